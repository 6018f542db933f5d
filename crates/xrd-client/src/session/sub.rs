//! Sub-sessions bound to a parent's login
//!
//! Bulk payloads of data requests travel on secondary sockets created with
//! `bind`. Free path ids sit on an unbounded queue; a path is taken for one
//! request and returned when its response cycle ends, even if the caller
//! stopped waiting for it.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use xrd_core::error::{SessionError, XrdError};
use xrd_protocol::messages::bind::{BindRequest, BindResponse};
use xrd_protocol::PathId;

use super::{Reply, Session, SessionInner};

/// A claimed path id, returned to the free queue on drop
pub(crate) struct PathGuard {
    path_id: PathId,
    free: mpsc::UnboundedSender<PathId>,
}

impl PathGuard {
    pub(crate) fn path_id(&self) -> PathId {
        self.path_id
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        // Fails only once the session is gone
        let _ = self.free.send(self.path_id);
    }
}

impl Session {
    /// Claim a path for a data payload, binding a new sub-session if none
    /// is free and the limit allows
    ///
    /// `None` means the payload goes inline on the control socket. Boxed
    /// since binding sends a request itself.
    pub(super) fn claim_path_id(&self) -> BoxFuture<'_, Option<PathGuard>> {
        Box::pin(async move {
            let max = self.inner.options.config.max_sub_sessions;
            if max == 0 || self.is_sub() {
                return None;
            }

            if let Some(guard) = self.inner.take_free_path() {
                return Some(guard);
            }

            let _creating = self.inner.sub_create.lock().await;
            if let Some(guard) = self.inner.take_free_path() {
                return Some(guard);
            }
            if self.inner.live_subs() >= max {
                tracing::debug!(
                    "{} on {}, writing inline",
                    SessionError::SubSessionsExhausted(max),
                    self.addr()
                );
                return None;
            }

            match self.bind_sub().await {
                Ok((path_id, sub)) => {
                    self.inner.subs_write().insert(path_id, sub);
                    Some(self.inner.path_guard(path_id))
                }
                Err(e) => {
                    tracing::warn!("Could not bind a sub-session to {}: {}", self.addr(), e);
                    None
                }
            }
        })
    }

    /// Open a second connection to the same server and bind it
    async fn bind_sub(&self) -> Result<(PathId, Session), XrdError> {
        let login_id = self.login_id().ok_or_else(|| {
            SessionError::UnexpectedResponse(format!("bind to {} before login", self.addr()))
        })?;

        let sub = Session::dial(self.addr(), Arc::clone(&self.inner.options), true).await?;
        let bound = sub
            .send::<_, BindResponse>(&mut BindRequest::new(login_id))
            .await
            .and_then(Reply::into_response);

        match bound {
            Ok(_) if sub.is_closed() => Err(SessionError::Closed.into()),
            Ok(resp) => {
                tracing::info!("Bound sub-session {} to {}", resp.path_id, self.addr());
                Ok((resp.path_id, sub))
            }
            Err(e) => {
                sub.close().await;
                Err(e)
            }
        }
    }
}

impl SessionInner {
    /// Pop free paths until one whose sub-session is still alive
    fn take_free_path(&self) -> Option<PathGuard> {
        loop {
            let path_id = self
                .free_paths_rx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .try_recv()
                .ok()?;

            match self.sub(path_id) {
                Some(sub) if !sub.is_closed() => return Some(self.path_guard(path_id)),
                _ => {
                    if let Some(dead) = self.subs_write().remove(&path_id) {
                        dead.inner.shutdown();
                    }
                }
            }
        }
    }

    /// Count sub-sessions, forgetting closed ones
    fn live_subs(&self) -> usize {
        let mut subs = self.subs_write();
        subs.retain(|_, sub| !sub.is_closed());
        subs.len()
    }

    fn path_guard(&self, path_id: PathId) -> PathGuard {
        PathGuard {
            path_id,
            free: self.free_paths_tx.clone(),
        }
    }

    pub(super) fn sub(&self, path_id: PathId) -> Option<Session> {
        self.subs_read().get(&path_id).cloned()
    }
}
