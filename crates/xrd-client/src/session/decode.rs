//! Response decode loop
//!
//! One task per session reads frames off the socket and routes them by
//! status. The task holds only a weak reference so dropping the last
//! [`Session`](super::Session) handle tears the connection down.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use xrd_core::error::{ConnectionError, SessionError, XrdError};
use xrd_protocol::{
    ProtocolError, Redirection, ResponseCodec, ResponseFrame, ResponseStatus, ServerError,
    StreamId, WaitResponse, XrdDecode,
};

use super::SessionInner;
use crate::mux::ServerResponse;

pub(super) async fn run(
    session: Weak<SessionInner>,
    reader: OwnedReadHalf,
    cancel: CancellationToken,
) {
    let mut frames = FramedRead::new(reader, ResponseCodec::new());

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => next,
        };
        let Some(inner) = session.upgrade() else {
            break;
        };

        match next {
            Some(Ok(frame)) => inner.dispatch(frame),
            Some(Err(e)) => {
                inner.connection_failed(e.into());
                break;
            }
            None => {
                let reason = format!("{} closed the connection", inner.addr);
                inner.connection_failed(ConnectionError::ConnectionLost(reason).into());
                break;
            }
        }
    }
}

impl SessionInner {
    fn dispatch(self: &Arc<Self>, frame: ResponseFrame) {
        let stream_id = frame.header.stream_id;
        let mut data = frame.data;

        match frame.header.status {
            ResponseStatus::Ok => {
                self.deliver(stream_id, ServerResponse::Data(data));
                self.cleanup(stream_id);
            }
            ResponseStatus::OkSoFar => {
                self.deliver(stream_id, ServerResponse::Data(data));
            }
            ResponseStatus::Error => {
                let err = match ServerError::decode(&mut data) {
                    Ok(server_err) => XrdError::Server(server_err),
                    Err(e) => e.into(),
                };
                self.deliver(stream_id, ServerResponse::Error(err));
                self.cleanup(stream_id);
            }
            ResponseStatus::Wait => match WaitResponse::decode(&mut data) {
                Ok(wait) => self.schedule_retry(stream_id, wait.duration),
                Err(e) => {
                    self.deliver(stream_id, ServerResponse::Error(e.into()));
                    self.cleanup(stream_id);
                }
            },
            ResponseStatus::Redirect => {
                let response = match Redirection::parse(&data) {
                    Ok(r) => ServerResponse::Redirect(r),
                    Err(e) => ServerResponse::Error(e.into()),
                };
                self.deliver(stream_id, response);
                self.cleanup(stream_id);
            }
            status => {
                let err = ProtocolError::UnknownStatus(status.as_u16());
                self.deliver(stream_id, ServerResponse::Error(err.into()));
                self.cleanup(stream_id);
            }
        }
    }

    /// Resend the pending request after `delay`; the stream stays claimed
    fn schedule_retry(self: &Arc<Self>, stream_id: StreamId, delay: Duration) {
        let request = self.pending_lock().get(&stream_id).cloned();
        let Some(request) = request else {
            let reason = format!("wait instruction for unknown request on {}", stream_id);
            self.deliver(
                stream_id,
                ServerResponse::Error(SessionError::UnexpectedResponse(reason).into()),
            );
            self.cleanup(stream_id);
            return;
        };

        tracing::debug!(
            "Server {} asked to wait {:?} before resending {}",
            self.addr,
            delay,
            stream_id
        );

        let session = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let Some(inner) = session.upgrade() else {
                        return;
                    };
                    if let Err(e) = inner.write_request(&request).await {
                        inner.deliver(stream_id, ServerResponse::Error(e));
                        inner.cleanup(stream_id);
                    }
                }
            }
        });
    }

    /// Handle a dead connection
    ///
    /// Requests pending on the initial server fail. Requests pending on any
    /// other server are redirected back to the initial one.
    fn connection_failed(&self, err: XrdError) {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }

        let pending: Vec<StreamId> = self.pending_lock().keys().copied().collect();
        if self.is_sub {
            tracing::debug!("Sub-session to {} ended: {}", self.addr, err);
        } else if self.is_initial() {
            tracing::error!(
                "Connection to initial server {} failed with {} pending requests: {}",
                self.addr,
                pending.len(),
                err
            );
            let reason = err.to_string();
            for stream_id in pending {
                let lost = ConnectionError::ConnectionLost(reason.clone());
                self.deliver(stream_id, ServerResponse::Error(lost.into()));
                self.cleanup(stream_id);
            }
        } else {
            tracing::warn!(
                "Connection to {} failed: {}; redirecting {} pending requests to {}",
                self.addr,
                err,
                pending.len(),
                self.options.initial_addr
            );
            for stream_id in pending {
                let back = Redirection::to(self.options.initial_addr.clone());
                self.deliver(stream_id, ServerResponse::Redirect(back));
                self.cleanup(stream_id);
            }
        }

        self.shutdown();
    }
}
