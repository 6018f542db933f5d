//! Stream multiplexer
//!
//! Maps each in-flight request to the channel its responses are delivered
//! on. Stream ids come from a background generator cycling through the
//! 255 * 255 id pool; ids claimed out-of-band (the handshake) are skipped.
//!
//! The per-stream channel is unbounded so the decode loop never blocks on a
//! slow caller. Dropping the sender (on [`Mux::unclaim`]) is the signal that
//! the response cycle is complete.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use xrd_core::error::{SessionError, XrdError};
use xrd_protocol::{Redirection, StreamId, STREAM_ID_POOL_SIZE};

/// Default capacity of the free stream id ring
pub const DEFAULT_FREE_IDS_BUFFER: usize = 32;

/// One unit delivered to the caller waiting on a stream
#[derive(Debug)]
pub enum ServerResponse {
    /// Payload of an `Ok` or `OkSoFar` response
    Data(Bytes),
    /// The request must be re-issued elsewhere
    Redirect(Redirection),
    /// The request failed
    Error(XrdError),
}

/// Receiving end handed to the claimer of a stream id
pub type ResponseReceiver = mpsc::UnboundedReceiver<ServerResponse>;

type ResponseSender = mpsc::UnboundedSender<ServerResponse>;

struct MuxState {
    waiters: HashMap<StreamId, ResponseSender>,
    closed: bool,
}

/// Stream id allocator and response router for one connection
pub struct Mux {
    state: Mutex<MuxState>,
    free_ids: tokio::sync::Mutex<mpsc::Receiver<StreamId>>,
    cancel: CancellationToken,
}

impl Mux {
    /// Create a multiplexer; must be called from within a Tokio runtime
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_FREE_IDS_BUFFER)
    }

    /// Create a multiplexer whose free id ring holds `buffer` ids
    pub fn with_buffer(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        tokio::spawn(generate_ids(tx, cancel.clone()));

        Self {
            state: Mutex::new(MuxState {
                waiters: HashMap::new(),
                closed: false,
            }),
            free_ids: tokio::sync::Mutex::new(rx),
            cancel,
        }
    }

    /// Claim the next free stream id
    ///
    /// Waits on the generator when the ring is momentarily empty.
    pub async fn claim(&self) -> Result<(StreamId, ResponseReceiver), XrdError> {
        let mut free_ids = self.free_ids.lock().await;
        loop {
            let id = free_ids.recv().await.ok_or(SessionError::MuxClosed)?;

            let mut state = self.lock_state();
            if state.closed {
                return Err(SessionError::MuxClosed.into());
            }
            if state.waiters.contains_key(&id) {
                continue;
            }

            let (tx, rx) = mpsc::unbounded_channel();
            state.waiters.insert(id, tx);
            return Ok((id, rx));
        }
    }

    /// Claim a specific stream id
    pub fn claim_with_id(&self, id: StreamId) -> Result<ResponseReceiver, XrdError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(SessionError::MuxClosed.into());
        }
        if state.waiters.contains_key(&id) {
            return Err(SessionError::StreamClaimed(id.to_string()).into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Release a stream id, ending its response cycle; no-op if unclaimed
    pub fn unclaim(&self, id: StreamId) {
        self.lock_state().waiters.remove(&id);
    }

    /// Deliver one response to the holder of `id`
    ///
    /// A holder that stopped listening is not an error: the id stays claimed
    /// until the cycle completes.
    pub fn send_data(&self, id: StreamId, response: ServerResponse) -> Result<(), XrdError> {
        let state = self.lock_state();
        let tx = state
            .waiters
            .get(&id)
            .ok_or_else(|| SessionError::NoWaiter(id.to_string()))?;
        if tx.send(response).is_err() {
            tracing::trace!("Receiver for {} is gone, dropping response", id);
        }
        Ok(())
    }

    /// Whether `id` is currently claimed
    pub fn is_claimed(&self, id: StreamId) -> bool {
        self.lock_state().waiters.contains_key(&id)
    }

    /// Number of claimed stream ids
    pub fn claimed(&self) -> usize {
        self.lock_state().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Stop the generator and fail every claimed stream
    pub fn close(&self) {
        let waiters = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        self.cancel.cancel();

        for (_, tx) in waiters {
            let _ = tx.send(ServerResponse::Error(SessionError::Closed.into()));
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MuxState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Feed the free id ring until cancelled
async fn generate_ids(tx: mpsc::Sender<StreamId>, cancel: CancellationToken) {
    let mut next: u16 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(StreamId::from(next)) => {
                if sent.is_err() {
                    break;
                }
                next = (next + 1) % STREAM_ID_POOL_SIZE;
            }
        }
    }
}
