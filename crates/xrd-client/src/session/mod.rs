//! Sessions: one negotiated connection to one server
//!
//! A [`Session`] owns a TCP connection, the [`Mux`] correlating requests
//! with responses on it, the requests still in flight (kept so they can be
//! replayed when the server asks to wait), the signing policy negotiated at
//! setup, and a small pool of sub-sessions bound to its login for carrying
//! bulk payloads.
//!
//! # Lifecycle
//!
//! 1. Dial and handshake, bounded by `connect_timeout`
//! 2. Login, presenting a redirect token if one was handed out
//! 3. Authenticate if the server listed security providers
//! 4. Negotiate the protocol version and signing requirements
//!
//! Steps 2 to 4 together are bounded by `connect_timeout` as well.
//!
//! Afterwards a background task decodes every response from the socket and
//! routes it to the waiting caller. The session closes on [`Session::close`],
//! when its last handle is dropped, or when the connection fails.

mod decode;
mod setup;
mod sub;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use xrd_core::error::{ConnectionError, SessionError, XrdError};
use xrd_core::{Auther, ClientConfig, UnixAuther};
use xrd_protocol::messages::login;
use xrd_protocol::messages::sigver::SigverRequest;
use xrd_protocol::{
    DataDirection, PathId, Redirection, Request, RequestHeader, SignRequirements, StreamId,
    XrdDecode, XrdEncode,
};

use crate::mux::{Mux, ResponseReceiver, ServerResponse};
use sub::PathGuard;

/// Settings shared by every session a client opens
#[derive(Clone)]
pub struct SessionOptions {
    pub config: ClientConfig,
    /// Address of the first server contacted; a failing session elsewhere
    /// redirects its pending requests back here
    pub initial_addr: String,
    /// Security providers, tried in the order the server lists them
    pub authers: Vec<Arc<dyn Auther>>,
}

impl SessionOptions {
    /// Options with the `unix` provider for the configured user
    pub fn new(config: ClientConfig, initial_addr: impl Into<String>) -> Self {
        let unix = UnixAuther::new(config.username.clone(), config.username.clone());
        Self {
            config,
            initial_addr: initial_addr.into(),
            authers: vec![Arc::new(unix)],
        }
    }

    /// Replace the security providers
    pub fn with_authers(mut self, authers: Vec<Arc<dyn Auther>>) -> Self {
        self.authers = authers;
        self
    }
}

/// Outcome of a request that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    /// Final response, decoded
    Response(T),
    /// The request must be re-issued to another server
    Redirect(Redirection),
}

impl<T> Reply<T> {
    /// The response, treating a redirection as unexpected
    pub fn into_response(self) -> Result<T, XrdError> {
        match self {
            Reply::Response(resp) => Ok(resp),
            Reply::Redirect(r) => {
                Err(SessionError::UnexpectedResponse(format!("redirect to {}", r.addr)).into())
            }
        }
    }
}

/// A request as written, kept for replay on `Wait`
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    /// Request header and body, preceded by the signing envelope if any
    pub header: Bytes,
    /// Payload of a data request
    pub data: Bytes,
    /// Socket carrying `data`
    pub path_id: PathId,
}

impl PendingRequest {
    fn control(header: Bytes) -> Self {
        Self {
            header,
            data: Bytes::new(),
            path_id: PathId::CONTROL,
        }
    }
}

pub(crate) struct SessionInner {
    addr: String,
    options: Arc<SessionOptions>,
    is_sub: bool,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    mux: Mux,
    pending: Mutex<HashMap<StreamId, PendingRequest>>,
    /// Sub-session paths held by in-flight streams
    paths: Mutex<HashMap<StreamId, PathGuard>>,
    sign: RwLock<SignRequirements>,
    seq_id: AtomicI64,
    login_id: RwLock<Option<login::SessionId>>,
    protocol_version: AtomicI32,
    subs: RwLock<HashMap<PathId, Session>>,
    free_paths_tx: mpsc::UnboundedSender<PathId>,
    free_paths_rx: Mutex<mpsc::UnboundedReceiver<PathId>>,
    sub_create: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

/// Handle to a connection with one server; cheap to clone
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Connect to `addr` and run the whole setup sequence
    ///
    /// `token` is the login token of a redirection, empty otherwise.
    pub async fn connect(
        addr: &str,
        token: &str,
        options: Arc<SessionOptions>,
    ) -> Result<Self, XrdError> {
        let timeout = options.config.connect_timeout;
        let session = Self::dial(addr, options, false).await?;
        let established = match tokio::time::timeout(timeout, session.establish(token)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::ConnectTimeout(addr.to_string()).into()),
        };
        if let Err(err) = established {
            session.close().await;
            return Err(err);
        }

        tracing::info!(
            "Session to {} established (protocol {:#x})",
            session.addr(),
            session.protocol_version()
        );
        Ok(session)
    }

    /// Dial, start the decode loop and handshake; each step is bounded by
    /// `connect_timeout`
    async fn dial(addr: &str, options: Arc<SessionOptions>, is_sub: bool) -> Result<Self, XrdError> {
        let timeout = options.config.connect_timeout;
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(ConnectionError::ConnectTimeout(addr.to_string()).into()),
        };
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let (free_paths_tx, free_paths_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            addr: addr.to_string(),
            mux: Mux::with_buffer(options.config.free_stream_ids_buffer),
            options,
            is_sub,
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            paths: Mutex::new(HashMap::new()),
            sign: RwLock::new(SignRequirements::default()),
            seq_id: AtomicI64::new(0),
            login_id: RwLock::new(None),
            protocol_version: AtomicI32::new(0),
            subs: RwLock::new(HashMap::new()),
            free_paths_tx,
            free_paths_rx: Mutex::new(free_paths_rx),
            sub_create: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(decode::run(
            Arc::downgrade(&inner),
            reader,
            inner.cancel.clone(),
        ));

        let session = Self { inner };
        match tokio::time::timeout(timeout, session.handshake()).await {
            Ok(Ok(())) => Ok(session),
            Ok(Err(err)) => {
                session.close().await;
                Err(err)
            }
            Err(_) => {
                session.close().await;
                Err(ConnectionError::ConnectTimeout(addr.to_string()).into())
            }
        }
    }

    /// Send `req` and wait for its complete response
    ///
    /// `OkSoFar` chunks are concatenated until the final `Ok`, then decoded
    /// into `T`. A redirection is returned as [`Reply::Redirect`]; `Wait`
    /// instructions are handled transparently.
    ///
    /// Dropping the returned future stops waiting, but the stream id and any
    /// sub-session path stay claimed until the server answers or the session
    /// closes.
    pub async fn send<R, T>(&self, req: &mut R) -> Result<Reply<T>, XrdError>
    where
        R: Request + ?Sized,
        T: XrdDecode,
    {
        if self.is_closed() {
            return Err(SessionError::Closed.into());
        }

        let wants_path = req.data_request().map_or(false, |d| {
            d.direction() == DataDirection::Write && !d.path_data().is_empty()
        });
        let guard = if wants_path {
            self.claim_path_id().await
        } else {
            None
        };

        let (stream_id, rx) = self.inner.mux.claim().await?;
        let mut path_id = match guard {
            Some(guard) => {
                let path_id = guard.path_id();
                self.inner.paths_lock().insert(stream_id, guard);
                path_id
            }
            None => PathId::CONTROL,
        };

        loop {
            let data = match req.data_request() {
                Some(d) => {
                    d.set_path_id(path_id);
                    d.path_data()
                }
                None => Bytes::new(),
            };
            let header = match self.marshal(stream_id, req) {
                Ok(header) => header,
                Err(err) => {
                    self.inner.cleanup(stream_id);
                    return Err(err);
                }
            };

            let request = PendingRequest {
                header,
                data,
                path_id,
            };
            self.inner.pending_lock().insert(stream_id, request.clone());
            match self.inner.write_request(&request).await {
                Ok(()) => break,
                Err(XrdError::Session(SessionError::UnknownPath(id))) if !path_id.is_control() => {
                    tracing::debug!(
                        "Sub-session {} to {} is gone, writing inline",
                        id,
                        self.addr()
                    );
                    self.inner.release_path(stream_id);
                    path_id = PathId::CONTROL;
                }
                Err(err) => {
                    self.inner.cleanup(stream_id);
                    return Err(err);
                }
            }
        }

        match Self::collect(rx).await? {
            Reply::Response(mut raw) => Ok(Reply::Response(T::decode(&mut raw)?)),
            Reply::Redirect(r) => Ok(Reply::Redirect(r)),
        }
    }

    /// Marshal header and body, wrapped in a signing envelope if required
    fn marshal<R: Request + ?Sized>(&self, stream_id: StreamId, req: &R) -> Result<Bytes, XrdError> {
        let mut buf = BytesMut::new();
        RequestHeader::new(stream_id, req.request_id()).encode(&mut buf)?;
        req.encode(&mut buf)?;

        if !self.inner.sign_read().needed(req) {
            return Ok(buf.freeze());
        }

        let seq_id = self.inner.seq_id.fetch_add(1, Ordering::SeqCst) + 1;
        let sigver = SigverRequest::new(req.request_id(), seq_id, &buf);
        let mut signed = BytesMut::new();
        RequestHeader::new(stream_id, sigver.request_id()).encode(&mut signed)?;
        sigver.encode(&mut signed)?;
        signed.extend_from_slice(&buf);

        tracing::trace!(
            "Signed request {} on {} with sequence number {}",
            req.request_id(),
            stream_id,
            seq_id
        );
        Ok(signed.freeze())
    }

    /// Gather the responses of one stream until its cycle ends
    async fn collect(mut rx: ResponseReceiver) -> Result<Reply<Bytes>, XrdError> {
        let mut data = BytesMut::new();
        while let Some(resp) = rx.recv().await {
            match resp {
                ServerResponse::Data(chunk) => data.extend_from_slice(&chunk),
                ServerResponse::Redirect(r) => return Ok(Reply::Redirect(r)),
                ServerResponse::Error(err) => return Err(err),
            }
        }
        Ok(Reply::Response(data.freeze()))
    }

    /// Close the connection; requests still waiting fail with a closed error
    pub async fn close(&self) {
        self.inner.shutdown();
        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Shutdown of connection to {} failed: {}", self.addr(), e);
        }
    }

    /// Server address as `host:port`
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether this is a sub-session bound to another session's login
    pub fn is_sub(&self) -> bool {
        self.inner.is_sub
    }

    /// Protocol version reported by the server at handshake
    pub fn protocol_version(&self) -> i32 {
        self.inner.protocol_version.load(Ordering::SeqCst)
    }

    /// Session id assigned at login
    pub fn login_id(&self) -> Option<login::SessionId> {
        *self
            .inner
            .login_id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Signing policy negotiated with the server
    pub fn sign_requirements(&self) -> SignRequirements {
        self.inner.sign_read().clone()
    }

    /// Number of bound sub-sessions still connected
    pub fn sub_sessions(&self) -> usize {
        self.inner
            .subs_read()
            .values()
            .filter(|sub| !sub.is_closed())
            .count()
    }

    /// Number of requests awaiting their final response
    pub fn pending_requests(&self) -> usize {
        self.inner.pending_lock().len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.inner.addr)
            .field("is_sub", &self.inner.is_sub)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionInner {
    /// Write a request on the control socket, its payload on the socket
    /// named by its path id
    ///
    /// Fails with `UnknownPath` before writing anything when that socket is
    /// gone, so the server never waits for a payload that cannot arrive.
    pub(crate) async fn write_request(&self, request: &PendingRequest) -> Result<(), XrdError> {
        if request.path_id.is_control() {
            let mut writer = self.writer.lock().await;
            writer.write_all(&request.header).await?;
            if !request.data.is_empty() {
                writer.write_all(&request.data).await?;
            }
            writer.flush().await?;
            return Ok(());
        }

        let sub = self
            .sub(request.path_id)
            .filter(|sub| !sub.is_closed())
            .ok_or(SessionError::UnknownPath(request.path_id.as_u8()))?;
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(&request.header).await?;
            writer.flush().await?;
        }
        sub.inner.write_raw(&request.data).await
    }

    /// Write bytes as-is
    async fn write_raw(&self, data: &[u8]) -> Result<(), XrdError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed.into());
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Deliver a response, logging when nobody waits for it
    fn deliver(&self, stream_id: StreamId, response: ServerResponse) {
        if let Err(e) = self.mux.send_data(stream_id, response) {
            tracing::warn!("Dropping response from {}: {}", self.addr, e);
        }
    }

    /// End the response cycle of a stream, freeing its path
    fn cleanup(&self, stream_id: StreamId) {
        self.mux.unclaim(stream_id);
        self.pending_lock().remove(&stream_id);
        self.release_path(stream_id);
    }

    fn release_path(&self, stream_id: StreamId) {
        let guard = self.paths_lock().remove(&stream_id);
        drop(guard);
    }

    fn is_initial(&self) -> bool {
        !self.is_sub && self.addr == self.options.initial_addr
    }

    /// Stop the decode loop, fail waiters and tear down sub-sessions
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.mux.close();
        self.pending_lock().clear();
        let paths = std::mem::take(&mut *self.paths_lock());
        drop(paths);

        let subs: Vec<Session> = self.subs_write().drain().map(|(_, s)| s).collect();
        for sub in subs {
            sub.inner.shutdown();
        }
        tracing::debug!("Session to {} closed", self.addr);
    }

    fn pending_lock(&self) -> MutexGuard<'_, HashMap<StreamId, PendingRequest>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn paths_lock(&self) -> MutexGuard<'_, HashMap<StreamId, PathGuard>> {
        self.paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sign_read(&self) -> RwLockReadGuard<'_, SignRequirements> {
        self.sign
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subs_read(&self) -> RwLockReadGuard<'_, HashMap<PathId, Session>> {
        self.subs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subs_write(&self) -> RwLockWriteGuard<'_, HashMap<PathId, Session>> {
        self.subs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
