//! Scripted in-process server for integration tests
//!
//! Connection setup (handshake, login, auth, protocol, bind) is answered
//! automatically. Every other request is handed to the test through
//! [`FakeServer::next_request`] so the test decides what to answer, when,
//! and in which order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use xrd_protocol::messages::bind::BindResponse;
use xrd_protocol::messages::handshake::{HandshakeResponse, ServerType, HANDSHAKE_SIZE};
use xrd_protocol::messages::login::LoginResponse;
use xrd_protocol::messages::protocol::{flags, ProtocolResponse, SecurityInfo};
use xrd_protocol::messages::sigver::SigverRequest;
use xrd_protocol::messages::write::PATH_ID_OFFSET;
use xrd_protocol::{
    write_response, RequestHeader, RequestKind, ResponseStatus, ServerError, ServerErrorCode,
    StreamId, XrdDecode, XrdEncode, REQUEST_FIXED_SIZE,
};

pub const SESSION_ID: [u8; 16] = *b"fake-session-id!";

/// Route client logs to the test output; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the server answers connection setup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Security information returned at login, e.g. `&P=unix`
    pub security_info: &'static str,
    /// Security section of the protocol response
    pub security: Option<SecurityInfo>,
    /// Whether auth requests succeed
    pub accept_auth: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            security_info: "",
            security: None,
            accept_auth: true,
        }
    }
}

/// What the server observed during setup
#[derive(Debug, Default)]
pub struct ServerState {
    pub connections: AtomicUsize,
    pub binds: AtomicUsize,
    pub login_tokens: Mutex<Vec<Bytes>>,
    pub auth_credentials: Mutex<Vec<Bytes>>,
    /// Answer further binds with an error
    pub refuse_binds: AtomicBool,
    next_path: AtomicU8,
    paths: tokio::sync::Mutex<HashMap<u8, BoundPath>>,
}

/// Both halves of a bound socket; dropping it closes the connection
#[derive(Debug)]
struct BoundPath {
    reader: OwnedReadHalf,
    _writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl ServerState {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    /// Close every bound socket
    pub async fn drop_paths(&self) {
        self.paths.lock().await.clear();
    }
}

/// A request left for the test to answer
pub struct Incoming {
    pub header: RequestHeader,
    /// Fixed parameters, data length and inline data
    pub body: Bytes,
    /// Payload, read inline or from the bound socket
    pub data: Bytes,
    pub path_id: u8,
    /// Signing envelope that preceded the request
    pub signature: Option<SigverRequest>,
    /// Request bytes as read from the control socket
    pub raw: Bytes,
    pub conn: usize,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl Incoming {
    pub fn request_id(&self) -> u16 {
        self.header.request_id
    }

    pub fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }

    pub fn decode<T: XrdDecode>(&self) -> T {
        let mut body = self.body.clone();
        T::decode(&mut body).unwrap()
    }

    pub async fn respond<T: XrdEncode + ?Sized>(&self, status: ResponseStatus, body: &T) {
        self.respond_on(self.stream_id(), status, body).await;
    }

    /// Respond on an arbitrary stream id
    pub async fn respond_on<T: XrdEncode + ?Sized>(
        &self,
        stream_id: StreamId,
        status: ResponseStatus,
        body: &T,
    ) {
        let mut writer = self.writer.lock().await;
        write_response(&mut *writer, stream_id, status, body)
            .await
            .unwrap();
    }

    pub async fn ok<T: XrdEncode + ?Sized>(&self, body: &T) {
        self.respond(ResponseStatus::Ok, body).await;
    }

    pub async fn error(&self, code: ServerErrorCode, message: &str) {
        self.respond(ResponseStatus::Error, &ServerError::new(code, message))
            .await;
    }

    /// Close the connection this request arrived on
    pub async fn hang_up(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

pub struct FakeServer {
    pub addr: String,
    pub state: Arc<ServerState>,
    requests: mpsc::UnboundedReceiver<Incoming>,
}

impl FakeServer {
    pub async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(ServerState::default());
        let (tx, requests) = mpsc::unbounded_channel();

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    conn,
                    config.clone(),
                    Arc::clone(&accept_state),
                    tx.clone(),
                ));
            }
        });

        Self {
            addr,
            state,
            requests,
        }
    }

    /// Next request that is not part of connection setup
    pub async fn next_request(&mut self) -> Incoming {
        tokio::time::timeout(Duration::from_secs(10), self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("server stopped")
    }

    /// Assert no request arrives for a while
    pub async fn assert_idle(&mut self, wait: Duration) {
        if let Ok(Some(req)) = tokio::time::timeout(wait, self.requests.recv()).await {
            panic!("unexpected request {}", req.request_id());
        }
    }
}

async fn serve(
    stream: TcpStream,
    conn: usize,
    config: ServerConfig,
    state: Arc<ServerState>,
    requests: mpsc::UnboundedSender<Incoming>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    let mut handshake = [0u8; HANDSHAKE_SIZE];
    if reader.read_exact(&mut handshake).await.is_err() {
        return;
    }
    let hs = HandshakeResponse {
        protocol_version: 0x520,
        server_type: ServerType::Data,
    };
    reply(&writer, StreamId::HANDSHAKE, ResponseStatus::Ok, &hs).await;

    let mut signature = None;
    loop {
        let mut fixed = [0u8; REQUEST_FIXED_SIZE];
        if reader.read_exact(&mut fixed).await.is_err() {
            return;
        }
        let mut head = Bytes::copy_from_slice(&fixed[..4]);
        let header = RequestHeader::decode(&mut head).unwrap();
        let dlen = i32::from_be_bytes([fixed[20], fixed[21], fixed[22], fixed[23]]) as usize;
        let path_id = if header.request_id == RequestKind::Write.as_u16() {
            fixed[PATH_ID_OFFSET]
        } else {
            0
        };

        let mut inline = vec![0u8; if path_id == 0 { dlen } else { 0 }];
        if reader.read_exact(&mut inline).await.is_err() {
            return;
        }
        let data = if path_id == 0 {
            Bytes::from(inline.clone())
        } else {
            let mut paths = state.paths.lock().await;
            let bound = paths.get_mut(&path_id).expect("unknown path id");
            let mut payload = vec![0u8; dlen];
            bound.reader.read_exact(&mut payload).await.unwrap();
            Bytes::from(payload)
        };

        let mut raw = BytesMut::from(&fixed[..]);
        raw.extend_from_slice(&inline);
        let raw = raw.freeze();
        let body = raw.slice(4..);

        match RequestKind::from_u16(header.request_id) {
            Some(RequestKind::Sigver) => {
                let mut b = body.clone();
                signature = Some(SigverRequest::decode(&mut b).unwrap());
            }
            Some(RequestKind::Login) => {
                state
                    .login_tokens
                    .lock()
                    .unwrap()
                    .push(raw.slice(REQUEST_FIXED_SIZE..));
                let resp = LoginResponse {
                    session_id: SESSION_ID,
                    security_info: Bytes::from_static(config.security_info.as_bytes()),
                };
                reply(&writer, header.stream_id, ResponseStatus::Ok, &resp).await;
            }
            Some(RequestKind::Auth) => {
                state.auth_credentials.lock().unwrap().push(data.clone());
                if config.accept_auth {
                    reply(&writer, header.stream_id, ResponseStatus::Ok, &()).await;
                } else {
                    let err = ServerError::new(ServerErrorCode::NOT_AUTHORIZED, "denied");
                    reply(&writer, header.stream_id, ResponseStatus::Error, &err).await;
                }
            }
            Some(RequestKind::Protocol) => {
                let resp = ProtocolResponse {
                    binary_protocol_version: 0x520,
                    flags: flags::IS_SERVER,
                    security: config.security.clone(),
                };
                reply(&writer, header.stream_id, ResponseStatus::Ok, &resp).await;
            }
            Some(RequestKind::Bind) => {
                if state.refuse_binds.load(Ordering::SeqCst) {
                    let err = ServerError::new(ServerErrorCode::NOT_AUTHORIZED, "no more binds");
                    reply(&writer, header.stream_id, ResponseStatus::Error, &err).await;
                    continue;
                }
                state.binds.fetch_add(1, Ordering::SeqCst);
                let path_id = state.next_path.fetch_add(1, Ordering::SeqCst) + 1;
                let resp = BindResponse {
                    path_id: path_id.into(),
                };
                // The socket now only carries payloads read by its parent
                let bound = BoundPath {
                    reader,
                    _writer: Arc::clone(&writer),
                };
                state.paths.lock().await.insert(path_id, bound);
                reply(&writer, header.stream_id, ResponseStatus::Ok, &resp).await;
                return;
            }
            _ => {
                let incoming = Incoming {
                    header,
                    body,
                    data,
                    path_id,
                    signature: signature.take(),
                    raw,
                    conn,
                    writer: Arc::clone(&writer),
                };
                if requests.send(incoming).is_err() {
                    return;
                }
            }
        }
    }
}

async fn reply<T: XrdEncode + ?Sized>(
    writer: &tokio::sync::Mutex<OwnedWriteHalf>,
    stream_id: StreamId,
    status: ResponseStatus,
    body: &T,
) {
    let mut writer = writer.lock().await;
    let _ = write_response(&mut *writer, stream_id, status, body).await;
}
