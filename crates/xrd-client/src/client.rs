//! Client: session registry with redirect following

use dashmap::DashMap;
use std::sync::Arc;

use xrd_core::error::{SessionError, XrdError};
use xrd_core::{Auther, ClientConfig};
use xrd_protocol::{Request, XrdDecode};

use crate::session::{Reply, Session, SessionOptions};

/// Default XRootD port
pub const DEFAULT_PORT: u16 = 1094;

/// Reduce an address or `root://` URL to `host:port`
///
/// The scheme and any path are stripped; the default port is appended when
/// none is given.
pub fn normalize_addr(addr: &str) -> String {
    let rest = addr
        .strip_prefix("root://")
        .or_else(|| addr.strip_prefix("xroot://"))
        .unwrap_or(addr);
    let host_port = rest.split('/').next().unwrap_or(rest);

    let has_port = match host_port.rfind(':') {
        // Bracketed IPv6 literal without a port
        Some(_) if host_port.ends_with(']') => false,
        Some(i) => !host_port[i + 1..].is_empty(),
        None => false,
    };
    if has_port {
        host_port.to_string()
    } else {
        format!("{}:{}", host_port.trim_end_matches(':'), DEFAULT_PORT)
    }
}

/// Entry point for talking to an XRootD cluster
///
/// Keeps one session per server address, starting with the initial server,
/// and transparently follows redirections between them.
pub struct Client {
    options: Arc<SessionOptions>,
    initial_addr: String,
    /// Sessions indexed by `host:port`
    sessions: DashMap<String, Session>,
    connecting: tokio::sync::Mutex<()>,
}

impl Client {
    /// Connect to the initial server, authenticating as the configured user
    pub async fn connect(addr: &str, config: ClientConfig) -> Result<Self, XrdError> {
        let initial_addr = normalize_addr(addr);
        Self::with_options(SessionOptions::new(config, initial_addr)).await
    }

    /// Connect with a custom set of security providers
    pub async fn connect_with_authers(
        addr: &str,
        config: ClientConfig,
        authers: Vec<Arc<dyn Auther>>,
    ) -> Result<Self, XrdError> {
        let initial_addr = normalize_addr(addr);
        Self::with_options(SessionOptions::new(config, initial_addr).with_authers(authers)).await
    }

    async fn with_options(options: SessionOptions) -> Result<Self, XrdError> {
        options.config.validate()?;
        let initial_addr = options.initial_addr.clone();
        let options = Arc::new(options);

        let session = Session::connect(&initial_addr, "", Arc::clone(&options)).await?;
        let sessions = DashMap::new();
        sessions.insert(initial_addr.clone(), session);

        tracing::info!("Client connected to {}", initial_addr);
        Ok(Self {
            options,
            initial_addr,
            sessions,
            connecting: tokio::sync::Mutex::new(()),
        })
    }

    /// Send a request to the initial server, following redirections
    pub async fn send<R, T>(&self, req: &mut R) -> Result<T, XrdError>
    where
        R: Request + ?Sized,
        T: XrdDecode,
    {
        let addr = self.initial_addr.clone();
        let (_, resp) = self.send_session(&addr, req).await?;
        Ok(resp)
    }

    /// Send a request to `addr`, following redirections
    ///
    /// Returns the address of the server that produced the final response
    /// alongside it.
    pub async fn send_session<R, T>(&self, addr: &str, req: &mut R) -> Result<(String, T), XrdError>
    where
        R: Request + ?Sized,
        T: XrdDecode,
    {
        let max = self.options.config.max_redirections;
        let mut addr = normalize_addr(addr);
        let mut token = String::new();

        for _ in 0..=max {
            let session = self.session(&addr, &token).await?;
            match session.send::<R, T>(req).await? {
                Reply::Response(resp) => return Ok((addr, resp)),
                Reply::Redirect(redirection) => {
                    tracing::info!("Redirected from {} to {}", addr, redirection.addr);
                    if let Some(fp) = req.filepath_request() {
                        fp.set_opaque(&redirection.opaque);
                    }
                    addr = normalize_addr(&redirection.addr);
                    token = redirection.token;
                }
            }
        }

        Err(SessionError::TooManyRedirections { max }.into())
    }

    /// Live session for `addr`, opening one if needed
    async fn session(&self, addr: &str, token: &str) -> Result<Session, XrdError> {
        if let Some(session) = self.live_session(addr) {
            return Ok(session);
        }

        let _connecting = self.connecting.lock().await;
        if let Some(session) = self.live_session(addr) {
            return Ok(session);
        }

        tracing::debug!("Opening session to {}", addr);
        let session = Session::connect(addr, token, Arc::clone(&self.options)).await?;
        self.sessions.insert(addr.to_string(), session.clone());
        Ok(session)
    }

    fn live_session(&self, addr: &str) -> Option<Session> {
        self.sessions
            .get(addr)
            .map(|r| r.value().clone())
            .filter(|s| !s.is_closed())
    }

    /// Address of the first server contacted
    pub fn initial_addr(&self) -> &str {
        &self.initial_addr
    }

    /// Addresses with a registered session
    pub fn session_addrs(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.options.config
    }

    /// Close every session
    pub async fn close(&self) {
        let sessions: Vec<Session> = self.sessions.iter().map(|r| r.value().clone()).collect();
        self.sessions.clear();
        for session in sessions {
            session.close().await;
        }
        tracing::info!("Client for {} closed", self.initial_addr);
    }
}
