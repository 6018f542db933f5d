//! Connection setup: handshake, login, authentication, protocol negotiation

use std::sync::atomic::Ordering;

use xrd_core::error::{AuthError, ConnectionError, XrdError};
use xrd_protocol::messages::auth::parse_security_info;
use xrd_protocol::messages::handshake::{HandshakeRequest, HandshakeResponse};
use xrd_protocol::messages::login::{LoginRequest, LoginResponse};
use xrd_protocol::messages::protocol::{ProtocolRequest, ProtocolResponse};
use xrd_protocol::{to_bytes, SignRequirements, StreamId, XrdDecode};

use super::{PendingRequest, Reply, Session};

impl Session {
    /// Login, authenticate when asked to, then negotiate the protocol
    pub(super) async fn establish(&self, token: &str) -> Result<(), XrdError> {
        let login = self.login(token).await?;
        if !login.security_info.is_empty() {
            self.authenticate(&login.security_info).await?;
        }
        self.negotiate().await
    }

    /// Exchange the initial handshake on the reserved stream id
    pub(super) async fn handshake(&self) -> Result<(), XrdError> {
        let rejected = |reason: String| ConnectionError::HandshakeRejected {
            addr: self.addr().to_string(),
            reason,
        };

        let rx = self.inner.mux.claim_with_id(StreamId::HANDSHAKE)?;
        let request = PendingRequest::control(to_bytes(&HandshakeRequest::new())?);
        self.inner
            .pending_lock()
            .insert(StreamId::HANDSHAKE, request.clone());
        if let Err(err) = self.inner.write_request(&request).await {
            self.inner.cleanup(StreamId::HANDSHAKE);
            return Err(err);
        }

        let mut raw = match Self::collect(rx).await? {
            Reply::Response(raw) => raw,
            Reply::Redirect(r) => return Err(rejected(format!("redirected to {}", r.addr)).into()),
        };
        let resp = HandshakeResponse::decode(&mut raw).map_err(|e| rejected(e.to_string()))?;

        self.inner
            .protocol_version
            .store(resp.protocol_version, Ordering::SeqCst);
        tracing::debug!(
            "Handshake with {} complete: protocol {:#x}, {:?}",
            self.addr(),
            resp.protocol_version,
            resp.server_type
        );
        Ok(())
    }

    async fn login(&self, token: &str) -> Result<LoginResponse, XrdError> {
        let username = &self.inner.options.config.username;
        let mut req = LoginRequest::new(username, token.to_owned());
        let resp: LoginResponse = self.send(&mut req).await?.into_response()?;

        *self
            .inner
            .login_id
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(resp.session_id);
        tracing::debug!("Logged in to {} as {}", self.addr(), username);
        Ok(resp)
    }

    /// Try each provider the server offers, in its order, with every
    /// matching auther; the first success wins
    async fn authenticate(&self, security_info: &[u8]) -> Result<(), XrdError> {
        let offered = parse_security_info(security_info);
        let mut tried = Vec::new();
        let mut reasons = Vec::new();

        for provider in &offered {
            let authers = self
                .inner
                .options
                .authers
                .iter()
                .filter(|a| a.provider() == provider.name);

            for auther in authers {
                tried.push(provider.name.clone());
                let mut req = match auther.request(&provider.params).await {
                    Ok(req) => req,
                    Err(e) => {
                        reasons.push(format!("{}: {:#}", provider.name, e));
                        continue;
                    }
                };

                match self
                    .send::<_, ()>(&mut req)
                    .await
                    .and_then(Reply::into_response)
                {
                    Ok(()) => {
                        tracing::info!("Authenticated to {} with {}", self.addr(), provider.name);
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!("Provider {} rejected by {}: {}", provider.name, self.addr(), e);
                        reasons.push(format!("{}: {}", provider.name, e));
                    }
                }
            }
        }

        if tried.is_empty() {
            return Err(AuthError::NoProvider {
                offered: offered.into_iter().map(|p| p.name).collect(),
            }
            .into());
        }
        Err(AuthError::Rejected {
            providers: tried,
            reasons,
        }
        .into())
    }

    /// Negotiate the protocol version and adopt the server's signing policy
    async fn negotiate(&self) -> Result<(), XrdError> {
        let config = &self.inner.options.config;
        let mut req = ProtocolRequest::new(config.protocol_version, config.request_security);
        let resp: ProtocolResponse = self.send(&mut req).await?.into_response()?;

        let requirements =
            SignRequirements::new(resp.security_level(), resp.security_overrides());
        *self
            .inner
            .sign
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = requirements;

        tracing::info!(
            "Negotiated protocol {:#x} with {} (security level {:?}, {} overrides)",
            resp.binary_protocol_version,
            self.addr(),
            resp.security_level(),
            resp.security_overrides().len()
        );
        Ok(())
    }
}
