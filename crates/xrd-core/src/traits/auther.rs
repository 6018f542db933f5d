//! Security provider contract

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use xrd_protocol::messages::auth::AuthRequest;

/// A security provider able to answer a server's authentication challenge
#[async_trait]
pub trait Auther: Send + Sync {
    /// Provider name as announced by servers (`unix`, `krb5`, ...)
    fn provider(&self) -> &str;

    /// Build the credentials for the parameters the server sent along
    /// with this provider's name
    async fn request(&self, params: &[String]) -> anyhow::Result<AuthRequest>;
}

/// The `unix` provider: identifies as a local user and group, no secrets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixAuther {
    pub username: String,
    pub group: String,
}

impl UnixAuther {
    pub const PROVIDER: &'static str = "unix";

    pub fn new(username: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            group: group.into(),
        }
    }

    /// Current user; the group defaults to the user's name
    pub fn current() -> Self {
        let username = whoami::username();
        Self::new(username.clone(), username)
    }
}

#[async_trait]
impl Auther for UnixAuther {
    fn provider(&self) -> &str {
        Self::PROVIDER
    }

    async fn request(&self, _params: &[String]) -> anyhow::Result<AuthRequest> {
        anyhow::ensure!(!self.username.is_empty(), "auth/unix: empty user name");

        let mut creds = BytesMut::new();
        creds.put_slice(b"unix\0");
        creds.put_slice(self.username.as_bytes());
        creds.put_u8(b' ');
        creds.put_slice(self.group.as_bytes());
        creds.put_u8(0);
        Ok(AuthRequest::new(Self::PROVIDER, creds.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unix_credentials() {
        let auther = UnixAuther::new("gopher", "users");
        assert_eq!(auther.provider(), "unix");

        let req = auther.request(&[]).await.unwrap();
        assert_eq!(&req.credential_type, b"unix");
        assert_eq!(req.credentials.as_ref(), b"unix\0gopher users\0");
    }

    #[tokio::test]
    async fn test_unix_rejects_empty_user() {
        let auther = UnixAuther::new("", "users");
        assert!(auther.request(&[]).await.is_err());
    }
}
