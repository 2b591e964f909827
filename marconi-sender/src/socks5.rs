//! SOCKS5 proxy support for outgoing connections.

use std::io;

use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use crate::errors::InvocationError;

/// Where and how to reach a SOCKS5 proxy.
#[derive(Clone, Debug)]
pub struct Socks5Config {
    /// Proxy address as `host:port`.
    pub proxy_addr: String,
    /// Username and password, when the proxy wants them.
    pub auth: Option<(String, String)>,
}

impl Socks5Config {
    /// Proxy without authentication.
    pub fn new(proxy_addr: impl Into<String>) -> Self {
        Self {
            proxy_addr: proxy_addr.into(),
            auth: None,
        }
    }

    /// Proxy with username and password authentication.
    pub fn with_auth(
        proxy_addr: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            proxy_addr: proxy_addr.into(),
            auth: Some((username.into(), password.into())),
        }
    }

    /// Opens a TCP stream to `target` through the proxy.
    pub(crate) async fn connect(&self, target: &str) -> Result<TcpStream, InvocationError> {
        tracing::debug!("connecting to {target} via socks5 proxy {}", self.proxy_addr);
        let stream = match &self.auth {
            Some((username, password)) => Socks5Stream::connect_with_password(
                self.proxy_addr.as_str(),
                target,
                username,
                password,
            )
            .await,
            None => Socks5Stream::connect(self.proxy_addr.as_str(), target).await,
        };
        stream
            .map(Socks5Stream::into_inner)
            .map_err(|e| InvocationError::Io(io::Error::other(e)))
    }
}
