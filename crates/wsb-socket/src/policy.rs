//! URL, subprotocol and security checks applied before a transport is built.

use std::collections::HashSet;

use tokio_tungstenite::tungstenite::http::Uri;
use wsb_protocol::Protocols;

use crate::error::SocketError;

/// Which upstreams the bridge may connect to.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    /// Permit plain `ws://` upstreams.
    pub allow_insecure: bool,
    /// When non-empty, only these hosts may be dialled.
    pub allowed_hosts: Vec<String>,
    /// Ports that may never be dialled.
    pub blocked_ports: Vec<u16>,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            allow_insecure: true,
            allowed_hosts: Vec::new(),
            blocked_ports: Vec::new(),
        }
    }
}

/// A URL that passed [`ConnectPolicy::check`].
#[derive(Debug, Clone)]
pub struct Target {
    pub uri: Uri,
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl ConnectPolicy {
    /// Validate `url` and `protocols`. Malformed input is reported before
    /// policy violations, matching what a browser socket does.
    pub fn check(&self, url: &str, protocols: &Protocols) -> Result<Target, SocketError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| SocketError::invalid_url(url, format!("{e}")))?;

        let secure = match uri.scheme_str() {
            Some("wss") => true,
            Some("ws") => false,
            Some(other) => {
                return Err(SocketError::invalid_url(
                    url,
                    format!("unsupported scheme {other:?}"),
                ));
            }
            None => return Err(SocketError::invalid_url(url, "missing scheme")),
        };
        let host = match uri.host() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(SocketError::invalid_url(url, "missing host")),
        };
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        check_protocols(protocols)?;

        if !secure && !self.allow_insecure {
            return Err(SocketError::security(url, "insecure ws:// connections are disabled"));
        }
        if !self.allowed_hosts.is_empty()
            && !self
                .allowed_hosts
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&host))
        {
            return Err(SocketError::security(url, format!("host {host} is not allowed")));
        }
        if self.blocked_ports.contains(&port) {
            return Err(SocketError::security(url, format!("port {port} is blocked")));
        }

        Ok(Target {
            uri,
            secure,
            host,
            port,
        })
    }
}

/// Subprotocols must be distinct, non-empty HTTP tokens.
fn check_protocols(protocols: &Protocols) -> Result<(), SocketError> {
    let mut seen = HashSet::new();
    for protocol in protocols.as_slice() {
        if protocol.is_empty() || !protocol.bytes().all(is_tchar) {
            return Err(SocketError::InvalidProtocol(protocol.clone()));
        }
        if !seen.insert(protocol.as_str()) {
            return Err(SocketError::InvalidProtocol(protocol.clone()));
        }
    }
    Ok(())
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
