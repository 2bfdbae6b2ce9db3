//! Share URL derivation.
//!
//! The admin surface shows a link (rendered elsewhere as a QR code) that
//! opens the viewer. When the app is served from a loopback address the
//! link is useless to a phone, so an [`OriginResolver`] may swap the host
//! for one reachable on the local network.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::surface::Route;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("origin '{0}' has no scheme")]
    MissingScheme(String),
    #[error("origin '{0}' has no host")]
    MissingHost(String),
    #[error("invalid port in origin '{0}'")]
    InvalidPort(String),
    #[error("origin '{0}' must not contain a path")]
    UnexpectedPath(String),
}

/// `scheme://host[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]", self.scheme, self.host)?;
        } else {
            write!(f, "{}://{}", self.scheme, self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl FromStr for Origin {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .filter(|(scheme, _)| !scheme.is_empty())
            .ok_or_else(|| OriginError::MissingScheme(s.to_string()))?;

        let authority = rest.strip_suffix('/').unwrap_or(rest);
        if authority.contains('/') {
            return Err(OriginError::UnexpectedPath(s.to_string()));
        }

        // [v6]:port | host:port | host
        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| OriginError::MissingHost(s.to_string()))?;
            let port = match after {
                "" => None,
                p => Some(p.strip_prefix(':').unwrap_or(p)),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(OriginError::MissingHost(s.to_string()));
        }
        let port = port
            .map(|p| p.parse::<u16>())
            .transpose()
            .map_err(|_| OriginError::InvalidPort(s.to_string()))?;

        Ok(Origin::new(scheme, host, port))
    }
}

/// Chooses the origin a share link should point at.
pub trait OriginResolver: Send + Sync {
    fn resolve(&self, origin: &Origin) -> Origin;
}

/// Uses the origin the app was reached on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl OriginResolver for PassThrough {
    fn resolve(&self, origin: &Origin) -> Origin {
        origin.clone()
    }
}

/// Replaces a loopback host with a LAN address; other hosts pass through.
#[derive(Debug, Clone)]
pub struct LanSubstitution {
    lan_host: String,
}

impl LanSubstitution {
    pub fn new(lan_host: impl Into<String>) -> Self {
        Self {
            lan_host: lan_host.into(),
        }
    }
}

impl OriginResolver for LanSubstitution {
    fn resolve(&self, origin: &Origin) -> Origin {
        if origin.is_loopback() {
            origin.with_host(self.lan_host.clone())
        } else {
            origin.clone()
        }
    }
}

/// `{scheme}://{host}[:{port}]/view`
pub fn derive_share_url(origin: &Origin, resolver: &dyn OriginResolver) -> String {
    format!("{}{}", resolver.resolve(origin), Route::Viewer.path())
}
