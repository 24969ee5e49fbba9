//! Browser origin allowlist.
//!
//! `SIDE_ALLOWED_ORIGINS` is a comma-separated list of origins in
//! `scheme://host[:port]` form; no path, query, fragment or credentials.
//! Origins are normalized (scheme/host lowercased, default ports elided)
//! before comparison, so `HTTP://Example.com:80/` and `http://example.com`
//! are the same entry.

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

/// A rejected allowlist entry.
#[derive(Debug, Clone, Error)]
#[error("invalid origin \"{origin}\": {reason}")]
pub struct OriginParseError {
    pub origin: String,
    pub reason: String,
}

impl OriginParseError {
    fn new(origin: &str, reason: impl Into<String>) -> Self {
        Self {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse and normalize one origin entry.
fn normalize_origin(raw: &str) -> Result<String, OriginParseError> {
    let url = Url::parse(raw).map_err(|e| OriginParseError::new(raw, e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(OriginParseError::new(raw, "scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(OriginParseError::new(raw, "missing host"));
    }
    if !matches!(url.path(), "" | "/") {
        return Err(OriginParseError::new(raw, "origins must not carry a path"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(OriginParseError::new(
            raw,
            "origins must not carry a query or fragment",
        ));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(OriginParseError::new(raw, "origins must not carry credentials"));
    }

    Ok(url.origin().ascii_serialization())
}

/// Parse a comma-separated allowlist. Empty entries are skipped; invalid
/// entries fail the whole parse.
pub fn parse_allowed_origins(raw: &str) -> Result<Vec<String>, OriginParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(normalize_origin)
        .collect()
}

/// The effective origin allowlist checked by the CORS middleware and the
/// WebSocket upgrade handlers.
#[derive(Debug, Clone)]
pub struct OriginAllowlist {
    origins: HashSet<String>,
}

impl OriginAllowlist {
    /// Seed defaults for the configured port, widen for development, then
    /// add every configured origin.
    pub fn build(
        port: u16,
        development: bool,
        configured: Option<&str>,
    ) -> Result<Self, OriginParseError> {
        let mut origins = HashSet::new();
        for host in ["localhost", "127.0.0.1"] {
            origins.insert(format!("http://{host}:{port}"));
        }
        if development {
            // Vite dev server
            origins.insert("http://localhost:5173".to_string());
            origins.insert("http://127.0.0.1:5173".to_string());
        }
        if let Some(raw) = configured {
            origins.extend(parse_allowed_origins(raw)?);
        }
        Ok(Self { origins })
    }

    /// Whether a request `Origin` header value is allowed.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match normalize_origin(origin) {
            Ok(normalized) => self.origins.contains(&normalized),
            Err(_) => false,
        }
    }

    /// All allowed origins, for building the CORS layer.
    #[must_use]
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}
