//! Validation of names arriving from clients and peers.
//!
//! Queue URIs, domain names and app ids all originate outside the
//! cluster and are validated once, at the control-plane boundary;
//! everything past the coordinator trusts them. A malformed URI is a
//! *permanent* rejection: retrying cannot fix it.

use std::fmt;

use super::error::{ClusterError, ClusterResult};
use crate::constants::MAX_URI_LENGTH;

/// URI scheme accepted for queues.
pub const URI_SCHEME: &str = "bmq";

/// A parsed, validated queue URI: `bmq://<domain>/<queue>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueUri {
    full: String,
    domain_len: usize,
}

impl QueueUri {
    /// Parse and validate a queue URI.
    pub fn parse(uri: &str) -> ClusterResult<Self> {
        if uri.is_empty() {
            return Err(ClusterError::InvalidUri("empty uri".into()));
        }
        if uri.len() > MAX_URI_LENGTH {
            return Err(ClusterError::InvalidUri(format!(
                "uri longer than {} bytes",
                MAX_URI_LENGTH
            )));
        }

        let rest = uri
            .strip_prefix(URI_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| {
                ClusterError::InvalidUri(format!("uri must start with {}://: {}", URI_SCHEME, uri))
            })?;

        let (domain, queue) = rest
            .split_once('/')
            .ok_or_else(|| ClusterError::InvalidUri(format!("uri missing queue path: {}", uri)))?;

        if domain.is_empty() {
            return Err(ClusterError::InvalidUri(format!("empty domain: {}", uri)));
        }
        if queue.is_empty() {
            return Err(ClusterError::InvalidUri(format!("empty queue name: {}", uri)));
        }
        if !domain.chars().all(is_name_char) {
            return Err(ClusterError::InvalidUri(format!(
                "invalid character in domain: {}",
                uri
            )));
        }
        if !queue.chars().all(|c| is_name_char(c) || c == '/') {
            return Err(ClusterError::InvalidUri(format!(
                "invalid character in queue name: {}",
                uri
            )));
        }

        Ok(Self {
            full: uri.to_string(),
            domain_len: domain.len(),
        })
    }

    /// The full URI string.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The domain component.
    pub fn domain(&self) -> &str {
        let start = URI_SCHEME.len() + 3;
        &self.full[start..start + self.domain_len]
    }

    /// The queue path component.
    pub fn queue(&self) -> &str {
        let start = URI_SCHEME.len() + 3 + self.domain_len + 1;
        &self.full[start..]
    }
}

impl fmt::Display for QueueUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// Validate an app id: non-empty, name characters only.
pub fn validate_app_id(app_id: &str) -> ClusterResult<()> {
    if app_id.is_empty() {
        return Err(ClusterError::AppIdConflict("empty app id".into()));
    }
    if !app_id.chars().all(is_name_char) {
        return Err(ClusterError::AppIdConflict(format!(
            "invalid character in app id: {}",
            app_id
        )));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' || c == '~'
}
