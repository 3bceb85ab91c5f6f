/*
 * config.rs
 * Copyright (C) 2026 Staffetta contributors
 *
 * This file is part of Staffetta, an HTTP/1.1 client transport library.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Transport configuration: endpoint, pool bounds, timeouts, TLS policy.
//!
//! One explicit record with documented defaults, validated once by
//! `validate()` when a pool or connection is built. There is no
//! process-global configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};

use crate::error::TransportError;

/// Certificate decision callback: end-entity certificate, intermediates as
/// presented by the peer, and the server name being validated. Return true
/// to accept the peer.
pub type CertificateDecision =
    dyn Fn(&CertificateDer<'_>, &[CertificateDer<'_>], &ServerName<'_>) -> bool + Send + Sync;

/// How the remote certificate is validated during the TLS handshake.
#[derive(Clone, Default)]
pub enum CertificateValidation {
    /// Accept any certificate without validation. This is the default and it
    /// is insecure: the peer is not authenticated at all. Use `WebPki` for
    /// real deployments.
    #[default]
    AcceptAll,
    /// Full chain validation against the platform trust store, falling back
    /// to the bundled Mozilla roots when the platform store is empty.
    WebPki,
    /// Pluggable validator: the callback decides.
    Callback(Arc<CertificateDecision>),
}

impl fmt::Debug for CertificateValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateValidation::AcceptAll => f.write_str("AcceptAll"),
            CertificateValidation::WebPki => f.write_str("WebPki"),
            CertificateValidation::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Minimum TLS protocol version offered during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// Transport configuration. `host`, `port` and `use_tls` identify the
/// endpoint; everything else has a usable default.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Upper bound on pooled connections and on concurrent in-flight
    /// requests. Default 4.
    pub max_connections: u16,
    /// Deadline for TCP connect and for the TLS handshake. Default 15s.
    pub connect_timeout: Duration,
    /// Deadline for each socket read (headers and body). Default 30s.
    pub read_timeout: Duration,
    /// Deadline for writing the request. Default 30s.
    pub write_timeout: Duration,
    /// Bounded wait for a pool permit and an idle connection. Default 60s.
    pub acquire_timeout: Duration,
    /// Initial read buffer size in bytes. Default 8192.
    pub buffer_size: usize,
    /// Cap on the response header block; exceeding it before the CRLFCRLF
    /// terminator fails the request. Default 4 x `buffer_size`.
    pub max_header_size: usize,
    /// Minimum TLS version. Default TLS 1.2.
    pub min_tls_version: TlsVersion,
    /// Remote certificate policy. Default `AcceptAll` (insecure, see above).
    pub certificate_validation: CertificateValidation,
}

const DEFAULT_BUFFER_SIZE: usize = 8192;

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
            max_connections: 4,
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(60),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_header_size: DEFAULT_BUFFER_SIZE * 4,
            min_tls_version: TlsVersion::Tls12,
            certificate_validation: CertificateValidation::default(),
        }
    }

    /// Check the record once at construction time. Violations are hard
    /// faults, not recoverable outcomes.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::InvalidConfig("host is empty".into()));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidConfig("port is zero".into()));
        }
        if self.max_connections == 0 {
            return Err(TransportError::InvalidConfig(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.buffer_size < 512 {
            return Err(TransportError::InvalidConfig(
                "buffer_size must be at least 512 bytes".into(),
            ));
        }
        if self.max_header_size < self.buffer_size {
            return Err(TransportError::InvalidConfig(
                "max_header_size must be at least buffer_size".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TransportConfig::new("example.org", 443, true);
        assert!(config.validate().is_ok());
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.max_header_size, config.buffer_size * 4);
        assert!(matches!(
            config.certificate_validation,
            CertificateValidation::AcceptAll
        ));
    }

    #[test]
    fn rejects_zero_connections() {
        let mut config = TransportConfig::new("example.org", 80, false);
        config.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_header_cap_below_buffer() {
        let mut config = TransportConfig::new("example.org", 80, false);
        config.max_header_size = config.buffer_size - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_host_and_zero_port() {
        assert!(TransportConfig::new("", 80, false).validate().is_err());
        assert!(TransportConfig::new("example.org", 0, false)
            .validate()
            .is_err());
    }
}
