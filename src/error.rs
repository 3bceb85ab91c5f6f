/*
 * error.rs
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

//! Transport errors: connect/handshake, framing, timeout, cancellation.
//!
//! Ordinary network and protocol failures never cross the `send_request`
//! boundary as `Err`; they are folded into the returned `SendOutcome`.
//! `InvalidConfig` is the one construction-time hard fault.

use std::fmt;
use std::io;

/// Errors from the connection pool, transport connection, or response framing.
#[derive(Debug)]
pub enum TransportError {
    /// TCP connect failed or timed out.
    Connect(String),
    /// TLS handshake failed or the certificate policy rejected the peer.
    Tls(String),
    /// The header block exceeded the configured cap before CRLFCRLF was found.
    HeaderTooLarge(usize),
    /// The peer closed the stream mid-exchange (zero-byte read).
    ClosedByPeer,
    /// An I/O operation exceeded its deadline. The argument names the phase.
    Timeout(&'static str),
    /// Malformed status line, header block, or chunk framing.
    Parse(String),
    /// The caller's cancellation token fired.
    Cancelled,
    /// The connection is already claimed by another in-flight request.
    Busy,
    /// The pool has been closed; no further requests are admitted.
    PoolClosed,
    /// Configuration rejected at construction time.
    InvalidConfig(String),
    /// Other socket-level error.
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(m) => write!(f, "connect failed: {}", m),
            TransportError::Tls(m) => write!(f, "TLS handshake failed: {}", m),
            TransportError::HeaderTooLarge(cap) => {
                write!(f, "response header block exceeds {} bytes", cap)
            }
            TransportError::ClosedByPeer => write!(f, "connection closed by peer"),
            TransportError::Timeout(phase) => write!(f, "timed out waiting for {}", phase),
            TransportError::Parse(m) => write!(f, "malformed response: {}", m),
            TransportError::Cancelled => write!(f, "operation cancelled"),
            TransportError::Busy => write!(f, "connection busy"),
            TransportError::PoolClosed => write!(f, "connection pool closed"),
            TransportError::InvalidConfig(m) => write!(f, "invalid configuration: {}", m),
            TransportError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}
