/*
 * lib.rs
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

//! Staffetta: HTTP/1.1 client transport.
//!
//! A pool of persistent, TLS-capable TCP connections that serializes
//! requests onto the wire and incrementally parses responses from the byte
//! stream. Design:
//! - Admission: `tokio::sync::Semaphore` with one permit per possible
//!   connection; the permit and the connection's busy flag are held until
//!   the response body is fully consumed or dropped.
//! - Framing: growable `bytes::BytesMut` buffer, CRLFCRLF boundary search,
//!   then chunked or Content-Length body decoding; bodies are pulled lazily.
//! - TLS: `tokio-rustls` with a configurable minimum version and a pluggable
//!   certificate policy. The default policy accepts any certificate and is
//!   insecure; see `CertificateValidation`.
//! - Failures: `send_request` folds every network and protocol failure into
//!   the returned `SendOutcome`; retry policy belongs to the caller.
//! - No HTTP/2 or HTTP/3, no redirects, no cookies, no caching.
//!
//! ```no_run
//! use staffetta::{ConnectionPool, Method, Request, TransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), staffetta::TransportError> {
//! let pool = ConnectionPool::new(TransportConfig::new("example.org", 443, true))?;
//! let mut request = Request::new(Method::Get, "/");
//! request.header("Host", "example.org");
//! let cancel = CancellationToken::new();
//! let mut outcome = pool.send_request(&request, &cancel).await;
//! if let Some(response) = outcome.response.as_mut() {
//!     if let Some(body) = response.take_body() {
//!         let bytes = body.bytes().await?;
//!         println!("{} bytes", bytes.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod listener;
pub mod net;
pub mod pool;
pub mod request;
pub mod response;

pub use config::{CertificateValidation, TlsVersion, TransportConfig};
pub use connection::{Connection, SendOutcome};
pub use error::TransportError;
pub use frame::Body;
pub use listener::{ListenerHandle, ListenerSet, TransportListener};
pub use net::HttpStream;
pub use pool::{ConnectionFactory, ConnectionPool};
pub use request::{Method, Request};
pub use response::{parse_headers, Response};
