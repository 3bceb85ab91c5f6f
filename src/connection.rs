/*
 * connection.rs
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

//! Transport connection: one TCP (optionally TLS-upgraded) socket carrying
//! strictly sequential HTTP/1.1 exchanges.
//!
//! At most one request is in flight per connection, enforced by an atomic
//! `busy` flag claimed with compare-and-swap. Connects lazily on first use
//! and reconnects transparently after `Connection: close`, failures, or an
//! abandoned body. `send_request` recovers every network and protocol
//! failure into the returned `SendOutcome`; nothing ordinary escapes as
//! `Err` or a panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedSemaphorePermit};
use tokio::time::timeout;
use tokio_rustls::rustls::client::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::frame::body::{BodyDecoder, BodyState};
use crate::frame::{Body, HeadScanner};
use crate::net::{client_config, HttpStream};
use crate::request::Request;
use crate::response::{parse_headers, Response};

/// Mutable connection state, exclusively owned by the in-flight request
/// (the mutex is only ever contended by a stale body being dropped).
pub(crate) struct ConnState {
    pub(crate) stream: Option<HttpStream>,
    /// HTTP-level connected flag; false forces a reconnect on the next send.
    pub(crate) connected: bool,
}

/// Releases a claimed connection on drop: clears `busy`, wakes pool waiters,
/// then frees the pool permit. Runs on every path, including panics and
/// cancellation.
pub(crate) struct ConnectionRelease {
    conn: Arc<Connection>,
    released_signal: Option<Arc<Notify>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionRelease {
    pub(crate) fn new(
        conn: Arc<Connection>,
        permit: Option<OwnedSemaphorePermit>,
        released_signal: Option<Arc<Notify>>,
    ) -> Self {
        Self {
            conn,
            released_signal,
            permit,
        }
    }
}

impl Drop for ConnectionRelease {
    fn drop(&mut self) {
        self.conn.busy.store(false, Ordering::Release);
        if let Some(signal) = &self.released_signal {
            signal.notify_waiters();
        }
        // The permit field drops after this body runs, freeing admission
        // capacity only once the connection is reusable.
    }
}

/// Result of one send. `error` is filled exactly when `response` is not;
/// network and protocol failures never surface as panics or `Err` here.
#[derive(Debug)]
pub struct SendOutcome {
    pub success: bool,
    pub response: Option<Response>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl SendOutcome {
    pub(crate) fn ok(response: Response, elapsed: Duration) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            elapsed,
        }
    }

    pub(crate) fn fail(error: String, elapsed: Duration) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error),
            elapsed,
        }
    }
}

/// One pooled transport connection to a fixed endpoint.
pub struct Connection {
    config: Arc<TransportConfig>,
    tls_config: Arc<ClientConfig>,
    busy: AtomicBool,
    state: Arc<AsyncMutex<ConnState>>,
}

impl Connection {
    /// Create an unconnected connection; the socket is dialed on first send.
    pub fn new(config: Arc<TransportConfig>) -> Arc<Self> {
        Arc::new(Self {
            tls_config: client_config(&config),
            config,
            busy: AtomicBool::new(false),
            state: Arc::new(AsyncMutex::new(ConnState {
                stream: None,
                connected: false,
            })),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn is_tls(&self) -> bool {
        self.config.use_tls
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Claim exclusive use. Only the false-to-true transition succeeds, so
    /// two callers can never hold the same connection.
    pub(crate) fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Force-reconnect: tears down any existing stream and dials again,
    /// even when currently connected.
    pub async fn reconnect(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        self.connect_locked(&mut state, cancel).await
    }

    /// Shut down the socket. The connection can be dialed again later.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(stream) = state.stream.as_mut() {
            let _ = stream.shutdown().await;
        }
        state.stream = None;
        state.connected = false;
    }

    /// Send one request outside a pool. Fails with a busy outcome if another
    /// request is in flight on this connection.
    pub async fn send_request(
        self: &Arc<Self>,
        request: &Request,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        if !self.try_claim() {
            return SendOutcome::fail(TransportError::Busy.to_string(), Duration::ZERO);
        }
        let release = ConnectionRelease::new(self.clone(), None, None);
        self.send_claimed(release, request, cancel).await
    }

    /// Send on an already-claimed connection. `release` travels into the
    /// response body so busy + permit are held until the body is consumed
    /// or the response dropped.
    pub(crate) async fn send_claimed(
        self: &Arc<Self>,
        release: ConnectionRelease,
        request: &Request,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let start = Instant::now();
        let mut guard = self.state.clone().lock_owned().await;
        match self.exchange(&mut guard, request, cancel).await {
            Ok((mut response, leftover, decoder)) => {
                let elapsed = start.elapsed();
                response.body = Some(Body::new(BodyState {
                    guard,
                    buf: leftover,
                    decoder,
                    read_timeout: self.config.read_timeout,
                    cancel: cancel.clone(),
                    release,
                }));
                SendOutcome::ok(response, elapsed)
            }
            Err(e) => {
                drop(guard);
                drop(release);
                SendOutcome::fail(e.to_string(), start.elapsed())
            }
        }
    }

    /// Full exchange: (re)connect if needed, write the request, read and
    /// parse the header block, select body framing. On failure the socket
    /// is dropped so the next use reconnects.
    async fn exchange(
        &self,
        state: &mut ConnState,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<(Response, BytesMut, BodyDecoder), TransportError> {
        if !state.connected || state.stream.is_none() {
            self.connect_locked(state, cancel).await?;
        }
        let result = self.exchange_io(state, request, cancel).await;
        match &result {
            Ok((response, _, _)) => {
                if response.connection_close {
                    debug!(
                        "{}:{} sent Connection: close, will reconnect on next use",
                        self.config.host, self.config.port
                    );
                    state.connected = false;
                }
            }
            Err(_) => {
                state.stream = None;
                state.connected = false;
            }
        }
        result
    }

    async fn exchange_io(
        &self,
        state: &mut ConnState,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<(Response, BytesMut, BodyDecoder), TransportError> {
        let stream = state.stream.as_mut().ok_or(TransportError::ClosedByPeer)?;

        // Header block as one write, body as a second, then flush.
        let head = request.head_bytes();
        write_all_bounded(stream, &head, self.config.write_timeout, cancel).await?;
        if let Some(body) = &request.body {
            write_all_bounded(stream, body, self.config.write_timeout, cancel).await?;
        }
        flush_bounded(stream, self.config.write_timeout, cancel).await?;

        // Accumulate until the CRLFCRLF terminator, bounded by the header cap.
        let mut buf = BytesMut::with_capacity(self.config.buffer_size * 2);
        let mut scanner = HeadScanner::new();
        let head_end = loop {
            if let Some(i) = scanner.find(&buf) {
                break i;
            }
            if buf.len() >= self.config.max_header_size {
                return Err(TransportError::HeaderTooLarge(self.config.max_header_size));
            }
            let n = read_some(stream, &mut buf, self.config.read_timeout, cancel).await?;
            if n == 0 {
                return Err(TransportError::ClosedByPeer);
            }
        };

        let text = std::str::from_utf8(&buf[..head_end])
            .map_err(|_| TransportError::Parse("header block is not valid UTF-8".into()))?;
        let response = parse_headers(text)?;
        // Everything after the terminator is the speculatively-read start of
        // the body; advancing the buffer hands it to the body decoder.
        buf.advance(head_end + 4);
        let decoder = BodyDecoder::for_response(
            response.chunked,
            response.content_length,
            self.config.max_header_size,
        );
        Ok((response, buf, decoder))
    }

    async fn connect_locked(
        &self,
        state: &mut ConnState,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        state.stream = None;
        state.connected = false;

        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("connecting to {}", addr);
        let tcp = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = timeout(self.config.connect_timeout, TcpStream::connect(&addr)) => {
                match result {
                    Err(_) => return Err(TransportError::Connect(format!("{} timed out", addr))),
                    Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
                    Ok(Ok(tcp)) => tcp,
                }
            }
        };

        if self.config.use_tls {
            let server_name = ServerName::try_from(self.config.host.clone())
                .map_err(|_| TransportError::Tls(format!("invalid server name {:?}", self.config.host)))?;
            let connector = TlsConnector::from(self.tls_config.clone());
            let tls = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = timeout(self.config.connect_timeout, connector.connect(server_name, tcp)) => {
                    match result {
                        Err(_) => return Err(TransportError::Tls(format!("handshake with {} timed out", addr))),
                        Ok(Err(e)) => {
                            warn!("TLS handshake with {} failed: {}", addr, e);
                            return Err(TransportError::Tls(e.to_string()));
                        }
                        Ok(Ok(tls)) => tls,
                    }
                }
            };
            state.stream = Some(HttpStream::Tls(Box::new(tls)));
        } else {
            state.stream = Some(HttpStream::Plain(tcp));
        }
        state.connected = true;
        Ok(())
    }
}

/// Read some bytes into `buf`, bounded by `limit` and the cancellation token.
pub(crate) async fn read_some(
    stream: &mut HttpStream,
    buf: &mut BytesMut,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<usize, TransportError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = timeout(limit, stream.read_buf(buf)) => match result {
            Err(_) => Err(TransportError::Timeout("socket read")),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TransportError::Io(e)),
        },
    }
}

async fn write_all_bounded(
    stream: &mut HttpStream,
    data: &[u8],
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = timeout(limit, stream.write_all(data)) => match result {
            Err(_) => Err(TransportError::Timeout("socket write")),
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
        },
    }
}

async fn flush_bounded(
    stream: &mut HttpStream,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = timeout(limit, stream.flush()) => match result {
            Err(_) => Err(TransportError::Timeout("socket flush")),
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
        },
    }
}
