/*
 * pool.rs
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

//! Connection pool: bounded admission over a bag of persistent connections.
//!
//! Admission is a counting semaphore with `max_connections` permits; the
//! permit travels with the claimed connection and is released only once the
//! response body has been consumed or dropped, so a "free" connection never
//! has a predecessor's bytes left on its socket. Connections are created
//! lazily by the factory closure up to the cap and are never removed until
//! the pool closes. When all connections are momentarily claimed, callers
//! wait on a release notification rather than polling.

use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use log::debug;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::connection::{Connection, ConnectionRelease, SendOutcome};
use crate::error::TransportError;
use crate::listener::ListenerSet;
use crate::request::Request;

/// Creates one unconnected `Connection`; installed by `with_factory` to
/// override dialing (tests, alternative endpoints).
pub type ConnectionFactory = dyn Fn() -> Arc<Connection> + Send + Sync;

/// Bounded pool of transport connections to one endpoint.
pub struct ConnectionPool {
    config: Arc<TransportConfig>,
    factory: Box<ConnectionFactory>,
    semaphore: Arc<Semaphore>,
    connections: Mutex<Vec<Arc<Connection>>>,
    released: Arc<Notify>,
    listeners: ListenerSet,
}

impl ConnectionPool {
    /// Build a pool whose factory captures the whole configuration.
    /// Validates the configuration once; this is the only hard fault.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let config = Arc::new(config);
        let factory_config = config.clone();
        Self::with_factory(config, Box::new(move || Connection::new(factory_config.clone())))
    }

    /// Build a pool with a caller-supplied connection factory.
    pub fn with_factory(
        config: Arc<TransportConfig>,
        factory: Box<ConnectionFactory>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
            connections: Mutex::new(Vec::new()),
            released: Arc::new(Notify::new()),
            listeners: ListenerSet::new(),
            config,
            factory,
        })
    }

    /// The event sink notified around each exchange.
    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Number of connections created so far (never exceeds the cap).
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Requests currently holding a permit.
    pub fn in_flight(&self) -> usize {
        (self.config.max_connections as usize).saturating_sub(self.semaphore.available_permits())
    }

    /// Send one request through the pool: acquire a permit within the
    /// configured bounded wait, claim or create an idle connection, delegate
    /// to it, and notify the event sink. Never returns `Err` and never
    /// panics for network or protocol failures; the permit and the claimed
    /// connection are released on every path once the response body is
    /// consumed or dropped.
    pub async fn send_request(&self, request: &Request, cancel: &CancellationToken) -> SendOutcome {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.acquire_timeout;

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                return SendOutcome::fail(TransportError::Cancelled.to_string(), start.elapsed());
            }
            result = tokio::time::timeout_at(deadline, self.semaphore.clone().acquire_owned()) => {
                match result {
                    Err(_) => {
                        return SendOutcome::fail(
                            TransportError::Timeout("pool permit").to_string(),
                            start.elapsed(),
                        );
                    }
                    Ok(Err(_)) => {
                        return SendOutcome::fail(
                            TransportError::PoolClosed.to_string(),
                            start.elapsed(),
                        );
                    }
                    Ok(Ok(permit)) => permit,
                }
            }
        };

        let conn = match self.claim(deadline, cancel).await {
            Ok(conn) => conn,
            Err(e) => return SendOutcome::fail(e.to_string(), start.elapsed()),
        };

        let release = ConnectionRelease::new(conn.clone(), Some(permit), Some(self.released.clone()));
        self.listeners.notify_request(SystemTime::now(), request);
        let outcome = conn.send_claimed(release, request, cancel).await;
        if let Some(response) = outcome.response.as_ref() {
            self.listeners
                .notify_response(SystemTime::now(), request, response);
        }
        outcome
    }

    /// Claim an idle connection or create one below the cap. Holding a
    /// permit means capacity exists or is about to be released, so this
    /// waits on the release notification instead of spinning.
    async fn claim(
        &self,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) -> Result<Arc<Connection>, TransportError> {
        loop {
            // Arm the waiter before scanning so a release between the scan
            // and the await is not missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(conn) = self.try_claim_idle() {
                return Ok(conn);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = tokio::time::timeout_at(deadline, &mut released) => {
                    if result.is_err() {
                        return Err(TransportError::Timeout("idle connection"));
                    }
                }
            }
        }
    }

    fn try_claim_idle(&self) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock().unwrap_or_else(|p| p.into_inner());
        for conn in connections.iter() {
            if conn.try_claim() {
                return Some(conn.clone());
            }
        }
        if connections.len() < self.config.max_connections as usize {
            let conn = (self.factory)();
            if conn.try_claim() {
                debug!(
                    "pool grows to {} connection(s) for {}:{}",
                    connections.len() + 1,
                    self.config.host,
                    self.config.port
                );
                connections.push(conn.clone());
                return Some(conn);
            }
        }
        None
    }

    /// Close the pool: no further requests are admitted and every pooled
    /// socket is shut down. In-flight exchanges keep their connections
    /// until their bodies are consumed or dropped.
    pub async fn close(&self) {
        self.semaphore.close();
        let connections: Vec<_> = self
            .connections
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for conn in connections {
            conn.close().await;
        }
    }
}
