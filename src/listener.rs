/*
 * listener.rs
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

//! Request/response event sink: a fire-and-forget observer registry.
//!
//! Listeners are notified before a request is sent and after its response
//! headers are parsed. Subscribe/unsubscribe report success instead of
//! panicking, and a panicking listener is isolated so the sink can never
//! affect the outcome of the exchange it observes.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::request::Request;
use crate::response::Response;

/// Observer of transport traffic. Calls arrive on the task driving the
/// request; implementations should return quickly.
pub trait TransportListener: Send + Sync {
    /// The request is about to be written to the wire.
    fn on_request(&self, at: SystemTime, request: &Request);

    /// The response header block has been parsed. The body may not have
    /// been consumed yet.
    fn on_response(&self, at: SystemTime, request: &Request, response: &Response);
}

/// Subscription handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Registry of transport listeners.
pub struct ListenerSet {
    entries: Mutex<HashMap<u64, Arc<dyn TransportListener>>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener. Registering the same listener twice produces two
    /// independent subscriptions with distinct handles.
    pub fn subscribe(&self, listener: Arc<dyn TransportListener>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(id, listener);
        ListenerHandle(id)
    }

    /// Remove a subscription. Returns false for unknown or already-removed
    /// handles.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(&handle.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn TransportListener>> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn notify_request(&self, at: SystemTime, request: &Request) {
        for listener in self.snapshot() {
            let _ = catch_unwind(AssertUnwindSafe(|| listener.on_request(at, request)));
        }
    }

    pub(crate) fn notify_response(&self, at: SystemTime, request: &Request, response: &Response) {
        for listener in self.snapshot() {
            let _ = catch_unwind(AssertUnwindSafe(|| {
                listener.on_response(at, request, response)
            }));
        }
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        requests: AtomicUsize,
    }

    impl TransportListener for Counting {
        fn on_request(&self, _at: SystemTime, _request: &Request) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
        fn on_response(&self, _at: SystemTime, _request: &Request, _response: &Response) {}
    }

    struct Panicking;

    impl TransportListener for Panicking {
        fn on_request(&self, _at: SystemTime, _request: &Request) {
            panic!("listener misbehaves");
        }
        fn on_response(&self, _at: SystemTime, _request: &Request, _response: &Response) {}
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let set = ListenerSet::new();
        let counting = Arc::new(Counting {
            requests: AtomicUsize::new(0),
        });
        let handle = set.subscribe(counting.clone());
        assert_eq!(set.len(), 1);
        assert!(set.unsubscribe(handle));
        assert!(!set.unsubscribe(handle));
        assert!(set.is_empty());
    }

    #[test]
    fn notification_reaches_all_listeners() {
        let set = ListenerSet::new();
        let counting = Arc::new(Counting {
            requests: AtomicUsize::new(0),
        });
        set.subscribe(counting.clone());
        set.subscribe(counting.clone());
        let request = Request::new(Method::Get, "/");
        set.notify_request(SystemTime::now(), &request);
        assert_eq!(counting.requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_poison_the_sink() {
        let set = ListenerSet::new();
        let counting = Arc::new(Counting {
            requests: AtomicUsize::new(0),
        });
        set.subscribe(Arc::new(Panicking));
        set.subscribe(counting.clone());
        let request = Request::new(Method::Get, "/");
        set.notify_request(SystemTime::now(), &request);
        assert_eq!(counting.requests.load(Ordering::SeqCst), 1);
    }
}
