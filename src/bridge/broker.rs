/*
 *  bridge/broker.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Cross-thread reference broker - keeps one device reference callable
 *  from whichever thread the host happens to call on
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! The device reference is created on the activating thread but the host
//! may call from any thread later on. The broker registers the reference
//! once in an [`InterfaceTable`], keeps the returned [`Cookie`], and before
//! each remote call re-derives a proxy for the calling thread when the
//! thread has changed since the last derivation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use log::{debug, warn};

use crate::bridge::error::BrokerError;
use crate::bridge::traits::Dispatch;

/// Registration token handed out by an interface table
pub type Cookie = u32;

/// Process-wide table through which references are marshalled between threads
pub trait InterfaceTable: Send + Sync {
    /// Register a reference, returning the token needed to fetch it later
    fn register(&self, object: Arc<dyn Dispatch>) -> Result<Cookie, BrokerError>;

    /// Derive a proxy usable on the calling thread
    fn fetch(&self, cookie: Cookie) -> Result<Arc<dyn Dispatch>, BrokerError>;

    /// Drop the table's reference; the cookie is dead afterwards
    fn revoke(&self, cookie: Cookie) -> Result<(), BrokerError>;
}

/// Default in-process interface table
pub struct GlobalInterfaceTable {
    entries: Mutex<HashMap<Cookie, Arc<dyn Dispatch>>>,
    next_cookie: AtomicU32,
}

impl GlobalInterfaceTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_cookie: AtomicU32::new(1),
        }
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GlobalInterfaceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceTable for GlobalInterfaceTable {
    fn register(&self, object: Arc<dyn Dispatch>) -> Result<Cookie, BrokerError> {
        let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed);
        if cookie == 0 {
            // wrapped around; 0 is never a valid cookie
            return Err(BrokerError::RegisterFailed);
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cookie, object);
        Ok(cookie)
    }

    fn fetch(&self, cookie: Cookie) -> Result<Arc<dyn Dispatch>, BrokerError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cookie)
            .cloned()
            .ok_or(BrokerError::UnknownCookie(cookie))
    }

    fn revoke(&self, cookie: Cookie) -> Result<(), BrokerError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&cookie)
            .map(|_| ())
            .ok_or(BrokerError::UnknownCookie(cookie))
    }
}

/// Thread the current proxy was derived for
struct Affinity {
    thread: ThreadId,
    proxy: Arc<dyn Dispatch>,
}

/// Thread-affine handle to the one active device reference
pub struct ReferenceBroker {
    table: Arc<dyn InterfaceTable>,
    cookie: Option<Cookie>,
    affinity: Mutex<Affinity>,
    derivations: AtomicUsize,
}

impl ReferenceBroker {
    /// Register `object` and bind the initial proxy to the calling thread
    pub fn register(
        table: Arc<dyn InterfaceTable>,
        object: Arc<dyn Dispatch>,
    ) -> Result<Self, BrokerError> {
        let cookie = table.register(Arc::clone(&object))?;
        debug!("Registered driver interface, cookie {}", cookie);

        Ok(Self {
            table,
            cookie: Some(cookie),
            affinity: Mutex::new(Affinity {
                thread: thread::current().id(),
                proxy: object,
            }),
            derivations: AtomicUsize::new(0),
        })
    }

    /// Proxy usable on the calling thread.
    ///
    /// Re-derives from the table only when the thread differs from the one
    /// of the last derivation; the previous proxy is released on replace.
    pub fn current(&self) -> Result<Arc<dyn Dispatch>, BrokerError> {
        let cookie = self.cookie.ok_or(BrokerError::Revoked)?;
        let this_thread = thread::current().id();

        let mut affinity = self.affinity.lock().unwrap_or_else(PoisonError::into_inner);
        if affinity.thread != this_thread {
            let proxy = self.table.fetch(cookie).map_err(|_| BrokerError::DeriveFailed {
                cookie,
                thread: format!("{:?}", this_thread),
            })?;
            affinity.proxy = proxy;
            affinity.thread = this_thread;
            self.derivations.fetch_add(1, Ordering::Relaxed);
            debug!("Switched driver interface to thread {:?}", this_thread);
        }

        Ok(Arc::clone(&affinity.proxy))
    }

    /// Number of thread switches that required a fresh proxy
    pub fn derivations(&self) -> usize {
        self.derivations.load(Ordering::Relaxed)
    }

    pub fn cookie(&self) -> Option<Cookie> {
        self.cookie
    }

    /// Revoke the registration. Only the first call reaches the table.
    pub fn revoke(&mut self) -> Result<(), BrokerError> {
        match self.cookie.take() {
            Some(cookie) => {
                debug!("Revoking driver interface, cookie {}", cookie);
                self.table.revoke(cookie)
            }
            None => Ok(()),
        }
    }
}

impl Drop for ReferenceBroker {
    fn drop(&mut self) {
        if self.cookie.is_some() {
            warn!("Driver interface dropped without revoke, revoking now");
            if let Err(e) = self.revoke() {
                warn!("Revoke on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::MockMount;

    /// Interface table that counts traffic for assertions
    #[derive(Default)]
    struct CountingTable {
        inner: GlobalInterfaceTable,
        fetches: AtomicUsize,
        revokes: AtomicUsize,
        fail_fetch: bool,
    }

    impl InterfaceTable for CountingTable {
        fn register(&self, object: Arc<dyn Dispatch>) -> Result<Cookie, BrokerError> {
            self.inner.register(object)
        }

        fn fetch(&self, cookie: Cookie) -> Result<Arc<dyn Dispatch>, BrokerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch {
                return Err(BrokerError::UnknownCookie(cookie));
            }
            self.inner.fetch(cookie)
        }

        fn revoke(&self, cookie: Cookie) -> Result<(), BrokerError> {
            self.revokes.fetch_add(1, Ordering::SeqCst);
            self.inner.revoke(cookie)
        }
    }

    fn mock_object() -> Arc<dyn Dispatch> {
        Arc::new(MockMount::new())
    }

    #[test]
    fn test_same_thread_reuses_proxy() {
        let table = Arc::new(CountingTable::default());
        let broker = ReferenceBroker::register(table.clone(), mock_object()).unwrap();

        broker.current().unwrap();
        broker.current().unwrap();

        assert_eq!(broker.derivations(), 0);
        assert_eq!(table.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_thread_switch_derives_once() {
        let table = Arc::new(CountingTable::default());
        let broker = ReferenceBroker::register(table.clone(), mock_object()).unwrap();

        broker.current().unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                broker.current().unwrap();
                broker.current().unwrap();
            });
        });

        assert_eq!(broker.derivations(), 1);
        assert_eq!(table.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_switches_do_not_leak_references() {
        let object = mock_object();
        let table = Arc::new(GlobalInterfaceTable::new());
        let broker = ReferenceBroker::register(table.clone(), Arc::clone(&object)).unwrap();

        // ours + table + broker proxy
        let baseline = Arc::strong_count(&object);
        assert_eq!(baseline, 3);

        for _ in 0..5 {
            thread::scope(|s| {
                s.spawn(|| {
                    let proxy = broker.current().unwrap();
                    drop(proxy);
                });
            });
            broker.current().unwrap();
        }

        assert_eq!(Arc::strong_count(&object), baseline);
        assert_eq!(broker.derivations(), 10);
    }

    #[test]
    fn test_derive_failure_is_reported() {
        let table = Arc::new(CountingTable { fail_fetch: true, ..Default::default() });
        let broker = ReferenceBroker::register(table, mock_object()).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                let err = broker.current().err().unwrap();
                assert!(matches!(err, BrokerError::DeriveFailed { .. }));
            });
        });
    }

    #[test]
    fn test_revoke_exactly_once() {
        let table = Arc::new(CountingTable::default());
        let mut broker = ReferenceBroker::register(table.clone(), mock_object()).unwrap();

        broker.revoke().unwrap();
        broker.revoke().unwrap();
        drop(broker);

        assert_eq!(table.revokes.load(Ordering::SeqCst), 1);
        assert!(table.inner.is_empty());
    }

    #[test]
    fn test_revoked_broker_refuses_calls() {
        let table = Arc::new(GlobalInterfaceTable::new());
        let mut broker = ReferenceBroker::register(table, mock_object()).unwrap();
        broker.revoke().unwrap();
        assert_eq!(broker.current().err(), Some(BrokerError::Revoked));
    }

    #[test]
    fn test_drop_revokes_forgotten_registration() {
        let table = Arc::new(CountingTable::default());
        let broker = ReferenceBroker::register(table.clone(), mock_object()).unwrap();
        drop(broker);
        assert_eq!(table.revokes.load(Ordering::SeqCst), 1);
    }
}
