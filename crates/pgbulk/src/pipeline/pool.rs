// Copyright 2025 PgBulk Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use thiserror::Error;
use tokio::sync::Notify;

use crate::error::PipelineError;

/// Misuse of the pool contract. Fatal to the calling task, not to the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// `try_acquire` found no idle entry.
    #[error("pool exhausted: no idle entry")]
    Exhausted,
    /// The pool has been closed; no further leases are possible.
    #[error("pool closed")]
    Closed,
}

struct PoolState<E> {
    idle: VecDeque<E>,
    leased: usize,
    closed: bool,
}

struct Inner<E> {
    state: Mutex<PoolState<E>>,
    notify: Notify,
    capacity: usize,
}

/// Fixed-capacity pool of live connection/worker entries.
///
/// A cheap cloneable handle: constructed once at pipeline start, handed to
/// everything that needs a lease, and closed at pipeline end. At most
/// `capacity` entries are leased at any moment; `acquire` waits until one
/// is idle.
pub struct Pool<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Pool<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Pool<E> {
    /// Build a pool of `capacity` entries. A request for 0 is normalized to
    /// 1. The factory is called once per entry; any failure aborts
    /// construction so the pipeline fails fast instead of running with a
    /// silently smaller pool.
    pub async fn build<F, Fut>(capacity: usize, mut factory: F) -> Result<Self, PipelineError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = anyhow::Result<E>>,
    {
        let capacity = capacity.max(1);
        let mut idle = VecDeque::with_capacity(capacity);
        for i in 0..capacity {
            let entry = factory(i)
                .await
                .map_err(|e| PipelineError::PoolConstruction(format!("entry {}: {}", i, e)))?;
            idle.push_back(entry);
        }
        info!("pool ready with {} entries", capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PoolState {
                    idle,
                    leased: 0,
                    closed: false,
                }),
                notify: Notify::new(),
                capacity,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of currently idle entries.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().unwrap().idle.len()
    }

    /// Number of currently leased entries. Never exceeds `capacity`.
    pub fn leased_count(&self) -> usize {
        self.inner.state.lock().unwrap().leased
    }

    /// Lease an idle entry, waiting until one is free. Fails with
    /// [`PoolError::Closed`] once [`Pool::close_all`] has run; it never
    /// blocks forever on a closed pool.
    pub async fn acquire(&self) -> Result<PoolGuard<E>, PoolError> {
        loop {
            // Register for a wakeup before checking state so a release
            // between the check and the await cannot be missed.
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock().unwrap();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                if let Some(entry) = state.idle.pop_front() {
                    state.leased += 1;
                    return Ok(PoolGuard {
                        entry: Some(entry),
                        pool: self.clone(),
                    });
                }
            }
            notified.await;
        }
    }

    /// Non-blocking variant: fails with [`PoolError::Exhausted`] when no
    /// entry is idle.
    pub fn try_acquire(&self) -> Result<PoolGuard<E>, PoolError> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(PoolError::Closed);
        }
        match state.idle.pop_front() {
            Some(entry) => {
                state.leased += 1;
                Ok(PoolGuard {
                    entry: Some(entry),
                    pool: self.clone(),
                })
            }
            None => Err(PoolError::Exhausted),
        }
    }

    /// Close the pool. Idle entries are dropped now; leased entries are
    /// dropped when their guards return. Every waiter and subsequent caller
    /// of `acquire` gets [`PoolError::Closed`].
    pub fn close_all(&self) {
        let drained: Vec<E> = {
            let mut state = self.inner.state.lock().unwrap();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        drop(drained);
        self.inner.notify.notify_waiters();
        debug!("pool closed");
    }
}

/// Exclusive lease on one pool entry. Dropping the guard returns the entry
/// to the idle set on every exit path; after `close_all` the entry is
/// dropped instead of re-idled.
pub struct PoolGuard<E> {
    entry: Option<E>,
    pool: Pool<E>,
}

impl<E> Deref for PoolGuard<E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.entry.as_ref().expect("entry present until drop")
    }
}

impl<E> DerefMut for PoolGuard<E> {
    fn deref_mut(&mut self) -> &mut E {
        self.entry.as_mut().expect("entry present until drop")
    }
}

impl<E> Drop for PoolGuard<E> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let mut state = self.pool.inner.state.lock().unwrap();
            state.leased -= 1;
            if state.closed {
                drop(state);
                drop(entry);
            } else {
                state.idle.push_back(entry);
                drop(state);
                self.pool.inner.notify.notify_one();
            }
        }
    }
}
