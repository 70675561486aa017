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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::task::JoinHandle;

use super::chunk::Chunk;
use super::pool::Pool;

/// Result of applying one chunk. Collected unordered; `chunk_id` lets a
/// consumer reorder if it ever needs submission order.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success { chunk_id: usize, rows: usize },
    Failure { chunk_id: usize, error: String },
}

impl Outcome {
    pub fn chunk_id(&self) -> usize {
        match self {
            Outcome::Success { chunk_id, .. } | Outcome::Failure { chunk_id, .. } => *chunk_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Where chunks go. One seam, two implementations: the batched relational
/// write ([`crate::db::PgSink`]) and the socket worker hand-off
/// ([`crate::ipc::IpcSink`]).
#[async_trait]
pub trait ChunkSink: Send + Sync + 'static {
    type Entry: Send + 'static;

    /// Apply one chunk using a leased pool entry, returning the number of
    /// records applied. Errors are converted to failed outcomes by the
    /// dispatcher; they never abort the run.
    async fn apply(&self, entry: &mut Self::Entry, chunk: &Chunk) -> anyhow::Result<usize>;
}

/// How chunk tasks are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Start every chunk immediately and let `Pool::acquire` serialize
    /// beyond capacity.
    #[default]
    AllAtOnce,
    /// Start chunks in waves sized to the pool capacity (or the explicit
    /// concurrency override), waiting for each wave before the next.
    CapacityWaves,
}

/// Cooperative cancellation flag checked at the task suspension points
/// (before acquire, before apply). Remaining chunks report a failed outcome
/// instead of the run terminating mid-write.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Aggregate view of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub fn summarize(outcomes: &[Outcome]) -> RunReport {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    RunReport {
        succeeded,
        failed: outcomes.len() - succeeded,
    }
}

/// The concurrency core: one task per chunk, parallelism bounded by the
/// pool, every submitted chunk accounted for with exactly one outcome.
pub struct Dispatcher {
    policy: DispatchPolicy,
    concurrency: Option<usize>,
    per_chunk_timeout: Option<Duration>,
    cancel: CancelFlag,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self {
            policy,
            concurrency: None,
            per_chunk_timeout: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Override the wave width independently of pool capacity. The pool
    /// still bounds how many leases exist, so a wider value only changes
    /// how many tasks are started per wave.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency.max(1));
        self
    }

    /// Convert any single chunk taking longer than `timeout` into a failed
    /// outcome instead of hanging the whole run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_chunk_timeout = Some(timeout);
        self
    }

    /// Handle for cancelling the run from outside.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run every chunk against the sink. Returns exactly one outcome per
    /// submitted chunk; a single chunk's failure never cancels its
    /// siblings.
    pub async fn run<S: ChunkSink>(
        &self,
        sink: Arc<S>,
        pool: &Pool<S::Entry>,
        chunks: Vec<Chunk>,
    ) -> Vec<Outcome> {
        let total = chunks.len();
        let mut outcomes = Vec::with_capacity(total);
        match self.policy {
            DispatchPolicy::AllAtOnce => {
                let mut handles = Vec::with_capacity(total);
                for chunk in chunks {
                    handles.push(self.spawn_chunk(Arc::clone(&sink), pool.clone(), chunk));
                }
                join_wave(handles, &mut outcomes).await;
            }
            DispatchPolicy::CapacityWaves => {
                let wave_width = self.concurrency.unwrap_or_else(|| pool.capacity());
                let mut pending = chunks.into_iter();
                loop {
                    let wave: Vec<Chunk> = pending.by_ref().take(wave_width).collect();
                    if wave.is_empty() {
                        break;
                    }
                    let mut handles = Vec::with_capacity(wave.len());
                    for chunk in wave {
                        handles.push(self.spawn_chunk(Arc::clone(&sink), pool.clone(), chunk));
                    }
                    join_wave(handles, &mut outcomes).await;
                }
            }
        }
        let report = summarize(&outcomes);
        info!(
            "dispatch complete: {} chunks, {} succeeded, {} failed",
            total, report.succeeded, report.failed
        );
        outcomes
    }

    fn spawn_chunk<S: ChunkSink>(
        &self,
        sink: Arc<S>,
        pool: Pool<S::Entry>,
        chunk: Chunk,
    ) -> (usize, JoinHandle<Outcome>) {
        let cancel = self.cancel.clone();
        let timeout = self.per_chunk_timeout;
        let chunk_id = chunk.id;
        let handle = tokio::spawn(async move {
            if cancel.is_cancelled() {
                return Outcome::Failure {
                    chunk_id,
                    error: "cancelled before acquire".into(),
                };
            }
            let mut entry = match pool.acquire().await {
                Ok(guard) => guard,
                Err(e) => {
                    return Outcome::Failure {
                        chunk_id,
                        error: e.to_string(),
                    }
                }
            };
            if cancel.is_cancelled() {
                return Outcome::Failure {
                    chunk_id,
                    error: "cancelled before apply".into(),
                };
            }
            let applied = match timeout {
                Some(limit) => match tokio::time::timeout(limit, sink.apply(&mut entry, &chunk))
                    .await
                {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!("chunk timed out after {:?}", limit)),
                },
                None => sink.apply(&mut entry, &chunk).await,
            };
            // The guard drop releases the entry on every path above.
            match applied {
                Ok(rows) => Outcome::Success { chunk_id, rows },
                Err(e) => {
                    warn!("chunk {} failed (continuing): {}", chunk_id, e);
                    Outcome::Failure {
                        chunk_id,
                        error: e.to_string(),
                    }
                }
            }
        });
        (chunk_id, handle)
    }
}

async fn join_wave(handles: Vec<(usize, JoinHandle<Outcome>)>, outcomes: &mut Vec<Outcome>) {
    for (chunk_id, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            // A panicked task still yields an outcome; no chunk is dropped.
            Err(e) => outcomes.push(Outcome::Failure {
                chunk_id,
                error: format!("task join failed: {}", e),
            }),
        }
    }
}
