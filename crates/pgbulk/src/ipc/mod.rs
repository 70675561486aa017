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

//! Socket transport for shipping record payloads to long-lived worker
//! processes. One frame is one JSON record per connection; the sender
//! half-closes and the worker reads to EOF. Framing is fire-and-forget:
//! there is no application-level acknowledgment, so per-frame failures are
//! logged and skipped rather than retried.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::pipeline::chunk::Chunk;
use crate::pipeline::dispatcher::ChunkSink;
use crate::records::Record;

/// Per-frame failures. Recovered at frame granularity: the sending or
/// serving loop logs them and continues with the next frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The worker socket could not be reached.
    #[error("connect to {path} failed after {attempts} attempts: {source}")]
    Connect {
        path: String,
        attempts: usize,
        source: std::io::Error,
    },
    /// Writing the frame failed mid-stream.
    #[error("frame write to {path} failed: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    /// The payload was not a single JSON record.
    #[error("frame decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// How records are spread across the worker sockets. Both policies agree on
/// which worker an item lands on; they differ in how frames are grouped on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignPolicy {
    /// Item `i` goes to worker `i mod W`, streamed one frame at a time.
    #[default]
    RoundRobin,
    /// Wave `k` sends items `[k*W, k*W + W)` to workers `0..W` concurrently.
    Block,
}

/// Worker `j`'s socket path under `dir`.
pub fn worker_socket_path(dir: &Path, worker: usize) -> PathBuf {
    dir.join(format!("worker-{}.sock", worker))
}

/// The worker an item at `index` is assigned to.
pub fn worker_for(index: usize, worker_count: usize) -> usize {
    index % worker_count.max(1)
}

/// Connect with bounded retries and exponential backoff. The worker binds
/// its socket before accepting, so a successful connect doubles as the
/// readiness signal; there is no startup sleep anywhere.
pub async fn connect_ready(
    path: &Path,
    attempts: usize,
    initial_backoff: Duration,
) -> Result<UnixStream, FrameError> {
    let attempts = attempts.max(1);
    let mut backoff = initial_backoff;
    let mut last_err = None;
    for attempt in 0..attempts {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
            }
        }
    }
    Err(FrameError::Connect {
        path: path.display().to_string(),
        attempts,
        source: last_err.expect("at least one attempt was made"),
    })
}

/// Ship one record as a single frame: connect, write the JSON payload, then
/// shut the write side down so the worker's read-to-EOF terminates. No ack
/// is awaited.
pub async fn send_record(path: &Path, record: &Record) -> Result<(), FrameError> {
    let mut stream = connect_ready(path, 5, Duration::from_millis(50)).await?;
    let payload = serde_json::to_vec(record)?;
    let write = async {
        stream.write_all(&payload).await?;
        stream.shutdown().await
    };
    write.await.map_err(|e| FrameError::Write {
        path: path.display().to_string(),
        source: e,
    })
}

/// Fan a record stream out to `worker_count` workers under `dir`.
pub struct IpcChannel {
    dir: PathBuf,
    worker_count: usize,
    policy: AssignPolicy,
}

impl IpcChannel {
    pub fn new(dir: PathBuf, worker_count: usize, policy: AssignPolicy) -> Self {
        Self {
            dir,
            worker_count: worker_count.max(1),
            policy,
        }
    }

    /// Send every record to its assigned worker. A frame that fails to send
    /// is logged and skipped; the loop continues with the rest. Returns the
    /// number of frames sent.
    pub async fn feed(&self, records: &[Record]) -> usize {
        let sent = match self.policy {
            AssignPolicy::RoundRobin => self.feed_round_robin(records).await,
            AssignPolicy::Block => self.feed_block(records).await,
        };
        info!(
            "fed {}/{} frames to {} workers",
            sent,
            records.len(),
            self.worker_count
        );
        sent
    }

    async fn feed_round_robin(&self, records: &[Record]) -> usize {
        let mut sent = 0usize;
        for (i, record) in records.iter().enumerate() {
            let path = worker_socket_path(&self.dir, worker_for(i, self.worker_count));
            match send_record(&path, record).await {
                Ok(()) => sent += 1,
                Err(e) => warn!("frame {} dropped: {}", i, e),
            }
        }
        sent
    }

    async fn feed_block(&self, records: &[Record]) -> usize {
        let mut sent = 0usize;
        for (k, wave) in records.chunks(self.worker_count).enumerate() {
            let mut handles = Vec::with_capacity(wave.len());
            for (j, record) in wave.iter().cloned().enumerate() {
                let path = worker_socket_path(&self.dir, j);
                let index = k * self.worker_count + j;
                handles.push(tokio::spawn(async move {
                    (index, send_record(&path, &record).await)
                }));
            }
            for handle in handles {
                match handle.await {
                    Ok((_, Ok(()))) => sent += 1,
                    Ok((index, Err(e))) => warn!("frame {} dropped: {}", index, e),
                    Err(e) => warn!("send task failed: {}", e),
                }
            }
        }
        sent
    }
}

/// Bind `path` (unlinking any stale socket file first) and serve
/// connections one at a time: read to EOF, decode one JSON record, hand it
/// to `handle`. A malformed payload or failed handler is logged and the
/// loop continues; the worker never terminates on bad input.
pub async fn serve_worker<F, Fut>(path: PathBuf, mut handle: F) -> Result<()>
where
    F: FnMut(Record) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    let listener = UnixListener::bind(&path)?;
    info!("worker listening on {}", path.display());
    loop {
        let (mut stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let mut buf = Vec::new();
        if let Err(e) = stream.read_to_end(&mut buf).await {
            warn!("frame read failed: {}", e);
            continue;
        }
        match serde_json::from_slice::<Record>(&buf) {
            Ok(record) => {
                if let Err(e) = handle(record).await {
                    warn!("record handler failed (continuing): {}", e);
                }
            }
            Err(e) => warn!(
                "malformed frame ({} bytes) skipped: {}",
                buf.len(),
                FrameError::Decode(e)
            ),
        }
    }
}

/// IPC implementation of the chunk sink seam: a leased entry is one worker,
/// and applying a chunk ships each of its records as a frame to that
/// worker. Failed frames do not stop the remaining ones; a partially failed
/// chunk is reported as a failed outcome after every frame was attempted.
pub struct IpcSink;

/// Pool entry for the IPC transport.
#[derive(Debug, Clone)]
pub struct IpcWorker {
    pub id: usize,
    pub path: PathBuf,
}

#[async_trait]
impl ChunkSink for IpcSink {
    type Entry = IpcWorker;

    async fn apply(&self, entry: &mut IpcWorker, chunk: &Chunk) -> Result<usize> {
        let mut failed = 0usize;
        for record in &chunk.records {
            if let Err(e) = send_record(&entry.path, record).await {
                warn!("worker {} frame dropped: {}", entry.id, e);
                failed += 1;
            }
        }
        let total = chunk.records.len();
        if failed > 0 {
            anyhow::bail!("{}/{} frames failed for worker {}", failed, total, entry.id);
        }
        Ok(total)
    }
}
