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

use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::chunk::Chunk;
use super::dispatcher::{ChunkSink, Outcome};
use super::pool::{Pool, PoolError};

/// Producer/consumer variant of the pipeline, for when fetch and apply run
/// at different natural cadences: one fetch loop fills a bounded queue, one
/// persistent apply loop drains it in FIFO order with a single pool entry.
/// The producer blocks when the queue is full (backpressure, never drops);
/// completion is signaled by dropping the sender.
pub async fn run_producer_consumer<S: ChunkSink>(
    sink: Arc<S>,
    pool: Pool<S::Entry>,
    chunks: Vec<Chunk>,
    queue_capacity: usize,
) -> Result<Vec<Outcome>> {
    let (tx, mut rx) = mpsc::channel::<Chunk>(queue_capacity.max(1));

    let producer = tokio::spawn(async move {
        let mut sent = 0usize;
        for chunk in chunks {
            if tx.send(chunk).await.is_err() {
                // Consumer is gone; nothing left to hand off to.
                break;
            }
            sent += 1;
        }
        debug!("producer finished after {} chunks", sent);
    });

    let consumer = tokio::spawn(async move {
        let mut entry = pool.acquire().await?;
        let mut outcomes = Vec::new();
        while let Some(chunk) = rx.recv().await {
            let chunk_id = chunk.id;
            match sink.apply(&mut entry, &chunk).await {
                Ok(rows) => outcomes.push(Outcome::Success { chunk_id, rows }),
                Err(e) => {
                    warn!("queued chunk {} failed (continuing): {}", chunk_id, e);
                    outcomes.push(Outcome::Failure {
                        chunk_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok::<_, PoolError>(outcomes)
    });

    producer.await?;
    let outcomes = consumer.await??;
    info!("queue drained: {} outcomes", outcomes.len());
    Ok(outcomes)
}
