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

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pgbulk::pipeline::chunk::Chunk;
use pgbulk::pipeline::dispatcher::ChunkSink;
use pgbulk::records::Record;

/// Test sink: tracks how many applies run at once and fails injected
/// chunk ids after doing its "work".
pub struct MockSink {
    pub delay: Duration,
    pub fail_chunks: Vec<usize>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub applied: AtomicUsize,
}

impl MockSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_chunks: Vec::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            applied: AtomicUsize::new(0),
        }
    }

    pub fn failing(delay: Duration, fail_chunks: Vec<usize>) -> Self {
        Self {
            fail_chunks,
            ..Self::new(delay)
        }
    }

    pub fn max_seen(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkSink for MockSink {
    type Entry = ();

    async fn apply(&self, _entry: &mut (), chunk: &Chunk) -> anyhow::Result<usize> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.applied.fetch_add(1, Ordering::SeqCst);
        if self.fail_chunks.contains(&chunk.id) {
            anyhow::bail!("injected failure for chunk {}", chunk.id);
        }
        Ok(chunk.records.len())
    }
}

pub fn make_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record {
            id: format!("r{}", i),
            author: "author".into(),
            text: format!("text {}", i),
            score: i as i64,
        })
        .collect()
}
