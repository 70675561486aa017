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

use crate::records::Record;

/// A bounded batch of records processed as one unit of work. Chunks are
/// independent of each other; no cross-chunk ordering is guaranteed
/// downstream.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: usize,
    pub records: Vec<Record>,
}

/// Split `records` into ordered chunks of at most `chunk_size` records.
/// A non-positive `chunk_size` is the sentinel for "one chunk containing
/// everything". An empty input yields no chunks, not a single empty one.
pub fn chunk_records(records: Vec<Record>, chunk_size: i64) -> Vec<Chunk> {
    if records.is_empty() {
        return Vec::new();
    }
    if chunk_size <= 0 {
        return vec![Chunk { id: 0, records }];
    }
    let size = chunk_size as usize;
    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);
    for record in records {
        current.push(record);
        if current.len() == size {
            chunks.push(Chunk {
                id: chunks.len(),
                records: std::mem::replace(&mut current, Vec::with_capacity(size)),
            });
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            id: chunks.len(),
            records: current,
        });
    }
    chunks
}
