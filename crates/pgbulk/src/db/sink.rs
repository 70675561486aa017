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

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use crate::pipeline::chunk::Chunk;
use crate::pipeline::dispatcher::ChunkSink;

const COLUMNS_PER_ROW: usize = 4;

/// Relational sink: one multi-row parameterized INSERT per chunk.
pub struct PgSink;

/// Placeholder list for a multi-row insert:
/// `($1, $2, $3, $4), ($5, $6, $7, $8), ...`
fn values_clause(rows: usize) -> String {
    let mut clause = String::new();
    for r in 0..rows {
        if r > 0 {
            clause.push_str(", ");
        }
        let base = r * COLUMNS_PER_ROW;
        clause.push_str(&format!(
            "(${}, ${}, ${}, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4
        ));
    }
    clause
}

#[async_trait]
impl ChunkSink for PgSink {
    type Entry = Client;

    async fn apply(&self, entry: &mut Client, chunk: &Chunk) -> Result<usize> {
        if chunk.records.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO comments (id, author, content, score) VALUES {}",
            values_clause(chunk.records.len())
        );
        if std::env::var("PGBULK_DEBUG_SQL").ok().as_deref() == Some("1") {
            debug!("batch insert sql ({} rows): {}", chunk.records.len(), sql);
        }
        let mut params: Vec<&(dyn ToSql + Sync)> =
            Vec::with_capacity(chunk.records.len() * COLUMNS_PER_ROW);
        for record in &chunk.records {
            params.push(&record.id);
            params.push(&record.author);
            params.push(&record.text);
            params.push(&record.score);
        }
        let n = entry.execute(sql.as_str(), &params).await?;
        Ok(n as usize)
    }
}
