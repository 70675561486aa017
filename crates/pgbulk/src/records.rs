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

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One row from the line-delimited source. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub author: String,
    pub text: String,
    pub score: i64,
}

/// Read records from a JSONL file, one JSON object per line. Blank lines are
/// skipped. A negative `limit` means "all records". Any unreadable or
/// malformed line is fatal: the run must abort before dispatch rather than
/// ingest a partial source.
pub fn read_records(path: &Path, limit: i64) -> Result<Vec<Record>, PipelineError> {
    let file = std::fs::File::open(path)
        .map_err(|e| PipelineError::SourceRead(format!("{}: {}", path.display(), e)))?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        if limit >= 0 && records.len() as i64 >= limit {
            break;
        }
        let line = line
            .map_err(|e| PipelineError::SourceRead(format!("line {}: {}", lineno + 1, e)))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .map_err(|e| PipelineError::SourceRead(format!("line {}: {}", lineno + 1, e)))?;
        records.push(record);
    }
    Ok(records)
}
