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

use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};

/// Append-only sink for `<operation> <tag> -> <ms> ms` lines. Appends are
/// serialized behind the mutex so concurrent measurements never interleave
/// within a line.
pub struct TimingLog {
    sink: Mutex<std::fs::File>,
}

impl TimingLog {
    /// Open (or create) the log at `path` for appending.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open timing log {}", path.display()))?;
        Ok(Self {
            sink: Mutex::new(file),
        })
    }

    /// Open the log named by `PGBULK_TIME_LOG`, default `timings.log`.
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("PGBULK_TIME_LOG").unwrap_or_else(|_| "timings.log".to_string());
        Self::open(Path::new(&path))
    }

    pub fn append(&self, operation: &str, tag: &str, elapsed_ms: u128) {
        let line = format!("{} {} -> {} ms\n", operation, tag, elapsed_ms);
        match self.sink.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!("timing log append failed: {}", e);
                }
            }
            Err(_) => warn!("timing log poisoned; entry dropped"),
        }
    }
}

/// Measure one async operation's wall-clock duration, append it to the
/// timing log, and pass the result through unchanged.
pub async fn measure<T, F: Future<Output = T>>(
    log: &TimingLog,
    operation: &str,
    tag: &str,
    fut: F,
) -> T {
    let start = Instant::now();
    let result = fut.await;
    let elapsed_ms = start.elapsed().as_millis();
    info!("{} {} -> {} ms", operation, tag, elapsed_ms);
    log.append(operation, tag, elapsed_ms);
    result
}
