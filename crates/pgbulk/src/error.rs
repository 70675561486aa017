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

use thiserror::Error;

/// Fatal pipeline errors. Only these abort a whole run; per-chunk and
/// per-frame failures are recovered and surface as failed outcomes or
/// skipped frames instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The record source was unreadable or malformed. Raised before any
    /// dispatch happens.
    #[error("source read failed: {0}")]
    SourceRead(String),

    /// A connection or worker entry could not be created at startup. The
    /// pool is never silently shrunk.
    #[error("pool construction failed: {0}")]
    PoolConstruction(String),
}
