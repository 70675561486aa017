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

// Shared modules for the importer and worker binaries.

pub mod db;
pub mod error;
pub mod ipc;
pub mod measure;
pub mod pipeline;
pub mod records;

pub use error::PipelineError;
pub use pipeline::chunk::{chunk_records, Chunk};
pub use pipeline::dispatcher::{ChunkSink, DispatchPolicy, Dispatcher, Outcome};
pub use pipeline::pool::{Pool, PoolError, PoolGuard};
pub use records::Record;
