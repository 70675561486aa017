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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use pgbulk::chunk_records;
use pgbulk::db::{connect, create_schema, PgConfig, PgSink};
use pgbulk::ipc::{AssignPolicy, IpcChannel};
use pgbulk::measure::{measure, TimingLog};
use pgbulk::pipeline::dispatcher::{summarize, DispatchPolicy, Dispatcher};
use pgbulk::pipeline::pool::Pool;
use pgbulk::pipeline::queue::run_producer_consumer;
use pgbulk::records::read_records;

#[derive(Parser)]
#[command(
    name = "pgbulk",
    about = "Bulk-load line-delimited records into Postgres and feed embedding workers"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum DispatchArg {
    AllAtOnce,
    Waves,
}

#[derive(Clone, Copy, ValueEnum)]
enum AssignArg {
    RoundRobin,
    Block,
}

#[derive(Subcommand)]
enum Command {
    /// Import a JSONL file into the comments table.
    Import {
        /// Path to the line-delimited record file.
        input: PathBuf,
        /// Records per chunk; non-positive means one chunk with everything.
        #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
        chunk_size: i64,
        /// Pool capacity (0 is normalized to 1).
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Record limit; negative means all.
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        limit: i64,
        #[arg(long, value_enum, default_value = "all-at-once")]
        dispatch: DispatchArg,
        /// Per-chunk timeout in milliseconds (0 disables).
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
        /// Use the single-consumer bounded queue instead of the dispatcher.
        #[arg(long)]
        queued: bool,
        #[arg(long, default_value_t = 16)]
        queue_capacity: usize,
    },
    /// Fan records out to the embedding workers over unix sockets.
    Feed {
        input: PathBuf,
        /// Directory holding the worker-<j>.sock paths.
        #[arg(long, default_value = "/tmp")]
        socket_dir: PathBuf,
        #[arg(long, default_value_t = 2)]
        workers: usize,
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        limit: i64,
        #[arg(long, value_enum, default_value = "round-robin")]
        assign: AssignArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Import {
            input,
            chunk_size,
            workers,
            limit,
            dispatch,
            timeout_ms,
            queued,
            queue_capacity,
        } => {
            run_import(
                input,
                chunk_size,
                workers,
                limit,
                dispatch,
                timeout_ms,
                queued,
                queue_capacity,
            )
            .await
        }
        Command::Feed {
            input,
            socket_dir,
            workers,
            limit,
            assign,
        } => run_feed(input, socket_dir, workers, limit, assign).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_import(
    input: PathBuf,
    chunk_size: i64,
    workers: usize,
    limit: i64,
    dispatch: DispatchArg,
    timeout_ms: u64,
    queued: bool,
    queue_capacity: usize,
) -> Result<()> {
    let records = read_records(&input, limit)?;
    info!("{} records read from {}", records.len(), input.display());
    let chunks = chunk_records(records, chunk_size);
    let timing = TimingLog::open_default()?;

    let pg = PgConfig::from_env();
    let setup_client = connect(&pg).await?;
    create_schema(&setup_client).await?;
    drop(setup_client);

    let pool = Pool::build(workers, |_| {
        let pg = pg.clone();
        async move { connect(&pg).await }
    })
    .await?;
    let sink = Arc::new(PgSink);
    let tag = format!("chunk_size={}", chunk_size);

    let outcomes = if queued {
        measure(
            &timing,
            "bulk_import_queued",
            &tag,
            run_producer_consumer(Arc::clone(&sink), pool.clone(), chunks, queue_capacity),
        )
        .await?
    } else {
        let mut dispatcher = Dispatcher::new(match dispatch {
            DispatchArg::AllAtOnce => DispatchPolicy::AllAtOnce,
            DispatchArg::Waves => DispatchPolicy::CapacityWaves,
        });
        if timeout_ms > 0 {
            dispatcher = dispatcher.with_timeout(Duration::from_millis(timeout_ms));
        }
        measure(
            &timing,
            "bulk_import",
            &tag,
            dispatcher.run(sink, &pool, chunks),
        )
        .await
    };

    pool.close_all();
    let report = summarize(&outcomes);
    info!(
        "import finished: {} chunks succeeded, {} failed",
        report.succeeded, report.failed
    );
    Ok(())
}

async fn run_feed(
    input: PathBuf,
    socket_dir: PathBuf,
    workers: usize,
    limit: i64,
    assign: AssignArg,
) -> Result<()> {
    let records = read_records(&input, limit)?;
    info!("{} records read from {}", records.len(), input.display());
    let timing = TimingLog::open_default()?;
    let policy = match assign {
        AssignArg::RoundRobin => AssignPolicy::RoundRobin,
        AssignArg::Block => AssignPolicy::Block,
    };
    let channel = IpcChannel::new(socket_dir, workers, policy);
    let tag = format!("workers={}", workers);
    let sent = measure(&timing, "feed_workers", &tag, channel.feed(&records)).await;
    info!("feed finished: {}/{} frames sent", sent, records.len());
    Ok(())
}
