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
use log::{info, warn};
use tokio_postgres::{Client, NoTls};

use super::config::PgConfig;

/// Open one Postgres connection and spawn its driver task. The returned
/// client is what the pool holds as an entry; dropping it closes the
/// connection and ends the driver task.
pub async fn connect(cfg: &PgConfig) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(&cfg.conn_string(), NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("postgres connection task ended: {}", e);
        }
    });
    Ok(client)
}

/// Drop and recreate the comments table. UNLOGGED on purpose: the table is a
/// re-runnable bulk-load target. The embedding column stays NULL until the
/// socket workers fill it in.
pub async fn create_schema(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "DROP TABLE IF EXISTS comments CASCADE;
             CREATE UNLOGGED TABLE comments (
                 id        TEXT,
                 author    TEXT,
                 content   TEXT,
                 score     BIGINT,
                 embedding DOUBLE PRECISION[]
             );",
        )
        .await?;
    info!("schema ready: table comments");
    Ok(())
}
