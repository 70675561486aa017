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

/// Connection parameters for the relational sink. Resolution: `PGBULK_PG_*`
/// environment variables, falling back to the local development defaults.
#[derive(Clone, Debug)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            database: "pgvector-test".into(),
            user: "postgres".into(),
            password: String::new(),
        }
    }
}

impl PgConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("PGBULK_PG_HOST").unwrap_or(d.host),
            port: std::env::var("PGBULK_PG_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.port),
            database: std::env::var("PGBULK_PG_DATABASE").unwrap_or(d.database),
            user: std::env::var("PGBULK_PG_USER").unwrap_or(d.user),
            password: std::env::var("PGBULK_PG_PASSWORD").unwrap_or(d.password),
        }
    }

    pub fn conn_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}
