use anyhow::Result;
use log::{error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use pgbulk::db::{connect, PgConfig};
use pgbulk::ipc::serve_worker;
use pgbulk::records::Record;

#[derive(Serialize)]
struct EmbedReq<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

// Response parsing helpers (module-level so tests can access them)
#[derive(serde::Deserialize)]
struct TeiResp {
    embeddings: Vec<Vec<f64>>,
}

// OpenAI-style: { data: [{ embedding: [...] }, ... ] }
#[derive(serde::Deserialize)]
struct OpenAiItem {
    embedding: Vec<f64>,
}
#[derive(serde::Deserialize)]
struct OpenAiResp {
    data: Vec<OpenAiItem>,
}

// Accept either the TEI-native or the OpenAI-style response shape.
fn parse_embedding(body: &[u8]) -> Option<Vec<f64>> {
    if let Ok(t) = serde_json::from_slice::<TeiResp>(body) {
        return t.embeddings.into_iter().next();
    }
    serde_json::from_slice::<OpenAiResp>(body)
        .ok()
        .and_then(|r| r.data.into_iter().next().map(|it| it.embedding))
}

async fn embed_text(
    http: &reqwest::Client,
    endpoint: &str,
    model: &str,
    max_retries: usize,
    text: &str,
) -> Result<Vec<f64>> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let resp = http
            .post(endpoint)
            .json(&EmbedReq {
                model,
                input: [text],
            })
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => {
                let body = r.bytes().await?;
                match parse_embedding(&body) {
                    Some(v) => return Ok(v),
                    None => anyhow::bail!(
                        "unrecognized embeddings response shape ({} bytes)",
                        body.len()
                    ),
                }
            }
            Ok(r) => {
                warn!(
                    "embeddings endpoint returned {} (attempt {})",
                    r.status(),
                    attempt
                );
            }
            Err(e) => {
                warn!("embeddings request failed (attempt {}): {}", attempt, e);
            }
        }
        if attempt >= max_retries {
            anyhow::bail!("embedding failed after {} attempts", attempt);
        }
        tokio::time::sleep(Duration::from_millis(100 * (1 << (attempt - 1)).min(8))).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("pgbulk-embed-worker starting up");

    let socket: PathBuf = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => {
            error!("usage: pgbulk-embed-worker <socket-path>");
            std::process::exit(2);
        }
    };

    let embed_base =
        std::env::var("PGBULK_EMBED_BASE").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let endpoint = format!("{}/embeddings", embed_base.trim_end_matches('/'));
    let embed_model = match std::env::var("PGBULK_EMBED_MODEL") {
        Ok(m) if !m.trim().is_empty() => m,
        _ => {
            error!("PGBULK_EMBED_MODEL environment variable not set; it is required");
            std::process::exit(1);
        }
    };
    let max_retries: usize = std::env::var("PGBULK_EMBED_RETRIES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let pg = PgConfig::from_env();
    let client = connect(&pg).await?;
    info!("embed worker connected to postgres db={}", pg.database);

    let db = &client;
    serve_worker(socket, |record: Record| {
        let http = http.clone();
        let endpoint = endpoint.clone();
        let model = embed_model.clone();
        async move {
            let embedding = embed_text(&http, &endpoint, &model, max_retries, &record.text).await?;
            db.execute(
                "UPDATE comments SET embedding = $1 WHERE id = $2",
                &[&embedding, &record.id],
            )
            .await?;
            info!("embedded record {}", record.id);
            Ok(())
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::parse_embedding;

    #[test]
    fn parses_tei_native_shape() {
        let body = br#"{"embeddings": [[0.1, 0.2, 0.3]]}"#;
        let v = parse_embedding(body).unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[0] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn parses_openai_shape() {
        let body = br#"{"data": [{"embedding": [1.0, 2.0]}], "model": "m"}"#;
        let v = parse_embedding(body).unwrap();
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(parse_embedding(b"{}").is_none());
        assert!(parse_embedding(b"not json").is_none());
    }
}
