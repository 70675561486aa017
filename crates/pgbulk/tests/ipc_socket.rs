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
use std::time::Duration;

use pgbulk::ipc::{
    connect_ready, send_record, serve_worker, worker_socket_path, AssignPolicy, IpcChannel,
    IpcSink, IpcWorker,
};
use pgbulk::pipeline::chunk::Chunk;
use pgbulk::pipeline::dispatcher::ChunkSink;
use pgbulk::records::Record;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

fn record(i: usize) -> Record {
    Record {
        id: format!("r{}", i),
        author: "author".into(),
        text: format!("text {}", i),
        score: i as i64,
    }
}

fn spawn_collector(
    path: PathBuf,
) -> (
    tokio::task::JoinHandle<anyhow::Result<()>>,
    mpsc::UnboundedReceiver<Record>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(serve_worker(path, move |rec| {
        let tx = tx.clone();
        async move {
            tx.send(rec)
                .map_err(|e| anyhow::anyhow!("collector send: {}", e))?;
            Ok(())
        }
    }));
    (handle, rx)
}

async fn recv_one(rx: &mut mpsc::UnboundedReceiver<Record>) -> Record {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("collector channel closed")
}

#[tokio::test]
async fn one_record_per_connection_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let path = worker_socket_path(dir.path(), 0);
    let (worker, mut rx) = spawn_collector(path.clone());

    let sent = record(7);
    send_record(&path, &sent).await.unwrap();
    let got = recv_one(&mut rx).await;
    assert_eq!(got, sent);

    worker.abort();
}

#[tokio::test]
async fn round_robin_feed_assigns_i_mod_w() {
    let dir = tempfile::tempdir().unwrap();
    let p0 = worker_socket_path(dir.path(), 0);
    let p1 = worker_socket_path(dir.path(), 1);
    let (w0, mut rx0) = spawn_collector(p0);
    let (w1, mut rx1) = spawn_collector(p1);

    let records: Vec<Record> = (0..4).map(record).collect();
    let channel = IpcChannel::new(dir.path().to_path_buf(), 2, AssignPolicy::RoundRobin);
    let sent = channel.feed(&records).await;
    assert_eq!(sent, 4);

    assert_eq!(recv_one(&mut rx0).await.id, "r0");
    assert_eq!(recv_one(&mut rx0).await.id, "r2");
    assert_eq!(recv_one(&mut rx1).await.id, "r1");
    assert_eq!(recv_one(&mut rx1).await.id, "r3");

    w0.abort();
    w1.abort();
}

#[tokio::test]
async fn block_feed_sends_waves_to_workers_in_position_order() {
    let dir = tempfile::tempdir().unwrap();
    let p0 = worker_socket_path(dir.path(), 0);
    let p1 = worker_socket_path(dir.path(), 1);
    let (w0, mut rx0) = spawn_collector(p0);
    let (w1, mut rx1) = spawn_collector(p1);

    let records: Vec<Record> = (0..5).map(record).collect();
    let channel = IpcChannel::new(dir.path().to_path_buf(), 2, AssignPolicy::Block);
    let sent = channel.feed(&records).await;
    assert_eq!(sent, 5);

    // Wave k holds items [k*2, k*2+2); waves are joined before the next
    // starts, so each worker sees its items in wave order.
    assert_eq!(recv_one(&mut rx0).await.id, "r0");
    assert_eq!(recv_one(&mut rx0).await.id, "r2");
    assert_eq!(recv_one(&mut rx0).await.id, "r4");
    assert_eq!(recv_one(&mut rx1).await.id, "r1");
    assert_eq!(recv_one(&mut rx1).await.id, "r3");

    w0.abort();
    w1.abort();
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_worker_survives() {
    let dir = tempfile::tempdir().unwrap();
    let path = worker_socket_path(dir.path(), 0);
    let (worker, mut rx) = spawn_collector(path.clone());

    // First connection carries garbage; the worker must log and loop.
    let mut raw = connect_ready(&path, 5, Duration::from_millis(20))
        .await
        .unwrap();
    raw.write_all(b"not json").await.unwrap();
    raw.shutdown().await.unwrap();
    drop(raw);

    let sent = record(1);
    send_record(&path, &sent).await.unwrap();
    let got = recv_one(&mut rx).await;
    assert_eq!(got, sent);

    worker.abort();
}

#[tokio::test]
async fn connect_ready_waits_for_a_late_listener() {
    let dir = tempfile::tempdir().unwrap();
    let path = worker_socket_path(dir.path(), 0);

    let delayed_path = path.clone();
    let starter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        spawn_collector(delayed_path)
    });

    let stream = connect_ready(&path, 10, Duration::from_millis(30)).await;
    assert!(stream.is_ok(), "connect_ready should outwait the bind");

    let (worker, _rx) = starter.await.unwrap();
    worker.abort();
}

#[tokio::test]
async fn missing_worker_drops_frames_without_erroring() {
    let dir = tempfile::tempdir().unwrap();
    let channel = IpcChannel::new(dir.path().to_path_buf(), 1, AssignPolicy::RoundRobin);
    let sent = channel.feed(&[record(0)]).await;
    assert_eq!(sent, 0);
}

#[tokio::test]
async fn ipc_sink_ships_every_record_of_a_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = worker_socket_path(dir.path(), 0);
    let (worker, mut rx) = spawn_collector(path.clone());

    let chunk = Chunk {
        id: 0,
        records: (0..3).map(record).collect(),
    };
    let sink = IpcSink;
    let mut entry = IpcWorker { id: 0, path };
    let applied = sink.apply(&mut entry, &chunk).await.unwrap();
    assert_eq!(applied, 3);

    for i in 0..3 {
        assert_eq!(recv_one(&mut rx).await.id, format!("r{}", i));
    }

    worker.abort();
}
