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

use std::time::Duration;

use pgbulk::pipeline::pool::{Pool, PoolError};

async fn unit_pool(capacity: usize) -> Pool<()> {
    Pool::build(capacity, |_| async { Ok::<_, anyhow::Error>(()) })
        .await
        .unwrap()
}

#[tokio::test]
async fn zero_capacity_is_normalized_to_one() {
    let pool = unit_pool(0).await;
    assert_eq!(pool.capacity(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn acquire_and_release_cycle() {
    let pool = Pool::build(2, |i| async move { Ok::<_, anyhow::Error>(i) })
        .await
        .unwrap();
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_eq!(pool.leased_count(), 2);
    assert!(matches!(pool.try_acquire(), Err(PoolError::Exhausted)));
    drop(a);
    assert_eq!(pool.idle_count(), 1);
    let c = pool.try_acquire().unwrap();
    assert_eq!(pool.leased_count(), 2);
    drop(b);
    drop(c);
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.leased_count(), 0);
}

#[tokio::test]
async fn blocked_acquire_wakes_on_release() {
    let pool = unit_pool(1).await;
    let guard = pool.acquire().await.unwrap();
    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.acquire().await.map(|_g| ()) });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "waiter must block while leased");
    drop(guard);
    let res = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter must wake after release")
        .unwrap();
    assert!(res.is_ok());
}

#[tokio::test]
async fn acquire_after_close_fails_fast() {
    let pool = unit_pool(2).await;
    pool.close_all();
    let res = tokio::time::timeout(Duration::from_millis(200), pool.acquire())
        .await
        .expect("acquire must not block on a closed pool");
    assert!(matches!(res, Err(PoolError::Closed)));
    assert!(matches!(pool.try_acquire(), Err(PoolError::Closed)));
    assert_eq!(pool.idle_count(), 0);
}

#[tokio::test]
async fn close_wakes_blocked_waiters() {
    let pool = unit_pool(1).await;
    let guard = pool.acquire().await.unwrap();
    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.acquire().await.map(|_g| ()) });
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close_all();
    let res = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter must wake on close")
        .unwrap();
    assert!(matches!(res, Err(PoolError::Closed)));
    // A guard returned after close drops its entry instead of re-idling it.
    drop(guard);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.leased_count(), 0);
}

#[tokio::test]
async fn construction_failure_is_fatal() {
    let res = Pool::build(3, |i| async move {
        if i == 1 {
            anyhow::bail!("refused")
        } else {
            Ok(i)
        }
    })
    .await;
    let err = match res {
        Ok(_) => panic!("expected construction failure"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("entry 1"), "got: {}", err);
}
