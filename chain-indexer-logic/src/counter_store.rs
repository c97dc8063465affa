//! Per-partition backpressure counters (spec §4.2, C2).
//!
//! Backed by a Redis sorted set keyed `"<topic>_n_transactions"`, member =
//! partition index (as a string), score = integer count. `ZINCRBY` gives
//! atomic increment/decrement without a round trip to read-then-write;
//! `ZRANGE ... WITHSCORES` with `LIMIT 0 1` gives the minimum-score member in
//! one call. Grounded on `blockscout-blockscout-rs/libs/recache`'s `redis`
//! dependency (the only `redis` usage in the retrieval pack) for the
//! version/feature pin; the key shape and operation set are grounded on the
//! original's `RedisManager` (`app/db/redis.py`).

use anyhow::Result;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

pub struct CounterStore {
    conn: ConnectionManager,
    key: String,
}

impl CounterStore {
    pub async fn connect(redis_url: &str, topic: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: format!("{topic}_n_transactions"),
        })
    }

    /// Atomically adds `n` to `partition`'s counter. `n` may be negative.
    pub async fn incr_by(&self, partition: u32, n: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: f64 = conn.zincr(&self.key, partition.to_string(), n as f64).await?;
        Ok(())
    }

    /// Decrements `partition`'s counter by 1. The score is allowed to go
    /// negative transiently (spec §4.2) — a decrement racing ahead of its
    /// matching increment is tolerated, not corrected.
    pub async fn decr(&self, partition: u32) -> Result<()> {
        self.incr_by(partition, -1).await
    }

    /// Sum of all partition counters — the topic backlog.
    pub async fn total(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        let pairs: Vec<(String, f64)> = conn.zrange_withscores(&self.key, 0, -1).await?;
        Ok(pairs.into_iter().map(|(_, score)| score).sum::<f64>() as i64)
    }

    /// The partition with the lowest score, or `None` if the set is empty.
    /// Ties are broken by Redis's own member ordering for equal scores —
    /// "arbitrary but deterministic" per spec §4.3.
    pub async fn argmin_partition(&self) -> Result<Option<u32>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(&self.key, 0, 0).await?;
        Ok(members.into_iter().next().and_then(|m| m.parse().ok()))
    }
}
