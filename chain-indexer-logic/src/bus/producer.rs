//! Partitioned topic producer (spec §4.3, C4 producer side).
//!
//! Grounded line-by-line on the original's `KafkaProducerManager`: a cursor
//! that seeds every partition once before switching to min-score selection,
//! a capacity gate that polls the counter store's total before every send,
//! and post-send bookkeeping that increments the landed partition's counter
//! by the number of messages actually appended to the batch.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{Duration, Instant},
};

use anyhow::Result;
use rdkafka::{
    message::OwnedHeaders,
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use crate::counter_store::CounterStore;
use crate::metrics::{BUS_CAPACITY_STALL_SECONDS, MESSAGES_PRODUCED};

/// Maximum messages tolerated per partition before producing stalls.
pub const MAX_PER_PARTITION: i64 = 1000;
/// Maximum messages submitted as a single bus batch.
pub const MESSAGES_PER_BATCH: usize = 1024;

/// `-1` signals min-score mode; any other value is the next partition index
/// to seed, matching the original's `self._i_partition` sentinel.
const MIN_SCORE_MODE: i64 = -1;

pub struct BusProducer {
    producer: FutureProducer,
    counter: CounterStore,
    topic: String,
    cursor: AtomicI64,
}

impl BusProducer {
    pub fn new(producer: FutureProducer, counter: CounterStore, topic: String) -> Self {
        Self {
            producer,
            counter,
            topic,
            cursor: AtomicI64::new(0),
        }
    }

    async fn number_of_partitions(&self) -> Result<usize> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(Some(&self.topic), Duration::from_secs(10))?;
        let topic_meta = metadata
            .topics()
            .iter()
            .find(|t| t.name() == self.topic)
            .ok_or_else(|| anyhow::anyhow!("topic {} not found in broker metadata", self.topic))?;
        Ok(topic_meta.partitions().len())
    }

    async fn choose_partition(&self) -> Result<i32> {
        let cursor = self.cursor.load(Ordering::SeqCst);
        if cursor == MIN_SCORE_MODE {
            return Ok(self.counter.argmin_partition().await?.unwrap_or(0) as i32);
        }

        let n_partitions = self.number_of_partitions().await? as i64;
        let partition = cursor;
        let next = cursor + 1;
        if next >= n_partitions {
            self.cursor.store(MIN_SCORE_MODE, Ordering::SeqCst);
        } else {
            self.cursor.store(next, Ordering::SeqCst);
        }
        Ok(partition as i32)
    }

    /// Suspends until the topic backlog is back under capacity, logging a
    /// warning every 60s stalled and an info once resumed after a stall of
    /// at least 60s. If the backlog is empty and there was no prior stall,
    /// this returns immediately without even checking capacity once more.
    async fn wait_for_capacity(&self) -> Result<()> {
        let started = Instant::now();
        let mut stalled_secs: u64 = 0;

        loop {
            let n_partitions = self.number_of_partitions().await? as i64;
            let total = self.counter.total().await?;

            if total == 0 && stalled_secs == 0 {
                return Ok(());
            }

            let capacity = MAX_PER_PARTITION * n_partitions.max(1);
            if total <= capacity {
                if stalled_secs >= 60 {
                    tracing::info!(stalled_secs, "continuing producing after stall");
                    BUS_CAPACITY_STALL_SECONDS.observe(started.elapsed().as_secs_f64());
                }
                return Ok(());
            }

            if stalled_secs > 0 && stalled_secs % 60 == 0 {
                tracing::warn!(stalled_secs, "producing stalled");
            }
            stalled_secs += 1;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Sends one message, gated by [`Self::wait_for_capacity`].
    pub async fn send_one(&self, msg: &str) -> Result<()> {
        self.send_batch(std::slice::from_ref(&msg.to_string())).await
    }

    /// Splits `msgs` into sub-batches of at most [`MESSAGES_PER_BATCH`] and
    /// submits each as one bus batch to the chosen partition.
    pub async fn send_batch(&self, msgs: &[String]) -> Result<()> {
        if msgs.is_empty() {
            tracing::warn!("attempted to send an empty list of messages");
            return Ok(());
        }

        for chunk in msgs.chunks(MESSAGES_PER_BATCH) {
            self.wait_for_capacity().await?;
            let partition = self.choose_partition().await?;

            let mut n_appended = 0usize;
            for msg in chunk {
                let record: FutureRecord<'_, (), str> = FutureRecord::to(&self.topic)
                    .partition(partition)
                    .payload(msg.as_str())
                    .headers(OwnedHeaders::new());
                match self.producer.send(record, Timeout::Never).await {
                    Ok(_) => n_appended += 1,
                    Err((e, _)) if e.to_string().to_lowercase().contains("timed out") => {
                        tracing::error!(message = %msg, error = %e, "bus send timed out; delivery unknown");
                    }
                    Err((e, _)) => return Err(anyhow::anyhow!(e)),
                }
            }

            if n_appended > 0 {
                self.counter.incr_by(partition as u32, n_appended as i64).await?;
                MESSAGES_PRODUCED.inc_by(n_appended as u64);
            } else {
                tracing::warn!(partition, "no messages from this batch were acknowledged");
            }
        }
        Ok(())
    }
}
