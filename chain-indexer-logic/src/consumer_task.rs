//! Consumer worker (spec §4.8, C9): decodes bus messages, fetches tx+receipt,
//! dispatches to the processor, and tracks consumed/saved counters.
//!
//! Grounded on the original's `ConsumerWorker.process_message` plus the
//! `consumer_fanout` parallel-instance loop in `app/main.py`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ethers::types::TxHash;
use futures::future::join_all;

use crate::bus::{BusConsumer, BusMessage};
use crate::metrics::TRANSACTIONS_SAVED;
use crate::processor;
use crate::registry::ContractRegistry;
use crate::repository::Repository;
use crate::rpc::RpcClient;

/// Fetches tx + receipt for `msg.tx_hash` and runs it through the processor.
/// A hash the node no longer knows about (pruned, or a bad message) is
/// logged and skipped rather than treated as fatal.
async fn process_message(
    msg: BusMessage,
    rpc: &RpcClient,
    repo: &Repository,
    registry: &ContractRegistry,
) -> Result<()> {
    let hash: TxHash = msg.tx_hash.parse()?;

    let Some(tx) = rpc.get_transaction(hash).await? else {
        tracing::warn!(hash = %msg.tx_hash, "transaction not found at node; skipping");
        return Ok(());
    };
    let Some(receipt) = rpc.get_transaction_receipt(hash).await? else {
        tracing::warn!(hash = %msg.tx_hash, "transaction receipt not found at node; skipping");
        return Ok(());
    };

    let saved = processor::process_transaction(msg.mode, &tx, &receipt, registry, rpc, repo).await?;
    if saved {
        TRANSACTIONS_SAVED.inc();
    }
    Ok(())
}

/// Runs one consumer-group member to completion. `PartitionsIdle` surfaces
/// as `Ok(())` from [`BusConsumer::run`] already; any other error here is
/// the "any other exception in the consumer" case (spec §7) and should make
/// the caller exit non-zero with the offending hash already logged.
#[tracing::instrument(skip_all)]
pub async fn run_consumer(
    consumer: BusConsumer,
    idle_timeout: Duration,
    rpc: Arc<RpcClient>,
    repo: Arc<Repository>,
    registry: Arc<ContractRegistry>,
) -> Result<()> {
    consumer
        .run(idle_timeout, move |msg| {
            let rpc = Arc::clone(&rpc);
            let repo = Arc::clone(&repo);
            let registry = Arc::clone(&registry);
            async move {
                let hash = msg.tx_hash.clone();
                process_message(msg, &rpc, &repo, &registry).await.map_err(|e| {
                    tracing::error!(hash = %hash, error = %e, "consumer failed processing transaction");
                    e
                })
            }
        })
        .await
}

/// Spawns `fanout` consumer-group members in parallel per process (spec
/// §4.8: "at least `consumer_fanout` consumer tasks run in parallel per
/// process; each owns its own consumer-group member"). `make_consumer` is
/// invoked once per task so each gets its own `StreamConsumer` handle.
pub async fn start_consuming<F>(
    fanout: u32,
    make_consumer: F,
    idle_timeout: Duration,
    rpc: Arc<RpcClient>,
    repo: Arc<Repository>,
    registry: Arc<ContractRegistry>,
) -> Result<()>
where
    F: Fn() -> Result<BusConsumer>,
{
    let mut tasks = Vec::with_capacity(fanout as usize);
    for _ in 0..fanout {
        let consumer = make_consumer()?;
        tasks.push(run_consumer(
            consumer,
            idle_timeout,
            Arc::clone(&rpc),
            Arc::clone(&repo),
            Arc::clone(&registry),
        ));
    }

    let results = join_all(tasks).await;
    let mut failed = false;
    for result in results {
        if let Err(err) = result {
            tracing::error!(error = %err, "consumer task exited with an error");
            failed = true;
        }
    }

    anyhow::ensure!(!failed, "one or more consumer tasks failed");
    Ok(())
}
