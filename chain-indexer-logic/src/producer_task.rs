//! Block walk loop (spec §4.6, C7).
//!
//! One sub-task per `DataCollectionSpec`, grounded on the original's
//! `DataCollector.collect_data` loop: resolve bounds once, then fetch block
//! by block until the RPC says there is no more chain, enqueueing
//! transaction hashes for the configured mode's consumers.

use std::time::Instant;

use anyhow::{bail, Result};
use ethers::types::{BlockId, BlockNumber};
use futures::future::join_all;

use crate::bus::BusProducer;
use crate::repository::Repository;
use crate::resolver::{self, ExplorationBounds};
use crate::rpc::{BlockOrNotFound, RpcClient};
use crate::settings::{DataCollectionMode, DataCollectionSpec};

/// Blocks between progress log lines.
const PROGRESS_LOG_FREQUENCY: u64 = 1000;

/// Runs the block walk for a single `DataCollectionSpec` to completion.
#[tracing::instrument(skip_all, fields(mode = %spec.mode))]
pub async fn produce_data(
    spec: &DataCollectionSpec,
    repo: &Repository,
    rpc: &RpcClient,
    bus: &BusProducer,
) -> Result<()> {
    if spec.mode == DataCollectionMode::LogFilter {
        bail!("log_filter producer is not implemented");
    }

    let ExplorationBounds { start_block, end_block } = resolver::resolve(spec, repo, rpc).await?;

    let mut current = start_block;
    let started = Instant::now();
    let mut blocks_since_log: u64 = 0;
    let mut ewma_secs_per_block: f64 = 0.0;
    let mut last_log_instant = started;

    loop {
        if let Some(end) = end_block {
            if current > end {
                break;
            }
        }

        let id = BlockId::Number(BlockNumber::Number(current.into()));
        match rpc.get_block(id).await? {
            BlockOrNotFound::Found(mut block, tx_hashes) => {
                if spec.mode == DataCollectionMode::Full {
                    block.block_reward = rpc.get_block_reward(BlockNumber::Number(current.into())).await?;
                }
                repo.insert_block(&block).await?;

                if !tx_hashes.is_empty() {
                    let messages: Vec<String> = tx_hashes
                        .iter()
                        .map(|hash| crate::bus::BusMessage::encode(spec.mode, hash))
                        .collect();
                    bus.send_batch(&messages).await?;
                }
            }
            BlockOrNotFound::NotFound => {
                tracing::info!(block = current, "block not found at tip; producer terminating");
                break;
            }
        }

        current += 1;
        blocks_since_log += 1;

        if blocks_since_log >= PROGRESS_LOG_FREQUENCY {
            let elapsed = last_log_instant.elapsed().as_secs_f64();
            let secs_per_block = elapsed / blocks_since_log as f64;
            ewma_secs_per_block = if ewma_secs_per_block == 0.0 {
                secs_per_block
            } else {
                0.2 * secs_per_block + 0.8 * ewma_secs_per_block
            };

            let percent = end_block.map(|end| {
                let span = (end.saturating_sub(start_block).max(1)) as f64;
                let done = current.saturating_sub(start_block) as f64;
                (done / span * 100.0).min(100.0)
            });
            let eta_secs = end_block.map(|end| ewma_secs_per_block * current.abs_diff(end) as f64);

            tracing::info!(
                block = current,
                percent = percent,
                eta_secs = eta_secs,
                "producer progress"
            );

            blocks_since_log = 0;
            last_log_instant = Instant::now();
        }
    }

    Ok(())
}

/// Spawns `produce_data` concurrently for every configured spec and waits
/// for all of them, returning an error if any failed (spec §4.6: "gathers
/// their exit statuses and returns non-zero if any failed").
pub async fn start_producing_data(
    specs: &[DataCollectionSpec],
    repo: &Repository,
    rpc: &RpcClient,
    bus: &BusProducer,
) -> Result<()> {
    let results = join_all(specs.iter().map(|spec| produce_data(spec, repo, rpc, bus))).await;

    let mut failed = false;
    for (spec, result) in specs.iter().zip(results) {
        if let Err(err) = result {
            tracing::error!(mode = %spec.mode, error = %err, "producer sub-task failed");
            failed = true;
        }
    }

    if failed {
        bail!("one or more producer sub-tasks failed");
    }
    Ok(())
}
