//! Exploration-bounds resolver (spec §4.5, C6).
//!
//! Decides where the producer should resume: the configured `start_block`
//! wins outright; otherwise the persisted latest block's transaction set is
//! checked against the RPC's view of that block to detect a crash mid-block
//! (the original never names this step explicitly, but `DataCollector`'s
//! `_get_start_block` re-derives it from `BlockData.transactions` vs. the
//! `transaction` table).

use anyhow::Result;

use crate::repository::Repository;
use crate::rpc::{BlockOrNotFound, RpcClient};
use crate::settings::DataCollectionSpec;

#[derive(Debug, Clone, Copy)]
pub struct ExplorationBounds {
    pub start_block: u64,
    /// `None` means unbounded: the walk terminates only on the RPC's
    /// "block not found" signal.
    pub end_block: Option<u64>,
}

pub async fn resolve(spec: &DataCollectionSpec, repo: &Repository, rpc: &RpcClient) -> Result<ExplorationBounds> {
    let start_block = match spec.start_block {
        Some(start) => start,
        None => match repo.latest_block_number().await? {
            Some(latest) => {
                let persisted_hashes = repo.transaction_hashes_for_block(latest).await?;
                let rpc_hashes = match rpc.get_block(ethers::types::BlockId::Number(ethers::types::BlockNumber::Number(latest.into()))).await? {
                    BlockOrNotFound::Found(_, hashes) => hashes,
                    BlockOrNotFound::NotFound => Vec::new(),
                };

                let mut persisted_sorted = persisted_hashes;
                let mut rpc_sorted = rpc_hashes;
                persisted_sorted.sort();
                rpc_sorted.sort();

                if persisted_sorted == rpc_sorted {
                    latest + 1
                } else {
                    tracing::warn!(
                        block = latest,
                        "persisted transaction set for latest block doesn't match the chain; re-ingesting"
                    );
                    latest
                }
            }
            None => 0,
        },
    };

    Ok(ExplorationBounds {
        start_block,
        end_block: spec.end_block,
    })
}
