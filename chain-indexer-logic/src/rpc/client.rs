//! Typed block/transaction/receipt/trace accessors (spec §4.1, C1).
//!
//! Wraps `ethers::providers::Provider<Http>`. `trace_block` and
//! `trace_replayTransaction` aren't part of the standard `eth_*` namespace
//! `ethers` models with typed methods, so they're issued as raw JSON-RPC
//! calls via `Provider::request`, mirroring the original's `_make_request`
//! escape hatch for non-standard methods.

use std::time::Duration;

use anyhow::Context;
use chrono::{TimeZone, Utc};
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError},
    types::{Address, Bytes, BlockId, BlockNumber, TransactionRequest, TxHash},
};
use serde_json::Value;

use chain_indexer_entity::{Block, InternalTransaction};

use super::retry::with_retry;

/// Result of a block lookup: either the normalized block, or the RPC's
/// "block not found" signal, which the producer treats as terminal (spec
/// §4.1, §4.6).
pub enum BlockOrNotFound {
    Found(Block, Vec<String>),
    NotFound,
}

pub struct RpcClient {
    provider: Provider<Http>,
    retries: u32,
    retry_delay: Duration,
}

impl RpcClient {
    pub fn new(node_url: &str, timeout: Duration, retries: u32, retry_delay: Duration) -> anyhow::Result<Self> {
        let url: url::Url = node_url.parse().context("parsing node_url")?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building the RPC HTTP client")?;
        let transport = Http::new_with_client(url, http_client);
        let provider = Provider::new(transport).interval(Duration::from_millis(200));
        Ok(Self {
            provider,
            retries,
            retry_delay,
        })
    }

    async fn retry<F, Fut, T>(&self, f: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        with_retry(self.retries, self.retry_delay, f).await
    }

    /// Fetches block `id` (a block number, or "latest" via [`BlockNumber::Latest`]).
    /// `"block not found"` is the producer's terminal signal, not an error.
    pub async fn get_block(&self, id: BlockId) -> anyhow::Result<BlockOrNotFound> {
        let block = self.retry(|| self.provider.get_block(id)).await?;
        let Some(block) = block else {
            return Ok(BlockOrNotFound::NotFound);
        };
        let Some(number) = block.number else {
            return Ok(BlockOrNotFound::NotFound);
        };
        let Some(hash) = block.hash else {
            return Ok(BlockOrNotFound::NotFound);
        };

        let tx_hashes: Vec<String> = block.transactions.iter().map(|h| format!("{h:#x}")).collect();

        let normalized = Block {
            number: number.as_u64() as i64,
            hash: format!("{hash:#x}"),
            nonce: format!("{:#x}", block.nonce.unwrap_or_default()),
            difficulty: block.difficulty.low_u64() as i64,
            gas_limit: block.gas_limit.as_u64() as i64,
            gas_used: block.gas_used.as_u64() as i64,
            timestamp: Utc
                .timestamp_opt(block.timestamp.as_u64() as i64, 0)
                .single()
                .unwrap_or_else(Utc::now),
            miner: format!("{:#x}", block.author.unwrap_or_default()),
            parent_hash: format!("{:#x}", block.parent_hash),
            block_reward: 0,
        };

        Ok(BlockOrNotFound::Found(normalized, tx_hashes))
    }

    /// Read-only `eth_call` against `to` with ABI-encoded `data`, used by the
    /// registry's contract-read methods (token/pair metadata resolution).
    pub async fn eth_call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        let tx = TransactionRequest::new().to(to).data(data).into();
        Ok(self.retry(|| self.provider.call(&tx, None)).await?)
    }

    pub async fn latest_block_number(&self) -> anyhow::Result<u64> {
        Ok(self.retry(|| self.provider.get_block_number()).await?.as_u64())
    }

    pub async fn get_transaction(&self, hash: TxHash) -> anyhow::Result<Option<ethers::types::Transaction>> {
        Ok(self.retry(|| self.provider.get_transaction(hash)).await?)
    }

    pub async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> anyhow::Result<Option<ethers::types::TransactionReceipt>> {
        Ok(self.retry(|| self.provider.get_transaction_receipt(hash)).await?)
    }

    /// `trace_block` filtered to `type == "reward"`, summing `action.value`
    /// (a `0x`-hex string). Open question #2 (spec §9): unverified for
    /// non-mainnet traces, implemented exactly as specified.
    pub async fn get_block_reward(&self, id: BlockNumber) -> anyhow::Result<i64> {
        let result: Value = self
            .retry(|| self.provider.request("trace_block", [block_number_param(id)]))
            .await?;

        let mut total: i64 = 0;
        if let Some(entries) = result.as_array() {
            for entry in entries {
                if entry.get("type").and_then(Value::as_str) == Some("reward") {
                    if let Some(value) = entry.pointer("/action/value").and_then(Value::as_str) {
                        let value = value.trim_start_matches("0x");
                        total += i64::from_str_radix(value, 16).unwrap_or(0);
                    }
                }
            }
        }
        Ok(total)
    }

    /// `trace_replayTransaction` flattened into `InternalTransaction` rows.
    pub async fn get_internal_transactions(&self, hash: TxHash) -> anyhow::Result<Vec<InternalTransaction>> {
        let result: Value = self
            .retry(|| {
                self.provider
                    .request("trace_replayTransaction", (format!("{hash:#x}"), ["trace"]))
            })
            .await?;

        let mut out = Vec::new();
        let Some(trace) = result.pointer("/trace").and_then(Value::as_array) else {
            return Ok(out);
        };

        for entry in trace {
            let action = entry.get("action").cloned().unwrap_or(Value::Null);
            let call_type = action
                .get("callType")
                .and_then(Value::as_str)
                .unwrap_or("call")
                .to_string();
            let from = action.get("from").and_then(Value::as_str).unwrap_or_default().to_string();
            let to = action.get("to").and_then(Value::as_str).unwrap_or_default().to_string();
            let value = hex_to_decimal_string(action.get("value").and_then(Value::as_str).unwrap_or("0x0"));
            let input = action.get("input").and_then(Value::as_str).unwrap_or_default().to_string();
            let gas = hex_to_i64(action.get("gas").and_then(Value::as_str).unwrap_or("0x0"));
            let gas_used = entry
                .pointer("/result/gasUsed")
                .and_then(Value::as_str)
                .map(hex_to_i64)
                .unwrap_or(0);

            out.push(InternalTransaction {
                transaction_hash: format!("{hash:#x}"),
                from_address: from,
                to_address: to,
                value,
                gas_limit: gas,
                gas_used,
                input_data: input,
                call_type,
            });
        }
        Ok(out)
    }
}

fn block_number_param(id: BlockNumber) -> String {
    match id {
        BlockNumber::Number(n) => format!("{:#x}", n.as_u64()),
        BlockNumber::Latest => "latest".to_string(),
        BlockNumber::Earliest => "earliest".to_string(),
        BlockNumber::Pending => "pending".to_string(),
        BlockNumber::Safe => "safe".to_string(),
        BlockNumber::Finalized => "finalized".to_string(),
    }
}

fn hex_to_i64(s: &str) -> i64 {
    i64::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or(0)
}

/// Parses a `0x`-hex uint256 into a base-10 decimal string, since the value
/// doesn't fit `i64` (spec §3 supplemental: Web3 hex-to-native coercion).
fn hex_to_decimal_string(s: &str) -> String {
    let s = s.trim_start_matches("0x");
    if s.is_empty() {
        return "0".to_string();
    }
    ethers::types::U256::from_str_radix(s, 16)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "0".to_string())
}
