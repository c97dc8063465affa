//! Row-shaped data structures for the chain-indexer relational store.
//!
//! Table names carry a per-deployment `<topic>_` prefix that is only known at
//! runtime (see `chain-indexer-logic::repository`), so these are plain
//! structs rather than `sea_orm::DeriveEntityModel` entities — the derive
//! macro requires a `#[sea_orm(table_name = "...")]` compile-time constant,
//! which can't express a runtime prefix. `FromQueryResult` only maps columns
//! by name and works fine against any query, prefixed table or not.

use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ContractCategory {
    Unknown,
    Erc20,
    Erc721,
    Erc1155,
    #[serde(rename = "UniV2Factory")]
    UniV2Factory,
    #[serde(rename = "UniV2Pair")]
    UniV2Pair,
}

impl ContractCategory {
    pub fn is_erc(self) -> bool {
        matches!(
            self,
            ContractCategory::Erc20 | ContractCategory::Erc721 | ContractCategory::Erc1155
        )
    }

    pub fn is_uniswap_pair(self) -> bool {
        matches!(self, ContractCategory::UniV2Pair)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContractCategory::Unknown => "unknown",
            ContractCategory::Erc20 => "erc20",
            ContractCategory::Erc721 => "erc721",
            ContractCategory::Erc1155 => "erc1155",
            ContractCategory::UniV2Factory => "UniSwapV2Factory",
            ContractCategory::UniV2Pair => "UniSwapV2Pair",
        }
    }
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct Block {
    pub number: i64,
    pub hash: String,
    pub nonce: String,
    pub difficulty: i64,
    pub gas_limit: i64,
    pub gas_used: i64,
    pub timestamp: DateTime<Utc>,
    pub miner: String,
    pub parent_hash: String,
    pub block_reward: i64,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct Transaction {
    pub hash: String,
    pub block_number: i64,
    pub from_address: String,
    pub to_address: Option<String>,
    /// Decimal string: transaction value in wei, a uint256 that does not fit `i64`.
    pub value: String,
    pub gas_price: i64,
    pub gas_limit: i64,
    pub gas_used: i64,
    pub transaction_fee: i64,
    pub is_token_tx: bool,
    pub input_data: String,
}

#[derive(Debug, Clone)]
pub struct InternalTransaction {
    pub transaction_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub gas_limit: i64,
    pub gas_used: i64,
    pub input_data: String,
    pub call_type: String,
}

#[derive(Debug, Clone)]
pub struct TransactionLog {
    pub transaction_hash: String,
    pub log_index: i32,
    pub address: String,
    pub data: String,
    pub removed: bool,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct Contract {
    pub address: String,
    pub transaction_hash: String,
    pub is_pair_contract: bool,
}

#[derive(Debug, Clone)]
pub struct TokenContract {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<i32>,
    pub total_supply: Option<String>,
    pub token_category: String,
}

#[derive(Debug, Clone)]
pub struct PairContract {
    pub address: String,
    pub token0: String,
    pub token1: String,
    pub reserve0: String,
    pub reserve1: String,
    pub factory: String,
}

#[derive(Debug, Clone)]
pub struct ContractSupplyChange {
    pub address: String,
    pub transaction_hash: String,
    pub amount_changed: String,
}

#[derive(Debug, Clone)]
pub struct PairLiquidityChange {
    pub address: String,
    pub transaction_hash: String,
    pub amount0: String,
    pub amount1: String,
}

#[derive(Debug, Clone)]
pub struct NftTransfer {
    pub transaction_hash: String,
    pub log_index: i32,
    pub address: String,
    pub from_address: String,
    pub to_address: String,
    pub token_id: String,
}
