//! Contract registry (spec §4.4, C5 registry half).
//!
//! Built once per consumer from the union of all `ContractSpec`s across all
//! `DataCollectionSpec`s, grounded on the original's implicit registry (a
//! dict built from `config.data_collection[*].contracts` in `app/utils/data_collector.py`).
//! `ContractHandle` pairs an address with the category's parsed ABI, used
//! only for the metadata reads `handle_contract_creation` needs — event
//! decoding itself doesn't consult the ABI (see `events.rs`).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chain_indexer_entity::ContractCategory;
use ethers::{abi::Token, types::Address};
use serde::Deserialize;

use crate::rpc::RpcClient;
use crate::settings::ContractSpec;

/// Shape of the ABI file named by `--abi-file` (spec §6).
#[derive(Debug, Deserialize)]
pub struct AbiFile {
    pub erc20: ethabi::Contract,
    pub erc721: ethabi::Contract,
    pub erc1155: ethabi::Contract,
    #[serde(rename = "UniSwapV2Factory")]
    pub uni_swap_v2_factory: ethabi::Contract,
    #[serde(rename = "UniSwapV2Pair")]
    pub uni_swap_v2_pair: ethabi::Contract,
}

impl AbiFile {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading ABI file {}", path.as_ref().display()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn for_category(&self, category: ContractCategory) -> Option<&ethabi::Contract> {
        match category {
            ContractCategory::Erc20 => Some(&self.erc20),
            ContractCategory::Erc721 => Some(&self.erc721),
            ContractCategory::Erc1155 => Some(&self.erc1155),
            ContractCategory::UniV2Factory => Some(&self.uni_swap_v2_factory),
            ContractCategory::UniV2Pair => Some(&self.uni_swap_v2_pair),
            ContractCategory::Unknown => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub address: String,
    pub category: ContractCategory,
}

pub struct ContractRegistry {
    by_address: HashMap<String, ContractSpec>,
    abi: Arc<AbiFile>,
}

impl ContractRegistry {
    pub fn build(specs: impl IntoIterator<Item = ContractSpec>, abi: Arc<AbiFile>) -> Self {
        let by_address = specs.into_iter().map(|s| (s.address_lower(), s)).collect();
        Self { by_address, abi }
    }

    pub fn category_of(&self, address: &str) -> Option<ContractCategory> {
        self.by_address.get(&address.to_lowercase()).map(|s| s.category)
    }

    pub fn allowed_events(&self, address: &str) -> Option<&BTreeSet<String>> {
        self.by_address.get(&address.to_lowercase()).map(|s| &s.events)
    }

    pub fn is_allowed_event(&self, address: &str, tag: &str) -> bool {
        self.by_address
            .get(&address.to_lowercase())
            .map(|s| s.events.contains(tag))
            .unwrap_or(false)
    }

    pub fn contract_handle(&self, address: &str, category: ContractCategory) -> ContractHandle {
        ContractHandle {
            address: address.to_lowercase(),
            category,
        }
    }

    /// Resolves ERC20/ERC721/ERC1155 metadata for a newly created contract.
    /// Returns `None` (a "Decoding miss", spec §7) when the registered ABI
    /// doesn't expose the expected read methods at this address — the
    /// surrounding transaction is still saved, just without derived rows.
    pub async fn resolve_token_metadata(
        &self,
        rpc: &RpcClient,
        handle: &ContractHandle,
    ) -> Result<Option<TokenMetadata>> {
        let Some(abi) = self.abi.for_category(handle.category) else {
            return Ok(None);
        };
        let address: Address = handle.address.parse()?;

        // `symbol` is the call that confirms this address actually implements
        // the category's token ABI; the rest are best-effort.
        let Ok(symbol) = call_string(rpc, abi, address, "symbol").await else {
            return Ok(None);
        };
        let name = call_string(rpc, abi, address, "name").await.ok();
        let decimals = call_u8(rpc, abi, address, "decimals").await.ok();
        let total_supply = call_uint(rpc, abi, address, "totalSupply").await.ok();

        Ok(Some(TokenMetadata {
            symbol: Some(symbol),
            name,
            decimals,
            total_supply,
        }))
    }

    /// Resolves UniV2 pair metadata (token0/token1/factory) for a newly
    /// created pair contract.
    pub async fn resolve_pair_metadata(
        &self,
        rpc: &RpcClient,
        handle: &ContractHandle,
    ) -> Result<Option<PairMetadata>> {
        let Some(abi) = self.abi.for_category(handle.category) else {
            return Ok(None);
        };
        let address: Address = handle.address.parse()?;

        // `token0`/`token1` confirm this address actually implements the pair
        // ABI; a failure here is a Decoding miss, not a hard error.
        let Ok(token0) = call_address(rpc, abi, address, "token0").await else {
            return Ok(None);
        };
        let Ok(token1) = call_address(rpc, abi, address, "token1").await else {
            return Ok(None);
        };
        let factory = call_address(rpc, abi, address, "factory").await.ok();
        let reserve0 = call_uint(rpc, abi, address, "reserve0")
            .await
            .unwrap_or_else(|_| "0".to_string());
        let reserve1 = call_uint(rpc, abi, address, "reserve1")
            .await
            .unwrap_or_else(|_| "0".to_string());

        Ok(Some(PairMetadata {
            token0,
            token1,
            factory,
            reserve0,
            reserve1,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PairMetadata {
    pub token0: String,
    pub token1: String,
    pub factory: Option<String>,
    pub reserve0: String,
    pub reserve1: String,
}

async fn call_raw(rpc: &RpcClient, abi: &ethabi::Contract, address: Address, method: &str) -> Result<Vec<Token>> {
    let function = abi.function(method)?;
    let data = function.encode_input(&[])?;
    let output = rpc.eth_call(address, data.into()).await?;
    Ok(function.decode_output(&output)?)
}

async fn call_string(rpc: &RpcClient, abi: &ethabi::Contract, address: Address, method: &str) -> Result<String> {
    let tokens = call_raw(rpc, abi, address, method).await?;
    tokens
        .into_iter()
        .next()
        .and_then(|t| t.into_string())
        .context("expected a string return value")
}

async fn call_u8(rpc: &RpcClient, abi: &ethabi::Contract, address: Address, method: &str) -> Result<u8> {
    let tokens = call_raw(rpc, abi, address, method).await?;
    tokens
        .into_iter()
        .next()
        .and_then(|t| t.into_uint())
        .map(|v| v.low_u32() as u8)
        .context("expected a uint return value")
}

async fn call_uint(rpc: &RpcClient, abi: &ethabi::Contract, address: Address, method: &str) -> Result<String> {
    let tokens = call_raw(rpc, abi, address, method).await?;
    tokens
        .into_iter()
        .next()
        .and_then(|t| t.into_uint())
        .map(|v| v.to_string())
        .context("expected a uint return value")
}

async fn call_address(rpc: &RpcClient, abi: &ethabi::Contract, address: Address, method: &str) -> Result<String> {
    let tokens = call_raw(rpc, abi, address, method).await?;
    tokens
        .into_iter()
        .next()
        .and_then(|t| t.into_address())
        .map(|a| format!("{a:#x}"))
        .context("expected an address return value")
}
