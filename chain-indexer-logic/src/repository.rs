//! Relational store (spec §4.9 / §3 / §6, C3).
//!
//! Table names carry a runtime `<topic>_` prefix, which `sea_orm`'s
//! `DeriveEntityModel` can't express (its `#[sea_orm(table_name = "...")]`
//! is a compile-time constant) — so this issues parameterized raw SQL via
//! `sea_orm::Statement::from_sql_and_values`, the same escape hatch the
//! teacher reaches for in `da-indexer-logic/src/celestia/repository/blocks.rs::find_gaps`.
//! Every insert is `ON CONFLICT DO NOTHING` (or `DO UPDATE` for upsertable
//! metadata), matching spec §3's idempotence invariant.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, TransactionTrait};

use chain_indexer_entity::{
    Block, Contract, ContractSupplyChange, InternalTransaction, NftTransfer, PairContract, PairLiquidityChange,
    TokenContract, Transaction, TransactionLog,
};

pub struct Repository {
    db: DatabaseConnection,
    topic: String,
}

fn stmt(sql: String, values: Vec<sea_orm::Value>) -> Statement {
    Statement::from_sql_and_values(DbBackend::Postgres, &sql, values)
}

impl Repository {
    pub fn new(db: DatabaseConnection, topic: String) -> Self {
        Self { db, topic }
    }

    fn table(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.topic)
    }

    pub async fn latest_block_number(&self) -> anyhow::Result<Option<u64>> {
        #[derive(FromQueryResult)]
        struct Row {
            number: i64,
        }
        let sql = format!("SELECT number FROM \"{}\" ORDER BY number DESC LIMIT 1", self.table("block"));
        let row = Row::find_by_statement(stmt(sql, vec![])).one(&self.db).await?;
        Ok(row.map(|r| r.number as u64))
    }

    pub async fn transaction_hashes_for_block(&self, block_number: u64) -> anyhow::Result<Vec<String>> {
        #[derive(FromQueryResult)]
        struct Row {
            hash: String,
        }
        let sql = format!("SELECT hash FROM \"{}\" WHERE block_number = $1", self.table("transaction"));
        let rows = Row::find_by_statement(stmt(sql, vec![(block_number as i64).into()]))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.hash).collect())
    }

    pub async fn transaction_exists(&self, hash: &str) -> anyhow::Result<bool> {
        #[derive(FromQueryResult)]
        struct Row {
            hash: String,
        }
        let sql = format!("SELECT hash FROM \"{}\" WHERE hash = $1", self.table("transaction"));
        let row = Row::find_by_statement(stmt(sql, vec![hash.into()]))
            .one(&self.db)
            .await?;
        Ok(row.is_some())
    }

    pub async fn insert_block(&self, block: &Block) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (number, hash, nonce, difficulty, gas_limit, gas_used, timestamp, miner, parent_hash, block_reward) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) ON CONFLICT (number) DO NOTHING",
            self.table("block")
        );
        self.db
            .execute(stmt(
                sql,
                vec![
                    block.number.into(),
                    block.hash.clone().into(),
                    block.nonce.clone().into(),
                    block.difficulty.into(),
                    block.gas_limit.into(),
                    block.gas_used.into(),
                    block.timestamp.into(),
                    block.miner.clone().into(),
                    block.parent_hash.clone().into(),
                    block.block_reward.into(),
                ],
            ))
            .await?;
        Ok(())
    }

    /// Inserts the transaction row, then (inside one store transaction) the
    /// given logs, then (inside a second store transaction) the given
    /// internal transactions — matching `persist_transaction`'s ordering
    /// (spec §4.7).
    pub async fn persist_transaction(
        &self,
        tx: &Transaction,
        logs: &[TransactionLog],
        internal_txs: &[InternalTransaction],
    ) -> anyhow::Result<()> {
        let txn = self.db.begin().await?;
        let sql = format!(
            "INSERT INTO \"{}\" (hash, block_number, from_address, to_address, value, gas_price, gas_limit, gas_used, transaction_fee, is_token_tx, input_data) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) ON CONFLICT (hash) DO NOTHING",
            self.table("transaction")
        );
        txn.execute(stmt(
            sql,
            vec![
                tx.hash.clone().into(),
                tx.block_number.into(),
                tx.from_address.clone().into(),
                tx.to_address.clone().into(),
                tx.value.clone().into(),
                tx.gas_price.into(),
                tx.gas_limit.into(),
                tx.gas_used.into(),
                tx.transaction_fee.into(),
                tx.is_token_tx.into(),
                tx.input_data.clone().into(),
            ],
        ))
        .await?;
        txn.commit().await?;

        if !logs.is_empty() {
            let txn = self.db.begin().await?;
            for log in logs {
                let sql = format!(
                    "INSERT INTO \"{}\" (transaction_hash, log_index, address, data, removed, topics) \
                     VALUES ($1,$2,$3,$4,$5,$6) ON CONFLICT (transaction_hash, log_index) DO NOTHING",
                    self.table("transaction_logs")
                );
                txn.execute(stmt(
                    sql,
                    vec![
                        log.transaction_hash.clone().into(),
                        log.log_index.into(),
                        log.address.clone().into(),
                        log.data.clone().into(),
                        log.removed.into(),
                        log.topics.clone().into(),
                    ],
                ))
                .await?;
            }
            txn.commit().await?;
        }

        if !internal_txs.is_empty() {
            let txn = self.db.begin().await?;
            for itx in internal_txs {
                let sql = format!(
                    "INSERT INTO \"{}\" (transaction_hash, from_address, to_address, value, gas_limit, gas_used, input_data, call_type) \
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
                    self.table("internal_transaction")
                );
                txn.execute(stmt(
                    sql,
                    vec![
                        itx.transaction_hash.clone().into(),
                        itx.from_address.clone().into(),
                        itx.to_address.clone().into(),
                        itx.value.clone().into(),
                        itx.gas_limit.into(),
                        itx.gas_used.into(),
                        itx.input_data.clone().into(),
                        itx.call_type.clone().into(),
                    ],
                ))
                .await?;
            }
            txn.commit().await?;
        }

        Ok(())
    }

    /// Writes `Contract` + (`TokenContract` | `PairContract`) inside a
    /// single store transaction (`handle_contract_creation`, spec §4.7).
    pub async fn persist_token_contract(&self, contract: &Contract, token: &TokenContract) -> anyhow::Result<()> {
        let txn = self.db.begin().await?;
        self.insert_contract_in(&txn, contract).await?;
        let sql = format!(
            "INSERT INTO \"{}\" (address, symbol, name, decimals, total_supply, token_category) \
             VALUES ($1,$2,$3,$4,$5,$6) ON CONFLICT (address) DO NOTHING",
            self.table("token_contract")
        );
        txn.execute(stmt(
            sql,
            vec![
                token.address.clone().into(),
                token.symbol.clone().into(),
                token.name.clone().into(),
                token.decimals.into(),
                token.total_supply.clone().into(),
                token.token_category.clone().into(),
            ],
        ))
        .await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn persist_pair_contract(&self, contract: &Contract, pair: &PairContract) -> anyhow::Result<()> {
        let txn = self.db.begin().await?;
        self.insert_contract_in(&txn, contract).await?;
        let sql = format!(
            "INSERT INTO \"{}\" (address, token0_address, token1_address, reserve0, reserve1, factory) \
             VALUES ($1,$2,$3,$4,$5,$6) ON CONFLICT (address) DO NOTHING",
            self.table("pair_contract")
        );
        txn.execute(stmt(
            sql,
            vec![
                pair.address.clone().into(),
                pair.token0.clone().into(),
                pair.token1.clone().into(),
                pair.reserve0.clone().into(),
                pair.reserve1.clone().into(),
                pair.factory.clone().into(),
            ],
        ))
        .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn insert_contract_in(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        contract: &Contract,
    ) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (address, transaction_hash, is_pair_contract) VALUES ($1,$2,$3) ON CONFLICT (address) DO NOTHING",
            self.table("contract")
        );
        txn.execute(stmt(
            sql,
            vec![
                contract.address.clone().into(),
                contract.transaction_hash.clone().into(),
                contract.is_pair_contract.into(),
            ],
        ))
        .await?;
        Ok(())
    }

    pub async fn insert_contract_supply_change(&self, change: &ContractSupplyChange) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (address, transaction_hash, amount_changed) VALUES ($1,$2,$3) \
             ON CONFLICT (address, transaction_hash) DO NOTHING",
            self.table("contract_supply_change")
        );
        self.db
            .execute(stmt(
                sql,
                vec![
                    change.address.clone().into(),
                    change.transaction_hash.clone().into(),
                    change.amount_changed.clone().into(),
                ],
            ))
            .await?;
        Ok(())
    }

    pub async fn insert_pair_liquidity_change(&self, change: &PairLiquidityChange) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (address, transaction_hash, amount0, amount1) VALUES ($1,$2,$3,$4) \
             ON CONFLICT (address, transaction_hash) DO NOTHING",
            self.table("pair_liquidity_change")
        );
        self.db
            .execute(stmt(
                sql,
                vec![
                    change.address.clone().into(),
                    change.transaction_hash.clone().into(),
                    change.amount0.clone().into(),
                    change.amount1.clone().into(),
                ],
            ))
            .await?;
        Ok(())
    }

    pub async fn insert_nft_transfer(&self, transfer: &NftTransfer) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (transaction_hash, log_index, address, from_address, to_address, token_id) \
             VALUES ($1,$2,$3,$4,$5,$6) ON CONFLICT (transaction_hash, log_index) DO NOTHING",
            self.table("nft_transfer")
        );
        self.db
            .execute(stmt(
                sql,
                vec![
                    transfer.transaction_hash.clone().into(),
                    transfer.log_index.into(),
                    transfer.address.clone().into(),
                    transfer.from_address.clone().into(),
                    transfer.to_address.clone().into(),
                    transfer.token_id.clone().into(),
                ],
            ))
            .await?;
        Ok(())
    }
}

