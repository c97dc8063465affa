//! Schema bootstrap for a single topic's table family.
//!
//! Spec §6 prefixes every table by `<topic>_`, and the topic is only known at
//! runtime (it comes from `GlobalConfig::topic`), so this isn't a
//! `sea_orm_migration::MigratorTrait` implementation — those assume a static,
//! compile-time-known set of tables. It's a DDL string builder executed
//! through `sea_orm::Statement`, the same escape hatch the teacher reaches
//! for when its entity macros can't express a query: `da-indexer-migration`'s
//! own `from_sql` helper splits a multi-statement SQL blob on `;` and runs
//! each piece inside one transaction. We do the same here, minus the
//! `SchemaManager` layer, since there's no static migrator to drive it.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement, TransactionTrait};

/// Runs every statement in `content` (split on `;`) inside one transaction.
pub async fn from_sql(db: &DatabaseConnection, content: &str) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    for stmt in content.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        txn.execute(Statement::from_string(db.get_database_backend(), stmt.to_string()))
            .await
            .map_err(|e| DbErr::Migration(format!("{e}\nQuery: {stmt}")))?;
    }
    txn.commit().await
}

/// Creates (idempotently) every table this topic's producer/consumer pair
/// needs, plus the `updated_at` trigger spec §6 requires on every table.
pub async fn create_tables(db: &DatabaseConnection, topic: &str) -> Result<(), DbErr> {
    from_sql(db, &ddl_for_topic(topic)).await
}

fn ddl_for_topic(topic: &str) -> String {
    let t = topic;
    format!(
        r#"
        CREATE OR REPLACE FUNCTION chain_indexer_set_updated_at() RETURNS trigger AS $$
        BEGIN
            NEW.updated_at = now();
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;

        CREATE TABLE IF NOT EXISTS "{t}_block" (
            "number" bigint PRIMARY KEY,
            "hash" text NOT NULL,
            "nonce" text NOT NULL,
            "difficulty" bigint NOT NULL,
            "gas_limit" bigint NOT NULL,
            "gas_used" bigint NOT NULL,
            "timestamp" timestamptz NOT NULL,
            "miner" text NOT NULL,
            "parent_hash" text NOT NULL,
            "block_reward" bigint NOT NULL DEFAULT 0,
            "updated_at" timestamptz NOT NULL DEFAULT now()
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_block";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_block"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_transaction" (
            "hash" text PRIMARY KEY,
            "block_number" bigint NOT NULL REFERENCES "{t}_block"("number"),
            "from_address" text NOT NULL,
            "to_address" text,
            "value" numeric NOT NULL,
            "gas_price" bigint NOT NULL,
            "gas_limit" bigint NOT NULL,
            "gas_used" bigint NOT NULL,
            "transaction_fee" bigint NOT NULL,
            "is_token_tx" boolean NOT NULL DEFAULT false,
            "input_data" text NOT NULL,
            "updated_at" timestamptz NOT NULL DEFAULT now()
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_transaction";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_transaction"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_transaction_logs" (
            "transaction_hash" text NOT NULL REFERENCES "{t}_transaction"("hash"),
            "log_index" integer NOT NULL,
            "address" text NOT NULL,
            "data" text NOT NULL,
            "removed" boolean NOT NULL DEFAULT false,
            "topics" text[] NOT NULL DEFAULT '{{}}',
            "updated_at" timestamptz NOT NULL DEFAULT now(),
            PRIMARY KEY ("transaction_hash", "log_index")
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_transaction_logs";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_transaction_logs"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_internal_transaction" (
            "id" bigserial PRIMARY KEY,
            "transaction_hash" text NOT NULL REFERENCES "{t}_transaction"("hash"),
            "from_address" text NOT NULL,
            "to_address" text NOT NULL,
            "value" numeric NOT NULL,
            "gas_limit" bigint NOT NULL,
            "gas_used" bigint NOT NULL,
            "input_data" text NOT NULL,
            "call_type" text NOT NULL,
            "updated_at" timestamptz NOT NULL DEFAULT now()
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_internal_transaction";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_internal_transaction"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_contract" (
            "address" text PRIMARY KEY,
            "transaction_hash" text NOT NULL,
            "is_pair_contract" boolean NOT NULL DEFAULT false,
            "updated_at" timestamptz NOT NULL DEFAULT now()
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_contract";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_contract"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_token_contract" (
            "address" text PRIMARY KEY REFERENCES "{t}_contract"("address"),
            "symbol" text,
            "name" text,
            "decimals" integer,
            "total_supply" numeric,
            "token_category" text NOT NULL,
            "updated_at" timestamptz NOT NULL DEFAULT now()
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_token_contract";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_token_contract"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_pair_contract" (
            "address" text PRIMARY KEY REFERENCES "{t}_contract"("address"),
            "token0_address" text NOT NULL,
            "token1_address" text NOT NULL,
            "reserve0" numeric,
            "reserve1" numeric,
            "factory" text,
            "updated_at" timestamptz NOT NULL DEFAULT now()
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_pair_contract";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_pair_contract"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_contract_supply_change" (
            "address" text NOT NULL,
            "transaction_hash" text NOT NULL,
            "amount_changed" numeric NOT NULL,
            "updated_at" timestamptz NOT NULL DEFAULT now(),
            PRIMARY KEY ("address", "transaction_hash")
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_contract_supply_change";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_contract_supply_change"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_pair_liquidity_change" (
            "address" text NOT NULL,
            "transaction_hash" text NOT NULL,
            "amount0" numeric NOT NULL,
            "amount1" numeric NOT NULL,
            "updated_at" timestamptz NOT NULL DEFAULT now(),
            PRIMARY KEY ("address", "transaction_hash")
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_pair_liquidity_change";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_pair_liquidity_change"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();

        CREATE TABLE IF NOT EXISTS "{t}_nft_transfer" (
            "transaction_hash" text NOT NULL,
            "log_index" integer NOT NULL,
            "address" text NOT NULL,
            "from_address" text NOT NULL,
            "to_address" text NOT NULL,
            "token_id" numeric NOT NULL,
            "updated_at" timestamptz NOT NULL DEFAULT now(),
            PRIMARY KEY ("transaction_hash", "log_index")
        );
        DROP TRIGGER IF EXISTS trg_updated_at ON "{t}_nft_transfer";
        CREATE TRIGGER trg_updated_at BEFORE UPDATE ON "{t}_nft_transfer"
            FOR EACH ROW EXECUTE FUNCTION chain_indexer_set_updated_at();
        "#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_mentions_every_table_for_the_topic() {
        let ddl = ddl_for_topic("eth");
        for suffix in [
            "block",
            "transaction",
            "transaction_logs",
            "internal_transaction",
            "contract",
            "token_contract",
            "pair_contract",
            "contract_supply_change",
            "pair_liquidity_change",
            "nft_transfer",
        ] {
            assert!(
                ddl.contains(&format!("\"eth_{suffix}\"")),
                "missing table eth_{suffix}"
            );
        }
    }
}
