use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

lazy_static! {
    pub static ref MESSAGES_PRODUCED: IntCounter = register_int_counter!(
        "chain_indexer_messages_produced_total",
        "total number of transaction-hash messages enqueued onto the bus",
    )
    .unwrap();
    pub static ref MESSAGES_CONSUMED: IntCounter = register_int_counter!(
        "chain_indexer_messages_consumed_total",
        "total number of bus messages dequeued by a consumer",
    )
    .unwrap();
    pub static ref TRANSACTIONS_SAVED: IntCounter = register_int_counter!(
        "chain_indexer_transactions_saved_total",
        "total number of transactions persisted by any processor mode",
    )
    .unwrap();
    pub static ref RPC_RETRIES: IntCounter = register_int_counter!(
        "chain_indexer_rpc_retries_total",
        "total number of RPC calls retried after a transient error",
    )
    .unwrap();
    pub static ref DECODE_MISSES: IntCounter = register_int_counter!(
        "chain_indexer_decode_misses_total",
        "total number of logs seen at a registered address with no matching decoder",
    )
    .unwrap();
    pub static ref BUS_CAPACITY_STALL_SECONDS: Histogram = register_histogram!(
        "chain_indexer_bus_capacity_stall_seconds",
        "time spent waiting for the bus topic's backlog to drain below capacity",
    )
    .unwrap();
}
