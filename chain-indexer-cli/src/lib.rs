//! Wiring for the `chain-indexer` binary (spec §6): a single CLI with
//! `--worker-type {producer,consumer}`, reading a `GlobalConfig` from
//! `--cfg` and (consumer only) an ABI file from `--abi-file`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rdkafka::{
    config::ClientConfig,
    consumer::StreamConsumer,
    producer::FutureProducer,
};
use sea_orm::Database;

use chain_indexer_logic::{
    bus::{BusConsumer, BusProducer},
    consumer_task, counter_store::CounterStore, producer_task, registry::{AbiFile, ContractRegistry},
    repository::Repository, rpc::RpcClient, settings::GlobalConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkerType {
    Producer,
    Consumer,
}

#[derive(Debug, Parser)]
#[command(name = "chain-indexer")]
pub struct Cli {
    #[arg(long, value_enum)]
    pub worker_type: WorkerType,

    #[arg(long)]
    pub cfg: String,

    /// Required when `--worker-type consumer`; ignored for `producer`.
    #[arg(long)]
    pub abi_file: Option<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = GlobalConfig::load(&cli.cfg)?;

    let db = Database::connect(&config.db_dsn).await.context("connecting to the relational store")?;
    chain_indexer_migration::create_tables(&db, &config.topic)
        .await
        .context("creating/verifying the topic's table family")?;
    let repo = Arc::new(Repository::new(db, config.topic.clone()));

    let rpc = Arc::new(RpcClient::new(
        &config.node_url,
        config.rpc_timeout,
        config.rpc_retries,
        config.rpc_retry_delay,
    )?);

    match cli.worker_type {
        WorkerType::Producer => run_producer(&config, repo, rpc).await,
        WorkerType::Consumer => {
            let abi_file = cli
                .abi_file
                .as_ref()
                .context("--abi-file is required for --worker-type consumer")?;
            run_consumer(&config, repo, rpc, abi_file).await
        }
    }
}

async fn run_producer(config: &GlobalConfig, repo: Arc<Repository>, rpc: Arc<RpcClient>) -> Result<()> {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.bus_url);
    let producer: FutureProducer = client_config.create().context("building the bus producer client")?;

    let counter = CounterStore::connect(&config.counter_url, &config.topic).await?;
    let bus = BusProducer::new(producer, counter, config.topic.clone());

    producer_task::start_producing_data(&config.data_collection, repo.as_ref(), rpc.as_ref(), &bus).await
}

async fn run_consumer(
    config: &GlobalConfig,
    repo: Arc<Repository>,
    rpc: Arc<RpcClient>,
    abi_file: &str,
) -> Result<()> {
    let abi = Arc::new(AbiFile::load(abi_file)?);
    let contracts = config
        .data_collection
        .iter()
        .flat_map(|spec| spec.contracts.iter().cloned());
    let registry = Arc::new(ContractRegistry::build(contracts, abi));

    let counter = Arc::new(CounterStore::connect(&config.counter_url, &config.topic).await?);
    let bus_url = config.bus_url.clone();
    let topic = config.topic.clone();
    let counter_for_factory = Arc::clone(&counter);
    let make_consumer = move || -> Result<BusConsumer> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &bus_url)
            .set("group.id", &topic)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest");
        let consumer: StreamConsumer = client_config.create().context("building a bus consumer client")?;
        BusConsumer::new(consumer, Arc::clone(&counter_for_factory), &topic)
    };

    consumer_task::start_consuming(
        config.consumer_fanout,
        make_consumer,
        config.idle_timeout,
        rpc,
        repo,
        registry,
    )
    .await
}
