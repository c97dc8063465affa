#[macro_use]
extern crate lazy_static;

pub mod bus;
pub mod consumer_task;
pub mod counter_store;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod processor;
pub mod producer_task;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod rpc;
pub mod settings;
