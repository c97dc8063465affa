pub mod consumer;
pub mod message;
pub mod producer;

pub use consumer::BusConsumer;
pub use message::BusMessage;
pub use producer::BusProducer;
