pub mod broker;

pub use broker::{create_message_broker, MessageBroker, ScanBroker};
