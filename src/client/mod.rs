pub use api::{
    AdminClient, AdminConnector, ClientBuilder, ConsumerSession, Deserializer, PulsarClient,
    SubscribeOptions, SubscriptionType,
};
pub use client_cache::ClientCache;
pub use deserializer::{PayloadSchema, PulsarRecord, RecordDeserializer, RecordValue};
pub use memory::{BrokerStats, FaultPoint, MemoryAdmin, MemoryBroker, MemoryConsumer};

mod api;
mod client_cache;
mod deserializer;
mod memory;
