//! Bounded, single-pass reader for one topic partition.
//!
//! Given a topic and a range of message ids, a [`BoundedConsumer`] yields
//! exactly the records inside the range through a fresh exclusive
//! subscription, reports gaps through a [`DataLossReporter`] and releases its
//! subscription on every exit path. [`PartitionReader`] drives it in the
//! continuous `(from, until]` or the batch `[from, until)` mode.

pub mod client;
pub mod consume;
pub mod message;
pub mod partition;
mod service;

pub use consume::{
    BoundedConsumer, DataLossPolicy, DataLossReporter, EndBound, PartitionReader, ReadMode,
    StartBound,
};
pub use message::{EntryPosition, Message, MessageId};
pub use partition::{OffsetRange, PartitionDescriptor};
pub use service::{
    setup_local_tracing, setup_tracing, AdminConfig, AppError, AppResult, ClientConfig,
    ConsumerConfig, ReadConfig, ReaderConfig, Shutdown, TracingGuard,
};
