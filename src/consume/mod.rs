pub use boundary::{entered_end, is_last_message, message_exists, rough_eq, EndBound};
pub use bounded_consumer::{BoundedConsumer, StartBound};
pub use data_loss::{DataLossPolicy, DataLossReporter};
pub use partition_reader::{PartitionReader, ReadMode};
pub use resolver::{resolve_latest, seekable_latest};

mod boundary;
mod bounded_consumer;
mod data_loss;
mod partition_reader;
mod resolver;
