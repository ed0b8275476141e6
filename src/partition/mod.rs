pub use descriptor::PartitionDescriptor;
pub use offset_range::OffsetRange;

mod descriptor;
mod offset_range;
