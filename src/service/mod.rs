pub use app_error::{AppError, AppResult};
pub use config::{AdminConfig, ClientConfig, ConsumerConfig, ReadConfig, ReaderConfig};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing, TracingGuard};

mod app_error;
mod config;
mod shutdown;
mod tracing_config;
