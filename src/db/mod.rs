//! Database-facing plumbing: statement type, transport seam, configuration.

mod config;
pub mod transport;

pub use config::Config;
pub use transport::{AqlQuery, MemoryTransport, Transport};
