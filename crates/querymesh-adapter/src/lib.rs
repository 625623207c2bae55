//! The capability-typed data source adapter contract and registry
//! (spec §3 "Adapter instance", §4.1, §4.2).

mod adapter;
mod capability;
mod config;
mod error;
mod registry;
mod sqlite_adapter;

pub use adapter::Adapter;
pub use capability::Capability;
pub use config::{AdapterOptions, DatasourceConfig, ResolvedDatasourceConfig};
pub use error::AdapterError;
pub use registry::{AdapterConstructor, AdapterRegistry};
pub use sqlite_adapter::SqliteAdapter;
