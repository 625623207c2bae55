//! Declarative datasource configuration (spec §6 "Datasource configuration").

use querymesh_secrets::Secret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Safeguard ceilings an adapter instance enforces (spec §3 "Adapter
/// instance").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOptions {
    pub row_limit: Option<u64>,
    pub max_bytes: Option<u64>,
    pub statement_timeout_ms: Option<u64>,
}

/// One datasource's raw, pre-secret-resolution configuration. Connection
/// values may be `${scheme:key}` references (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    pub id: String,
    pub engine_type: String,
    pub connection: HashMap<String, String>,
    #[serde(default)]
    pub options: AdapterOptions,
}

/// A datasource's configuration after secret resolution, handed to an
/// adapter constructor. `connection` values are opaque [`Secret`]s so a
/// constructor can never accidentally log plaintext (spec §4.1).
#[derive(Clone)]
pub struct ResolvedDatasourceConfig {
    pub id: String,
    pub engine_type: String,
    pub connection: HashMap<String, Secret>,
    pub options: AdapterOptions,
}
