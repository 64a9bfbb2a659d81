//! Service configuration.

use serde::Deserialize;

use crate::error::{Result, StoreError};

/// Tunables shared by the services. Defaults are production-sane; a
/// `plant-store.toml` file or `PLANT_STORE_*` environment variables
/// override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Filesystem path for the embedded database (used by binaries/demos;
    /// library callers open their own `sled::Db`).
    pub db_path: String,
    /// Upper bound for any single inbound quantity. Requests above it are
    /// rejected before any state is touched.
    pub max_line_quantity: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: "plant-store.db".to_string(),
            max_line_quantity: 1_000_000,
        }
    }
}

impl ServiceConfig {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name("plant-store").required(false))
            .add_source(config::Environment::with_prefix("PLANT_STORE"))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|err| StoreError::Config(err.to_string()))
    }
}
