//! Plant material-flow core: requisition approval, procurement and goods
//! receipt, store issue and return, all settling into a single per-item
//! stock ledger backed by an embedded sled database.

pub mod config;
mod db;
pub mod error;
pub mod ids;
pub mod master;
pub mod procurement;
pub mod requisition;
pub mod stock;
pub mod store;
pub mod types;

pub use config::ServiceConfig;
pub use error::{RecordKind, Result, StoreError};
pub use master::MasterRegistry;
pub use procurement::ProcurementService;
pub use requisition::RequisitionService;
pub use stock::StockLedger;
pub use store::StoreService;

/// Everything wired together over one database.
#[derive(Clone)]
pub struct PlantStore {
    pub registry: MasterRegistry,
    pub ledger: StockLedger,
    pub requisitions: RequisitionService,
    pub procurement: ProcurementService,
    pub store: StoreService,
}

impl PlantStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Self::open_with(db, ServiceConfig::default())
    }

    pub fn open_with(db: &sled::Db, config: ServiceConfig) -> Result<Self> {
        let registry = MasterRegistry::open(db)?;
        let ledger = StockLedger::open(db)?;
        Ok(Self {
            requisitions: RequisitionService::open_with(db, registry.clone(), config.clone())?,
            procurement: ProcurementService::open_with(
                db,
                registry.clone(),
                ledger.clone(),
                config.clone(),
            )?,
            store: StoreService::open_with(db, registry.clone(), ledger.clone(), config)?,
            registry,
            ledger,
        })
    }
}
