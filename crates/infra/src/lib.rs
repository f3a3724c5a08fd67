//! Infrastructure layer: configuration, stores (memory and Postgres), and
//! the ledger maintenance flows built on them.

pub mod config;
pub mod ledger_admin;
pub mod store;


pub use config::{AppConfig, ConfigError, LogFormat, StoreBackend};
pub use ledger_admin::{RepairReport, audit_ledger, repair_ledger};
pub use store::{
    CatalogFilter, CatalogStore, LedgerStore, MemoryStore, MovementPage, MovementQuery,
    MovementView, OrderStore, PartyStore, PostgresStore, StatusChange, Store, StoreError,
    StoreResult, SubjectLedger,
};
