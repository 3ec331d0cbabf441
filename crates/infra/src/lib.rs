//! Infrastructure layer: stores, the stock ledger, transactional units of work,
//! analytics and the engine facade.

pub mod analytics;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod scope;
pub mod store;
pub mod transactions;

pub use analytics::{AnalyticsAggregator, SalesSummary};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, StoreBackend};
pub use engine::Engine;
pub use error::{EngineError, PersistenceError, PersistenceErrorKind};
pub use ledger::StockLedger;
pub use scope::TransactionScope;
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreTx};
pub use transactions::{SaleTransaction, SupplyTransaction};
