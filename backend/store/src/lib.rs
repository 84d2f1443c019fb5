pub mod persistence;
pub mod postgrest;
pub mod sqlite_store;
pub mod store;

pub use persistence::PersistenceStage;
pub use postgrest::PostgrestStore;
pub use sqlite_store::SqliteBillStore;
pub use store::{BillStore, InMemoryBillStore};
