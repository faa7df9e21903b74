pub mod manager;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use manager::DatabaseManager;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use record::{Assigned, FieldChange, FieldKind, FieldMap};
pub use store::{stream_rows, RecordStore, RowStream, StoreError, StoreTx};
