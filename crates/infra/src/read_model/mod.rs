//! Last-write-wins table storage for the pipeline's caches and views.

pub mod table_store;

pub use table_store::{AverageTable, EnrichedTable, InMemoryTableStore, ReferenceTable, TableStore, Upsert};
