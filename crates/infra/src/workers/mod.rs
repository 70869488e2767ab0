//! Background workers that move records from topics into the pipeline.

pub mod ingest_worker;

pub use ingest_worker::{IngestWorker, WorkerHandle, spawn_metadata_worker, spawn_rating_worker};
