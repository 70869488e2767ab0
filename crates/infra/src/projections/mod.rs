//! Read-side processors over the pipeline's tables.
//!
//! - `enrichment`: the metadata ⋈ average join that produces enriched records
//! - `rated_movies`: queryable view of the latest enriched record per entity

pub mod enrichment;
pub mod rated_movies;

pub use enrichment::EnrichmentJoiner;
pub use rated_movies::RatedMoviesView;
