mod compiler;
mod config;
mod executor;
mod ingest;
pub mod plan;
mod repository;
mod similarity;
pub mod sql;
mod store;
mod stubs;

pub use compiler::compile;
pub use config::{QueryConfig, DEFAULT_LIMIT, DEFAULT_POOL_SIZE, MOLECULE_SIMILARITY_LIMIT, SNAPSHOT_SIMILARITY_LIMIT};
pub use executor::QueryExecutor;
pub use ingest::{Ingestor, SeedSummary};
pub use plan::{ElementOp, JoinedRow, KeyColumn, OrderingClause, Predicate, QueryPlan};
pub use repository::{snapshot_request, FormulaRepository, MoleculeRepository, Repositories, SnapshotRepository,
                     SNAPSHOT_DEFAULT_DISTANCE};
pub use similarity::{rank_by_distance, SimilarityClauseBuilder};
pub use sql::{BindValue, ColumnValue, Dialect, RenderedQuery};
pub use store::ChemStore;
pub use stubs::InMemoryChemStore;
