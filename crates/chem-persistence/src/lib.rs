//! Persistencia Diesel del `ChemStore`.
//!
//! Con la feature `pg` el almacén usa Postgres con la extensión pgvector y
//! ordena por similitud en la propia consulta. Sin ella (y en los tests
//! unitarios) usa SQLite y ordena en el cliente con las mismas métricas.

pub mod schema;
mod store;

pub use store::{DieselChemStore, MIGRATIONS};
