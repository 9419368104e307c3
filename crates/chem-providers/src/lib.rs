mod engine;
mod errors;
pub mod fingerprint;
mod periodic_table;
pub mod smiles;

pub use engine::{ChemEngine, FingerprintService, FingerprintSet};
pub use errors::EngineError;
pub use fingerprint::{FingerprintMethod, FINGERPRINT_SIZE};
pub use periodic_table::{formula_string, parse_formula_string, Element, SYMBOLS};
pub use smiles::MolGraph;
