mod columns;
mod domain_stubs;
mod errors;
mod filters;
mod formula;
mod molecule;
mod snapshot;

pub use columns::{BoolColumn, ClassColumn, DistanceMetric, EntityKind, FingerprintColumn, MemberColumn, MemberKind,
                  MemberValue, NumericColumn};
pub use domain_stubs::{DomainStubs, StubStructure};
pub use errors::{DomainError, FoundExt};
pub use filters::{BoolFilter, ClassFilter, ElementFilter, FilterSpec, FormulaFilter, MoleculeFilter, NumericFilter,
                  SimilarityRequest, SnapshotFilter, DEFAULT_DISTANCE, DEFAULT_METHOD};
pub use formula::{Formula, NewFormula};
pub use molecule::{Molecule, NewMolecule};
pub use snapshot::{NewSnapshot, ScalarProperties, Snapshot, SnapshotRecord, VectorProperties, DEFAULT_TEMPERATURE};
