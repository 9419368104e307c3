// store.rs
use crate::plan::QueryPlan;
use chem_domain::{DomainError, EntityKind, Formula, Molecule, NewFormula, NewMolecule, NewSnapshot, Snapshot};

/// Contrato del almacén relacional.
///
/// Las lecturas reciben un plan ya validado y devuelven las filas en el
/// orden final (orden por similitud si lo hay, orden natural si no) con la
/// paginación aplicada. Las inserciones las usa la ingesta; sólo los
/// contadores derivados de los padres cambian después.
pub trait ChemStore: Send + Sync {
  fn fetch_formulas(&self, plan: &QueryPlan) -> Result<Vec<Formula>, DomainError>;
  fn fetch_molecules(&self, plan: &QueryPlan) -> Result<Vec<Molecule>, DomainError>;
  fn fetch_snapshots(&self, plan: &QueryPlan) -> Result<Vec<Snapshot>, DomainError>;

  /// Tamaño de la tabla completa.
  fn count(&self, entity: EntityKind) -> Result<u64, DomainError>;

  fn insert_formula(&self, formula: NewFormula) -> Result<Formula, DomainError>;
  /// Inserta y añade el id a `molecule_ids` de su fórmula.
  fn insert_molecule(&self, molecule: NewMolecule) -> Result<Molecule, DomainError>;
  /// Inserta y añade el id a `snapshot_ids` de su molécula.
  fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot, DomainError>;
}
