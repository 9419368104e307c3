// ingest.rs
//
// Alta de estructuras y snapshots. Las consultas son de sólo lectura; esto
// es lo único que escribe en el almacén (datos de ejemplo y tests).
use crate::plan::{KeyColumn, Predicate, QueryPlan};
use crate::store::ChemStore;
use chem_domain::{DomainError, DomainStubs, EntityKind, Formula, FoundExt, Molecule, NewFormula, NewMolecule,
                  NewSnapshot, Snapshot, SnapshotRecord};
use chem_providers::{ChemEngine, FingerprintService};
use log::{debug, info};
use std::sync::Arc;

/// Totales tras una carga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
  pub formulas: u64,
  pub molecules: u64,
  pub snapshots: u64,
}

pub struct Ingestor {
  store: Arc<dyn ChemStore>,
  engine: Arc<ChemEngine>,
}

impl Ingestor {
  pub fn new(store: Arc<dyn ChemStore>, engine: Arc<ChemEngine>) -> Self {
    Self { store, engine }
  }

  /// Busca la fórmula por su cadena y la crea si no existe.
  pub fn ensure_formula(&self, formula: NewFormula) -> Result<Formula, DomainError> {
    let key = Predicate::KeyEquals { column: KeyColumn::FormulaString, value: formula.formula_string.clone() };
    let plan = QueryPlan::new(EntityKind::Formula).filter(key).paginate(0, 1);
    match self.store.fetch_formulas(&plan)?.into_iter().next() {
      Some(existing) => Ok(existing),
      None => {
        debug!("nueva fórmula {}", formula.formula_string);
        self.store.insert_formula(formula)
      }
    }
  }

  /// Registra una estructura con su fórmula. Idempotente por SMILES.
  pub fn add_structure(&self, smiles: &str, qed: Option<f64>, logp: Option<f64>) -> Result<Molecule, DomainError> {
    let counts = self.engine.element_counts(smiles)?;
    let formula = self.ensure_formula(NewFormula::from_counts(counts)?)?;
    let plan = QueryPlan::new(EntityKind::Molecule).filter(Predicate::KeyEquals { column: KeyColumn::Smiles,
                                                                                  value: smiles.to_string() })
                                                   .paginate(0, 1);
    if let Some(existing) = self.store.fetch_molecules(&plan)?.into_iter().next() {
      return Ok(existing);
    }
    let molecule = NewMolecule::from_structure(&self.engine, smiles, formula.id)?.with_descriptors(qed, logp);
    self.store.insert_molecule(molecule)
  }

  /// Añade un snapshot a `molecule`. Los átomos del registro deben
  /// corresponder a la fórmula de la molécula. Idempotente por hash.
  pub fn add_snapshot(&self, molecule: &Molecule, owner_id: i64, record: SnapshotRecord)
                      -> Result<Snapshot, DomainError> {
    let plan = QueryPlan::new(EntityKind::Formula).filter(Predicate::IdEquals { table: EntityKind::Formula,
                                                                                id: molecule.formula_id })
                                                  .paginate(0, 1);
    let formula = self.store
                      .fetch_formulas(&plan)?
                      .into_iter()
                      .next()
                      .or_not_found("formula", molecule.formula_id)?;
    let implied = record.implied_formula_string()?;
    if implied != formula.formula_string {
      return Err(DomainError::ValidationError(format!("el snapshot implica {} pero la molécula {} es {}",
                                                      implied, molecule.smiles, formula.formula_string)));
    }

    let snapshot = NewSnapshot::new(molecule.id, owner_id, record)?;
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(Predicate::KeyEquals { column: KeyColumn::HashToken,
                                                                                  value: snapshot.hash_token.clone() })
                                                   .paginate(0, 1);
    if let Some(existing) = self.store.fetch_snapshots(&plan)?.into_iter().next() {
      return Ok(existing);
    }
    self.store.insert_snapshot(snapshot)
  }

  /// Carga las estructuras de ejemplo, dos snapshots por cada una y la
  /// fórmula sin carbono.
  pub fn seed_stubs(&self, owner_id: i64) -> Result<SeedSummary, DomainError> {
    for stub in DomainStubs::structures() {
      let molecule = self.add_structure(stub.smiles, stub.qed, stub.logp)?;
      for record in DomainStubs::snapshot_records(&self.engine, stub.smiles)? {
        self.add_snapshot(&molecule, owner_id, record)?;
      }
    }
    self.ensure_formula(DomainStubs::carbonless_formula()?)?;
    let summary = SeedSummary { formulas: self.store.count(EntityKind::Formula)?,
                                molecules: self.store.count(EntityKind::Molecule)?,
                                snapshots: self.store.count(EntityKind::Snapshot)? };
    info!("datos de ejemplo cargados: {} fórmulas, {} moléculas, {} snapshots",
          summary.formulas, summary.molecules, summary.snapshots);
    Ok(summary)
  }
}
