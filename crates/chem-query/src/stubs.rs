// stubs.rs
use crate::plan::{JoinedRow, QueryPlan};
use crate::similarity::rank_by_distance;
use crate::store::ChemStore;
use chem_domain::{DomainError, EntityKind, Formula, Molecule, NewFormula, NewMolecule, NewSnapshot, Snapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Implementación en memoria para tests y desarrollo. El orden natural de
/// las filas es el de inserción.
#[derive(Default, Clone)]
pub struct InMemoryChemStore {
  formulas: Arc<Mutex<Vec<Formula>>>,
  molecules: Arc<Mutex<Vec<Molecule>>>,
  snapshots: Arc<Mutex<Vec<Snapshot>>>,
}

impl InMemoryChemStore {
  pub fn new() -> Self {
    Self::default()
  }

  // Mutex envenenado -> DomainError
  fn lock_map<'a, T>(&'a self, m: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, DomainError> {
    m.lock()
     .map_err(|e| DomainError::ExternalError(format!("Mutex '{}' poisoned: {}", name, e)))
  }

  /// Aplica joins, predicados, orden y paginación sobre las tablas ya
  /// bloqueadas. Los bloqueos se toman siempre en el orden
  /// fórmulas → moléculas → snapshots.
  fn select<'a>(plan: &QueryPlan,
                formulas: &'a [Formula],
                molecules: &'a [Molecule],
                snapshots: &'a [Snapshot])
                -> Vec<JoinedRow<'a>> {
    let formula_by_id: HashMap<i64, &Formula> = formulas.iter().map(|f| (f.id, f)).collect();
    let molecule_by_id: HashMap<i64, &Molecule> = molecules.iter().map(|m| (m.id, m)).collect();
    let with_molecule = |m: &'a Molecule| {
      formula_by_id.get(&m.formula_id)
                   .map(|f| JoinedRow { formula: *f, molecule: Some(m), snapshot: None })
    };

    let rows: Vec<JoinedRow<'a>> = match plan.entity {
      EntityKind::Formula => formulas.iter()
                                     .map(|f| JoinedRow { formula: f, molecule: None, snapshot: None })
                                     .collect(),
      EntityKind::Molecule => molecules.iter().filter_map(with_molecule).collect(),
      EntityKind::Snapshot => snapshots.iter()
                                       .filter_map(|s| {
                                         molecule_by_id.get(&s.molecule_id)
                                                       .and_then(|m| with_molecule(*m))
                                                       .map(|row| JoinedRow { snapshot: Some(s), ..row })
                                       })
                                       .collect(),
    };

    let mut rows: Vec<JoinedRow<'a>> =
      rows.into_iter().filter(|r| plan.predicates.iter().all(|p| p.matches(r))).collect();
    if let Some(ordering) = &plan.ordering {
      rows = rank_by_distance(rows, ordering, |r| r.molecule.map(|m| m.fingerprint(ordering.column)).unwrap_or(&[]));
    }
    let skip = usize::try_from(plan.skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(plan.limit).unwrap_or(usize::MAX);
    rows.into_iter().skip(skip).take(limit).collect()
  }
}

impl ChemStore for InMemoryChemStore {
  fn fetch_formulas(&self, plan: &QueryPlan) -> Result<Vec<Formula>, DomainError> {
    let formulas = self.lock_map(&self.formulas, "formulas")?;
    let molecules = self.lock_map(&self.molecules, "molecules")?;
    let snapshots = self.lock_map(&self.snapshots, "snapshots")?;
    Ok(Self::select(plan, &formulas, &molecules, &snapshots).into_iter()
                                                            .map(|r| r.formula.clone())
                                                            .collect())
  }

  fn fetch_molecules(&self, plan: &QueryPlan) -> Result<Vec<Molecule>, DomainError> {
    let formulas = self.lock_map(&self.formulas, "formulas")?;
    let molecules = self.lock_map(&self.molecules, "molecules")?;
    let snapshots = self.lock_map(&self.snapshots, "snapshots")?;
    Ok(Self::select(plan, &formulas, &molecules, &snapshots).into_iter()
                                                            .filter_map(|r| r.molecule.cloned())
                                                            .collect())
  }

  fn fetch_snapshots(&self, plan: &QueryPlan) -> Result<Vec<Snapshot>, DomainError> {
    let formulas = self.lock_map(&self.formulas, "formulas")?;
    let molecules = self.lock_map(&self.molecules, "molecules")?;
    let snapshots = self.lock_map(&self.snapshots, "snapshots")?;
    Ok(Self::select(plan, &formulas, &molecules, &snapshots).into_iter()
                                                            .filter_map(|r| r.snapshot.cloned())
                                                            .collect())
  }

  fn count(&self, entity: EntityKind) -> Result<u64, DomainError> {
    let n = match entity {
      EntityKind::Formula => self.lock_map(&self.formulas, "formulas")?.len(),
      EntityKind::Molecule => self.lock_map(&self.molecules, "molecules")?.len(),
      EntityKind::Snapshot => self.lock_map(&self.snapshots, "snapshots")?.len(),
    };
    Ok(n as u64)
  }

  fn insert_formula(&self, formula: NewFormula) -> Result<Formula, DomainError> {
    let mut formulas = self.lock_map(&self.formulas, "formulas")?;
    if formulas.iter().any(|f| f.formula_string == formula.formula_string) {
      return Err(DomainError::ValidationError(format!("fórmula duplicada: {}", formula.formula_string)));
    }
    let now = Utc::now().naive_utc();
    let row = Formula { id: formulas.len() as i64 + 1,
                        formula_string: formula.formula_string,
                        elements: formula.elements,
                        molwt: formula.molwt,
                        atom_number: formula.atom_number,
                        molecule_number: 0,
                        molecule_ids: Vec::new(),
                        commit_time: now,
                        update_time: now };
    formulas.push(row.clone());
    Ok(row)
  }

  fn insert_molecule(&self, molecule: NewMolecule) -> Result<Molecule, DomainError> {
    molecule.validate()?;
    let mut formulas = self.lock_map(&self.formulas, "formulas")?;
    let mut molecules = self.lock_map(&self.molecules, "molecules")?;
    if molecules.iter().any(|m| m.smiles == molecule.smiles) {
      return Err(DomainError::ValidationError(format!("molécula duplicada: {}", molecule.smiles)));
    }
    let formula = formulas.iter_mut().find(|f| f.id == molecule.formula_id).ok_or_else(|| {
                                                                              DomainError::ValidationError(format!("fórmula {} inexistente", molecule.formula_id))
                                                                            })?;
    let now = Utc::now().naive_utc();
    let row = Molecule { id: molecules.len() as i64 + 1,
                         smiles: molecule.smiles,
                         total_charge: molecule.total_charge,
                         total_multiplicity: molecule.total_multiplicity,
                         qed: molecule.qed,
                         logp: molecule.logp,
                         fingerprints: molecule.fingerprints,
                         formula_id: molecule.formula_id,
                         snapshot_number: 0,
                         snapshot_ids: Vec::new(),
                         commit_time: now,
                         update_time: now };
    formula.molecule_ids.push(row.id);
    formula.molecule_number = formula.molecule_ids.len() as i32;
    formula.update_time = now;
    molecules.push(row.clone());
    Ok(row)
  }

  fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot, DomainError> {
    let implied = snapshot.record.implied_formula_string()?;
    let formulas = self.lock_map(&self.formulas, "formulas")?;
    let mut molecules = self.lock_map(&self.molecules, "molecules")?;
    let mut snapshots = self.lock_map(&self.snapshots, "snapshots")?;
    if snapshots.iter().any(|s| s.hash_token == snapshot.hash_token) {
      return Err(DomainError::ValidationError(format!("snapshot duplicado: {}", snapshot.hash_token)));
    }
    let molecule = molecules.iter_mut().find(|m| m.id == snapshot.molecule_id).ok_or_else(|| {
                                                                                 DomainError::ValidationError(format!("molécula {} inexistente", snapshot.molecule_id))
                                                                               })?;
    let expected = formulas.iter()
                           .find(|f| f.id == molecule.formula_id)
                           .map(|f| f.formula_string.as_str())
                           .unwrap_or_default();
    if implied != expected {
      return Err(DomainError::ValidationError(format!("el snapshot implica {} pero la molécula {} es {}",
                                                      implied, molecule.smiles, expected)));
    }
    let now = Utc::now().naive_utc();
    let row = Snapshot { id: snapshots.len() as i64 + 1,
                         hash_token: snapshot.hash_token,
                         molecule_id: snapshot.molecule_id,
                         owner_id: snapshot.owner_id,
                         record: snapshot.record,
                         commit_time: now,
                         update_time: now };
    molecule.snapshot_ids.push(row.id);
    molecule.snapshot_number = molecule.snapshot_ids.len() as i32;
    molecule.update_time = now;
    snapshots.push(row.clone());
    Ok(row)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{KeyColumn, Predicate};
  use chem_domain::DomainStubs;
  use chem_providers::{ChemEngine, FingerprintService};

  #[test]
  fn inserts_keep_parent_counts_in_sync() {
    let engine = ChemEngine::init().unwrap();
    let store = InMemoryChemStore::new();
    let formula = store.insert_formula(NewFormula::from_counts(engine.element_counts("CCO").unwrap()).unwrap())
                       .unwrap();
    let molecule = store.insert_molecule(NewMolecule::from_structure(&engine, "CCO", formula.id).unwrap())
                        .unwrap();
    for record in DomainStubs::snapshot_records(&engine, "CCO").unwrap() {
      store.insert_snapshot(NewSnapshot::new(molecule.id, 1, record).unwrap()).unwrap();
    }
    let plan = QueryPlan::new(EntityKind::Molecule).filter(Predicate::KeyEquals { column: KeyColumn::Smiles,
                                                                                  value: "CCO".into() });
    let stored = store.fetch_molecules(&plan).unwrap();
    assert_eq!(stored[0].snapshot_number, 2);
    assert!(stored[0].check_invariants().is_ok());
    let formulas = store.fetch_formulas(&QueryPlan::new(EntityKind::Formula)).unwrap();
    assert_eq!(formulas[0].molecule_ids, vec![molecule.id]);
    assert!(formulas[0].check_invariants().is_ok());
  }

  #[test]
  fn duplicates_and_orphans_are_rejected() {
    let engine = ChemEngine::init().unwrap();
    let store = InMemoryChemStore::new();
    let new_formula = NewFormula::from_formula_string("H6C2O1").unwrap();
    store.insert_formula(new_formula.clone()).unwrap();
    assert!(store.insert_formula(new_formula).is_err());
    assert!(store.insert_molecule(NewMolecule::from_structure(&engine, "CCO", 99).unwrap()).is_err());
    let record = DomainStubs::snapshot_records(&engine, "CCO").unwrap().remove(0);
    assert!(store.insert_snapshot(NewSnapshot::new(5, 1, record).unwrap()).is_err());
    assert_eq!(store.count(EntityKind::Molecule).unwrap(), 0);
  }

  #[test]
  fn snapshots_must_match_the_molecule_formula() {
    let engine = ChemEngine::init().unwrap();
    let store = InMemoryChemStore::new();
    let formula = store.insert_formula(NewFormula::from_counts(engine.element_counts("CCO").unwrap()).unwrap())
                       .unwrap();
    let molecule = store.insert_molecule(NewMolecule::from_structure(&engine, "CCO", formula.id).unwrap())
                        .unwrap();
    let water = DomainStubs::snapshot_records(&engine, "O").unwrap().remove(0);
    let err = store.insert_snapshot(NewSnapshot::new(molecule.id, 1, water).unwrap()).unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
    assert_eq!(store.count(EntityKind::Snapshot).unwrap(), 0);
    assert_eq!(store.fetch_molecules(&QueryPlan::new(EntityKind::Molecule)).unwrap()[0].snapshot_number, 0);
  }
}
