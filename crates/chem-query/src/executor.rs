// executor.rs
use crate::plan::QueryPlan;
use crate::store::ChemStore;
use chem_domain::{DomainError, EntityKind, Formula, Molecule, Snapshot};
use log::debug;
use std::sync::Arc;

/// Ejecuta planes contra un `ChemStore`. El plan se valida antes de tocar
/// el almacén.
#[derive(Clone)]
pub struct QueryExecutor {
  store: Arc<dyn ChemStore>,
}

impl QueryExecutor {
  pub fn new(store: Arc<dyn ChemStore>) -> Self {
    Self { store }
  }

  pub fn formulas(&self, plan: &QueryPlan) -> Result<Vec<Formula>, DomainError> {
    if !self.prepare(plan, EntityKind::Formula)? {
      return Ok(Vec::new());
    }
    self.store.fetch_formulas(plan)
  }

  pub fn molecules(&self, plan: &QueryPlan) -> Result<Vec<Molecule>, DomainError> {
    if !self.prepare(plan, EntityKind::Molecule)? {
      return Ok(Vec::new());
    }
    self.store.fetch_molecules(plan)
  }

  pub fn snapshots(&self, plan: &QueryPlan) -> Result<Vec<Snapshot>, DomainError> {
    if !self.prepare(plan, EntityKind::Snapshot)? {
      return Ok(Vec::new());
    }
    self.store.fetch_snapshots(plan)
  }

  /// Cuenta la tabla completa. No acepta filtros.
  pub fn count(&self, entity: EntityKind) -> Result<u64, DomainError> {
    self.store.count(entity)
  }

  // false: la consulta no puede devolver filas (limit 0)
  fn prepare(&self, plan: &QueryPlan, expected: EntityKind) -> Result<bool, DomainError> {
    if plan.entity != expected {
      return Err(DomainError::ValidationError(format!("plan sobre {} ejecutado como {}", plan.entity, expected)));
    }
    plan.validate()?;
    debug!("{}: {} predicados, orden: {}, joins: {:?}, skip {}, limit {}",
           plan.entity,
           plan.predicates.len(),
           plan.ordering.as_ref().map(|o| o.column.column_name()).unwrap_or("natural"),
           plan.joins(),
           plan.skip,
           plan.limit);
    Ok(plan.limit > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{KeyColumn, Predicate};
  use crate::stubs::InMemoryChemStore;
  use chem_domain::NumericColumn;

  fn executor() -> QueryExecutor {
    QueryExecutor::new(Arc::new(InMemoryChemStore::new()))
  }

  #[test]
  fn plan_entity_must_match() {
    let plan = QueryPlan::new(EntityKind::Snapshot);
    assert!(matches!(executor().molecules(&plan), Err(DomainError::ValidationError(_))));
  }

  #[test]
  fn unreachable_columns_are_rejected_before_the_store() {
    let plan = QueryPlan::new(EntityKind::Formula).filter(Predicate::Range { column: NumericColumn::Qed,
                                                                             min: 0.0,
                                                                             max: 1.0 });
    assert!(matches!(executor().formulas(&plan), Err(DomainError::ValidationError(_))));
    let plan = QueryPlan::new(EntityKind::Molecule).filter(Predicate::KeyEquals { column: KeyColumn::HashToken,
                                                                                  value: "x".into() });
    assert!(executor().molecules(&plan).is_err());
  }

  #[test]
  fn empty_store_yields_empty_rows() {
    let rows = executor().snapshots(&QueryPlan::new(EntityKind::Snapshot).paginate(0, 0)).unwrap();
    assert!(rows.is_empty());
    assert_eq!(executor().count(EntityKind::Formula).unwrap(), 0);
  }
}
