// repository.rs
use crate::compiler::compile;
use crate::executor::QueryExecutor;
use crate::plan::{KeyColumn, OrderingClause, Predicate, QueryPlan};
use crate::similarity::SimilarityClauseBuilder;
use crate::store::ChemStore;
use chem_domain::{DomainError, EntityKind, FilterSpec, Formula, FormulaFilter, Molecule, MoleculeFilter,
                  SimilarityRequest, Snapshot, SnapshotFilter};
use chem_providers::{formula_string, FingerprintService};
use std::sync::Arc;

/// Distancia por defecto de la búsqueda por estructura sobre snapshots.
pub const SNAPSHOT_DEFAULT_DISTANCE: &str = "l2";

/// Petición de similitud con los valores por defecto de snapshots.
pub fn snapshot_request(smiles: &str) -> SimilarityRequest {
  SimilarityRequest::new(smiles).with_distance(SNAPSHOT_DEFAULT_DISTANCE)
}

// Fórmula implicada por la estructura; falla si no se puede interpretar.
fn implied_formula(service: &dyn FingerprintService, smiles: &str) -> Result<String, DomainError> {
  Ok(formula_string(&service.element_counts(smiles)?))
}

fn by_id(entity: EntityKind, id: i64) -> QueryPlan {
  QueryPlan::new(entity).filter(Predicate::IdEquals { table: entity, id }).paginate(0, 1)
}

fn key(column: KeyColumn, value: &str) -> Predicate {
  Predicate::KeyEquals { column, value: value.to_string() }
}

fn ordering_for(builder: &SimilarityClauseBuilder, spec: &FilterSpec)
                -> Result<Option<OrderingClause>, DomainError> {
  match &spec.similarity {
    Some(request) => builder.build_request(request),
    None => Ok(None),
  }
}

#[derive(Clone)]
pub struct FormulaRepository {
  executor: QueryExecutor,
}

impl FormulaRepository {
  pub fn new(executor: QueryExecutor) -> Self {
    Self { executor }
  }

  pub fn get_by_id(&self, id: i64) -> Result<Option<Formula>, DomainError> {
    Ok(self.executor.formulas(&by_id(EntityKind::Formula, id))?.into_iter().next())
  }

  /// Coincidencia exacta de la cadena de fórmula (p. ej. `H6C2O1`).
  pub fn get_by_formula_string(&self, formula: &str) -> Result<Option<Formula>, DomainError> {
    let plan = QueryPlan::new(EntityKind::Formula).filter(key(KeyColumn::FormulaString, formula))
                                                  .paginate(0, 1);
    Ok(self.executor.formulas(&plan)?.into_iter().next())
  }

  pub fn count(&self) -> Result<u64, DomainError> {
    self.executor.count(EntityKind::Formula)
  }

  pub fn list(&self, skip: u64, limit: u64) -> Result<Vec<Formula>, DomainError> {
    self.query_by_filter(None, skip, limit)
  }

  pub fn query_by_filter(&self, filter: Option<&FormulaFilter>, skip: u64, limit: u64)
                         -> Result<Vec<Formula>, DomainError> {
    let spec = filter.map(FilterSpec::from).unwrap_or_default();
    let plan = QueryPlan::new(EntityKind::Formula).with_predicates(compile(EntityKind::Formula, &spec))
                                                  .paginate(skip, limit);
    self.executor.formulas(&plan)
  }
}

#[derive(Clone)]
pub struct MoleculeRepository {
  executor: QueryExecutor,
  service: Arc<dyn FingerprintService>,
  similarity: SimilarityClauseBuilder,
}

impl MoleculeRepository {
  pub fn new(executor: QueryExecutor, service: Arc<dyn FingerprintService>) -> Self {
    let similarity = SimilarityClauseBuilder::new(service.clone());
    Self { executor, service, similarity }
  }

  pub fn get_by_id(&self, id: i64) -> Result<Option<Molecule>, DomainError> {
    Ok(self.executor.molecules(&by_id(EntityKind::Molecule, id))?.into_iter().next())
  }

  /// La fórmula se deriva de la estructura y después se exige que coincidan
  /// fórmula y SMILES, ambos de forma exacta.
  pub fn get_by_smiles(&self, smiles: &str) -> Result<Option<Molecule>, DomainError> {
    let formula = implied_formula(self.service.as_ref(), smiles)?;
    let plan = QueryPlan::new(EntityKind::Molecule).filter(key(KeyColumn::FormulaString, &formula))
                                                   .filter(key(KeyColumn::Smiles, smiles))
                                                   .paginate(0, 1);
    Ok(self.executor.molecules(&plan)?.into_iter().next())
  }

  pub fn count(&self) -> Result<u64, DomainError> {
    self.executor.count(EntityKind::Molecule)
  }

  pub fn list(&self, skip: u64, limit: u64) -> Result<Vec<Molecule>, DomainError> {
    self.query_by_filter(None, skip, limit)
  }

  pub fn query_by_filter(&self, filter: Option<&MoleculeFilter>, skip: u64, limit: u64)
                         -> Result<Vec<Molecule>, DomainError> {
    let spec = filter.map(FilterSpec::from).unwrap_or_default();
    let plan = QueryPlan::new(EntityKind::Molecule).with_predicates(compile(EntityKind::Molecule, &spec))
                                                   .ordered_by(ordering_for(&self.similarity, &spec)?)
                                                   .paginate(skip, limit);
    self.executor.molecules(&plan)
  }

  /// Sólo orden por similitud, sin filtros.
  pub fn search_by_structure(&self, request: &SimilarityRequest, skip: u64, limit: u64)
                             -> Result<Vec<Molecule>, DomainError> {
    let plan = QueryPlan::new(EntityKind::Molecule).ordered_by(self.similarity.build_request(request)?)
                                                   .paginate(skip, limit);
    self.executor.molecules(&plan)
  }

  pub fn formula_of(&self, molecule: &Molecule) -> Result<Option<Formula>, DomainError> {
    Ok(self.executor.formulas(&by_id(EntityKind::Formula, molecule.formula_id))?.into_iter().next())
  }
}

#[derive(Clone)]
pub struct SnapshotRepository {
  executor: QueryExecutor,
  service: Arc<dyn FingerprintService>,
  similarity: SimilarityClauseBuilder,
}

impl SnapshotRepository {
  pub fn new(executor: QueryExecutor, service: Arc<dyn FingerprintService>) -> Self {
    let similarity = SimilarityClauseBuilder::new(service.clone());
    Self { executor, service, similarity }
  }

  pub fn get_by_id(&self, id: i64) -> Result<Option<Snapshot>, DomainError> {
    Ok(self.executor.snapshots(&by_id(EntityKind::Snapshot, id))?.into_iter().next())
  }

  pub fn get_by_smiles_and_hash(&self, smiles: &str, hash_token: &str) -> Result<Option<Snapshot>, DomainError> {
    let formula = implied_formula(self.service.as_ref(), smiles)?;
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(key(KeyColumn::FormulaString, &formula))
                                                   .filter(key(KeyColumn::Smiles, smiles))
                                                   .filter(key(KeyColumn::HashToken, hash_token))
                                                   .paginate(0, 1);
    Ok(self.executor.snapshots(&plan)?.into_iter().next())
  }

  pub fn count(&self) -> Result<u64, DomainError> {
    self.executor.count(EntityKind::Snapshot)
  }

  pub fn list(&self, skip: u64, limit: u64) -> Result<Vec<Snapshot>, DomainError> {
    self.query_by_filter(None, skip, limit)
  }

  pub fn query_by_filter(&self, filter: Option<&SnapshotFilter>, skip: u64, limit: u64)
                         -> Result<Vec<Snapshot>, DomainError> {
    let spec = filter.map(FilterSpec::from).unwrap_or_default();
    let plan = QueryPlan::new(EntityKind::Snapshot).with_predicates(compile(EntityKind::Snapshot, &spec))
                                                   .ordered_by(ordering_for(&self.similarity, &spec)?)
                                                   .paginate(skip, limit);
    self.executor.snapshots(&plan)
  }

  /// Snapshots ordenados por la similitud de su molécula con `request`.
  pub fn search_by_structure(&self, request: &SimilarityRequest, skip: u64, limit: u64)
                             -> Result<Vec<Snapshot>, DomainError> {
    let plan = QueryPlan::new(EntityKind::Snapshot).ordered_by(self.similarity.build_request(request)?)
                                                   .paginate(skip, limit);
    self.executor.snapshots(&plan)
  }

  /// Todos los snapshots de la molécula con exactamente esta estructura.
  /// Vacío si la estructura no está registrada.
  pub fn snapshots_of_structure(&self, smiles: &str) -> Result<Vec<Snapshot>, DomainError> {
    let formula = implied_formula(self.service.as_ref(), smiles)?;
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(key(KeyColumn::FormulaString, &formula))
                                                   .filter(key(KeyColumn::Smiles, smiles));
    self.executor.snapshots(&plan)
  }
}

/// Los tres repositorios sobre un mismo almacén y servicio de fingerprints.
#[derive(Clone)]
pub struct Repositories {
  pub formulas: FormulaRepository,
  pub molecules: MoleculeRepository,
  pub snapshots: SnapshotRepository,
}

impl Repositories {
  pub fn new(store: Arc<dyn ChemStore>, service: Arc<dyn FingerprintService>) -> Self {
    let executor = QueryExecutor::new(store);
    Self { formulas: FormulaRepository::new(executor.clone()),
           molecules: MoleculeRepository::new(executor.clone(), service.clone()),
           snapshots: SnapshotRepository::new(executor, service) }
  }
}
