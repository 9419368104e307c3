// similarity.rs
use crate::plan::OrderingClause;
use chem_domain::{DistanceMetric, DomainError, FingerprintColumn, SimilarityRequest};
use chem_providers::{FingerprintMethod, FingerprintService};
use log::warn;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;

/// Construye el orden por similitud. Cada llamada calcula el fingerprint de
/// la estructura (sin caché).
#[derive(Clone)]
pub struct SimilarityClauseBuilder {
  service: Arc<dyn FingerprintService>,
}

impl SimilarityClauseBuilder {
  pub fn new(service: Arc<dyn FingerprintService>) -> Self {
    Self { service }
  }

  /// El método se valida antes de calcular nada. Una métrica que no sea
  /// `l2`, `inner_product` o `cosine` devuelve `Ok(None)`: no se ordena.
  pub fn build(&self, structure: &str, method: &str, metric: &str) -> Result<Option<OrderingClause>, DomainError> {
    let method: FingerprintMethod = method.parse()?;
    let embedding = self.service.embed(structure, method)?;
    match DistanceMetric::parse(metric) {
      Some(metric) => Ok(Some(OrderingClause { column: FingerprintColumn::from(method), metric, embedding })),
      None => {
        warn!("métrica de distancia '{}' no reconocida, la consulta no se ordena por similitud", metric);
        Ok(None)
      }
    }
  }

  pub fn build_request(&self, request: &SimilarityRequest) -> Result<Option<OrderingClause>, DomainError> {
    self.build(&request.smiles, &request.method, &request.distance)
  }
}

/// Ordena `rows` por distancia ascendente al vector de `clause`, como lo
/// haría el `ORDER BY` de pgvector: orden estable (los empates conservan el
/// orden natural) y `NaN` al final.
pub fn rank_by_distance<T, F>(rows: Vec<T>, clause: &OrderingClause, fingerprint: F) -> Vec<T>
  where T: Send + Sync,
        F: Fn(&T) -> &[f32] + Sync
{
  let distances: Vec<f64> = rows.par_iter()
                                .map(|r| clause.metric.distance(fingerprint(r), &clause.embedding))
                                .collect();
  let mut ranked: Vec<(f64, T)> = distances.into_iter().zip(rows).collect();
  ranked.sort_by(|a, b| nan_last(a.0, b.0));
  ranked.into_iter().map(|(_, r)| r).collect()
}

fn nan_last(a: f64, b: f64) -> Ordering {
  match (a.is_nan(), b.is_nan()) {
    (true, true) => Ordering::Equal,
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chem_providers::{ChemEngine, Element, EngineError};
  use std::collections::BTreeMap;
  use std::sync::atomic::AtomicUsize;

  struct CountingService {
    inner: ChemEngine,
    calls: AtomicUsize,
  }

  impl FingerprintService for CountingService {
    fn embed(&self, structure: &str, method: FingerprintMethod) -> Result<Vec<f32>, EngineError> {
      self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      self.inner.embed(structure, method)
    }

    fn canonicalize(&self, structure: &str) -> Result<String, EngineError> {
      self.inner.canonicalize(structure)
    }

    fn element_counts(&self, structure: &str) -> Result<BTreeMap<Element, u32>, EngineError> {
      self.inner.element_counts(structure)
    }
  }

  fn builder() -> (SimilarityClauseBuilder, Arc<CountingService>) {
    let service = Arc::new(CountingService { inner: ChemEngine::init().unwrap(), calls: AtomicUsize::new(0) });
    (SimilarityClauseBuilder::new(service.clone()), service)
  }

  #[test]
  fn method_selects_the_fingerprint_column() {
    let (b, _) = builder();
    let clause = b.build("CCO", "torsion", "l2").unwrap().unwrap();
    assert_eq!(clause.column, FingerprintColumn::TopologicalTorsion);
    assert_eq!(clause.metric, DistanceMetric::L2);
    assert_eq!(clause.embedding.len(), chem_providers::FINGERPRINT_SIZE);
  }

  #[test]
  fn unknown_method_fails_before_embedding() {
    let (b, service) = builder();
    assert_eq!(b.build("CCO", "ecfp4", "cosine"), Err(DomainError::InvalidMethod("ecfp4".into())));
    assert_eq!(service.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
  }

  #[test]
  fn invalid_structure_is_reported() {
    let (b, _) = builder();
    assert!(matches!(b.build("C1CC(", "morgan", "cosine"), Err(DomainError::InvalidStructure(_))));
  }

  #[test]
  fn unknown_metric_yields_no_ordering() {
    let (b, service) = builder();
    assert_eq!(b.build("CCO", "morgan", "manhattan"), Ok(None));
    assert_eq!(service.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[test]
  fn one_embedding_per_call() {
    let (b, service) = builder();
    b.build("CCO", "morgan", "cosine").unwrap();
    b.build("CCO", "morgan", "cosine").unwrap();
    assert_eq!(service.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
  }

  #[test]
  fn ranking_is_stable_and_puts_nan_last() {
    let clause = OrderingClause { column: FingerprintColumn::Morgan,
                                  metric: DistanceMetric::Cosine,
                                  embedding: vec![1.0, 0.0] };
    let rows = vec![("zero", vec![0.0, 0.0]),
                    ("far", vec![0.0, 1.0]),
                    ("near-a", vec![1.0, 0.0]),
                    ("near-b", vec![2.0, 0.0])];
    let ranked = rank_by_distance(rows, &clause, |r| &r.1);
    let names: Vec<_> = ranked.iter().map(|r| r.0).collect();
    assert_eq!(names, vec!["near-a", "near-b", "far", "zero"]);
  }

  #[test]
  fn inner_product_ranks_largest_dot_first() {
    let clause = OrderingClause { column: FingerprintColumn::Morgan,
                                  metric: DistanceMetric::InnerProduct,
                                  embedding: vec![1.0, 1.0, 1.0] };
    let rows = vec![vec![1.0, 0.0, 0.0], vec![1.0, 1.0, 1.0], vec![1.0, 1.0, 0.0]];
    let ranked = rank_by_distance(rows, &clause, |r| r);
    let dots: Vec<f32> = ranked.iter().map(|r| r.iter().sum()).collect();
    assert_eq!(dots, vec![3.0, 2.0, 1.0]);
  }
}
