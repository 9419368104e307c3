use chem_domain::{BoolFilter, ClassFilter, ElementFilter, EntityKind, MoleculeFilter, NumericFilter,
                  SimilarityRequest, SnapshotFilter};
use chem_persistence::DieselChemStore;
use chem_providers::ChemEngine;
use chem_query::{snapshot_request, ChemStore, InMemoryChemStore, Ingestor, Repositories};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
  sqlite: Repositories,
  memory: Repositories,
  path: std::path::PathBuf,
}

impl Drop for Fixture {
  fn drop(&mut self) {
    let _ = std::fs::remove_file(&self.path);
  }
}

fn fixture() -> Fixture {
  let path = std::env::temp_dir().join(format!("chem_query_{}.db", Uuid::new_v4()));
  let engine = Arc::new(ChemEngine::init().unwrap());
  let sqlite: Arc<dyn ChemStore> = Arc::new(DieselChemStore::new(path.to_str().unwrap(), 4).unwrap());
  let memory: Arc<dyn ChemStore> = Arc::new(InMemoryChemStore::new());
  for store in [&sqlite, &memory] {
    Ingestor::new(store.clone(), engine.clone()).seed_stubs(1).unwrap();
  }
  Fixture { sqlite: Repositories::new(sqlite, engine.clone()), memory: Repositories::new(memory, engine), path }
}

fn sorted(mut ids: Vec<i64>) -> Vec<i64> {
  ids.sort();
  ids
}

#[test]
fn sqlite_store_matches_the_in_memory_store() {
  if cfg!(feature = "pg") {
    eprintln!("skipping sqlite-only test because 'pg' feature is enabled");
    return;
  }
  let f = fixture();
  for entity in EntityKind::ALL {
    let (a, b) = match entity {
      EntityKind::Formula => (f.sqlite.formulas.count().unwrap(), f.memory.formulas.count().unwrap()),
      EntityKind::Molecule => (f.sqlite.molecules.count().unwrap(), f.memory.molecules.count().unwrap()),
      EntityKind::Snapshot => (f.sqlite.snapshots.count().unwrap(), f.memory.snapshots.count().unwrap()),
    };
    assert_eq!(a, b, "{}", entity);
  }

  let filter = SnapshotFilter { numeric_filters: vec![NumericFilter::between("alpha_gap", 0.2, 0.22)],
                                element_filters: vec![ElementFilter::new("C", -1), ElementFilter::new("N", 0)],
                                class_filters: vec![ClassFilter { column: "solvent".into(),
                                                                  values: vec!["water".into()] }],
                                bool_filters: vec![BoolFilter { column: "is_TS".into(), value: true }],
                                ..SnapshotFilter::default() };
  let ids = |repos: &Repositories| {
    sorted(repos.snapshots.query_by_filter(Some(&filter), 0, 100).unwrap().iter().map(|s| s.id).collect())
  };
  let expected = ids(&f.memory);
  assert!(!expected.is_empty());
  assert_eq!(ids(&f.sqlite), expected);
}

#[test]
fn similarity_order_is_the_same_on_both_stores() {
  if cfg!(feature = "pg") {
    return;
  }
  let f = fixture();
  for metric in ["l2", "inner_product", "cosine"] {
    for method in ["morgan", "rdk", "atompair", "torsion"] {
      let request = SimilarityRequest::new("Oc1ccccc1").with_method(method).with_distance(metric);
      let smiles = |repos: &Repositories| -> Vec<String> {
        repos.molecules
             .search_by_structure(&request, 1, 6)
             .unwrap()
             .into_iter()
             .map(|m| m.smiles)
             .collect()
      };
      assert_eq!(smiles(&f.sqlite), smiles(&f.memory), "{} / {}", method, metric);
    }
  }
  let request = snapshot_request("CCN");
  let sqlite = f.sqlite.snapshots.search_by_structure(&request, 0, 3).unwrap();
  let memory = f.memory.snapshots.search_by_structure(&request, 0, 3).unwrap();
  assert_eq!(sqlite.iter().map(|s| s.id).collect::<Vec<_>>(), memory.iter().map(|s| s.id).collect::<Vec<_>>());
}

#[test]
fn natural_keys_resolve_through_sqlite() {
  if cfg!(feature = "pg") {
    return;
  }
  let f = fixture();
  let ethanol = f.sqlite.molecules.get_by_smiles("CCO").unwrap().unwrap();
  assert_eq!(f.sqlite.molecules.get_by_id(ethanol.id).unwrap().map(|m| m.smiles), Some("CCO".to_string()));
  assert!(f.sqlite.molecules.get_by_smiles("CCOC").unwrap().is_none());
  assert_eq!(ethanol.snapshot_number, 2);

  let formula = f.sqlite.molecules.formula_of(&ethanol).unwrap().unwrap();
  assert_eq!(formula.formula_string, "H6C2O1");
  assert_eq!(formula.molecule_number, 2);

  let snapshots = f.sqlite.snapshots.snapshots_of_structure("CCO").unwrap();
  assert_eq!(sorted(snapshots.iter().map(|s| s.id).collect()), sorted(ethanol.snapshot_ids.clone()));
  let found = f.sqlite.snapshots.get_by_smiles_and_hash("CCO", &snapshots[0].hash_token).unwrap();
  assert_eq!(found.map(|s| s.record), Some(snapshots[0].record.clone()));
}

#[test]
fn filters_with_similarity_and_pagination() {
  if cfg!(feature = "pg") {
    return;
  }
  let f = fixture();
  let filter = MoleculeFilter { smiles: Some("CCCC".into()),
                                distance: "l2".into(),
                                numeric_filters: vec![NumericFilter::between("molwt", 0.0, 60.0)],
                                ..MoleculeFilter::default() };
  let full: Vec<String> = f.sqlite
                           .molecules
                           .query_by_filter(Some(&filter), 0, 100)
                           .unwrap()
                           .into_iter()
                           .map(|m| m.smiles)
                           .collect();
  assert_eq!(full[0], "CCCC");
  let page: Vec<String> = f.sqlite
                           .molecules
                           .query_by_filter(Some(&filter), 2, 3)
                           .unwrap()
                           .into_iter()
                           .map(|m| m.smiles)
                           .collect();
  assert_eq!(page, full[2..5].to_vec());
  assert!(f.sqlite.molecules.query_by_filter(Some(&filter), 0, 0).unwrap().is_empty());
  let all = f.sqlite.snapshots.list(0, 100).unwrap();
  assert_eq!(f.sqlite.snapshots.list(5, 4).unwrap(), all[5..9].to_vec());
}

#[test]
fn membership_on_numeric_columns_binds_typed_values() {
  if cfg!(feature = "pg") {
    return;
  }
  let f = fixture();
  let filter = SnapshotFilter { class_filters: vec![ClassFilter { column: "temperature".into(),
                                                                  values: vec!["350".into()] },
                                                    ClassFilter { column: "owner_id".into(),
                                                                  values: vec!["1".into()] }],
                                numeric_filters: vec![NumericFilter::between("first_frequency", 1.0e6, 2.0e6)],
                                ..SnapshotFilter::default() };
  let sqlite = f.sqlite.snapshots.query_by_filter(Some(&filter), 0, 100).unwrap();
  assert_eq!(sqlite.len(), 10);
  assert!(sqlite.iter().all(|s| s.record.is_ts));
  let memory = f.memory.snapshots.query_by_filter(Some(&filter), 0, 100).unwrap();
  assert_eq!(sorted(sqlite.iter().map(|s| s.id).collect()), sorted(memory.iter().map(|s| s.id).collect()));
}
