use chem_domain::{DomainStubs, EntityKind, FilterSpec, NewSnapshot, NumericColumn, SnapshotFilter};
use chem_providers::ChemEngine;

#[test]
fn request_body_parses_into_a_filter_spec() {
  let body = r#"{
    "numeric_filters": [
      {"column": "molwt", "min": 40.0, "max": 50.0},
      {"column": "not_a_column", "min": 0}
    ],
    "element_filters": [{"element": "O", "count": 1}, {"element": "Zz", "count": -1}],
    "class_filters": [],
    "bool_filters": [{"column": "is_optimized", "value": true}],
    "smiles": "CCO",
    "method": "rdk"
  }"#;
  let filter: SnapshotFilter = serde_json::from_str(body).unwrap();
  let spec = FilterSpec::from(&filter);
  let similarity = spec.similarity.clone().unwrap();
  assert_eq!(similarity.method, "rdk");
  assert_eq!(similarity.distance, "cosine");
  assert_eq!(spec.numeric_filters.len(), 2);
  let known: Vec<_> = spec.numeric_filters
                          .iter()
                          .filter_map(|f| NumericColumn::resolve(EntityKind::Snapshot, &f.column))
                          .collect();
  assert_eq!(known, vec![NumericColumn::Molwt]);
}

#[test]
fn new_snapshot_hash_is_stable() {
  let engine = ChemEngine::init().unwrap();
  let records = DomainStubs::snapshot_records(&engine, "CCN").unwrap();
  let a = NewSnapshot::new(1, 1, records[0].clone()).unwrap();
  let b = NewSnapshot::new(2, 7, records[0].clone()).unwrap();
  assert_eq!(a.hash_token, b.hash_token);
  assert_eq!(a.hash_token, records[0].hash_token().unwrap());
}
