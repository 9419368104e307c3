// filters.rs
//
// Forma de las especificaciones de filtro tal como llegan de la capa externa
// (JSON). No se valida nada aquí: el compilador de filtros decide qué
// columnas se reconocen.
use serde::{Deserialize, Serialize};

pub const DEFAULT_METHOD: &str = "morgan";
pub const DEFAULT_DISTANCE: &str = "cosine";

fn default_method() -> String {
  DEFAULT_METHOD.to_string()
}

fn default_distance() -> String {
  DEFAULT_DISTANCE.to_string()
}

/// Rango cerrado `[min, max]`; un extremo ausente no acota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFilter {
  pub column: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max: Option<f64>,
}

impl NumericFilter {
  pub fn between(column: &str, min: f64, max: f64) -> Self {
    Self { column: column.to_string(), min: Some(min), max: Some(max) }
  }

  pub fn bounds(&self) -> (f64, f64) {
    (self.min.unwrap_or(f64::NEG_INFINITY), self.max.unwrap_or(f64::INFINITY))
  }
}

/// `count < 0`: presente; `count == 0`: ausente; `count > 0`: conteo exacto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementFilter {
  pub element: String,
  #[serde(default)]
  pub count: i64,
}

impl ElementFilter {
  pub fn new(element: &str, count: i64) -> Self {
    Self { element: element.to_string(), count }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFilter {
  pub column: String,
  #[serde(default)]
  pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolFilter {
  pub column: String,
  pub value: bool,
}

/// Orden por similitud contra una estructura. `method` y `distance` se
/// guardan como texto: un método desconocido es un error al construir el
/// orden, una métrica desconocida simplemente no ordena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityRequest {
  pub smiles: String,
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default = "default_distance")]
  pub distance: String,
}

impl SimilarityRequest {
  pub fn new(smiles: &str) -> Self {
    Self { smiles: smiles.to_string(), method: default_method(), distance: default_distance() }
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_string();
    self
  }

  pub fn with_distance(mut self, distance: &str) -> Self {
    self.distance = distance.to_string();
    self
  }
}

/// Vista común de cualquier filtro; lo que consume el compilador.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
  pub numeric_filters: Vec<NumericFilter>,
  pub element_filters: Vec<ElementFilter>,
  pub class_filters: Vec<ClassFilter>,
  pub bool_filters: Vec<BoolFilter>,
  pub similarity: Option<SimilarityRequest>,
}

impl FilterSpec {
  pub fn is_empty(&self) -> bool {
    self.numeric_filters.is_empty()
    && self.element_filters.is_empty()
    && self.class_filters.is_empty()
    && self.bool_filters.is_empty()
    && self.similarity.is_none()
  }
}

fn similarity_of(smiles: &Option<String>, method: &str, distance: &str) -> Option<SimilarityRequest> {
  smiles.as_ref()
        .filter(|s| !s.is_empty())
        .map(|s| SimilarityRequest { smiles: s.clone(), method: method.to_string(), distance: distance.to_string() })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaFilter {
  #[serde(default)]
  pub numeric_filters: Vec<NumericFilter>,
  #[serde(default)]
  pub element_filters: Vec<ElementFilter>,
}

impl From<&FormulaFilter> for FilterSpec {
  fn from(f: &FormulaFilter) -> Self {
    Self { numeric_filters: f.numeric_filters.clone(),
           element_filters: f.element_filters.clone(),
           ..Self::default() }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeFilter {
  #[serde(default)]
  pub smiles: Option<String>,
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default = "default_distance")]
  pub distance: String,
  #[serde(default)]
  pub numeric_filters: Vec<NumericFilter>,
  #[serde(default)]
  pub element_filters: Vec<ElementFilter>,
}

impl Default for MoleculeFilter {
  fn default() -> Self {
    Self { smiles: None,
           method: default_method(),
           distance: default_distance(),
           numeric_filters: Vec::new(),
           element_filters: Vec::new() }
  }
}

impl From<&MoleculeFilter> for FilterSpec {
  fn from(f: &MoleculeFilter) -> Self {
    Self { numeric_filters: f.numeric_filters.clone(),
           element_filters: f.element_filters.clone(),
           similarity: similarity_of(&f.smiles, &f.method, &f.distance),
           ..Self::default() }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFilter {
  #[serde(default)]
  pub numeric_filters: Vec<NumericFilter>,
  #[serde(default)]
  pub class_filters: Vec<ClassFilter>,
  #[serde(default)]
  pub bool_filters: Vec<BoolFilter>,
  #[serde(default)]
  pub element_filters: Vec<ElementFilter>,
  #[serde(default)]
  pub smiles: Option<String>,
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default = "default_distance")]
  pub distance: String,
}

impl Default for SnapshotFilter {
  fn default() -> Self {
    Self { numeric_filters: Vec::new(),
           class_filters: Vec::new(),
           bool_filters: Vec::new(),
           element_filters: Vec::new(),
           smiles: None,
           method: default_method(),
           distance: default_distance() }
  }
}

impl From<&SnapshotFilter> for FilterSpec {
  fn from(f: &SnapshotFilter) -> Self {
    Self { numeric_filters: f.numeric_filters.clone(),
           element_filters: f.element_filters.clone(),
           class_filters: f.class_filters.clone(),
           bool_filters: f.bool_filters.clone(),
           similarity: similarity_of(&f.smiles, &f.method, &f.distance) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_take_defaults() {
    let f: MoleculeFilter = serde_json::from_str(r#"{"smiles": "CCO"}"#).unwrap();
    assert_eq!(f.method, "morgan");
    assert_eq!(f.distance, "cosine");
    let spec = FilterSpec::from(&f);
    assert_eq!(spec.similarity, Some(SimilarityRequest::new("CCO")));
  }

  #[test]
  fn unbounded_numeric_filters() {
    let f: NumericFilter = serde_json::from_str(r#"{"column": "molwt", "min": 10}"#).unwrap();
    assert_eq!(f.bounds(), (10.0, f64::INFINITY));
    let e: ElementFilter = serde_json::from_str(r#"{"element": "N"}"#).unwrap();
    assert_eq!(e.count, 0);
  }

  #[test]
  fn snapshot_filter_keeps_every_list() {
    let json = r#"{
      "numeric_filters": [{"column": "alpha_gap", "max": 0.3}],
      "class_filters": [{"column": "basis", "values": ["6-31G(d)"]}],
      "bool_filters": [{"column": "is_TS", "value": false}],
      "element_filters": [{"element": "C", "count": -1}],
      "distance": "l2"
    }"#;
    let f: SnapshotFilter = serde_json::from_str(json).unwrap();
    let spec = FilterSpec::from(&f);
    assert_eq!(spec.numeric_filters.len(), 1);
    assert_eq!(spec.class_filters[0].values, vec!["6-31G(d)".to_string()]);
    assert!(!spec.bool_filters[0].value);
    assert!(spec.similarity.is_none());
    assert!(!spec.is_empty());
    assert!(FilterSpec::from(&FormulaFilter::default()).is_empty());
  }
}
