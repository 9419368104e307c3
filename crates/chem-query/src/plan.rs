// plan.rs
use chem_domain::{BoolColumn, DistanceMetric, DomainError, EntityKind, FingerprintColumn, Formula, MemberColumn,
                  MemberValue, Molecule, NumericColumn, Snapshot};
use chem_providers::Element;

/// Restricción sobre la cuenta de un elemento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementOp {
  Present,
  Absent,
  Exactly(u32),
}

impl ElementOp {
  /// `< 0` presente, `0` ausente, `> 0` exacto.
  pub fn from_count(count: i64) -> Self {
    match count {
      c if c < 0 => Self::Present,
      0 => Self::Absent,
      c => Self::Exactly(u32::try_from(c).unwrap_or(u32::MAX)),
    }
  }

  pub fn accepts(&self, count: u32) -> bool {
    match self {
      Self::Present => count > 0,
      Self::Absent => count == 0,
      Self::Exactly(n) => count == *n,
    }
  }
}

/// Columnas de clave natural.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyColumn {
  FormulaString,
  Smiles,
  HashToken,
}

impl KeyColumn {
  pub fn column_name(&self) -> &'static str {
    match self {
      Self::FormulaString => "formula_string",
      Self::Smiles => "smiles",
      Self::HashToken => "hash_token",
    }
  }

  pub fn owner(&self) -> EntityKind {
    match self {
      Self::FormulaString => EntityKind::Formula,
      Self::Smiles => EntityKind::Molecule,
      Self::HashToken => EntityKind::Snapshot,
    }
  }
}

/// Predicado independiente; la lista de un plan se combina con AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  /// `min <= col <= max`. Un valor nulo nunca cumple.
  Range { column: NumericColumn, min: f64, max: f64 },
  Element { element: Element, op: ElementOp },
  /// Pertenencia; con `values` vacío no cumple ninguna fila.
  OneOf { column: MemberColumn, values: Vec<MemberValue> },
  Flag { column: BoolColumn, value: bool },
  IdEquals { table: EntityKind, id: i64 },
  KeyEquals { column: KeyColumn, value: String },
}

impl Predicate {
  /// Tabla cuya columna se compara.
  pub fn table(&self) -> EntityKind {
    match self {
      Self::Range { column, .. } => column.owner(),
      Self::Element { .. } => EntityKind::Formula,
      Self::OneOf { column, .. } => column.owner(),
      Self::Flag { column, .. } => column.owner(),
      Self::IdEquals { table, .. } => *table,
      Self::KeyEquals { column, .. } => column.owner(),
    }
  }

  /// Evalúa el predicado sobre una fila ya unida.
  pub fn matches(&self, row: &JoinedRow<'_>) -> bool {
    match self {
      Self::Range { column, min, max } => row.numeric(*column).is_some_and(|v| v >= *min && v <= *max),
      Self::Element { element, op } => op.accepts(row.formula.count_of(*element)),
      Self::OneOf { column, values } => row.snapshot
                                          .and_then(|s| s.member_value(*column))
                                          .is_some_and(|v| values.contains(&v)),
      Self::Flag { column, value } => row.snapshot.is_some_and(|s| s.record.flag(*column) == *value),
      Self::IdEquals { table, id } => row.id_of(*table) == Some(*id),
      Self::KeyEquals { column, value } => row.key(*column) == Some(value.as_str()),
    }
  }
}

/// Fila de la entidad consultada junto con sus padres en la cadena.
#[derive(Debug, Clone, Copy)]
pub struct JoinedRow<'a> {
  pub formula: &'a Formula,
  pub molecule: Option<&'a Molecule>,
  pub snapshot: Option<&'a Snapshot>,
}

impl<'a> JoinedRow<'a> {
  pub fn numeric(&self, column: NumericColumn) -> Option<f64> {
    match column.owner() {
      EntityKind::Formula => self.formula.numeric_value(column),
      EntityKind::Molecule => self.molecule.and_then(|m| m.numeric_value(column)),
      EntityKind::Snapshot => self.snapshot.and_then(|s| s.record.numeric_value(column)),
    }
  }

  pub fn id_of(&self, table: EntityKind) -> Option<i64> {
    match table {
      EntityKind::Formula => Some(self.formula.id),
      EntityKind::Molecule => self.molecule.map(|m| m.id),
      EntityKind::Snapshot => self.snapshot.map(|s| s.id),
    }
  }

  pub fn key(&self, column: KeyColumn) -> Option<&'a str> {
    match column {
      KeyColumn::FormulaString => Some(self.formula.formula_string.as_str()),
      KeyColumn::Smiles => self.molecule.map(|m| m.smiles.as_str()),
      KeyColumn::HashToken => self.snapshot.map(|s| s.hash_token.as_str()),
    }
  }
}

/// Orden ascendente por distancia entre una columna de fingerprint y el
/// vector de la estructura consultada.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingClause {
  pub column: FingerprintColumn,
  pub metric: DistanceMetric,
  pub embedding: Vec<f32>,
}

impl OrderingClause {
  pub fn distance_to(&self, molecule: &Molecule) -> f64 {
    self.metric.distance(molecule.fingerprint(self.column), &self.embedding)
  }
}

/// Consulta completa sobre una entidad: predicados, orden opcional y
/// paginación.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
  pub entity: EntityKind,
  pub predicates: Vec<Predicate>,
  pub ordering: Option<OrderingClause>,
  pub skip: u64,
  pub limit: u64,
}

impl QueryPlan {
  pub fn new(entity: EntityKind) -> Self {
    Self { entity, predicates: Vec::new(), ordering: None, skip: 0, limit: u64::MAX }
  }

  pub fn with_predicates(mut self, predicates: Vec<Predicate>) -> Self {
    self.predicates.extend(predicates);
    self
  }

  pub fn filter(mut self, predicate: Predicate) -> Self {
    self.predicates.push(predicate);
    self
  }

  pub fn ordered_by(mut self, ordering: Option<OrderingClause>) -> Self {
    self.ordering = ordering;
    self
  }

  pub fn paginate(mut self, skip: u64, limit: u64) -> Self {
    self.skip = skip;
    self.limit = limit;
    self
  }

  /// Tablas a unir además de la entidad, en orden de join.
  pub fn joins(&self) -> Vec<EntityKind> {
    let deepest = self.predicates
                      .iter()
                      .map(Predicate::table)
                      .chain(self.ordering.as_ref().map(|o| o.column.owner()))
                      .min()
                      .unwrap_or(self.entity);
    let mut tables = Vec::new();
    let mut current = self.entity;
    while current > deepest {
      match current.parent() {
        Some((parent, _)) => {
          tables.push(parent);
          current = parent;
        }
        None => break,
      }
    }
    tables
  }

  /// Toda columna referenciada debe ser alcanzable desde la entidad.
  pub fn validate(&self) -> Result<(), DomainError> {
    if let Some(p) = self.predicates.iter().find(|p| !self.entity.reaches(p.table())) {
      return Err(DomainError::ValidationError(format!("{:?} no es alcanzable desde {}", p, self.entity)));
    }
    if let Some(o) = &self.ordering {
      if !self.entity.reaches(o.column.owner()) {
        return Err(DomainError::ValidationError(format!("{} no es alcanzable desde {}",
                                                        o.column.column_name(),
                                                        self.entity)));
      }
    }
    Ok(())
  }
}
