// sql.rs
//
// Render de un `QueryPlan` a SQL parametrizado. Los identificadores salen
// siempre de cadenas estáticas del registro de columnas; todo valor que
// viene del usuario va como parámetro.
use crate::plan::{ElementOp, Predicate, QueryPlan};
use chem_domain::{DomainError, EntityKind, MemberValue};
use chem_providers::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
  /// Postgres con la extensión pgvector.
  Postgres,
  /// SQLite: sin operadores vectoriales, el orden por similitud se hace en
  /// el cliente.
  Sqlite,
}

impl Dialect {
  fn placeholder(&self, n: usize) -> String {
    match self {
      Self::Postgres => format!("${}", n),
      Self::Sqlite => "?".to_string(),
    }
  }

  pub fn supports_vector_ordering(&self) -> bool {
    matches!(self, Self::Postgres)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
  BigInt(i64),
  Double(f64),
  Text(String),
  Bool(bool),
  NullableBigInt(Option<i64>),
  NullableDouble(Option<f64>),
  NullableText(Option<String>),
}

/// Valor de una columna en un `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
  Bind(BindValue),
  /// Columna vectorial: `vector` en Postgres, JSON en SQLite.
  Vector(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
  pub sql: String,
  pub binds: Vec<BindValue>,
}

struct SqlBuilder {
  dialect: Dialect,
  sql: String,
  binds: Vec<BindValue>,
}

impl SqlBuilder {
  fn new(dialect: Dialect) -> Self {
    Self { dialect, sql: String::new(), binds: Vec::new() }
  }

  fn push(&mut self, text: &str) -> &mut Self {
    self.sql.push_str(text);
    self
  }

  fn bind(&mut self, value: BindValue) -> &mut Self {
    self.binds.push(value);
    let placeholder = self.dialect.placeholder(self.binds.len());
    self.sql.push_str(&placeholder);
    self
  }

  fn bind_vector(&mut self, values: &[f32]) -> &mut Self {
    match self.dialect {
      Dialect::Postgres => self.push("CAST(").bind(BindValue::Text(vector_literal(values))).push(" AS vector)"),
      Dialect::Sqlite => self.bind(BindValue::Text(vector_literal(values))),
    }
  }

  fn finish(self) -> RenderedQuery {
    RenderedQuery { sql: self.sql, binds: self.binds }
  }
}

/// `alias.columna`.
pub fn column_ref(table: EntityKind, column: &str) -> String {
  format!("{}.{}", table.alias(), column)
}

fn element_ref(element: Element) -> String {
  format!("{}.\"{}\"", EntityKind::Formula.alias(), element.symbol())
}

/// Texto de un vector en el formato de entrada de pgvector, `[1,0,...]`.
pub fn vector_literal(values: &[f32]) -> String {
  let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
  format!("[{}]", parts.join(","))
}

/// Lectura de una columna vectorial como texto `[..]`, que también es JSON.
pub fn vector_as_text(dialect: Dialect, column: &str) -> String {
  match dialect {
    Dialect::Postgres => format!("CAST({} AS text)", column),
    Dialect::Sqlite => column.to_string(),
  }
}

fn limit_value(n: u64) -> i64 {
  i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_clause(b: &mut SqlBuilder, plan: &QueryPlan) {
  let entity = plan.entity;
  b.push(" FROM ").push(entity.table_name()).push(" ").push(entity.alias());
  let mut current = entity;
  for table in plan.joins() {
    if let Some((_, fk)) = current.parent() {
      let on = format!(" JOIN {} {} ON {}.id = {}",
                       table.table_name(),
                       table.alias(),
                       table.alias(),
                       column_ref(current, fk));
      b.push(&on);
    }
    current = table;
  }
}

fn predicate_sql(b: &mut SqlBuilder, predicate: &Predicate) {
  match predicate {
    Predicate::Range { column, min, max } => {
      let col = column_ref(column.owner(), column.token());
      b.push("(")
       .push(&col)
       .push(" >= ")
       .bind(BindValue::Double(*min))
       .push(" AND ")
       .push(&col)
       .push(" <= ")
       .bind(BindValue::Double(*max))
       .push(")");
    }
    Predicate::Element { element, op } => {
      b.push(&element_ref(*element));
      match op {
        ElementOp::Present => b.push(" > ").bind(BindValue::BigInt(0)),
        ElementOp::Absent => b.push(" = ").bind(BindValue::BigInt(0)),
        ElementOp::Exactly(n) => b.push(" = ").bind(BindValue::BigInt(i64::from(*n))),
      };
    }
    Predicate::OneOf { column, values } => {
      if values.is_empty() {
        b.push("1 = 0");
        return;
      }
      b.push(&column_ref(column.owner(), column.token())).push(" IN (");
      for (i, v) in values.iter().enumerate() {
        if i > 0 {
          b.push(", ");
        }
        b.bind(match v {
           MemberValue::Text(t) => BindValue::Text(t.clone()),
           MemberValue::Integer(n) => BindValue::BigInt(*n),
           MemberValue::Real(x) => BindValue::Double(*x),
         });
      }
      b.push(")");
    }
    Predicate::Flag { column, value } => {
      b.push(&column_ref(column.owner(), column.column_name())).push(" = ").bind(BindValue::Bool(*value));
    }
    Predicate::IdEquals { table, id } => {
      b.push(&column_ref(*table, "id")).push(" = ").bind(BindValue::BigInt(*id));
    }
    Predicate::KeyEquals { column, value } => {
      b.push(&column_ref(column.owner(), column.column_name()))
       .push(" = ")
       .bind(BindValue::Text(value.clone()));
    }
  }
}

fn where_clause(b: &mut SqlBuilder, predicates: &[Predicate]) {
  for (i, p) in predicates.iter().enumerate() {
    b.push(if i == 0 { " WHERE " } else { " AND " });
    predicate_sql(b, p);
  }
}

/// Consulta completa: filtros, orden por similitud (sólo Postgres) y
/// `LIMIT/OFFSET`. Sin orden no se añade `ORDER BY`.
pub fn render_select(plan: &QueryPlan, dialect: Dialect, projection: &str) -> Result<RenderedQuery, DomainError> {
  plan.validate()?;
  if plan.ordering.is_some() && !dialect.supports_vector_ordering() {
    return Err(DomainError::ValidationError(format!("{:?} no ordena por distancia vectorial", dialect)));
  }
  let mut b = SqlBuilder::new(dialect);
  b.push("SELECT ").push(projection);
  from_clause(&mut b, plan);
  where_clause(&mut b, &plan.predicates);
  if let Some(ordering) = &plan.ordering {
    let col = column_ref(ordering.column.owner(), ordering.column.column_name());
    b.push(" ORDER BY ")
     .push(&col)
     .push(" ")
     .push(ordering.metric.pg_operator())
     .push(" ")
     .bind_vector(&ordering.embedding);
  }
  b.push(" LIMIT ")
   .bind(BindValue::BigInt(limit_value(plan.limit)))
   .push(" OFFSET ")
   .bind(BindValue::BigInt(limit_value(plan.skip)));
  Ok(b.finish())
}

/// Ids de las filas que cumplen los filtros junto con el fingerprint por el
/// que se ordena, en orden natural de id. Primera fase del orden en cliente.
pub fn render_order_keys(plan: &QueryPlan, dialect: Dialect) -> Result<RenderedQuery, DomainError> {
  plan.validate()?;
  let ordering = plan.ordering
                     .as_ref()
                     .ok_or_else(|| DomainError::ValidationError("el plan no tiene orden".to_string()))?;
  let id = column_ref(plan.entity, "id");
  let fp = column_ref(ordering.column.owner(), ordering.column.column_name());
  let mut b = SqlBuilder::new(dialect);
  b.push("SELECT ")
   .push(&id)
   .push(" AS id, ")
   .push(&vector_as_text(dialect, &fp))
   .push(" AS fingerprint");
  from_clause(&mut b, plan);
  where_clause(&mut b, &plan.predicates);
  b.push(" ORDER BY ").push(&id);
  Ok(b.finish())
}

/// Filas de `entity` con id en `ids` (sin orden garantizado).
pub fn render_by_ids(entity: EntityKind, dialect: Dialect, projection: &str, ids: &[i64]) -> RenderedQuery {
  let mut b = SqlBuilder::new(dialect);
  b.push("SELECT ")
   .push(projection)
   .push(" FROM ")
   .push(entity.table_name())
   .push(" ")
   .push(entity.alias());
  if ids.is_empty() {
    b.push(" WHERE 1 = 0");
    return b.finish();
  }
  b.push(" WHERE ").push(&column_ref(entity, "id")).push(" IN (");
  for (i, id) in ids.iter().enumerate() {
    if i > 0 {
      b.push(", ");
    }
    b.bind(BindValue::BigInt(*id));
  }
  b.push(")");
  b.finish()
}

/// `INSERT ... RETURNING id`. Los nombres de columna deben venir del
/// registro (o de la tabla periódica para las columnas de elemento).
pub fn render_insert(entity: EntityKind, dialect: Dialect, values: &[(String, ColumnValue)]) -> RenderedQuery {
  let mut b = SqlBuilder::new(dialect);
  let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
  b.push("INSERT INTO ")
   .push(entity.table_name())
   .push(" (")
   .push(&columns.join(", "))
   .push(") VALUES (");
  for (i, (_, value)) in values.iter().enumerate() {
    if i > 0 {
      b.push(", ");
    }
    match value {
      ColumnValue::Bind(v) => b.bind(v.clone()),
      ColumnValue::Vector(v) => b.bind_vector(v),
    };
  }
  b.push(") RETURNING id");
  b.finish()
}

/// Conteo de la tabla completa; nunca lleva filtros.
pub fn render_count(entity: EntityKind) -> String {
  format!("SELECT COUNT(*) AS count FROM {}", entity.table_name())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{KeyColumn, OrderingClause};
  use chem_domain::{BoolColumn, ClassColumn, DistanceMetric, FingerprintColumn, MemberColumn, NumericColumn};

  #[test]
  fn plain_plan_has_only_pagination() {
    let plan = QueryPlan::new(EntityKind::Formula).paginate(10, 5);
    let q = render_select(&plan, Dialect::Postgres, "f.id").unwrap();
    assert_eq!(q.sql, "SELECT f.id FROM formulas f LIMIT $1 OFFSET $2");
    assert_eq!(q.binds, vec![BindValue::BigInt(5), BindValue::BigInt(10)]);
  }

  #[test]
  fn snapshot_filters_join_the_chain() {
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(Predicate::Element { element: Element::CARBON,
                                                                                op: ElementOp::Present })
                                                   .filter(Predicate::Range { column: NumericColumn::AlphaGap,
                                                                              min: 0.1,
                                                                              max: 0.4 })
                                                   .filter(Predicate::Flag { column: BoolColumn::IsTs,
                                                                             value: false })
                                                   .paginate(0, 100);
    let q = render_select(&plan, Dialect::Sqlite, "s.id").unwrap();
    assert_eq!(q.sql,
               "SELECT s.id FROM snapshots s JOIN molecules m ON m.id = s.molecule_id \
                JOIN formulas f ON f.id = m.formula_id WHERE f.\"C\" > ? AND \
                (s.alpha_gap >= ? AND s.alpha_gap <= ?) AND s.is_ts = ? LIMIT ? OFFSET ?");
    assert_eq!(q.binds,
               vec![BindValue::BigInt(0),
                    BindValue::Double(0.1),
                    BindValue::Double(0.4),
                    BindValue::Bool(false),
                    BindValue::BigInt(100),
                    BindValue::BigInt(0)]);
  }

  #[test]
  fn user_values_never_reach_the_sql_text() {
    let hostile = "x'); DROP TABLE molecules; --".to_string();
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(Predicate::OneOf { column: MemberColumn::Class(ClassColumn::Basis),
                                                                              values: vec![MemberValue::Text(hostile.clone())] })
                                                   .filter(Predicate::KeyEquals { column: KeyColumn::Smiles,
                                                                                  value: hostile.clone() });
    let q = render_select(&plan, Dialect::Postgres, "s.id").unwrap();
    assert!(!q.sql.contains("DROP"));
    assert!(q.sql.contains("s.basis IN ($1)"));
    assert!(q.sql.contains("m.smiles = $2"));
    assert_eq!(q.binds[0], BindValue::Text(hostile));
  }

  #[test]
  fn empty_membership_matches_nothing() {
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(Predicate::OneOf { column: MemberColumn::Class(ClassColumn::Solvent),
                                                                              values: vec![] });
    let q = render_select(&plan, Dialect::Sqlite, "s.id").unwrap();
    assert!(q.sql.contains(" WHERE 1 = 0 LIMIT"));
  }

  #[test]
  fn membership_binds_follow_the_column_type() {
    let plan = QueryPlan::new(EntityKind::Snapshot).filter(Predicate::OneOf { column: MemberColumn::FrameId,
                                                                              values: vec![MemberValue::Integer(3)] })
                                                   .filter(Predicate::OneOf { column: MemberColumn::Numeric(NumericColumn::Temperature),
                                                                              values: vec![MemberValue::Real(350.0),
                                                                                           MemberValue::Real(298.15)] });
    let q = render_select(&plan, Dialect::Postgres, "s.id").unwrap();
    assert!(q.sql.contains("WHERE s.frame_id IN ($1) AND s.temperature IN ($2, $3)"));
    assert_eq!(&q.binds[..3],
               &[BindValue::BigInt(3), BindValue::Double(350.0), BindValue::Double(298.15)]);
  }

  #[test]
  fn postgres_orders_with_pgvector_operators() {
    for (metric, op) in [(DistanceMetric::L2, "<->"), (DistanceMetric::InnerProduct, "<#>"), (DistanceMetric::Cosine, "<=>")] {
      let plan = QueryPlan::new(EntityKind::Snapshot).ordered_by(Some(OrderingClause { column: FingerprintColumn::Morgan,
                                                                                       metric,
                                                                                       embedding: vec![1.0, 0.0] }))
                                                     .paginate(0, 1);
      let q = render_select(&plan, Dialect::Postgres, "s.id").unwrap();
      assert_eq!(q.sql,
                 format!("SELECT s.id FROM snapshots s JOIN molecules m ON m.id = s.molecule_id \
                          ORDER BY m.morgan_fp3_1024 {} CAST($1 AS vector) LIMIT $2 OFFSET $3",
                         op));
      assert_eq!(q.binds[0], BindValue::Text("[1,0]".into()));
    }
  }

  #[test]
  fn sqlite_refuses_vector_ordering_but_renders_keys() {
    let plan = QueryPlan::new(EntityKind::Molecule).ordered_by(Some(OrderingClause { column: FingerprintColumn::Rdkit,
                                                                                     metric: DistanceMetric::Cosine,
                                                                                     embedding: vec![] }));
    assert!(render_select(&plan, Dialect::Sqlite, "m.id").is_err());
    let keys = render_order_keys(&plan, Dialect::Sqlite).unwrap();
    assert_eq!(keys.sql, "SELECT m.id AS id, m.rdkit_fp_1024 AS fingerprint FROM molecules m ORDER BY m.id");
  }

  #[test]
  fn inserts_cast_vectors_only_on_postgres() {
    let values = vec![("smiles".to_string(), ColumnValue::Bind(BindValue::Text("CCO".into()))),
                      ("qed".to_string(), ColumnValue::Bind(BindValue::NullableDouble(None))),
                      ("morgan_fp3_1024".to_string(), ColumnValue::Vector(vec![0.0, 1.0]))];
    let pg = render_insert(EntityKind::Molecule, Dialect::Postgres, &values);
    assert_eq!(pg.sql,
               "INSERT INTO molecules (smiles, qed, morgan_fp3_1024) VALUES ($1, $2, CAST($3 AS vector)) RETURNING id");
    assert_eq!(pg.binds[2], BindValue::Text("[0,1]".into()));
    let lite = render_insert(EntityKind::Molecule, Dialect::Sqlite, &values);
    assert_eq!(lite.sql, "INSERT INTO molecules (smiles, qed, morgan_fp3_1024) VALUES (?, ?, ?) RETURNING id");
    assert_eq!(lite.binds, pg.binds);
  }

  #[test]
  fn lookups_by_id_and_count() {
    let q = render_by_ids(EntityKind::Molecule, Dialect::Postgres, "m.id", &[3, 1]);
    assert_eq!(q.sql, "SELECT m.id FROM molecules m WHERE m.id IN ($1, $2)");
    assert_eq!(render_by_ids(EntityKind::Molecule, Dialect::Sqlite, "m.id", &[]).sql,
               "SELECT m.id FROM molecules m WHERE 1 = 0");
    assert_eq!(render_count(EntityKind::Snapshot), "SELECT COUNT(*) AS count FROM snapshots");
  }

  #[test]
  fn unbounded_limit_is_clamped() {
    let q = render_select(&QueryPlan::new(EntityKind::Formula), Dialect::Sqlite, "f.id").unwrap();
    assert_eq!(q.binds, vec![BindValue::BigInt(i64::MAX), BindValue::BigInt(0)]);
  }
}
