use crate::schema::{formulas, molecules};
use chem_domain::{BoolColumn, ClassColumn, DomainError, EntityKind, FingerprintColumn, Formula, FoundExt, Molecule,
                  NewFormula, NewMolecule, NewSnapshot, NumericColumn, ScalarProperties, Snapshot, SnapshotRecord};
use chem_providers::{parse_formula_string, FingerprintSet};
use chem_query::sql::{column_ref, render_by_ids, render_count, render_insert, render_order_keys, render_select,
                      vector_as_text};
use chem_query::{rank_by_distance, BindValue, ChemStore, ColumnValue, Dialect, Predicate, QueryConfig, QueryPlan,
                 RenderedQuery};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::query_dsl::LoadQuery;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Bool, Double, Integer, Nullable, Text, Timestamp};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(all(feature = "pg", not(test)))]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations/postgres");
#[cfg(any(test, not(feature = "pg")))]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations/sqlite");
#[cfg(all(feature = "pg", not(test)))]
type Db = diesel::pg::Pg;
#[cfg(any(test, not(feature = "pg")))]
type Db = diesel::sqlite::Sqlite;
#[cfg(all(feature = "pg", not(test)))]
type DbConn = PgConnection;
#[cfg(any(test, not(feature = "pg")))]
type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;
#[cfg(all(feature = "pg", not(test)))]
const DIALECT: Dialect = Dialect::Postgres;
#[cfg(any(test, not(feature = "pg")))]
const DIALECT: Dialect = Dialect::Sqlite;

// Errores dentro de una transacción; se convierten a DomainError al salir.
#[derive(Debug, thiserror::Error)]
enum StoreError {
  #[error("db: {0}")]
  Db(#[from] DieselError),
  #[error(transparent)]
  Domain(#[from] DomainError),
  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl From<StoreError> for DomainError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::Db(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
        DomainError::ValidationError(format!("registro duplicado: {}", info.message()))
      }
      StoreError::Db(e) => DomainError::ExternalError(format!("db: {}", e)),
      StoreError::Domain(e) => e,
      StoreError::Json(e) => DomainError::from(e),
    }
  }
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, DomainError> {
  res.map_err(|e| DomainError::from(StoreError::Db(e)))
}

/// Aplica los parámetros de `query` en orden.
fn bound(query: RenderedQuery) -> BoxedSqlQuery<'static, Db, SqlQuery> {
  debug!("sql: {}", query.sql);
  let initial = diesel::sql_query(query.sql).into_boxed::<Db>();
  query.binds.into_iter().fold(initial, |q, value| match value {
                           BindValue::BigInt(v) => q.bind::<BigInt, _>(v),
                           BindValue::Double(v) => q.bind::<Double, _>(v),
                           BindValue::Text(v) => q.bind::<Text, _>(v),
                           BindValue::Bool(v) => q.bind::<Bool, _>(v),
                           BindValue::NullableBigInt(v) => q.bind::<Nullable<BigInt>, _>(v),
                           BindValue::NullableDouble(v) => q.bind::<Nullable<Double>, _>(v),
                           BindValue::NullableText(v) => q.bind::<Nullable<Text>, _>(v),
                         })
}

fn projection(entity: EntityKind, columns: &[&str]) -> String {
  columns.iter()
         .map(|c| format!("{} AS {}", column_ref(entity, c), c))
         .collect::<Vec<_>>()
         .join(", ")
}

const FORMULA_COLUMNS: [&str; 8] =
  ["id", "formula_string", "molwt", "atom_number", "molecule_number", "molecule_ids", "commit_time", "update_time"];
const MOLECULE_COLUMNS: [&str; 11] = ["id",
                                      "smiles",
                                      "total_charge",
                                      "total_multiplicity",
                                      "qed",
                                      "logp",
                                      "formula_id",
                                      "snapshot_number",
                                      "snapshot_ids",
                                      "commit_time",
                                      "update_time"];
const SNAPSHOT_COLUMNS: [&str; 14] = ["id",
                                      "hash_token",
                                      "molecule_id",
                                      "owner_id",
                                      "frame_id",
                                      "coords",
                                      "atoms",
                                      "bonds",
                                      "formal_charges",
                                      "formal_spins",
                                      "standard_coords",
                                      "vectors",
                                      "commit_time",
                                      "update_time"];

fn formula_projection() -> String {
  projection(EntityKind::Formula, &FORMULA_COLUMNS)
}

fn molecule_projection() -> String {
  let fingerprints = FingerprintColumn::ALL.iter().map(|fp| {
                                                    let col = column_ref(EntityKind::Molecule, fp.column_name());
                                                    format!("{} AS {}", vector_as_text(DIALECT, &col), fp.column_name())
                                                  });
  std::iter::once(projection(EntityKind::Molecule, &MOLECULE_COLUMNS)).chain(fingerprints)
                                                                      .collect::<Vec<_>>()
                                                                      .join(", ")
}

fn snapshot_projection() -> String {
  let mut columns: Vec<&str> = SNAPSHOT_COLUMNS.to_vec();
  columns.extend(ClassColumn::ALL.iter().map(|c| c.token()));
  columns.extend(NumericColumn::ALL.iter().filter(|c| c.owner() == EntityKind::Snapshot).map(|c| c.token()));
  columns.extend(BoolColumn::ALL.iter().map(|c| c.column_name()));
  projection(EntityKind::Snapshot, &columns)
}

trait RowId {
  fn row_id(&self) -> i64;
}

#[derive(QueryableByName)]
struct IdRow {
  #[diesel(sql_type = BigInt)]
  id: i64,
}

#[derive(QueryableByName)]
struct CountRow {
  #[diesel(sql_type = BigInt)]
  count: i64,
}

#[derive(QueryableByName)]
struct OrderKeyRow {
  #[diesel(sql_type = BigInt)]
  id: i64,
  #[diesel(sql_type = Text)]
  fingerprint: String,
}

#[derive(QueryableByName)]
struct FormulaRow {
  #[diesel(sql_type = BigInt)]
  id: i64,
  #[diesel(sql_type = Text)]
  formula_string: String,
  #[diesel(sql_type = Double)]
  molwt: f64,
  #[diesel(sql_type = Integer)]
  atom_number: i32,
  #[diesel(sql_type = Integer)]
  molecule_number: i32,
  #[diesel(sql_type = Text)]
  molecule_ids: String,
  #[diesel(sql_type = Timestamp)]
  commit_time: NaiveDateTime,
  #[diesel(sql_type = Timestamp)]
  update_time: NaiveDateTime,
}

impl RowId for FormulaRow {
  fn row_id(&self) -> i64 {
    self.id
  }
}

impl FormulaRow {
  // Las cuentas por elemento se reconstruyen desde la cadena canónica.
  fn into_domain(self) -> Result<Formula, DomainError> {
    let elements = parse_formula_string(&self.formula_string).ok_or_else(|| {
                     DomainError::SerializationError(format!("fórmula almacenada inválida: {}", self.formula_string))
                   })?;
    Ok(Formula { id: self.id,
                 elements,
                 molwt: self.molwt,
                 atom_number: self.atom_number,
                 molecule_number: self.molecule_number,
                 molecule_ids: serde_json::from_str(&self.molecule_ids)?,
                 commit_time: self.commit_time,
                 update_time: self.update_time,
                 formula_string: self.formula_string })
  }
}

#[derive(QueryableByName)]
struct MoleculeRow {
  #[diesel(sql_type = BigInt)]
  id: i64,
  #[diesel(sql_type = Text)]
  smiles: String,
  #[diesel(sql_type = Integer)]
  total_charge: i32,
  #[diesel(sql_type = Integer)]
  total_multiplicity: i32,
  #[diesel(sql_type = Nullable<Double>)]
  qed: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  logp: Option<f64>,
  #[diesel(sql_type = Text)]
  morgan_fp3_1024: String,
  #[diesel(sql_type = Text)]
  rdkit_fp_1024: String,
  #[diesel(sql_type = Text)]
  atompair_fp_1024: String,
  #[diesel(sql_type = Text)]
  topological_torsion_fp_1024: String,
  #[diesel(sql_type = BigInt)]
  formula_id: i64,
  #[diesel(sql_type = Integer)]
  snapshot_number: i32,
  #[diesel(sql_type = Text)]
  snapshot_ids: String,
  #[diesel(sql_type = Timestamp)]
  commit_time: NaiveDateTime,
  #[diesel(sql_type = Timestamp)]
  update_time: NaiveDateTime,
}

impl RowId for MoleculeRow {
  fn row_id(&self) -> i64 {
    self.id
  }
}

impl MoleculeRow {
  fn into_domain(self) -> Result<Molecule, DomainError> {
    let fingerprints = FingerprintSet { morgan: serde_json::from_str(&self.morgan_fp3_1024)?,
                                        rdk: serde_json::from_str(&self.rdkit_fp_1024)?,
                                        atompair: serde_json::from_str(&self.atompair_fp_1024)?,
                                        torsion: serde_json::from_str(&self.topological_torsion_fp_1024)? };
    Ok(Molecule { id: self.id,
                  smiles: self.smiles,
                  total_charge: self.total_charge,
                  total_multiplicity: self.total_multiplicity,
                  qed: self.qed,
                  logp: self.logp,
                  fingerprints,
                  formula_id: self.formula_id,
                  snapshot_number: self.snapshot_number,
                  snapshot_ids: serde_json::from_str(&self.snapshot_ids)?,
                  commit_time: self.commit_time,
                  update_time: self.update_time })
  }
}

#[derive(QueryableByName)]
struct SnapshotRow {
  #[diesel(sql_type = BigInt)]
  id: i64,
  #[diesel(sql_type = Text)]
  hash_token: String,
  #[diesel(sql_type = BigInt)]
  molecule_id: i64,
  #[diesel(sql_type = BigInt)]
  owner_id: i64,
  #[diesel(sql_type = Nullable<BigInt>)]
  frame_id: Option<i64>,
  #[diesel(sql_type = Text)]
  coords: String,
  #[diesel(sql_type = Text)]
  atoms: String,
  #[diesel(sql_type = Text)]
  bonds: String,
  #[diesel(sql_type = Text)]
  formal_charges: String,
  #[diesel(sql_type = Text)]
  formal_spins: String,
  #[diesel(sql_type = Text)]
  standard_coords: String,
  #[diesel(sql_type = Text)]
  vectors: String,
  #[diesel(sql_type = Nullable<Text>)]
  filename: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  qm_software: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  qm_software_version: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  basis: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  functional: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  keywords: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  solvent_model: Option<String>,
  #[diesel(sql_type = Nullable<Text>)]
  solvent: Option<String>,
  #[diesel(sql_type = Double)]
  temperature: f64,
  #[diesel(sql_type = Nullable<Double>)]
  single_point_energy: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  zero_point_correction: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  energy_correction: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  enthalpy_correction: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  gibbs_free_energy_correction: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  zero_point_sum: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  thermal_energy_sum: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  thermal_enthalpy_sum: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  thermal_free_energy_sum: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  alpha_homo: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  alpha_lumo: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  alpha_gap: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  beta_homo: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  beta_lumo: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  beta_gap: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  first_frequency: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  second_frequency: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  spin_eginvalue: Option<f64>,
  #[diesel(sql_type = Nullable<Double>)]
  spin_multiplicity: Option<f64>,
  #[diesel(sql_type = Bool)]
  is_ts: bool,
  #[diesel(sql_type = Bool)]
  is_optimized: bool,
  #[diesel(sql_type = Bool)]
  is_error: bool,
  #[diesel(sql_type = Timestamp)]
  commit_time: NaiveDateTime,
  #[diesel(sql_type = Timestamp)]
  update_time: NaiveDateTime,
}

impl RowId for SnapshotRow {
  fn row_id(&self) -> i64 {
    self.id
  }
}

impl SnapshotRow {
  fn into_domain(self) -> Result<Snapshot, DomainError> {
    let frame_id = self.frame_id
                       .map(i32::try_from)
                       .transpose()
                       .map_err(|e| DomainError::SerializationError(format!("frame_id: {}", e)))?;
    let scalars = ScalarProperties { single_point_energy: self.single_point_energy,
                                     zero_point_correction: self.zero_point_correction,
                                     energy_correction: self.energy_correction,
                                     enthalpy_correction: self.enthalpy_correction,
                                     gibbs_free_energy_correction: self.gibbs_free_energy_correction,
                                     zero_point_sum: self.zero_point_sum,
                                     thermal_energy_sum: self.thermal_energy_sum,
                                     thermal_enthalpy_sum: self.thermal_enthalpy_sum,
                                     thermal_free_energy_sum: self.thermal_free_energy_sum,
                                     alpha_homo: self.alpha_homo,
                                     alpha_lumo: self.alpha_lumo,
                                     alpha_gap: self.alpha_gap,
                                     beta_homo: self.beta_homo,
                                     beta_lumo: self.beta_lumo,
                                     beta_gap: self.beta_gap,
                                     first_frequency: self.first_frequency,
                                     second_frequency: self.second_frequency,
                                     spin_eginvalue: self.spin_eginvalue,
                                     spin_multiplicity: self.spin_multiplicity };
    let record = SnapshotRecord { filename: self.filename,
                                  frame_id,
                                  coords: serde_json::from_str(&self.coords)?,
                                  atoms: serde_json::from_str(&self.atoms)?,
                                  bonds: serde_json::from_str(&self.bonds)?,
                                  formal_charges: serde_json::from_str(&self.formal_charges)?,
                                  formal_spins: serde_json::from_str(&self.formal_spins)?,
                                  standard_coords: serde_json::from_str(&self.standard_coords)?,
                                  qm_software: self.qm_software,
                                  qm_software_version: self.qm_software_version,
                                  basis: self.basis,
                                  functional: self.functional,
                                  keywords: self.keywords,
                                  solvent_model: self.solvent_model,
                                  solvent: self.solvent,
                                  temperature: self.temperature,
                                  scalars,
                                  vectors: serde_json::from_str(&self.vectors)?,
                                  is_ts: self.is_ts,
                                  is_optimized: self.is_optimized,
                                  is_error: self.is_error };
    Ok(Snapshot { id: self.id,
                  hash_token: self.hash_token,
                  molecule_id: self.molecule_id,
                  owner_id: self.owner_id,
                  record,
                  commit_time: self.commit_time,
                  update_time: self.update_time })
  }
}

fn value(column: &str, v: BindValue) -> (String, ColumnValue) {
  (column.to_string(), ColumnValue::Bind(v))
}

fn json<T: serde::Serialize>(v: &T) -> Result<BindValue, DomainError> {
  Ok(BindValue::Text(serde_json::to_string(v)?))
}

fn by_id(entity: EntityKind, id: i64) -> QueryPlan {
  QueryPlan::new(entity).filter(Predicate::IdEquals { table: entity, id }).paginate(0, 1)
}

/// Ejecuta el plan. Sin soporte vectorial en el motor, el orden por
/// similitud se resuelve en dos fases: claves y fingerprints en orden de id,
/// orden y paginación en memoria, y carga de la página por id.
fn fetch<R>(conn: &mut DbConn, plan: &QueryPlan, projection: &str) -> Result<Vec<R>, DomainError>
  where R: RowId,
        BoxedSqlQuery<'static, Db, SqlQuery>: LoadQuery<'static, DbConn, R>
{
  let ordering = match &plan.ordering {
    Some(o) if !DIALECT.supports_vector_ordering() => o,
    _ => return map_db_err(bound(render_select(plan, DIALECT, projection)?).load::<R>(conn)),
  };
  let keys = map_db_err(bound(render_order_keys(plan, DIALECT)?).load::<OrderKeyRow>(conn))?;
  let keys = keys.into_iter()
                 .map(|k| Ok((k.id, serde_json::from_str::<Vec<f32>>(&k.fingerprint)?)))
                 .collect::<Result<Vec<(i64, Vec<f32>)>, DomainError>>()?;
  let skip = usize::try_from(plan.skip).unwrap_or(usize::MAX);
  let limit = usize::try_from(plan.limit).unwrap_or(usize::MAX);
  let page: Vec<i64> = rank_by_distance(keys, ordering, |k| &k.1).into_iter()
                                                                 .skip(skip)
                                                                 .take(limit)
                                                                 .map(|(id, _)| id)
                                                                 .collect();
  let mut rows = map_db_err(bound(render_by_ids(plan.entity, DIALECT, projection, &page)).load::<R>(conn))?;
  let position: HashMap<i64, usize> = page.iter().enumerate().map(|(i, id)| (*id, i)).collect();
  rows.sort_by_key(|r| position.get(&r.row_id()).copied().unwrap_or(usize::MAX));
  Ok(rows)
}

fn insert_returning_id(conn: &mut DbConn, query: RenderedQuery) -> Result<i64, StoreError> {
  let rows = bound(query).load::<IdRow>(conn)?;
  rows.into_iter()
      .next()
      .map(|r| r.id)
      .ok_or_else(|| StoreError::Domain(DomainError::ExternalError("db: INSERT sin RETURNING".to_string())))
}

fn append_id(ids_json: &str, id: i64) -> Result<Vec<i64>, StoreError> {
  let mut ids: Vec<i64> = serde_json::from_str(ids_json)?;
  ids.push(id);
  Ok(ids)
}

/// `ChemStore` sobre Diesel. Postgres + pgvector con la feature `pg`,
/// SQLite en otro caso (y siempre en los tests unitarios).
pub struct DieselChemStore {
  pool: Arc<DbPool>,
}

impl DieselChemStore {
  /// Crea el pool y aplica las migraciones pendientes.
  pub fn new(database_url: &str, pool_size: u32) -> Result<Self, DomainError> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let pool = Pool::builder().max_size(pool_size.max(1))
                              .build(manager)
                              .map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))?;
    let store = DieselChemStore { pool: Arc::new(pool) };
    {
      let mut pooled = store.conn()?;
      let conn: &mut DbConn = &mut pooled;
      #[cfg(any(test, not(feature = "pg")))]
      {
        let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(conn);
        let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(conn);
      }
      let applied = conn.run_pending_migrations(MIGRATIONS)
                        .map_err(|e| DomainError::ExternalError(format!("migraciones: {}", e)))?;
      info!("almacén {:?} listo ({} migraciones aplicadas)", DIALECT, applied.len());
    }
    Ok(store)
  }

  pub fn from_config(config: &QueryConfig) -> Result<Self, DomainError> {
    let url = config.database_url
                    .as_deref()
                    .ok_or_else(|| DomainError::ExternalError("CHEM_DB_URL / DATABASE_URL no definido".into()))?;
    if DIALECT == Dialect::Postgres {
      let l = url.to_lowercase();
      if !(l.starts_with("postgres") || url.contains('@')) {
        return Err(DomainError::ExternalError("CHEM_DB_URL / DATABASE_URL no parece una URL de Postgres".into()));
      }
    }
    Self::new(url, config.pool_size)
  }

  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>, DomainError> {
    self.pool.get().map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))
  }

  fn load_formula(conn: &mut DbConn, id: i64) -> Result<Formula, DomainError> {
    fetch::<FormulaRow>(conn, &by_id(EntityKind::Formula, id), &formula_projection())?.into_iter()
                                                                                      .next()
                                                                                      .or_not_found("formula", id)?
                                                                                      .into_domain()
  }

  fn load_molecule(conn: &mut DbConn, id: i64) -> Result<Molecule, DomainError> {
    fetch::<MoleculeRow>(conn, &by_id(EntityKind::Molecule, id), &molecule_projection())?.into_iter()
                                                                                         .next()
                                                                                         .or_not_found("molecule", id)?
                                                                                         .into_domain()
  }

  fn load_snapshot(conn: &mut DbConn, id: i64) -> Result<Snapshot, DomainError> {
    fetch::<SnapshotRow>(conn, &by_id(EntityKind::Snapshot, id), &snapshot_projection())?.into_iter()
                                                                                         .next()
                                                                                         .or_not_found("snapshot", id)?
                                                                                         .into_domain()
  }
}

impl ChemStore for DieselChemStore {
  fn fetch_formulas(&self, plan: &QueryPlan) -> Result<Vec<Formula>, DomainError> {
    let mut pooled = self.conn()?;
    fetch::<FormulaRow>(&mut pooled, plan, &formula_projection())?.into_iter()
                                                                  .map(FormulaRow::into_domain)
                                                                  .collect()
  }

  fn fetch_molecules(&self, plan: &QueryPlan) -> Result<Vec<Molecule>, DomainError> {
    let mut pooled = self.conn()?;
    fetch::<MoleculeRow>(&mut pooled, plan, &molecule_projection())?.into_iter()
                                                                    .map(MoleculeRow::into_domain)
                                                                    .collect()
  }

  fn fetch_snapshots(&self, plan: &QueryPlan) -> Result<Vec<Snapshot>, DomainError> {
    let mut pooled = self.conn()?;
    fetch::<SnapshotRow>(&mut pooled, plan, &snapshot_projection())?.into_iter()
                                                                    .map(SnapshotRow::into_domain)
                                                                    .collect()
  }

  fn count(&self, entity: EntityKind) -> Result<u64, DomainError> {
    let mut pooled = self.conn()?;
    let conn: &mut DbConn = &mut pooled;
    let row = map_db_err(diesel::sql_query(render_count(entity)).get_result::<CountRow>(conn))?;
    Ok(u64::try_from(row.count).unwrap_or(0))
  }

  fn insert_formula(&self, formula: NewFormula) -> Result<Formula, DomainError> {
    let mut values = vec![value("formula_string", BindValue::Text(formula.formula_string.clone())),
                          value("molwt", BindValue::Double(formula.molwt)),
                          value("atom_number", BindValue::BigInt(i64::from(formula.atom_number)))];
    for (element, count) in &formula.elements {
      values.push(value(&format!("\"{}\"", element.symbol()), BindValue::BigInt(i64::from(*count))));
    }
    let mut pooled = self.conn()?;
    let conn: &mut DbConn = &mut pooled;
    let id = insert_returning_id(conn, render_insert(EntityKind::Formula, DIALECT, &values))?;
    debug!("fórmula {} insertada con id {}", formula.formula_string, id);
    Self::load_formula(conn, id)
  }

  fn insert_molecule(&self, molecule: NewMolecule) -> Result<Molecule, DomainError> {
    molecule.validate()?;
    let fp = &molecule.fingerprints;
    let values = vec![value("smiles", BindValue::Text(molecule.smiles.clone())),
                      value("total_charge", BindValue::BigInt(i64::from(molecule.total_charge))),
                      value("total_multiplicity", BindValue::BigInt(i64::from(molecule.total_multiplicity))),
                      value("qed", BindValue::NullableDouble(molecule.qed)),
                      value("logp", BindValue::NullableDouble(molecule.logp)),
                      value("formula_id", BindValue::BigInt(molecule.formula_id)),
                      (FingerprintColumn::Morgan.column_name().to_string(), ColumnValue::Vector(fp.morgan.clone())),
                      (FingerprintColumn::Rdkit.column_name().to_string(), ColumnValue::Vector(fp.rdk.clone())),
                      (FingerprintColumn::AtomPair.column_name().to_string(),
                       ColumnValue::Vector(fp.atompair.clone())),
                      (FingerprintColumn::TopologicalTorsion.column_name().to_string(),
                       ColumnValue::Vector(fp.torsion.clone()))];
    let mut pooled = self.conn()?;
    let conn: &mut DbConn = &mut pooled;
    let id = conn.transaction::<_, StoreError, _>(|conn| {
                   let ids_json = formulas::table.find(molecule.formula_id)
                                                 .select(formulas::molecule_ids)
                                                 .first::<String>(conn)
                                                 .optional()?
                                                 .ok_or_else(|| {
                                                   DomainError::ValidationError(format!("fórmula {} inexistente",
                                                                                        molecule.formula_id))
                                                 })?;
                   let id = insert_returning_id(conn, render_insert(EntityKind::Molecule, DIALECT, &values))?;
                   let ids = append_id(&ids_json, id)?;
                   diesel::update(formulas::table.find(molecule.formula_id))
                     .set((formulas::molecule_ids.eq(serde_json::to_string(&ids)?),
                           formulas::molecule_number.eq(ids.len() as i32),
                           formulas::update_time.eq(Utc::now().naive_utc())))
                     .execute(conn)?;
                   Ok(id)
                 })?;
    debug!("molécula {} insertada con id {}", molecule.smiles, id);
    Self::load_molecule(conn, id)
  }

  fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot, DomainError> {
    let r = &snapshot.record;
    let implied = r.implied_formula_string()?;
    let mut values = vec![value("hash_token", BindValue::Text(snapshot.hash_token.clone())),
                          value("molecule_id", BindValue::BigInt(snapshot.molecule_id)),
                          value("owner_id", BindValue::BigInt(snapshot.owner_id)),
                          value("frame_id", BindValue::NullableBigInt(r.frame_id.map(i64::from))),
                          value("coords", json(&r.coords)?),
                          value("atoms", json(&r.atoms)?),
                          value("bonds", json(&r.bonds)?),
                          value("formal_charges", json(&r.formal_charges)?),
                          value("formal_spins", json(&r.formal_spins)?),
                          value("standard_coords", json(&r.standard_coords)?),
                          value("vectors", json(&r.vectors)?)];
    for column in ClassColumn::ALL {
      values.push(value(column.token(), BindValue::NullableText(r.class_value(column).map(str::to_string))));
    }
    for column in NumericColumn::ALL.iter().filter(|c| c.owner() == EntityKind::Snapshot) {
      values.push(value(column.token(), BindValue::NullableDouble(r.numeric_value(*column))));
    }
    for column in BoolColumn::ALL {
      values.push(value(column.column_name(), BindValue::Bool(r.flag(column))));
    }
    let mut pooled = self.conn()?;
    let conn: &mut DbConn = &mut pooled;
    let id = conn.transaction::<_, StoreError, _>(|conn| {
                   let (ids_json, formula_id) =
                     molecules::table.find(snapshot.molecule_id)
                                     .select((molecules::snapshot_ids, molecules::formula_id))
                                     .first::<(String, i64)>(conn)
                                     .optional()?
                                     .ok_or_else(|| {
                                       DomainError::ValidationError(format!("molécula {} inexistente",
                                                                            snapshot.molecule_id))
                                     })?;
                   let expected = formulas::table.find(formula_id)
                                                 .select(formulas::formula_string)
                                                 .first::<String>(conn)
                                                 .optional()?
                                                 .unwrap_or_default();
                   if implied != expected {
                     let msg = format!("el snapshot implica {} pero la molécula {} es {}",
                                       implied, snapshot.molecule_id, expected);
                     return Err(DomainError::ValidationError(msg).into());
                   }
                   let id = insert_returning_id(conn, render_insert(EntityKind::Snapshot, DIALECT, &values))?;
                   let ids = append_id(&ids_json, id)?;
                   diesel::update(molecules::table.find(snapshot.molecule_id))
                     .set((molecules::snapshot_ids.eq(serde_json::to_string(&ids)?),
                           molecules::snapshot_number.eq(ids.len() as i32),
                           molecules::update_time.eq(Utc::now().naive_utc())))
                     .execute(conn)?;
                   Ok(id)
                 })?;
    Self::load_snapshot(conn, id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chem_domain::DomainStubs;
  use chem_providers::{ChemEngine, FingerprintService};

  fn temp_store() -> (DieselChemStore, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!("chem_store_{}.db", uuid::Uuid::new_v4()));
    let store = DieselChemStore::new(path.to_str().unwrap(), 2).unwrap();
    (store, path)
  }

  #[test]
  fn projections_name_every_column() {
    let snapshot = snapshot_projection();
    assert!(snapshot.starts_with("s.id AS id, s.hash_token AS hash_token"));
    assert!(snapshot.contains("s.spin_multiplicity AS spin_multiplicity"));
    assert!(snapshot.contains("s.is_ts AS is_ts"));
    assert!(molecule_projection().ends_with("m.topological_torsion_fp_1024 AS topological_torsion_fp_1024"));
  }

  #[test]
  fn postgres_fingerprints_have_an_hnsw_index_per_metric() {
    let up = include_str!("../migrations/postgres/2024-06-01-000000_create_chem_tables/up.sql");
    for column in FingerprintColumn::ALL {
      for ops in ["vector_l2_ops", "vector_ip_ops", "vector_cosine_ops"] {
        let index = format!("ON molecules USING hnsw ({} {});", column.column_name(), ops);
        assert_eq!(up.matches(&index).count(), 1, "{}", index);
      }
    }
  }

  #[test]
  fn round_trip_keeps_element_counts_and_fingerprints() {
    let (store, path) = temp_store();
    let engine = ChemEngine::init().unwrap();
    let formula = store.insert_formula(NewFormula::from_counts(engine.element_counts("CCO").unwrap()).unwrap())
                       .unwrap();
    assert_eq!(formula.formula_string, "H6C2O1");
    let molecule = store.insert_molecule(NewMolecule::from_structure(&engine, "CCO", formula.id).unwrap())
                        .unwrap();
    assert_eq!(molecule.fingerprints, engine.embed_all("CCO").unwrap());
    let mut record = DomainStubs::snapshot_records(&engine, "CCO").unwrap().remove(1);
    // coordenadas exactas en binario para comparar tras pasar por JSON
    for c in record.coords.iter_mut().chain(record.standard_coords.iter_mut()) {
      c[0] = c[0].round();
    }
    let snapshot = store.insert_snapshot(NewSnapshot::new(molecule.id, 7, record.clone()).unwrap()).unwrap();
    assert_eq!(snapshot.record, record);
    assert_eq!(snapshot.owner_id, 7);

    let formula = DieselChemStore::load_formula(&mut store.conn().unwrap(), formula.id).unwrap();
    assert_eq!(formula.molecule_ids, vec![molecule.id]);
    assert!(formula.check_invariants().is_ok());
    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn orphans_and_duplicates_are_validation_errors() {
    let (store, path) = temp_store();
    let engine = ChemEngine::init().unwrap();
    let orphan = store.insert_molecule(NewMolecule::from_structure(&engine, "CCO", 42).unwrap());
    assert!(matches!(orphan, Err(DomainError::ValidationError(_))));
    store.insert_formula(NewFormula::from_formula_string("H4").unwrap()).unwrap();
    let duplicate = store.insert_formula(NewFormula::from_formula_string("H4").unwrap());
    assert!(matches!(duplicate, Err(DomainError::ValidationError(_))));
    assert_eq!(store.count(EntityKind::Formula).unwrap(), 1);
    assert_eq!(store.count(EntityKind::Molecule).unwrap(), 0);
    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn snapshots_of_another_formula_are_rejected() {
    let (store, path) = temp_store();
    let engine = ChemEngine::init().unwrap();
    let formula = store.insert_formula(NewFormula::from_counts(engine.element_counts("CCO").unwrap()).unwrap())
                       .unwrap();
    let molecule = store.insert_molecule(NewMolecule::from_structure(&engine, "CCO", formula.id).unwrap())
                        .unwrap();
    let water = DomainStubs::snapshot_records(&engine, "O").unwrap().remove(0);
    let mismatch = store.insert_snapshot(NewSnapshot::new(molecule.id, 1, water).unwrap());
    assert!(matches!(mismatch, Err(DomainError::ValidationError(_))));
    assert_eq!(store.count(EntityKind::Snapshot).unwrap(), 0);
    let molecule = DieselChemStore::load_molecule(&mut store.conn().unwrap(), molecule.id).unwrap();
    assert_eq!(molecule.snapshot_number, 0);
    let _ = std::fs::remove_file(path);
  }
}
