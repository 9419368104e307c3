// columns.rs
//
// Registro cerrado de columnas filtrables por entidad. Los tokens que llegan
// en los filtros se traducen aquí a variantes tipadas; lo que no se reconoce
// simplemente no tiene variante.
use chem_providers::FingerprintMethod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entidades de la jerarquía Formula → Molecule → Snapshot.
///
/// El orden sigue la cadena de joins: una entidad puede filtrar por columnas
/// de su propia tabla y de las tablas "anteriores" a ella.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Formula,
  Molecule,
  Snapshot,
}

impl EntityKind {
  pub const ALL: [EntityKind; 3] = [Self::Formula, Self::Molecule, Self::Snapshot];

  pub fn table_name(&self) -> &'static str {
    match self {
      Self::Formula => "formulas",
      Self::Molecule => "molecules",
      Self::Snapshot => "snapshots",
    }
  }

  pub fn alias(&self) -> &'static str {
    match self {
      Self::Formula => "f",
      Self::Molecule => "m",
      Self::Snapshot => "s",
    }
  }

  /// Tabla inmediatamente anterior en la cadena y la clave foránea que la
  /// referencia desde `self`.
  pub fn parent(&self) -> Option<(EntityKind, &'static str)> {
    match self {
      Self::Formula => None,
      Self::Molecule => Some((Self::Formula, "formula_id")),
      Self::Snapshot => Some((Self::Molecule, "molecule_id")),
    }
  }

  /// `true` si `table` es alcanzable con joins desde `self`.
  pub fn reaches(&self, table: EntityKind) -> bool {
    table <= *self
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
                  Self::Formula => "Formula",
                  Self::Molecule => "Molecule",
                  Self::Snapshot => "Snapshot",
                })
  }
}

macro_rules! numeric_columns {
  ($($variant:ident => ($token:literal, $owner:ident)),+ $(,)?) => {
    /// Columnas numéricas con filtro de rango.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum NumericColumn {
      $($variant),+
    }

    impl NumericColumn {
      pub const ALL: &'static [NumericColumn] = &[$(Self::$variant),+];

      /// Token con el que llega el filtro y nombre de la columna en la tabla.
      pub fn token(&self) -> &'static str {
        match self {
          $(Self::$variant => $token),+
        }
      }

      /// Tabla que guarda la columna.
      pub fn owner(&self) -> EntityKind {
        match self {
          $(Self::$variant => EntityKind::$owner),+
        }
      }
    }
  };
}

numeric_columns! {
  Molwt => ("molwt", Formula),
  AtomNumber => ("atom_number", Formula),
  TotalMultiplicity => ("total_multiplicity", Molecule),
  Qed => ("qed", Molecule),
  Logp => ("logp", Molecule),
  SinglePointEnergy => ("single_point_energy", Snapshot),
  ZeroPointCorrection => ("zero_point_correction", Snapshot),
  EnergyCorrection => ("energy_correction", Snapshot),
  EnthalpyCorrection => ("enthalpy_correction", Snapshot),
  GibbsFreeEnergyCorrection => ("gibbs_free_energy_correction", Snapshot),
  ZeroPointSum => ("zero_point_sum", Snapshot),
  ThermalEnergySum => ("thermal_energy_sum", Snapshot),
  ThermalEnthalpySum => ("thermal_enthalpy_sum", Snapshot),
  ThermalFreeEnergySum => ("thermal_free_energy_sum", Snapshot),
  AlphaHomo => ("alpha_homo", Snapshot),
  AlphaLumo => ("alpha_lumo", Snapshot),
  AlphaGap => ("alpha_gap", Snapshot),
  BetaHomo => ("beta_homo", Snapshot),
  BetaLumo => ("beta_lumo", Snapshot),
  BetaGap => ("beta_gap", Snapshot),
  SpinEginvalue => ("spin_eginvalue", Snapshot),
  SpinMultiplicity => ("spin_multiplicity", Snapshot),
  FirstFrequency => ("first_frequency", Snapshot),
  SecondFrequency => ("second_frequency", Snapshot),
  Temperature => ("temperature", Snapshot),
}

impl NumericColumn {
  /// Las frecuencias y la temperatura se guardan pero no admiten filtro de
  /// rango; un filtro sobre ellas se ignora.
  pub fn accepts_range(&self) -> bool {
    !matches!(self, Self::FirstFrequency | Self::SecondFrequency | Self::Temperature)
  }

  /// Resuelve un token contra la lista blanca de rangos de `entity`.
  /// `atom_number` pedido desde Molecule o Snapshot resuelve a la columna de
  /// Formula.
  pub fn resolve(entity: EntityKind, token: &str) -> Option<Self> {
    Self::ALL.iter()
             .copied()
             .find(|c| c.token() == token && c.accepts_range() && entity.reaches(c.owner()))
  }
}

/// Columnas de texto con filtro de pertenencia (sólo Snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassColumn {
  Filename,
  QmSoftware,
  QmSoftwareVersion,
  Basis,
  Functional,
  Keywords,
  SolventModel,
  Solvent,
}

impl ClassColumn {
  pub const ALL: [ClassColumn; 8] = [Self::Filename,
                                     Self::QmSoftware,
                                     Self::QmSoftwareVersion,
                                     Self::Basis,
                                     Self::Functional,
                                     Self::Keywords,
                                     Self::SolventModel,
                                     Self::Solvent];

  pub fn token(&self) -> &'static str {
    match self {
      Self::Filename => "filename",
      Self::QmSoftware => "qm_software",
      Self::QmSoftwareVersion => "qm_software_version",
      Self::Basis => "basis",
      Self::Functional => "functional",
      Self::Keywords => "keywords",
      Self::SolventModel => "solvent_model",
      Self::Solvent => "solvent",
    }
  }

  pub fn owner(&self) -> EntityKind {
    EntityKind::Snapshot
  }

  pub fn resolve(entity: EntityKind, token: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.token() == token && entity.reaches(c.owner()))
  }
}

/// Atributo escalar de Snapshot admitido en un filtro de pertenencia: las
/// columnas de texto, los identificadores y las propiedades numéricas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberColumn {
  Class(ClassColumn),
  Id,
  HashToken,
  MoleculeId,
  OwnerId,
  FrameId,
  Numeric(NumericColumn),
}

/// Tipo con el que se comparan los valores de un filtro de pertenencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
  Text,
  Integer,
  Real,
}

/// Valor ya tipado de un filtro de pertenencia.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberValue {
  Text(String),
  Integer(i64),
  Real(f64),
}

impl MemberColumn {
  pub fn all() -> Vec<MemberColumn> {
    let mut all: Vec<MemberColumn> = ClassColumn::ALL.into_iter().map(Self::Class).collect();
    all.extend([Self::Id, Self::HashToken, Self::MoleculeId, Self::OwnerId, Self::FrameId]);
    all.extend(NumericColumn::ALL.iter()
                                 .copied()
                                 .filter(|c| c.owner() == EntityKind::Snapshot)
                                 .map(Self::Numeric));
    all
  }

  /// Token del filtro, igual al nombre de la columna en `snapshots`.
  pub fn token(&self) -> &'static str {
    match self {
      Self::Class(c) => c.token(),
      Self::Id => "id",
      Self::HashToken => "hash_token",
      Self::MoleculeId => "molecule_id",
      Self::OwnerId => "owner_id",
      Self::FrameId => "frame_id",
      Self::Numeric(c) => c.token(),
    }
  }

  pub fn kind(&self) -> MemberKind {
    match self {
      Self::Class(_) | Self::HashToken => MemberKind::Text,
      Self::Id | Self::MoleculeId | Self::OwnerId | Self::FrameId => MemberKind::Integer,
      Self::Numeric(_) => MemberKind::Real,
    }
  }

  pub fn owner(&self) -> EntityKind {
    EntityKind::Snapshot
  }

  pub fn resolve(entity: EntityKind, token: &str) -> Option<Self> {
    Self::all().into_iter().find(|c| c.token() == token && entity.reaches(c.owner()))
  }

  /// Convierte el texto recibido al tipo de la columna. `None` si no se
  /// puede interpretar.
  pub fn parse_value(&self, raw: &str) -> Option<MemberValue> {
    match self.kind() {
      MemberKind::Text => Some(MemberValue::Text(raw.to_string())),
      MemberKind::Integer => raw.trim().parse().ok().map(MemberValue::Integer),
      MemberKind::Real => raw.trim().parse().ok().map(MemberValue::Real),
    }
  }
}

/// Banderas de estado de un Snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolColumn {
  IsTs,
  IsOptimized,
  IsError,
}

impl BoolColumn {
  pub const ALL: [BoolColumn; 3] = [Self::IsTs, Self::IsOptimized, Self::IsError];

  pub fn token(&self) -> &'static str {
    match self {
      Self::IsTs => "is_TS",
      Self::IsOptimized => "is_optimized",
      Self::IsError => "is_error",
    }
  }

  /// Nombre de la columna en la tabla (en minúsculas).
  pub fn column_name(&self) -> &'static str {
    match self {
      Self::IsTs => "is_ts",
      Self::IsOptimized => "is_optimized",
      Self::IsError => "is_error",
    }
  }

  pub fn owner(&self) -> EntityKind {
    EntityKind::Snapshot
  }

  pub fn resolve(entity: EntityKind, token: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.token() == token && entity.reaches(c.owner()))
  }
}

/// Columnas vectoriales de Molecule, una por método de fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintColumn {
  Morgan,
  Rdkit,
  AtomPair,
  TopologicalTorsion,
}

impl FingerprintColumn {
  pub const ALL: [FingerprintColumn; 4] = [Self::Morgan, Self::Rdkit, Self::AtomPair, Self::TopologicalTorsion];

  pub fn column_name(&self) -> &'static str {
    match self {
      Self::Morgan => "morgan_fp3_1024",
      Self::Rdkit => "rdkit_fp_1024",
      Self::AtomPair => "atompair_fp_1024",
      Self::TopologicalTorsion => "topological_torsion_fp_1024",
    }
  }

  pub fn method(&self) -> FingerprintMethod {
    match self {
      Self::Morgan => FingerprintMethod::Morgan,
      Self::Rdkit => FingerprintMethod::Rdk,
      Self::AtomPair => FingerprintMethod::Atompair,
      Self::TopologicalTorsion => FingerprintMethod::Torsion,
    }
  }

  pub fn owner(&self) -> EntityKind {
    EntityKind::Molecule
  }
}

impl From<FingerprintMethod> for FingerprintColumn {
  fn from(method: FingerprintMethod) -> Self {
    match method {
      FingerprintMethod::Morgan => Self::Morgan,
      FingerprintMethod::Rdk => Self::Rdkit,
      FingerprintMethod::Atompair => Self::AtomPair,
      FingerprintMethod::Torsion => Self::TopologicalTorsion,
    }
  }
}

/// Métricas de distancia entre fingerprints.
///
/// Todas se ordenan ascendentemente; el producto interno se usa negado para
/// que los más parecidos queden primero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
  L2,
  InnerProduct,
  Cosine,
}

impl DistanceMetric {
  pub const ALL: [DistanceMetric; 3] = [Self::L2, Self::InnerProduct, Self::Cosine];

  /// Sólo los tres literales exactos; cualquier otra cadena no es métrica.
  pub fn parse(token: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|m| m.token() == token)
  }

  pub fn token(&self) -> &'static str {
    match self {
      Self::L2 => "l2",
      Self::InnerProduct => "inner_product",
      Self::Cosine => "cosine",
    }
  }

  /// Operador de pgvector.
  pub fn pg_operator(&self) -> &'static str {
    match self {
      Self::L2 => "<->",
      Self::InnerProduct => "<#>",
      Self::Cosine => "<=>",
    }
  }

  /// Misma cantidad que calcula el operador de pgvector.
  pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    match self {
      Self::L2 => a.iter()
                   .zip(b)
                   .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
                   .sum::<f64>()
                   .sqrt(),
      Self::InnerProduct => -dot,
      Self::Cosine => {
        let na = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        let nb = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        if na == 0.0 || nb == 0.0 {
          f64::NAN
        } else {
          1.0 - dot / (na * nb)
        }
      }
    }
  }
}

impl fmt::Display for DistanceMetric {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.token())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn whitelists_grow_along_the_hierarchy() {
    assert_eq!(NumericColumn::resolve(EntityKind::Formula, "molwt"), Some(NumericColumn::Molwt));
    assert_eq!(NumericColumn::resolve(EntityKind::Formula, "qed"), None);
    assert_eq!(NumericColumn::resolve(EntityKind::Molecule, "qed"), Some(NumericColumn::Qed));
    assert_eq!(NumericColumn::resolve(EntityKind::Molecule, "alpha_gap"), None);
    assert_eq!(NumericColumn::resolve(EntityKind::Snapshot, "alpha_gap"), Some(NumericColumn::AlphaGap));
    assert_eq!(NumericColumn::resolve(EntityKind::Snapshot, "molwt"), Some(NumericColumn::Molwt));
    assert_eq!(NumericColumn::resolve(EntityKind::Snapshot, "coords"), None);
  }

  fn range_whitelist(entity: EntityKind) -> Vec<&'static str> {
    NumericColumn::ALL.iter()
                      .filter(|c| NumericColumn::resolve(entity, c.token()) == Some(**c))
                      .map(|c| c.token())
                      .collect()
  }

  #[test]
  fn range_whitelists_are_exact() {
    assert_eq!(range_whitelist(EntityKind::Formula), vec!["molwt", "atom_number"]);
    assert_eq!(range_whitelist(EntityKind::Molecule),
               vec!["molwt", "atom_number", "total_multiplicity", "qed", "logp"]);
    assert_eq!(range_whitelist(EntityKind::Snapshot),
               vec!["molwt",
                    "atom_number",
                    "total_multiplicity",
                    "qed",
                    "logp",
                    "single_point_energy",
                    "zero_point_correction",
                    "energy_correction",
                    "enthalpy_correction",
                    "gibbs_free_energy_correction",
                    "zero_point_sum",
                    "thermal_energy_sum",
                    "thermal_enthalpy_sum",
                    "thermal_free_energy_sum",
                    "alpha_homo",
                    "alpha_lumo",
                    "alpha_gap",
                    "beta_homo",
                    "beta_lumo",
                    "beta_gap",
                    "spin_eginvalue",
                    "spin_multiplicity"]);
    for token in ["first_frequency", "second_frequency", "temperature"] {
      assert_eq!(NumericColumn::resolve(EntityKind::Snapshot, token), None);
    }
  }

  #[test]
  fn membership_reaches_every_scalar_snapshot_attribute() {
    for token in ["basis", "hash_token", "frame_id", "temperature", "first_frequency", "owner_id", "alpha_gap"] {
      assert!(MemberColumn::resolve(EntityKind::Snapshot, token).is_some(), "{token}");
      assert_eq!(MemberColumn::resolve(EntityKind::Molecule, token), None);
    }
    for token in ["coords", "is_TS", "commit_time", "molwt", "smiles"] {
      assert_eq!(MemberColumn::resolve(EntityKind::Snapshot, token), None, "{token}");
    }
    let temperature = MemberColumn::resolve(EntityKind::Snapshot, "temperature").unwrap();
    assert_eq!(temperature.parse_value(" 350 "), Some(MemberValue::Real(350.0)));
    assert_eq!(temperature.parse_value("caliente"), None);
    let frame = MemberColumn::resolve(EntityKind::Snapshot, "frame_id").unwrap();
    assert_eq!(frame.parse_value("3"), Some(MemberValue::Integer(3)));
    assert_eq!(frame.parse_value("3.5"), None);
  }

  #[test]
  fn atom_number_resolves_to_the_formula_table() {
    for entity in EntityKind::ALL {
      let col = NumericColumn::resolve(entity, "atom_number").unwrap();
      assert_eq!(col.owner(), EntityKind::Formula);
    }
  }

  #[test]
  fn class_and_bool_columns_are_snapshot_only() {
    assert_eq!(ClassColumn::resolve(EntityKind::Snapshot, "basis"), Some(ClassColumn::Basis));
    assert_eq!(ClassColumn::resolve(EntityKind::Molecule, "basis"), None);
    assert_eq!(BoolColumn::resolve(EntityKind::Snapshot, "is_TS"), Some(BoolColumn::IsTs));
    assert_eq!(BoolColumn::resolve(EntityKind::Snapshot, "is_ts"), None);
    assert_eq!(BoolColumn::resolve(EntityKind::Formula, "is_error"), None);
  }

  #[test]
  fn metric_tokens_are_exact() {
    assert_eq!(DistanceMetric::parse("l2"), Some(DistanceMetric::L2));
    assert_eq!(DistanceMetric::parse("inner_product"), Some(DistanceMetric::InnerProduct));
    assert_eq!(DistanceMetric::parse("Cosine"), None);
    assert_eq!(DistanceMetric::parse("manhattan"), None);
  }

  #[test]
  fn distances_match_pgvector_conventions() {
    let a = [1.0, 0.0, 1.0];
    let b = [1.0, 1.0, 0.0];
    assert!((DistanceMetric::L2.distance(&a, &b) - 2f64.sqrt()).abs() < 1e-12);
    assert_eq!(DistanceMetric::InnerProduct.distance(&a, &b), -1.0);
    assert!((DistanceMetric::Cosine.distance(&a, &b) - 0.5).abs() < 1e-12);
    assert!(DistanceMetric::Cosine.distance(&a, &a).abs() < 1e-12);
    assert!(DistanceMetric::Cosine.distance(&a, &[0.0, 0.0, 0.0]).is_nan());
  }

  #[test]
  fn method_to_column_table_is_a_bijection() {
    for column in FingerprintColumn::ALL {
      assert_eq!(FingerprintColumn::from(column.method()), column);
    }
  }
}
