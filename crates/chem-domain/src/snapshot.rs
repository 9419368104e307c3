// snapshot.rs
use crate::{BoolColumn, ClassColumn, DomainError, MemberColumn, MemberValue, NumericColumn};
use chem_providers::{formula_string, Element};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_TEMPERATURE: f64 = 298.15;

fn default_temperature() -> f64 {
  DEFAULT_TEMPERATURE
}

/// Propiedades escalares calculadas; todas opcionales.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarProperties {
  pub single_point_energy: Option<f64>,
  pub zero_point_correction: Option<f64>,
  pub energy_correction: Option<f64>,
  pub enthalpy_correction: Option<f64>,
  pub gibbs_free_energy_correction: Option<f64>,
  pub zero_point_sum: Option<f64>,
  pub thermal_energy_sum: Option<f64>,
  pub thermal_enthalpy_sum: Option<f64>,
  pub thermal_free_energy_sum: Option<f64>,
  pub alpha_homo: Option<f64>,
  pub alpha_lumo: Option<f64>,
  pub alpha_gap: Option<f64>,
  pub beta_homo: Option<f64>,
  pub beta_lumo: Option<f64>,
  pub beta_gap: Option<f64>,
  pub first_frequency: Option<f64>,
  pub second_frequency: Option<f64>,
  pub spin_eginvalue: Option<f64>,
  pub spin_multiplicity: Option<f64>,
}

/// Propiedades vectoriales. Se persisten juntas como un documento JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorProperties {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mulliken_charge: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub spin_densities: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub gradients: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_vibration_mode: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub second_vibration_mode: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dipole: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub quadrupole: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub octapole: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hexadecapole: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nbo_bond_order: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub wiberg_bond_order: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mo_bond_order: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub atom_atom_overlap_bond_order: Option<Vec<Vec<f64>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nbo_charges: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lowdin_charges: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hirshfeld_charges: Option<Vec<f64>>,
}

/// Contenido de un snapshot: geometría, método de cálculo, propiedades y
/// banderas. Es lo que se hashea para deduplicar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
  pub filename: Option<String>,
  pub frame_id: Option<i32>,
  pub coords: Vec<[f64; 3]>,
  /// Números atómicos.
  pub atoms: Vec<u8>,
  /// `[inicio, fin, orden]`.
  pub bonds: Vec<[i32; 3]>,
  pub formal_charges: Vec<i32>,
  pub formal_spins: Vec<i32>,
  pub standard_coords: Vec<[f64; 3]>,
  pub qm_software: Option<String>,
  pub qm_software_version: Option<String>,
  pub basis: Option<String>,
  pub functional: Option<String>,
  pub keywords: Option<String>,
  pub solvent_model: Option<String>,
  pub solvent: Option<String>,
  #[serde(default = "default_temperature")]
  pub temperature: f64,
  #[serde(default)]
  pub scalars: ScalarProperties,
  #[serde(default)]
  pub vectors: VectorProperties,
  #[serde(default)]
  pub is_ts: bool,
  #[serde(default)]
  pub is_optimized: bool,
  #[serde(default)]
  pub is_error: bool,
}

impl SnapshotRecord {
  /// Registro vacío con sólo los átomos; el resto se completa por campo.
  pub fn with_atoms(atoms: Vec<u8>) -> Self {
    let n = atoms.len();
    Self { filename: None,
           frame_id: None,
           coords: vec![[0.0; 3]; n],
           atoms,
           bonds: Vec::new(),
           formal_charges: vec![0; n],
           formal_spins: vec![0; n],
           standard_coords: vec![[0.0; 3]; n],
           qm_software: None,
           qm_software_version: None,
           basis: None,
           functional: None,
           keywords: None,
           solvent_model: None,
           solvent: None,
           temperature: DEFAULT_TEMPERATURE,
           scalars: ScalarProperties::default(),
           vectors: VectorProperties::default(),
           is_ts: false,
           is_optimized: false,
           is_error: false }
  }

  /// SHA-256 (hex) del JSON compacto, con claves ordenadas, de la geometría,
  /// los enlaces, las cargas y los campos del método de cálculo.
  pub fn hash_token(&self) -> Result<String, DomainError> {
    let pattern = serde_json::json!({
      "atoms": self.atoms,
      "basis": self.basis,
      "bonds": self.bonds,
      "coords": self.coords,
      "formal_charges": self.formal_charges,
      "formal_spins": self.formal_spins,
      "functional": self.functional,
      "keywords": self.keywords,
      "qm_software": self.qm_software,
      "qm_software_version": self.qm_software_version,
      "solvent": self.solvent,
      "solvent_model": self.solvent_model,
      "temperature": self.temperature,
    });
    let text = serde_json::to_string(&pattern)?;
    let digest = Sha256::digest(text.as_bytes());
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
  }

  /// Fórmula implicada por la lista de átomos.
  pub fn implied_formula_string(&self) -> Result<String, DomainError> {
    let mut counts: BTreeMap<Element, u32> = BTreeMap::new();
    for z in &self.atoms {
      let element = Element::from_atomic_number(*z).ok_or_else(|| {
                                                     DomainError::ValidationError(format!("número atómico inválido: {}",
                                                                                          z))
                                                   })?;
      *counts.entry(element).or_insert(0) += 1;
    }
    Ok(formula_string(&counts))
  }

  pub fn validate(&self) -> Result<(), DomainError> {
    let n = self.atoms.len();
    if n == 0 {
      return Err(DomainError::ValidationError("snapshot sin átomos".to_string()));
    }
    let per_atom = [("coords", self.coords.len()),
                    ("formal_charges", self.formal_charges.len()),
                    ("formal_spins", self.formal_spins.len())];
    for (name, len) in per_atom {
      if len != n {
        return Err(DomainError::ValidationError(format!("{} tiene {} entradas para {} átomos", name, len, n)));
      }
    }
    if let Some(bad) = self.bonds.iter().find(|b| b[0] < 0 || b[1] < 0 || b[0] as usize >= n || b[1] as usize >= n) {
      return Err(DomainError::ValidationError(format!("enlace fuera de rango: {:?}", bad)));
    }
    Ok(())
  }

  pub fn numeric_value(&self, column: NumericColumn) -> Option<f64> {
    let p = &self.scalars;
    match column {
      NumericColumn::SinglePointEnergy => p.single_point_energy,
      NumericColumn::ZeroPointCorrection => p.zero_point_correction,
      NumericColumn::EnergyCorrection => p.energy_correction,
      NumericColumn::EnthalpyCorrection => p.enthalpy_correction,
      NumericColumn::GibbsFreeEnergyCorrection => p.gibbs_free_energy_correction,
      NumericColumn::ZeroPointSum => p.zero_point_sum,
      NumericColumn::ThermalEnergySum => p.thermal_energy_sum,
      NumericColumn::ThermalEnthalpySum => p.thermal_enthalpy_sum,
      NumericColumn::ThermalFreeEnergySum => p.thermal_free_energy_sum,
      NumericColumn::AlphaHomo => p.alpha_homo,
      NumericColumn::AlphaLumo => p.alpha_lumo,
      NumericColumn::AlphaGap => p.alpha_gap,
      NumericColumn::BetaHomo => p.beta_homo,
      NumericColumn::BetaLumo => p.beta_lumo,
      NumericColumn::BetaGap => p.beta_gap,
      NumericColumn::SpinEginvalue => p.spin_eginvalue,
      NumericColumn::SpinMultiplicity => p.spin_multiplicity,
      NumericColumn::FirstFrequency => p.first_frequency,
      NumericColumn::SecondFrequency => p.second_frequency,
      NumericColumn::Temperature => Some(self.temperature),
      _ => None,
    }
  }

  pub fn class_value(&self, column: ClassColumn) -> Option<&str> {
    match column {
      ClassColumn::Filename => self.filename.as_deref(),
      ClassColumn::QmSoftware => self.qm_software.as_deref(),
      ClassColumn::QmSoftwareVersion => self.qm_software_version.as_deref(),
      ClassColumn::Basis => self.basis.as_deref(),
      ClassColumn::Functional => self.functional.as_deref(),
      ClassColumn::Keywords => self.keywords.as_deref(),
      ClassColumn::SolventModel => self.solvent_model.as_deref(),
      ClassColumn::Solvent => self.solvent.as_deref(),
    }
  }

  pub fn flag(&self, column: BoolColumn) -> bool {
    match column {
      BoolColumn::IsTs => self.is_ts,
      BoolColumn::IsOptimized => self.is_optimized,
      BoolColumn::IsError => self.is_error,
    }
  }
}

/// Geometría concreta con sus propiedades, perteneciente a una molécula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub id: i64,
  pub hash_token: String,
  pub molecule_id: i64,
  pub owner_id: i64,
  #[serde(flatten)]
  pub record: SnapshotRecord,
  pub commit_time: NaiveDateTime,
  pub update_time: NaiveDateTime,
}

impl Snapshot {
  /// Valor del atributo para un filtro de pertenencia; `None` si es nulo.
  pub fn member_value(&self, column: MemberColumn) -> Option<MemberValue> {
    match column {
      MemberColumn::Class(c) => self.record.class_value(c).map(|v| MemberValue::Text(v.to_string())),
      MemberColumn::Id => Some(MemberValue::Integer(self.id)),
      MemberColumn::HashToken => Some(MemberValue::Text(self.hash_token.clone())),
      MemberColumn::MoleculeId => Some(MemberValue::Integer(self.molecule_id)),
      MemberColumn::OwnerId => Some(MemberValue::Integer(self.owner_id)),
      MemberColumn::FrameId => self.record.frame_id.map(|f| MemberValue::Integer(i64::from(f))),
      MemberColumn::Numeric(c) => self.record.numeric_value(c).map(MemberValue::Real),
    }
  }
}

impl fmt::Display for Snapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f,
           "Snapshot(#{} molécula: {}, átomos: {}, {} / {}, hash: {})",
           self.id,
           self.molecule_id,
           self.record.atoms.len(),
           self.record.functional.as_deref().unwrap_or("-"),
           self.record.basis.as_deref().unwrap_or("-"),
           &self.hash_token[..self.hash_token.len().min(12)])
  }
}

/// Snapshot aún no persistido. El hash se calcula al crearlo.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
  pub hash_token: String,
  pub molecule_id: i64,
  pub owner_id: i64,
  pub record: SnapshotRecord,
}

impl NewSnapshot {
  pub fn new(molecule_id: i64, owner_id: i64, record: SnapshotRecord) -> Result<Self, DomainError> {
    record.validate()?;
    Ok(Self { hash_token: record.hash_token()?, molecule_id, owner_id, record })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn water() -> SnapshotRecord {
    let mut r = SnapshotRecord::with_atoms(vec![8, 1, 1]);
    r.coords = vec![[0.0, 0.0, 0.117], [0.0, 0.757, -0.469], [0.0, -0.757, -0.469]];
    r.bonds = vec![[0, 1, 1], [0, 2, 1]];
    r.functional = Some("B3LYP".into());
    r.basis = Some("6-31G(d)".into());
    r
  }

  #[test]
  fn hash_depends_only_on_hashed_fields() {
    let a = water();
    let mut b = water();
    b.scalars.alpha_gap = Some(0.3);
    b.is_optimized = true;
    b.filename = Some("water.log".into());
    assert_eq!(a.hash_token().unwrap(), b.hash_token().unwrap());
    b.basis = Some("def2-SVP".into());
    assert_ne!(a.hash_token().unwrap(), b.hash_token().unwrap());
    assert_eq!(a.hash_token().unwrap().len(), 64);
  }

  #[test]
  fn implied_formula_comes_from_atoms() {
    assert_eq!(water().implied_formula_string().unwrap(), "H2O1");
    let bad = SnapshotRecord::with_atoms(vec![0]);
    assert!(bad.implied_formula_string().is_err());
  }

  #[test]
  fn validation_checks_per_atom_lengths_and_bonds() {
    assert!(water().validate().is_ok());
    let mut r = water();
    r.formal_charges.pop();
    assert!(r.validate().is_err());
    let mut r = water();
    r.bonds.push([0, 7, 1]);
    assert!(r.validate().is_err());
    assert!(SnapshotRecord::with_atoms(vec![]).validate().is_err());
  }

  #[test]
  fn accessors_follow_the_registry() {
    let mut r = water();
    r.scalars.beta_gap = Some(0.25);
    assert_eq!(r.numeric_value(NumericColumn::BetaGap), Some(0.25));
    assert_eq!(r.numeric_value(NumericColumn::Temperature), Some(DEFAULT_TEMPERATURE));
    assert_eq!(r.numeric_value(NumericColumn::Molwt), None);
    assert_eq!(r.class_value(ClassColumn::Functional), Some("B3LYP"));
    assert_eq!(r.class_value(ClassColumn::Solvent), None);
    assert!(!r.flag(BoolColumn::IsTs));
  }
}
