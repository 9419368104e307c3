// molecule.rs
use crate::{DomainError, FingerprintColumn, NumericColumn};
use chem_providers::{ChemEngine, FingerprintSet, FINGERPRINT_SIZE};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estructura topológica única perteneciente a una fórmula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
  pub id: i64,
  pub smiles: String,
  pub total_charge: i32,
  pub total_multiplicity: i32,
  pub qed: Option<f64>,
  pub logp: Option<f64>,
  #[serde(skip_serializing, default)]
  pub fingerprints: FingerprintSet,
  pub formula_id: i64,
  pub snapshot_number: i32,
  pub snapshot_ids: Vec<i64>,
  pub commit_time: NaiveDateTime,
  pub update_time: NaiveDateTime,
}

impl Molecule {
  pub fn numeric_value(&self, column: NumericColumn) -> Option<f64> {
    match column {
      NumericColumn::TotalMultiplicity => Some(f64::from(self.total_multiplicity)),
      NumericColumn::Qed => self.qed,
      NumericColumn::Logp => self.logp,
      _ => None,
    }
  }

  pub fn fingerprint(&self, column: FingerprintColumn) -> &[f32] {
    self.fingerprints.get(column.method())
  }

  pub fn check_invariants(&self) -> Result<(), DomainError> {
    check_fingerprints(&self.smiles, &self.fingerprints)?;
    if self.snapshot_number as usize != self.snapshot_ids.len() {
      return Err(DomainError::ValidationError(format!("{}: snapshot_number={} pero hay {} ids",
                                                      self.smiles,
                                                      self.snapshot_number,
                                                      self.snapshot_ids.len())));
    }
    Ok(())
  }
}

impl fmt::Display for Molecule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f,
           "Molecule(#{} SMILES: {}, carga: {}, multiplicidad: {}, snapshots: {})",
           self.id, self.smiles, self.total_charge, self.total_multiplicity, self.snapshot_number)
  }
}

fn check_fingerprints(smiles: &str, set: &FingerprintSet) -> Result<(), DomainError> {
  for column in FingerprintColumn::ALL {
    let len = set.get(column.method()).len();
    if len != FINGERPRINT_SIZE {
      return Err(DomainError::ValidationError(format!("{}: {} tiene dimensión {} (se esperaba {})",
                                                      smiles,
                                                      column.column_name(),
                                                      len,
                                                      FINGERPRINT_SIZE)));
    }
  }
  Ok(())
}

/// Datos de una molécula aún no persistida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMolecule {
  pub smiles: String,
  pub total_charge: i32,
  pub total_multiplicity: i32,
  pub qed: Option<f64>,
  pub logp: Option<f64>,
  pub fingerprints: FingerprintSet,
  pub formula_id: i64,
}

impl NewMolecule {
  /// Calcula carga, multiplicidad y los cuatro fingerprints. El SMILES se
  /// guarda tal cual llega: es la clave natural.
  pub fn from_structure(engine: &ChemEngine, smiles: &str, formula_id: i64) -> Result<Self, DomainError> {
    if smiles.trim().is_empty() {
      return Err(DomainError::ValidationError("SMILES no puede estar vacío".to_string()));
    }
    let (total_charge, total_multiplicity) = engine.charge_and_multiplicity(smiles)?;
    let fingerprints = engine.embed_all(smiles)?;
    Ok(Self { smiles: smiles.to_string(),
              total_charge,
              total_multiplicity,
              qed: None,
              logp: None,
              fingerprints,
              formula_id })
  }

  pub fn with_descriptors(mut self, qed: Option<f64>, logp: Option<f64>) -> Self {
    self.qed = qed;
    self.logp = logp;
    self
  }

  pub fn validate(&self) -> Result<(), DomainError> {
    check_fingerprints(&self.smiles, &self.fingerprints)
  }
}
