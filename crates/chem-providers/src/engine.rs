// engine.rs
use crate::fingerprint::{fingerprint, FingerprintMethod};
use crate::periodic_table::{formula_string, Element};
use crate::smiles::MolGraph;
use crate::EngineError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contrato del servicio de fingerprints que consume la capa de consultas.
///
/// Toda cadena de estructura que no se pueda interpretar produce
/// `EngineError::InvalidStructure`.
pub trait FingerprintService: Send + Sync {
  /// Vector de dimensión `FINGERPRINT_SIZE` para `structure`.
  fn embed(&self, structure: &str, method: FingerprintMethod) -> Result<Vec<f32>, EngineError>;

  /// SMILES canónico (independiente del orden de escritura de los átomos).
  fn canonicalize(&self, structure: &str) -> Result<String, EngineError>;

  /// Conteo de elementos con hidrógenos implícitos incluidos.
  fn element_counts(&self, structure: &str) -> Result<BTreeMap<Element, u32>, EngineError>;
}

/// Los cuatro fingerprints de una estructura.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintSet {
  pub morgan: Vec<f32>,
  pub rdk: Vec<f32>,
  pub atompair: Vec<f32>,
  pub torsion: Vec<f32>,
}

impl FingerprintSet {
  pub fn get(&self, method: FingerprintMethod) -> &[f32] {
    match method {
      FingerprintMethod::Morgan => &self.morgan,
      FingerprintMethod::Rdk => &self.rdk,
      FingerprintMethod::Atompair => &self.atompair,
      FingerprintMethod::Torsion => &self.torsion,
    }
  }
}

/// Motor químico en Rust puro. No guarda estado: cada llamada vuelve a
/// interpretar la estructura.
#[derive(Debug, Clone, Default)]
pub struct ChemEngine;

impl ChemEngine {
  pub fn init() -> Result<Self, EngineError> {
    log::debug!("ChemEngine inicializado (motor nativo)");
    Ok(Self)
  }

  pub fn parse(&self, structure: &str) -> Result<MolGraph, EngineError> {
    if structure.trim().is_empty() {
      return Err(EngineError::InvalidStructure("cadena vacía".to_string()));
    }
    MolGraph::parse(structure.trim())
  }

  /// Calcula los cuatro métodos en paralelo sobre un único grafo.
  pub fn embed_all(&self, structure: &str) -> Result<FingerprintSet, EngineError> {
    let graph = self.parse(structure)?.with_explicit_hydrogens();
    let mut vectors: Vec<Vec<f32>> = FingerprintMethod::ALL[..].par_iter().map(|m| fingerprint(&graph, *m)).collect();
    let torsion = vectors.pop().unwrap_or_default();
    let atompair = vectors.pop().unwrap_or_default();
    let rdk = vectors.pop().unwrap_or_default();
    let morgan = vectors.pop().unwrap_or_default();
    Ok(FingerprintSet { morgan, rdk, atompair, torsion })
  }

  pub fn formula_string(&self, structure: &str) -> Result<String, EngineError> {
    Ok(formula_string(&self.element_counts(structure)?))
  }

  pub fn molecular_weight(&self, structure: &str) -> Result<f64, EngineError> {
    Ok(self.element_counts(structure)?
           .iter()
           .map(|(e, c)| e.atomic_weight() * f64::from(*c))
           .sum())
  }

  /// Carga formal total y multiplicidad de espín suponiendo capa cerrada
  /// salvo que el número de electrones sea impar.
  pub fn charge_and_multiplicity(&self, structure: &str) -> Result<(i32, i32), EngineError> {
    let graph = self.parse(structure)?;
    let charge = graph.total_charge();
    let electrons: i64 = graph.element_counts()
                              .iter()
                              .map(|(e, c)| i64::from(e.atomic_number()) * i64::from(*c))
                              .sum::<i64>()
                         - i64::from(charge);
    Ok((charge, if electrons % 2 == 0 { 1 } else { 2 }))
  }
}

impl FingerprintService for ChemEngine {
  fn embed(&self, structure: &str, method: FingerprintMethod) -> Result<Vec<f32>, EngineError> {
    let graph = self.parse(structure)?.with_explicit_hydrogens();
    Ok(fingerprint(&graph, method))
  }

  fn canonicalize(&self, structure: &str) -> Result<String, EngineError> {
    Ok(self.parse(structure)?.canonical_smiles())
  }

  fn element_counts(&self, structure: &str) -> Result<BTreeMap<Element, u32>, EngineError> {
    Ok(self.parse(structure)?.element_counts())
  }
}
