// formula.rs
use crate::{DomainError, NumericColumn};
use chem_providers::{formula_string, parse_formula_string, Element};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identidad de composición elemental compartida por varias moléculas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
  pub id: i64,
  pub formula_string: String,
  /// Sólo los elementos con conteo distinto de cero.
  pub elements: BTreeMap<Element, u32>,
  pub molwt: f64,
  pub atom_number: i32,
  pub molecule_number: i32,
  pub molecule_ids: Vec<i64>,
  pub commit_time: NaiveDateTime,
  pub update_time: NaiveDateTime,
}

impl Formula {
  pub fn count_of(&self, element: Element) -> u32 {
    self.elements.get(&element).copied().unwrap_or(0)
  }

  pub fn numeric_value(&self, column: NumericColumn) -> Option<f64> {
    match column {
      NumericColumn::Molwt => Some(self.molwt),
      NumericColumn::AtomNumber => Some(f64::from(self.atom_number)),
      _ => None,
    }
  }

  pub fn check_invariants(&self) -> Result<(), DomainError> {
    if self.molecule_number as usize != self.molecule_ids.len() {
      return Err(DomainError::ValidationError(format!("{}: molecule_number={} pero hay {} ids",
                                                      self.formula_string,
                                                      self.molecule_number,
                                                      self.molecule_ids.len())));
    }
    Ok(())
  }
}

impl fmt::Display for Formula {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f,
           "Formula(#{} {}, molwt: {:.3}, átomos: {}, moléculas: {})",
           self.id, self.formula_string, self.molwt, self.atom_number, self.molecule_number)
  }
}

/// Datos de una fórmula aún no persistida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFormula {
  pub formula_string: String,
  pub elements: BTreeMap<Element, u32>,
  pub molwt: f64,
  pub atom_number: i32,
}

impl NewFormula {
  pub fn from_counts(counts: BTreeMap<Element, u32>) -> Result<Self, DomainError> {
    let elements: BTreeMap<Element, u32> = counts.into_iter().filter(|(_, c)| *c > 0).collect();
    if elements.is_empty() {
      return Err(DomainError::ValidationError("la fórmula no tiene átomos".to_string()));
    }
    let molwt = elements.iter().map(|(e, c)| e.atomic_weight() * f64::from(*c)).sum();
    let atom_number = elements.values().sum::<u32>() as i32;
    Ok(Self { formula_string: formula_string(&elements), elements, molwt, atom_number })
  }

  pub fn from_formula_string(formula: &str) -> Result<Self, DomainError> {
    let counts = parse_formula_string(formula).ok_or_else(|| {
                                                 DomainError::ValidationError(format!("cadena de fórmula inválida: {}",
                                                                                      formula))
                                               })?;
    Self::from_counts(counts)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ethanol_from_counts() {
    let f = NewFormula::from_formula_string("C2H6O1").unwrap();
    assert_eq!(f.formula_string, "H6C2O1");
    assert_eq!(f.atom_number, 9);
    assert!((f.molwt - 46.069).abs() < 1e-3);
  }

  #[test]
  fn zero_counts_are_dropped() {
    let counts = [(Element::CARBON, 0), (Element::HYDROGEN, 2)].into_iter().collect();
    let f = NewFormula::from_counts(counts).unwrap();
    assert_eq!(f.formula_string, "H2");
    assert_eq!(f.elements.len(), 1);
    assert!(NewFormula::from_counts(BTreeMap::new()).is_err());
    assert!(NewFormula::from_formula_string("C2h").is_err());
  }
}
