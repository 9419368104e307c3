use crate::{DomainError, NewFormula, SnapshotRecord};
use chem_providers::{ChemEngine, Element};
use std::collections::BTreeMap;

/// Estructura de ejemplo con sus descriptores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StubStructure {
  pub smiles: &'static str,
  pub qed: Option<f64>,
  pub logp: Option<f64>,
}

/// Datos de ejemplo deterministas para tests y para la demo de consola.
pub struct DomainStubs;

impl DomainStubs {
  pub const ETHANOL: &'static str = "CCO";

  /// Moléculas pequeñas. `CCO` y `COC` comparten fórmula.
  pub fn structures() -> Vec<StubStructure> {
    vec![StubStructure { smiles: "CCO", qed: Some(0.407), logp: Some(-0.0014) },
         StubStructure { smiles: "COC", qed: Some(0.385), logp: Some(0.26) },
         StubStructure { smiles: "CCN", qed: Some(0.411), logp: Some(0.0) },
         StubStructure { smiles: "CC=O", qed: Some(0.359), logp: Some(0.17) },
         StubStructure { smiles: "CC(=O)O", qed: Some(0.429), logp: Some(0.09) },
         StubStructure { smiles: "c1ccccc1", qed: Some(0.443), logp: Some(1.69) },
         StubStructure { smiles: "Oc1ccccc1", qed: Some(0.535), logp: Some(1.39) },
         StubStructure { smiles: "CCCC", qed: Some(0.437), logp: Some(1.81) },
         StubStructure { smiles: "O", qed: None, logp: None },
         StubStructure { smiles: "N", qed: None, logp: Some(0.16) }]
  }

  /// Fórmula `{C: 0, H: 4}`: sin carbono, útil para filtros de elemento.
  pub fn carbonless_formula() -> Result<NewFormula, DomainError> {
    let counts: BTreeMap<Element, u32> = [(Element::CARBON, 0), (Element::HYDROGEN, 4)].into_iter().collect();
    NewFormula::from_counts(counts)
  }

  /// Dos snapshots por estructura: uno optimizado en vacío y otro de estado
  /// de transición con solvente implícito. Las propiedades escalares se
  /// derivan del número de átomos para que los rangos sean predecibles.
  pub fn snapshot_records(engine: &ChemEngine, smiles: &str) -> Result<Vec<SnapshotRecord>, DomainError> {
    let graph = engine.parse(smiles)?.with_explicit_hydrogens();
    let atoms: Vec<u8> = graph.atoms().iter().map(|a| a.element.atomic_number()).collect();
    let n = atoms.len() as f64;
    let heavy = atoms.iter().filter(|z| **z > 1).count() as f64;

    let mut base = SnapshotRecord::with_atoms(atoms);
    base.coords = (0..base.atoms.len()).map(|i| {
                                         let t = i as f64;
                                         [1.1 * t, 0.5 * (t % 3.0), 0.25 * (t % 2.0)]
                                       })
                                       .collect();
    base.standard_coords = base.coords.clone();
    base.bonds = graph.bonds()
                      .iter()
                      .map(|b| [b.begin as i32, b.end as i32, b.order.code() as i32])
                      .collect();
    base.formal_charges = graph.atoms().iter().map(|a| i32::from(a.charge)).collect();
    base.qm_software = Some("Gaussian".to_string());
    base.qm_software_version = Some("16".to_string());
    base.functional = Some("B3LYP".to_string());
    base.keywords = Some("opt freq".to_string());
    base.scalars.single_point_energy = Some(-38.0 * heavy - 0.5 * (n - heavy));
    base.scalars.zero_point_correction = Some(0.0105 * n);
    base.scalars.alpha_homo = Some(-0.25 - 0.001 * n);
    base.scalars.alpha_lumo = Some(0.05 + 0.001 * n);
    base.scalars.alpha_gap = Some(0.30 + 0.002 * n);
    base.scalars.first_frequency = Some(100.0 + 10.0 * n);
    base.scalars.spin_multiplicity = Some(1.0);

    let mut optimized = base.clone();
    optimized.filename = Some(format!("{}_opt.log", smiles));
    optimized.basis = Some("6-31G(d)".to_string());
    optimized.is_optimized = true;

    let mut transition = base;
    transition.filename = Some(format!("{}_ts.log", smiles));
    transition.basis = Some("def2-SVP".to_string());
    transition.solvent_model = Some("SMD".to_string());
    transition.solvent = Some("water".to_string());
    transition.temperature = 350.0;
    transition.is_ts = true;
    transition.scalars.alpha_gap = transition.scalars.alpha_gap.map(|g| g - 0.1);
    transition.scalars.first_frequency = Some(-250.0);

    Ok(vec![optimized, transition])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stub_records_are_consistent_with_their_structure() {
    let engine = ChemEngine::init().unwrap();
    for s in DomainStubs::structures() {
      let expected = engine.formula_string(s.smiles).unwrap();
      for record in DomainStubs::snapshot_records(&engine, s.smiles).unwrap() {
        assert!(record.validate().is_ok(), "{}", s.smiles);
        assert_eq!(record.implied_formula_string().unwrap(), expected);
      }
    }
  }

  #[test]
  fn stub_snapshots_of_one_structure_hash_differently() {
    let engine = ChemEngine::init().unwrap();
    let records = DomainStubs::snapshot_records(&engine, DomainStubs::ETHANOL).unwrap();
    assert_ne!(records[0].hash_token().unwrap(), records[1].hash_token().unwrap());
  }

  #[test]
  fn carbonless_formula_has_no_carbon_entry() {
    let f = DomainStubs::carbonless_formula().unwrap();
    assert_eq!(f.formula_string, "H4");
    assert!(!f.elements.contains_key(&Element::CARBON));
  }
}
