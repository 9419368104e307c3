// fingerprint.rs
//
// Cuatro fingerprints hasheados de 1024 bits calculados sobre el grafo con
// hidrógenos explícitos: circular (radio 3), caminos lineales (1..=7
// enlaces), pares de átomos y torsiones topológicas.
use crate::smiles::MolGraph;
use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dimensión fija de todos los fingerprints.
pub const FINGERPRINT_SIZE: usize = 1024;

const MORGAN_RADIUS: u64 = 3;
const MAX_PATH_BONDS: usize = 7;
const MAX_PAIR_DISTANCE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMethod {
  Morgan,
  Rdk,
  Atompair,
  Torsion,
}

impl FingerprintMethod {
  pub const ALL: [FingerprintMethod; 4] = [Self::Morgan, Self::Rdk, Self::Atompair, Self::Torsion];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Morgan => "morgan",
      Self::Rdk => "rdk",
      Self::Atompair => "atompair",
      Self::Torsion => "torsion",
    }
  }
}

impl FromStr for FingerprintMethod {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL.into_iter()
             .find(|m| m.as_str() == s)
             .ok_or_else(|| EngineError::InvalidMethod(s.to_string()))
  }
}

impl fmt::Display for FingerprintMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn feature_hash(parts: &[u64]) -> u64 {
  let mut hasher = blake3::Hasher::new();
  for p in parts {
    hasher.update(&p.to_le_bytes());
  }
  let digest = hasher.finalize();
  let mut head = [0u8; 8];
  head.copy_from_slice(&digest.as_bytes()[..8]);
  u64::from_le_bytes(head)
}

struct BitVector(Vec<f32>);

impl BitVector {
  fn new() -> Self {
    Self(vec![0.0; FINGERPRINT_SIZE])
  }

  fn set(&mut self, hash: u64) {
    self.0[(hash % FINGERPRINT_SIZE as u64) as usize] = 1.0;
  }
}

/// Calcula el fingerprint `method` de un grafo que ya tiene los hidrógenos
/// como átomos (`MolGraph::with_explicit_hydrogens`).
pub fn fingerprint(graph: &MolGraph, method: FingerprintMethod) -> Vec<f32> {
  let mut bits = BitVector::new();
  match method {
    FingerprintMethod::Morgan => morgan(graph, &mut bits),
    FingerprintMethod::Rdk => linear_paths(graph, &mut bits),
    FingerprintMethod::Atompair => atom_pairs(graph, &mut bits),
    FingerprintMethod::Torsion => torsions(graph, &mut bits),
  }
  bits.0
}

fn atom_code(graph: &MolGraph, atom: usize) -> u64 {
  let a = &graph.atoms()[atom];
  (u64::from(a.element.atomic_number()) << 16) | ((graph.degree(atom) as u64) << 1) | u64::from(a.aromatic)
}

fn morgan(graph: &MolGraph, bits: &mut BitVector) {
  let rings = graph.ring_bonds();
  let in_ring: Vec<bool> = (0..graph.atom_count()).map(|a| graph.neighbors(a).iter().any(|(_, bi)| rings[*bi]))
                                                  .collect();
  let mut ids: Vec<u64> = graph.atoms()
                               .iter()
                               .enumerate()
                               .map(|(i, a)| {
                                 feature_hash(&[u64::from(a.element.atomic_number()),
                                                graph.degree(i) as u64,
                                                (i32::from(a.charge) + 128) as u64,
                                                u64::from(a.aromatic),
                                                u64::from(in_ring[i])])
                               })
                               .collect();
  ids.iter().for_each(|id| bits.set(*id));
  for radius in 1..=MORGAN_RADIUS {
    let next: Vec<u64> = (0..graph.atom_count()).map(|a| {
                                                   let mut env: Vec<(u64, u64)> =
                                                     graph.neighbors(a)
                                                          .iter()
                                                          .map(|(n, bi)| (graph.bonds()[*bi].order.code(), ids[*n]))
                                                          .collect();
                                                   env.sort_unstable();
                                                   let mut parts = vec![radius, ids[a]];
                                                   for (code, id) in env {
                                                     parts.push(code);
                                                     parts.push(id);
                                                   }
                                                   feature_hash(&parts)
                                                 })
                                                 .collect();
    next.iter().for_each(|id| bits.set(*id));
    ids = next;
  }
}

/// Clave canónica de un camino: la menor de sus dos lecturas.
fn path_key(graph: &MolGraph, atoms: &[usize], bonds: &[usize], code: impl Fn(usize) -> u64) -> Vec<u64> {
  let mut forward = Vec::with_capacity(atoms.len() + bonds.len() + 1);
  forward.push(bonds.len() as u64);
  for (k, a) in atoms.iter().enumerate() {
    forward.push(code(*a));
    if let Some(bi) = bonds.get(k) {
      forward.push(graph.bonds()[*bi].order.code());
    }
  }
  let mut backward = vec![forward[0]];
  backward.extend(forward[1..].iter().rev());
  forward.min(backward)
}

fn walk_paths(graph: &MolGraph,
              atoms: &mut Vec<usize>,
              bonds: &mut Vec<usize>,
              max_bonds: usize,
              visit: &mut dyn FnMut(&[usize], &[usize])) {
  if !bonds.is_empty() {
    visit(atoms, bonds);
  }
  if bonds.len() == max_bonds {
    return;
  }
  let last = atoms[atoms.len() - 1];
  for &(n, bi) in graph.neighbors(last) {
    if atoms.contains(&n) {
      continue;
    }
    atoms.push(n);
    bonds.push(bi);
    walk_paths(graph, atoms, bonds, max_bonds, visit);
    atoms.pop();
    bonds.pop();
  }
}

fn linear_paths(graph: &MolGraph, bits: &mut BitVector) {
  let code = |a: usize| {
    let atom = &graph.atoms()[a];
    (u64::from(atom.element.atomic_number()) << 1) | u64::from(atom.aromatic)
  };
  for start in 0..graph.atom_count() {
    let mut atoms = vec![start];
    let mut bonds = Vec::new();
    walk_paths(graph,
               &mut atoms,
               &mut bonds,
               MAX_PATH_BONDS,
               &mut |path_atoms, path_bonds| bits.set(feature_hash(&path_key(graph, path_atoms, path_bonds, code))));
  }
}

fn atom_pairs(graph: &MolGraph, bits: &mut BitVector) {
  let n = graph.atom_count();
  for i in 0..n {
    let dist = graph.distances_from(i);
    for (j, d) in dist.iter().enumerate().skip(i + 1) {
      let Some(d) = *d else { continue };
      if d > MAX_PAIR_DISTANCE {
        continue;
      }
      let (ci, cj) = (atom_code(graph, i), atom_code(graph, j));
      bits.set(feature_hash(&[ci.min(cj), d as u64, ci.max(cj)]));
    }
  }
}

fn torsions(graph: &MolGraph, bits: &mut BitVector) {
  let code = |a: usize| atom_code(graph, a);
  for start in 0..graph.atom_count() {
    let mut atoms = vec![start];
    let mut bonds = Vec::new();
    walk_paths(graph, &mut atoms, &mut bonds, 3, &mut |path_atoms, path_bonds| {
      if path_bonds.len() == 3 {
        bits.set(feature_hash(&path_key(graph, path_atoms, path_bonds, code)));
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fp(smiles: &str, method: FingerprintMethod) -> Vec<f32> {
    fingerprint(&MolGraph::parse(smiles).unwrap().with_explicit_hydrogens(), method)
  }

  #[test]
  fn method_names_parse() {
    assert_eq!("morgan".parse::<FingerprintMethod>().unwrap(), FingerprintMethod::Morgan);
    assert_eq!("torsion".parse::<FingerprintMethod>().unwrap(), FingerprintMethod::Torsion);
    assert_eq!("Morgan".parse::<FingerprintMethod>(),
               Err(EngineError::InvalidMethod("Morgan".into())));
  }

  #[test]
  fn every_method_yields_a_binary_vector_of_fixed_size() {
    for method in FingerprintMethod::ALL {
      let v = fp("CC(=O)Oc1ccccc1C(=O)O", method);
      assert_eq!(v.len(), FINGERPRINT_SIZE);
      assert!(v.iter().all(|b| *b == 0.0 || *b == 1.0));
      assert!(v.iter().any(|b| *b == 1.0), "{method} set no bits");
    }
  }

  #[test]
  fn atom_order_does_not_change_the_fingerprint() {
    for method in FingerprintMethod::ALL {
      assert_eq!(fp("CCO", method), fp("OCC", method), "{method}");
    }
  }

  #[test]
  fn different_structures_differ() {
    assert_ne!(fp("CCO", FingerprintMethod::Morgan), fp("CCN", FingerprintMethod::Morgan));
  }
}
