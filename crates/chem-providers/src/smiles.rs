// smiles.rs
//
// Lector de SMILES (subconjunto orgánico, átomos entre corchetes, ramas,
// cierres de anillo y aromáticos en minúscula) y escritor de SMILES canónico.
use crate::periodic_table::Element;
use crate::EngineError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
  Single,
  Double,
  Triple,
  Quadruple,
  Aromatic,
}

impl BondOrder {
  fn from_char(c: char) -> Option<Self> {
    match c {
      '-' | '/' | '\\' => Some(Self::Single),
      '=' => Some(Self::Double),
      '#' => Some(Self::Triple),
      '$' => Some(Self::Quadruple),
      ':' => Some(Self::Aromatic),
      _ => None,
    }
  }

  /// Contribución a la valencia; un enlace aromático cuenta 1 y el átomo
  /// aromático suma el electrón restante.
  fn valence(self) -> u32 {
    match self {
      Self::Single | Self::Aromatic => 1,
      Self::Double => 2,
      Self::Triple => 3,
      Self::Quadruple => 4,
    }
  }

  pub fn code(self) -> u64 {
    match self {
      Self::Single => 1,
      Self::Double => 2,
      Self::Triple => 3,
      Self::Quadruple => 4,
      Self::Aromatic => 12,
    }
  }

  fn symbol(self, both_aromatic: bool) -> &'static str {
    match (self, both_aromatic) {
      (Self::Single, true) => "-",
      (Self::Single, false) => "",
      (Self::Double, _) => "=",
      (Self::Triple, _) => "#",
      (Self::Quadruple, _) => "$",
      (Self::Aromatic, true) => "",
      (Self::Aromatic, false) => ":",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
  pub element: Element,
  pub aromatic: bool,
  pub charge: i8,
  pub isotope: Option<u16>,
  /// Hidrógenos implícitos (o declarados entre corchetes) unidos al átomo.
  pub hydrogens: u8,
  pub bracket: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
  pub begin: usize,
  pub end: usize,
  pub order: BondOrder,
}

/// Grafo molecular: átomos, enlaces y lista de adyacencia
/// `adjacency[atomo] = [(vecino, indice_enlace)]`.
#[derive(Debug, Clone, Default)]
pub struct MolGraph {
  atoms: Vec<Atom>,
  bonds: Vec<Bond>,
  adjacency: Vec<Vec<(usize, usize)>>,
}

fn invalid(smiles: &str, reason: &str) -> EngineError {
  EngineError::InvalidStructure(format!("'{}': {}", smiles, reason))
}

fn default_valences(element: Element) -> &'static [u32] {
  match element.atomic_number() {
    5 => &[3],
    6 => &[4],
    7 => &[3, 5],
    8 => &[2],
    15 => &[3, 5],
    16 => &[2, 4, 6],
    9 | 17 | 35 | 53 => &[1],
    _ => &[],
  }
}

fn is_organic_subset(element: Element) -> bool {
  !default_valences(element).is_empty()
}

fn default_hydrogens(element: Element, aromatic: bool, bond_valence: u32) -> u8 {
  let valences = default_valences(element);
  let used = bond_valence + u32::from(aromatic);
  let h = if aromatic {
    valences.first().map(|v| v.saturating_sub(used)).unwrap_or(0)
  } else {
    valences.iter().find(|v| **v >= used).map(|v| v - used).unwrap_or(0)
  };
  h as u8
}

impl MolGraph {
  /// Interpreta una cadena SMILES. Falla con `InvalidStructure` ante
  /// cualquier error de sintaxis o de anillos/ramas sin cerrar.
  pub fn parse(smiles: &str) -> Result<Self, EngineError> {
    let trimmed = smiles.trim();
    if trimmed.is_empty() {
      return Err(invalid(smiles, "cadena vacía"));
    }
    let chars: Vec<char> = trimmed.chars().collect();
    let mut graph = MolGraph::default();
    let mut prev: Option<usize> = None;
    let mut branches: Vec<usize> = Vec::new();
    let mut pending: Option<BondOrder> = None;
    let mut rings: HashMap<u32, (usize, Option<BondOrder>)> = HashMap::new();
    let mut i = 0;
    while i < chars.len() {
      let c = chars[i];
      match c {
        '(' => {
          let p = prev.ok_or_else(|| invalid(smiles, "rama sin átomo previo"))?;
          branches.push(p);
          i += 1;
        }
        ')' => {
          if pending.is_some() {
            return Err(invalid(smiles, "enlace sin átomo al cerrar rama"));
          }
          prev = Some(branches.pop().ok_or_else(|| invalid(smiles, "paréntesis sin abrir"))?);
          i += 1;
        }
        '.' => {
          if pending.is_some() {
            return Err(invalid(smiles, "enlace antes de '.'"));
          }
          prev = None;
          i += 1;
        }
        '0'..='9' | '%' => {
          let (num, next) = if c == '%' {
            let digits: String = chars.iter().skip(i + 1).take(2).collect();
            if digits.len() != 2 || !digits.chars().all(|d| d.is_ascii_digit()) {
              return Err(invalid(smiles, "cierre de anillo '%' mal formado"));
            }
            (digits.parse::<u32>().map_err(|_| invalid(smiles, "cierre de anillo inválido"))?, i + 3)
          } else {
            (c.to_digit(10).unwrap_or(0), i + 1)
          };
          i = next;
          let current = prev.ok_or_else(|| invalid(smiles, "cierre de anillo sin átomo"))?;
          match rings.remove(&num) {
            Some((open, open_bond)) => {
              let order = match (pending.take(), open_bond) {
                (Some(a), Some(b)) if a != b => return Err(invalid(smiles, "enlaces de anillo contradictorios")),
                (Some(a), _) => a,
                (None, Some(b)) => b,
                (None, None) => graph.default_bond(open, current),
              };
              graph.add_bond(open, current, order).map_err(|r| invalid(smiles, r))?;
            }
            None => {
              rings.insert(num, (current, pending.take()));
            }
          }
        }
        '[' => {
          let close = chars[i..].iter()
                                 .position(|ch| *ch == ']')
                                 .map(|p| p + i)
                                 .ok_or_else(|| invalid(smiles, "corchete sin cerrar"))?;
          let atom = parse_bracket(&chars[i + 1..close]).ok_or_else(|| invalid(smiles, "átomo entre corchetes inválido"))?;
          graph.attach(atom, &mut prev, &mut pending).map_err(|r| invalid(smiles, r))?;
          i = close + 1;
        }
        _ => {
          if let Some(order) = BondOrder::from_char(c) {
            if pending.is_some() {
              return Err(invalid(smiles, "enlaces consecutivos"));
            }
            pending = Some(order);
            i += 1;
            continue;
          }
          let (element, aromatic, len) =
            parse_organic(&chars[i..]).ok_or_else(|| invalid(smiles, &format!("carácter inesperado '{}'", c)))?;
          let atom = Atom { element, aromatic, charge: 0, isotope: None, hydrogens: 0, bracket: false };
          graph.attach(atom, &mut prev, &mut pending).map_err(|r| invalid(smiles, r))?;
          i += len;
        }
      }
    }
    if pending.is_some() {
      return Err(invalid(smiles, "enlace colgante al final"));
    }
    if !branches.is_empty() {
      return Err(invalid(smiles, "rama sin cerrar"));
    }
    if !rings.is_empty() {
      return Err(invalid(smiles, "anillo sin cerrar"));
    }
    graph.assign_implicit_hydrogens();
    Ok(graph)
  }

  fn attach(&mut self, atom: Atom, prev: &mut Option<usize>, pending: &mut Option<BondOrder>) -> Result<(), &'static str> {
    let idx = self.atoms.len();
    self.atoms.push(atom);
    self.adjacency.push(Vec::new());
    if let Some(p) = *prev {
      let order = pending.take().unwrap_or_else(|| self.default_bond(p, idx));
      self.add_bond(p, idx, order)?;
    } else if pending.is_some() {
      return Err("enlace sin átomo previo");
    }
    *prev = Some(idx);
    Ok(())
  }

  fn default_bond(&self, a: usize, b: usize) -> BondOrder {
    if self.atoms[a].aromatic && self.atoms[b].aromatic {
      BondOrder::Aromatic
    } else {
      BondOrder::Single
    }
  }

  fn add_bond(&mut self, begin: usize, end: usize, order: BondOrder) -> Result<(), &'static str> {
    if begin == end {
      return Err("enlace de un átomo consigo mismo");
    }
    if self.adjacency[begin].iter().any(|(n, _)| *n == end) {
      return Err("enlace duplicado");
    }
    let bi = self.bonds.len();
    self.bonds.push(Bond { begin, end, order });
    self.adjacency[begin].push((end, bi));
    self.adjacency[end].push((begin, bi));
    Ok(())
  }

  fn bond_valence(&self, atom: usize) -> u32 {
    self.adjacency[atom].iter().map(|(_, bi)| self.bonds[*bi].order.valence()).sum()
  }

  fn assign_implicit_hydrogens(&mut self) {
    for i in 0..self.atoms.len() {
      if !self.atoms[i].bracket {
        let bv = self.bond_valence(i);
        self.atoms[i].hydrogens = default_hydrogens(self.atoms[i].element, self.atoms[i].aromatic, bv);
      }
    }
  }

  pub fn atoms(&self) -> &[Atom] {
    &self.atoms
  }

  pub fn bonds(&self) -> &[Bond] {
    &self.bonds
  }

  pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
    &self.adjacency[atom]
  }

  pub fn atom_count(&self) -> usize {
    self.atoms.len()
  }

  pub fn degree(&self, atom: usize) -> usize {
    self.adjacency[atom].len()
  }

  pub fn total_charge(&self) -> i32 {
    self.atoms.iter().map(|a| i32::from(a.charge)).sum()
  }

  /// Conteo de átomos por elemento, hidrógenos incluidos.
  pub fn element_counts(&self) -> BTreeMap<Element, u32> {
    let mut counts = BTreeMap::new();
    for atom in &self.atoms {
      *counts.entry(atom.element).or_insert(0) += 1;
      if atom.hydrogens > 0 {
        *counts.entry(Element::HYDROGEN).or_insert(0) += u32::from(atom.hydrogens);
      }
    }
    counts
  }

  /// Devuelve una copia del grafo con todos los hidrógenos como átomos.
  pub fn with_explicit_hydrogens(&self) -> MolGraph {
    let mut graph = MolGraph { atoms: Vec::with_capacity(self.atoms.len()),
                               bonds: self.bonds.clone(),
                               adjacency: self.adjacency.clone() };
    for atom in &self.atoms {
      graph.atoms.push(Atom { hydrogens: 0, bracket: true, ..atom.clone() });
    }
    for (i, atom) in self.atoms.iter().enumerate() {
      for _ in 0..atom.hydrogens {
        let h = Atom { element: Element::HYDROGEN,
                       aromatic: false,
                       charge: 0,
                       isotope: None,
                       hydrogens: 0,
                       bracket: true };
        let mut prev = Some(i);
        let mut pending = Some(BondOrder::Single);
        // `attach` sólo falla con enlaces duplicados, imposible aquí.
        let _ = graph.attach(h, &mut prev, &mut pending);
      }
    }
    graph
  }

  /// Marca los enlaces que pertenecen a algún anillo.
  pub fn ring_bonds(&self) -> Vec<bool> {
    (0..self.bonds.len()).map(|bi| {
                           let bond = self.bonds[bi];
                           let mut seen = vec![false; self.atoms.len()];
                           let mut queue = VecDeque::from([bond.begin]);
                           seen[bond.begin] = true;
                           while let Some(a) = queue.pop_front() {
                             for &(n, nbi) in &self.adjacency[a] {
                               if nbi != bi && !seen[n] {
                                 seen[n] = true;
                                 queue.push_back(n);
                               }
                             }
                           }
                           seen[bond.end]
                         })
                         .collect()
  }

  /// Distancias topológicas (número de enlaces) desde `start`.
  pub fn distances_from(&self, start: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; self.atoms.len()];
    dist[start] = Some(0);
    let mut queue = VecDeque::from([start]);
    while let Some(a) = queue.pop_front() {
      let d = dist[a].unwrap_or(0);
      for &(n, _) in &self.adjacency[a] {
        if dist[n].is_none() {
          dist[n] = Some(d + 1);
          queue.push_back(n);
        }
      }
    }
    dist
  }

  /// SMILES canónico: rangos por refinamiento iterativo de invariantes
  /// (estilo Morgan) y recorrido en profundidad ordenado por rango.
  pub fn canonical_smiles(&self) -> String {
    let ranks = self.canonical_ranks();
    let mut order: Vec<usize> = (0..self.atoms.len()).collect();
    order.sort_by_key(|a| ranks[*a]);
    let mut writer = CanonicalWriter::new(self, &ranks);
    let mut parts = Vec::new();
    for start in order {
      if writer.visited[start] {
        continue;
      }
      writer.visit(start, None);
      let mut out = String::new();
      writer.emit(start, &mut out);
      parts.push(out);
    }
    parts.join(".")
  }

  fn canonical_ranks(&self) -> Vec<usize> {
    let n = self.atoms.len();
    let invariants: Vec<(u8, bool, i8, u8, usize, u16)> = self.atoms
                                                              .iter()
                                                              .enumerate()
                                                              .map(|(i, a)| {
                                                                (a.element.atomic_number(),
                                                                 a.aromatic,
                                                                 a.charge,
                                                                 a.hydrogens,
                                                                 self.degree(i),
                                                                 a.isotope.unwrap_or(0))
                                                              })
                                                              .collect();
    let mut ranks = dense_rank(&invariants);
    loop {
      let keys: Vec<(usize, Vec<(usize, u64)>)> = (0..n).map(|a| {
                                                           let mut env: Vec<(usize, u64)> =
                                                             self.adjacency[a].iter()
                                                                              .map(|(b, bi)| {
                                                                                (ranks[*b], self.bonds[*bi].order.code())
                                                                              })
                                                                              .collect();
                                                           env.sort_unstable();
                                                           (ranks[a], env)
                                                         })
                                                         .collect();
      let refined = dense_rank(&keys);
      if class_count(&refined) > class_count(&ranks) {
        ranks = refined;
        continue;
      }
      ranks = refined;
      if class_count(&ranks) == n {
        return ranks;
      }
      // Romper el primer empate y volver a refinar.
      let tied = (0..n).filter(|a| ranks.iter().filter(|r| **r == ranks[*a]).count() > 1)
                       .min_by_key(|a| (ranks[*a], *a))
                       .unwrap_or(0);
      let bumped: Vec<usize> = ranks.iter()
                                    .enumerate()
                                    .map(|(a, r)| if a == tied { 2 * r } else { 2 * r + 1 })
                                    .collect();
      ranks = dense_rank(&bumped);
    }
  }
}

fn dense_rank<K: Ord>(keys: &[K]) -> Vec<usize> {
  let mut sorted: Vec<&K> = keys.iter().collect();
  sorted.sort();
  sorted.dedup();
  keys.iter().map(|k| sorted.partition_point(|s| *s < k)).collect()
}

fn class_count(ranks: &[usize]) -> usize {
  ranks.iter().collect::<HashSet<_>>().len()
}

struct CanonicalWriter<'a> {
  graph: &'a MolGraph,
  ranks: &'a [usize],
  visited: Vec<bool>,
  children: Vec<Vec<(usize, usize)>>,
  opens: Vec<Vec<usize>>,
  closes: Vec<Vec<usize>>,
  ring_seen: HashSet<usize>,
  digits_in_use: BTreeSet<u32>,
  digit_of: HashMap<usize, u32>,
}

impl<'a> CanonicalWriter<'a> {
  fn new(graph: &'a MolGraph, ranks: &'a [usize]) -> Self {
    let n = graph.atoms.len();
    Self { graph,
           ranks,
           visited: vec![false; n],
           children: vec![Vec::new(); n],
           opens: vec![Vec::new(); n],
           closes: vec![Vec::new(); n],
           ring_seen: HashSet::new(),
           digits_in_use: BTreeSet::new(),
           digit_of: HashMap::new() }
  }

  fn visit(&mut self, atom: usize, from_bond: Option<usize>) {
    self.visited[atom] = true;
    let mut neighbors = self.graph.adjacency[atom].clone();
    neighbors.sort_by_key(|(n, _)| self.ranks[*n]);
    for (n, bi) in neighbors {
      if Some(bi) == from_bond {
        continue;
      }
      if self.visited[n] {
        if self.ring_seen.insert(bi) {
          self.opens[n].push(bi);
          self.closes[atom].push(bi);
        }
      } else {
        self.children[atom].push((n, bi));
        self.visit(n, Some(bi));
      }
    }
  }

  fn bond_symbol(&self, bi: usize) -> &'static str {
    let bond = self.graph.bonds[bi];
    let both = self.graph.atoms[bond.begin].aromatic && self.graph.atoms[bond.end].aromatic;
    bond.order.symbol(both)
  }

  fn push_digit(out: &mut String, d: u32) {
    if d < 10 {
      out.push_str(&d.to_string());
    } else {
      out.push_str(&format!("%{:02}", d));
    }
  }

  fn emit(&mut self, atom: usize, out: &mut String) {
    out.push_str(&self.atom_token(atom));
    for bi in self.opens[atom].clone() {
      let d = (1..).find(|d| !self.digits_in_use.contains(d)).unwrap_or(1);
      self.digits_in_use.insert(d);
      self.digit_of.insert(bi, d);
      out.push_str(self.bond_symbol(bi));
      Self::push_digit(out, d);
    }
    for bi in self.closes[atom].clone() {
      if let Some(d) = self.digit_of.remove(&bi) {
        Self::push_digit(out, d);
        self.digits_in_use.remove(&d);
      }
    }
    let kids = self.children[atom].clone();
    for (k, (child, bi)) in kids.iter().enumerate() {
      let last = k + 1 == kids.len();
      if !last {
        out.push('(');
      }
      out.push_str(self.bond_symbol(*bi));
      self.emit(*child, out);
      if !last {
        out.push(')');
      }
    }
  }

  fn atom_token(&self, i: usize) -> String {
    let atom = &self.graph.atoms[i];
    let symbol = if atom.aromatic { atom.element.symbol().to_lowercase() } else { atom.element.symbol().to_string() };
    let implicit = default_hydrogens(atom.element, atom.aromatic, self.graph.bond_valence(i));
    if is_organic_subset(atom.element) && atom.charge == 0 && atom.isotope.is_none() && implicit == atom.hydrogens {
      return symbol;
    }
    let mut token = String::from("[");
    if let Some(iso) = atom.isotope {
      token.push_str(&iso.to_string());
    }
    token.push_str(&symbol);
    match atom.hydrogens {
      0 => {}
      1 => token.push('H'),
      h => token.push_str(&format!("H{}", h)),
    }
    match atom.charge {
      0 => {}
      1 => token.push('+'),
      -1 => token.push('-'),
      c if c > 0 => token.push_str(&format!("+{}", c)),
      c => token.push_str(&format!("-{}", -i32::from(c))),
    }
    token.push(']');
    token
  }
}

fn parse_organic(rest: &[char]) -> Option<(Element, bool, usize)> {
  let first = *rest.first()?;
  let second = rest.get(1).copied();
  match (first, second) {
    ('C', Some('l')) => return Element::from_symbol("Cl").map(|e| (e, false, 2)),
    ('B', Some('r')) => return Element::from_symbol("Br").map(|e| (e, false, 2)),
    _ => {}
  }
  let (symbol, aromatic) = match first {
    'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' => (first.to_string(), false),
    'b' | 'c' | 'n' | 'o' | 'p' | 's' => (first.to_ascii_uppercase().to_string(), true),
    _ => return None,
  };
  Element::from_symbol(&symbol).map(|e| (e, aromatic, 1))
}

fn parse_bracket(content: &[char]) -> Option<Atom> {
  let mut i = 0;
  let mut isotope = String::new();
  while i < content.len() && content[i].is_ascii_digit() {
    isotope.push(content[i]);
    i += 1;
  }
  let first = *content.get(i)?;
  let (element, aromatic) = if first.is_ascii_uppercase() {
    let two: Option<Element> = content.get(i + 1)
                                      .filter(|c| c.is_ascii_lowercase())
                                      .and_then(|c| Element::from_symbol(&format!("{}{}", first, c)));
    match two {
      Some(e) => {
        i += 2;
        (e, false)
      }
      None => {
        i += 1;
        (Element::from_symbol(&first.to_string())?, false)
      }
    }
  } else {
    let pair: String = content.iter().skip(i).take(2).collect();
    if pair == "se" || pair == "as" {
      i += 2;
      (Element::from_symbol(&format!("{}{}", pair[..1].to_uppercase(), &pair[1..]))?, true)
    } else if matches!(first, 'b' | 'c' | 'n' | 'o' | 'p' | 's') {
      i += 1;
      (Element::from_symbol(&first.to_ascii_uppercase().to_string())?, true)
    } else {
      return None;
    }
  };
  while i < content.len() && content[i] == '@' {
    i += 1;
  }
  let mut hydrogens = 0u8;
  if content.get(i) == Some(&'H') {
    i += 1;
    let mut digits = String::new();
    while i < content.len() && content[i].is_ascii_digit() {
      digits.push(content[i]);
      i += 1;
    }
    hydrogens = if digits.is_empty() { 1 } else { digits.parse().ok()? };
  }
  let mut charge = 0i8;
  if let Some(&sign) = content.get(i).filter(|c| **c == '+' || **c == '-') {
    let unit: i8 = if sign == '+' { 1 } else { -1 };
    i += 1;
    let mut digits = String::new();
    while i < content.len() && content[i].is_ascii_digit() {
      digits.push(content[i]);
      i += 1;
    }
    if digits.is_empty() {
      let mut magnitude = 1i8;
      while content.get(i) == Some(&sign) {
        magnitude = magnitude.checked_add(1)?;
        i += 1;
      }
      charge = unit.checked_mul(magnitude)?;
    } else {
      charge = unit.checked_mul(digits.parse::<i8>().ok()?)?;
    }
  }
  if content.get(i) == Some(&':') {
    i += 1;
    while i < content.len() && content[i].is_ascii_digit() {
      i += 1;
    }
  }
  if i != content.len() {
    return None;
  }
  let isotope = if isotope.is_empty() { None } else { Some(isotope.parse().ok()?) };
  Some(Atom { element, aromatic, charge, isotope, hydrogens, bracket: true })
}
