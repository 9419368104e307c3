// periodic_table.rs
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Símbolos de los elementos 1..=118, indexados por `numero_atomico - 1`.
pub const SYMBOLS: [&str; 118] =
  ["H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca", "Sc",
   "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb",
   "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd",
   "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au",
   "Hg", "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf",
   "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts",
   "Og"];

/// Pesos atómicos estándar (g/mol), mismo orden que `SYMBOLS`.
const WEIGHTS: [f64; 118] =
  [1.008, 4.003, 6.941, 9.012, 10.812, 12.011, 14.007, 15.999, 18.998, 20.18, 22.99, 24.305, 26.982, 28.086, 30.974,
   32.067, 35.453, 39.948, 39.098, 40.078, 44.956, 47.867, 50.942, 51.996, 54.938, 55.845, 58.933, 58.693, 63.546,
   65.39, 69.723, 72.61, 74.922, 78.96, 79.904, 83.8, 85.468, 87.62, 88.906, 91.224, 92.906, 95.94, 98.0, 101.07,
   102.906, 106.42, 107.868, 112.412, 114.818, 118.711, 121.76, 127.6, 126.904, 131.29, 132.905, 137.328, 138.906,
   140.116, 140.908, 144.24, 145.0, 150.36, 151.964, 157.25, 158.925, 162.5, 164.93, 167.26, 168.934, 173.04, 174.967,
   178.49, 180.948, 183.84, 186.207, 190.23, 192.217, 195.078, 196.967, 200.59, 204.383, 207.2, 208.98, 209.0, 210.0,
   222.0, 223.0, 226.0, 227.0, 232.038, 231.036, 238.029, 237.0, 244.0, 243.0, 247.0, 247.0, 251.0, 252.0, 257.0,
   258.0, 259.0, 262.0, 267.0, 268.0, 269.0, 270.0, 269.0, 278.0, 281.0, 282.0, 285.0, 286.0, 289.0, 290.0, 293.0,
   294.0, 294.0];

static BY_SYMBOL: Lazy<HashMap<&'static str, u8>> =
  Lazy::new(|| SYMBOLS.iter().enumerate().map(|(i, s)| (*s, (i + 1) as u8)).collect());

/// Elemento de la tabla periódica (número atómico 1..=118).
///
/// El orden (`Ord`) es el del número atómico, que es también el orden en el
/// que se escriben las cadenas de fórmula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Element(u8);

impl Element {
  pub const HYDROGEN: Element = Element(1);
  pub const CARBON: Element = Element(6);

  pub fn from_atomic_number(n: u8) -> Option<Self> {
    (1..=118).contains(&n).then_some(Self(n))
  }

  /// Búsqueda exacta (sensible a mayúsculas) del símbolo.
  pub fn from_symbol(symbol: &str) -> Option<Self> {
    BY_SYMBOL.get(symbol).map(|n| Self(*n))
  }

  pub fn atomic_number(&self) -> u8 {
    self.0
  }

  pub fn symbol(&self) -> &'static str {
    SYMBOLS[(self.0 - 1) as usize]
  }

  pub fn atomic_weight(&self) -> f64 {
    WEIGHTS[(self.0 - 1) as usize]
  }

  /// Todos los elementos en orden de número atómico.
  pub fn all() -> impl Iterator<Item = Element> {
    (1..=118u8).map(Element)
  }
}

impl fmt::Display for Element {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.symbol())
  }
}

impl Serialize for Element {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.symbol())
  }
}

impl<'de> Deserialize<'de> for Element {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Element::from_symbol(&s).ok_or_else(|| serde::de::Error::custom(format!("símbolo de elemento inválido: {}", s)))
  }
}

/// Cadena de fórmula: símbolos en orden de número atómico seguidos de su
/// conteo (el `1` también se escribe), p. ej. etanol `H6C2O1`. Los conteos
/// cero se omiten.
pub fn formula_string<'a, I>(counts: I) -> String
  where I: IntoIterator<Item = (&'a Element, &'a u32)>
{
  let mut entries: Vec<(Element, u32)> = counts.into_iter().filter(|(_, c)| **c > 0).map(|(e, c)| (*e, *c)).collect();
  entries.sort_by_key(|(e, _)| *e);
  entries.iter().map(|(e, c)| format!("{}{}", e.symbol(), c)).collect()
}

/// Inverso de [`formula_string`]. Devuelve `None` si la cadena no respeta el
/// formato `SimboloConteo...`.
pub fn parse_formula_string(formula: &str) -> Option<BTreeMap<Element, u32>> {
  let chars: Vec<char> = formula.chars().collect();
  let mut counts = BTreeMap::new();
  let mut i = 0;
  while i < chars.len() {
    if !chars[i].is_ascii_uppercase() {
      return None;
    }
    let mut symbol = chars[i].to_string();
    i += 1;
    if i < chars.len() && chars[i].is_ascii_lowercase() {
      symbol.push(chars[i]);
      i += 1;
    }
    let start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
      i += 1;
    }
    let digits: String = chars[start..i].iter().collect();
    let count: u32 = digits.parse().ok()?;
    *counts.entry(Element::from_symbol(&symbol)?).or_insert(0) += count;
  }
  Some(counts)
}
