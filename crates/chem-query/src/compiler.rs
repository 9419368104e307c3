// compiler.rs
//
// Traduce una especificación de filtro a predicados sobre columnas de la
// lista blanca de la entidad. Columnas o símbolos no reconocidos se
// descartan sin error (sólo quedan en el log de debug).
use crate::plan::{ElementOp, Predicate};
use chem_domain::{BoolColumn, EntityKind, FilterSpec, MemberColumn, NumericColumn};
use chem_providers::Element;
use log::debug;

/// Compila `spec` para `entity`. Función pura; la parte de similitud no se
/// toca aquí.
pub fn compile(entity: EntityKind, spec: &FilterSpec) -> Vec<Predicate> {
  let mut predicates = Vec::new();
  if spec.is_empty() {
    return predicates;
  }

  for f in &spec.numeric_filters {
    match NumericColumn::resolve(entity, &f.column) {
      Some(column) => {
        let (min, max) = f.bounds();
        predicates.push(Predicate::Range { column, min, max });
      }
      None => debug!("{}: filtro numérico ignorado, columna '{}' fuera de la lista blanca", entity, f.column),
    }
  }

  for f in &spec.element_filters {
    match Element::from_symbol(&f.element) {
      Some(element) => predicates.push(Predicate::Element { element, op: ElementOp::from_count(f.count) }),
      None => debug!("{}: filtro de elemento ignorado, símbolo '{}' desconocido", entity, f.element),
    }
  }

  for f in &spec.class_filters {
    match MemberColumn::resolve(entity, &f.column) {
      Some(column) => {
        // un valor que no encaja con el tipo de la columna no puede coincidir
        let values = f.values
                      .iter()
                      .filter_map(|raw| {
                        let value = column.parse_value(raw);
                        if value.is_none() {
                          debug!("{}: valor '{}' descartado para '{}'", entity, raw, f.column);
                        }
                        value
                      })
                      .collect();
        predicates.push(Predicate::OneOf { column, values });
      }
      None => debug!("{}: filtro de clase ignorado, columna '{}'", entity, f.column),
    }
  }

  for f in &spec.bool_filters {
    match BoolColumn::resolve(entity, &f.column) {
      Some(column) => predicates.push(Predicate::Flag { column, value: f.value }),
      None => debug!("{}: filtro booleano ignorado, columna '{}'", entity, f.column),
    }
  }

  predicates
}

#[cfg(test)]
mod tests {
  use super::*;
  use chem_domain::{BoolFilter, ClassColumn, ClassFilter, ElementFilter, MemberValue, NumericFilter};

  fn spec() -> FilterSpec {
    FilterSpec { numeric_filters: vec![NumericFilter::between("molwt", 10.0, 50.0),
                                       NumericFilter::between("qed", 0.2, 0.9),
                                       NumericFilter::between("alpha_gap", 0.0, 1.0),
                                       NumericFilter::between("bogus", 0.0, 1.0)],
                 element_filters: vec![ElementFilter::new("C", -1),
                                       ElementFilter::new("N", 0),
                                       ElementFilter::new("O", 2),
                                       ElementFilter::new("Qq", 1)],
                 class_filters: vec![ClassFilter { column: "basis".into(), values: vec!["6-31G(d)".into()] },
                                     ClassFilter { column: "coords".into(), values: vec![] }],
                 bool_filters: vec![BoolFilter { column: "is_TS".into(), value: false },
                                    BoolFilter { column: "is_broken".into(), value: true }],
                 similarity: None }
  }

  #[test]
  fn formula_keeps_only_its_columns() {
    let predicates = compile(EntityKind::Formula, &spec());
    assert_eq!(predicates.len(), 4);
    assert_eq!(predicates[0],
               Predicate::Range { column: NumericColumn::Molwt, min: 10.0, max: 50.0 });
    assert!(predicates.iter().all(|p| p.table() == EntityKind::Formula));
  }

  #[test]
  fn molecule_adds_molecule_columns() {
    let predicates = compile(EntityKind::Molecule, &spec());
    assert_eq!(predicates.len(), 5);
    assert!(predicates.contains(&Predicate::Range { column: NumericColumn::Qed, min: 0.2, max: 0.9 }));
  }

  #[test]
  fn snapshot_accepts_class_and_bool_filters() {
    let predicates = compile(EntityKind::Snapshot, &spec());
    assert_eq!(predicates.len(), 8);
    assert!(predicates.contains(&Predicate::OneOf { column: MemberColumn::Class(ClassColumn::Basis),
                                                    values: vec![MemberValue::Text("6-31G(d)".into())] }));
    assert!(predicates.contains(&Predicate::Flag { column: BoolColumn::IsTs, value: false }));
  }

  #[test]
  fn element_counts_become_operators() {
    let predicates = compile(EntityKind::Formula, &spec());
    let ops: Vec<_> = predicates.iter()
                                .filter_map(|p| match p {
                                  Predicate::Element { element, op } => Some((element.symbol(), *op)),
                                  _ => None,
                                })
                                .collect();
    assert_eq!(ops, vec![("C", ElementOp::Present), ("N", ElementOp::Absent), ("O", ElementOp::Exactly(2))]);
  }

  #[test]
  fn membership_values_take_the_column_type() {
    let spec = FilterSpec { class_filters: vec![ClassFilter { column: "temperature".into(),
                                                              values: vec!["350".into(), "tibio".into()] },
                                                ClassFilter { column: "frame_id".into(), values: vec!["x".into()] }],
                            numeric_filters: vec![NumericFilter::between("temperature", 0.0, 1.0)],
                            ..FilterSpec::default() };
    let predicates = compile(EntityKind::Snapshot, &spec);
    let temperature = MemberColumn::Numeric(NumericColumn::Temperature);
    assert_eq!(predicates,
               vec![Predicate::OneOf { column: temperature, values: vec![MemberValue::Real(350.0)] },
                    Predicate::OneOf { column: MemberColumn::FrameId, values: vec![] }]);
    assert!(compile(EntityKind::Molecule, &spec).is_empty());
  }

  #[test]
  fn absent_bounds_are_unbounded() {
    let spec = FilterSpec { numeric_filters: vec![NumericFilter { column: "molwt".into(), min: None, max: Some(3.0) }],
                            ..FilterSpec::default() };
    assert_eq!(compile(EntityKind::Formula, &spec),
               vec![Predicate::Range { column: NumericColumn::Molwt, min: f64::NEG_INFINITY, max: 3.0 }]);
    assert!(compile(EntityKind::Snapshot, &FilterSpec::default()).is_empty());
  }
}
