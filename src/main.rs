use chem_domain::{EntityKind, FormulaFilter, MoleculeFilter, SimilarityRequest, SnapshotFilter};
use chem_persistence::DieselChemStore;
use chem_providers::ChemEngine;
use chem_query::{snapshot_request, ChemStore, InMemoryChemStore, Ingestor, QueryConfig, Repositories,
                 SNAPSHOT_SIMILARITY_LIMIT};
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Consola interactiva sobre los repositorios de fórmulas, moléculas y
/// snapshots.
///
/// Con `CHEM_DB_URL` (o `DATABASE_URL`) se usa la base de datos; sin ella se
/// arranca un almacén en memoria con los datos de ejemplo.
///
/// Opciones soportadas:
/// 1) Contar registros
/// 2) Listar una entidad
/// 3) Filtrar con un cuerpo JSON
/// 4) Buscar una molécula por SMILES
/// 5) Búsqueda por similitud
/// 6) Cargar datos de ejemplo
/// 7) Salir
fn main() -> Result<(), Box<dyn Error>> {
  let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
  tracing_subscriber::registry().with(filter)
                                .with(tracing_subscriber::fmt::layer())
                                .init();

  let config = QueryConfig::from_env()?;
  let engine = Arc::new(ChemEngine::init()?);
  let store: Arc<dyn ChemStore> = match &config.database_url {
    Some(_) => Arc::new(DieselChemStore::from_config(&config)?),
    None => {
      tracing::warn!("sin CHEM_DB_URL: se usa un almacén en memoria con datos de ejemplo");
      let store: Arc<dyn ChemStore> = Arc::new(InMemoryChemStore::new());
      Ingestor::new(store.clone(), engine.clone()).seed_stubs(0)?;
      store
    }
  };
  let repos = Repositories::new(store.clone(), engine.clone());

  loop {
    println!("\n== qm9-query ==");
    println!("1) Contar registros");
    println!("2) Listar (formula | molecule | snapshot)");
    println!("3) Filtrar con JSON");
    println!("4) Buscar molécula por SMILES");
    println!("5) Búsqueda por similitud");
    println!("6) Cargar datos de ejemplo");
    println!("7) Salir");
    let choice = prompt("Elige una opción: ")?;
    match choice.trim() {
      "1" => {
        println!("fórmulas: {}", show(repos.formulas.count()));
        println!("moléculas: {}", show(repos.molecules.count()));
        println!("snapshots: {}", show(repos.snapshots.count()));
      }
      "2" => {
        let Some(entity) = read_entity()? else { continue };
        let skip = read_number("Skip (enter = 0): ", 0)?;
        let limit = read_number(&format!("Límite (enter = {}): ", config.default_limit), config.default_limit)?;
        print_rows(&repos, entity, None, skip, limit);
      }
      "3" => {
        let Some(entity) = read_entity()? else { continue };
        let body = prompt("Filtro JSON: ")?;
        let limit = read_number(&format!("Límite (enter = {}): ", config.default_limit), config.default_limit)?;
        print_rows(&repos, entity, Some(body.trim()), 0, limit);
      }
      "4" => {
        let smiles = prompt("SMILES: ")?;
        match repos.molecules.get_by_smiles(smiles.trim()) {
          Ok(Some(m)) => {
            println!("{}", m);
            match repos.molecules.formula_of(&m) {
              Ok(Some(f)) => println!("  {}", f),
              Ok(None) => println!("  (sin fórmula)"),
              Err(e) => eprintln!("Error leyendo la fórmula: {}", e),
            }
            match repos.snapshots.snapshots_of_structure(&m.smiles) {
              Ok(list) => list.iter().for_each(|s| println!("  {}", s)),
              Err(e) => eprintln!("Error leyendo snapshots: {}", e),
            }
          }
          Ok(None) => println!("No encontrada"),
          Err(e) => eprintln!("Error: {}", e),
        }
      }
      "5" => {
        let smiles = prompt("SMILES: ")?;
        let method = prompt("Método (morgan | rdk | atompair | torsion, enter = morgan): ")?;
        let distance = prompt("Distancia (l2 | inner_product | cosine, enter = cosine): ")?;
        let mut request = SimilarityRequest::new(smiles.trim());
        if !method.trim().is_empty() {
          request = request.with_method(method.trim());
        }
        if !distance.trim().is_empty() {
          request = request.with_distance(distance.trim());
        }
        match repos.molecules.search_by_structure(&request, 0, config.similarity_limit) {
          Ok(list) => list.iter().enumerate().for_each(|(i, m)| println!("{:>3}. {}", i + 1, m)),
          Err(e) => eprintln!("Error en la búsqueda: {}", e),
        }
        match repos.snapshots.search_by_structure(&snapshot_request(smiles.trim()), 0, SNAPSHOT_SIMILARITY_LIMIT) {
          Ok(list) => list.iter().for_each(|s| println!("  snapshot más cercano: {}", s)),
          Err(e) => eprintln!("Error en la búsqueda de snapshots: {}", e),
        }
      }
      "6" => {
        let owner = read_number("Owner id (enter = 0): ", 0)?;
        match Ingestor::new(store.clone(), engine.clone()).seed_stubs(owner as i64) {
          Ok(summary) => println!("Cargado: {:?}", summary),
          Err(e) => eprintln!("Error cargando datos: {}", e),
        }
      }
      "7" => {
        println!("Saliendo...");
        break;
      }
      other => {
        println!("Opción inválida: {}", other);
      }
    }
  }

  Ok(())
}

fn show<E: std::fmt::Display>(r: Result<u64, E>) -> String {
  r.map(|n| n.to_string()).unwrap_or_else(|e| format!("error: {}", e))
}

fn print_rows(repos: &Repositories, entity: EntityKind, body: Option<&str>, skip: u64, limit: u64) {
  let rows: Result<Vec<String>, Box<dyn Error>> = (|| {
    Ok(match entity {
      EntityKind::Formula => {
        let filter = body.map(serde_json::from_str::<FormulaFilter>).transpose()?;
        repos.formulas.query_by_filter(filter.as_ref(), skip, limit)?.iter().map(|f| f.to_string()).collect()
      }
      EntityKind::Molecule => {
        let filter = body.map(serde_json::from_str::<MoleculeFilter>).transpose()?;
        repos.molecules.query_by_filter(filter.as_ref(), skip, limit)?.iter().map(|m| m.to_string()).collect()
      }
      EntityKind::Snapshot => {
        let filter = body.map(serde_json::from_str::<SnapshotFilter>).transpose()?;
        repos.snapshots.query_by_filter(filter.as_ref(), skip, limit)?.iter().map(|s| s.to_string()).collect()
      }
    })
  })();
  match rows {
    Ok(rows) if rows.is_empty() => println!("(sin resultados)"),
    Ok(rows) => rows.iter().for_each(|r| println!("{}", r)),
    Err(e) => eprintln!("Error en la consulta: {}", e),
  }
}

fn read_entity() -> io::Result<Option<EntityKind>> {
  let raw = prompt("Entidad (formula | molecule | snapshot): ")?;
  let entity = EntityKind::ALL.into_iter().find(|e| e.table_name().trim_end_matches('s') == raw.trim());
  if entity.is_none() {
    eprintln!("Entidad inválida: {}", raw.trim());
  }
  Ok(entity)
}

fn read_number(msg: &str, default: u64) -> io::Result<u64> {
  let raw = prompt(msg)?;
  if raw.trim().is_empty() {
    return Ok(default);
  }
  Ok(raw.trim().parse().unwrap_or_else(|_| {
    eprintln!("Número inválido, se usa {}", default);
    default
  }))
}

fn prompt(msg: &str) -> io::Result<String> {
  print!("{}", msg);
  io::stdout().flush()?;
  let mut s = String::new();
  io::stdin().read_line(&mut s)?;
  Ok(s)
}
