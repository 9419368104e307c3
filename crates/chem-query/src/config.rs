// config.rs
use chem_domain::DomainError;

pub const DEFAULT_LIMIT: u64 = 100;
pub const MOLECULE_SIMILARITY_LIMIT: u64 = 5;
pub const SNAPSHOT_SIMILARITY_LIMIT: u64 = 1;
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Configuración de ejecución. Se lee del entorno (y de `.env` si existe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
  /// `CHEM_DB_URL` o, en su defecto, `DATABASE_URL`.
  pub database_url: Option<String>,
  pub pool_size: u32,
  pub default_limit: u64,
  pub similarity_limit: u64,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self { database_url: None,
           pool_size: DEFAULT_POOL_SIZE,
           default_limit: DEFAULT_LIMIT,
           similarity_limit: MOLECULE_SIMILARITY_LIMIT }
  }
}

impl QueryConfig {
  pub fn from_env() -> Result<Self, DomainError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Igual que `from_env` pero con una fuente de variables arbitraria.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, DomainError>
    where F: Fn(&str) -> Option<String>
  {
    let defaults = Self::default();
    let database_url = lookup("CHEM_DB_URL").or_else(|| lookup("DATABASE_URL"))
                                            .filter(|url| !url.trim().is_empty());
    Ok(Self { database_url,
              pool_size: parse_or(&lookup, "CHEM_DB_POOL_SIZE", defaults.pool_size)?,
              default_limit: parse_or(&lookup, "CHEM_DEFAULT_LIMIT", defaults.default_limit)?,
              similarity_limit: parse_or(&lookup, "CHEM_SIMILARITY_LIMIT", defaults.similarity_limit)? })
  }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, DomainError>
  where F: Fn(&str) -> Option<String>,
        T: std::str::FromStr
{
  match lookup(key) {
    None => Ok(default),
    Some(raw) => raw.trim()
                    .parse()
                    .map_err(|_| DomainError::ValidationError(format!("{} no es un número válido: '{}'", key, raw))),
  }
}
