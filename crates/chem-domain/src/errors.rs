// errors.rs
use chem_providers::EngineError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
  /// Búsqueda por id o clave natural sin resultado, para quien prefiera un
  /// error en lugar de `None`.
  #[error("{entity} no encontrado: {key}")]
  NotFound { entity: &'static str, key: String },
  #[error("Estructura inválida: {0}")]
  InvalidStructure(String),
  #[error("Método de fingerprint inválido: {0}")]
  InvalidMethod(String),
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("Error externo: {0}")]
  ExternalError(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
}

impl From<EngineError> for DomainError {
  fn from(e: EngineError) -> Self {
    match e {
      EngineError::InvalidStructure(s) => Self::InvalidStructure(s),
      EngineError::InvalidMethod(m) => Self::InvalidMethod(m),
    }
  }
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

/// Convierte la ausencia de resultado en `DomainError::NotFound`.
pub trait FoundExt<T> {
  fn or_not_found(self, entity: &'static str, key: impl ToString) -> Result<T, DomainError>;
}

impl<T> FoundExt<T> for Option<T> {
  fn or_not_found(self, entity: &'static str, key: impl ToString) -> Result<T, DomainError> {
    self.ok_or_else(|| DomainError::NotFound { entity, key: key.to_string() })
  }
}

impl<T> FoundExt<T> for Result<Option<T>, DomainError> {
  fn or_not_found(self, entity: &'static str, key: impl ToString) -> Result<T, DomainError> {
    self?.or_not_found(entity, key)
  }
}
