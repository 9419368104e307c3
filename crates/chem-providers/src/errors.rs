// errors.rs
use thiserror::Error;

/// Errores del motor químico.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
  /// La cadena de estructura (SMILES) no se pudo interpretar.
  #[error("Estructura inválida: {0}")]
  InvalidStructure(String),
  /// Método de fingerprint desconocido.
  #[error("Método de fingerprint inválido: {0}")]
  InvalidMethod(String),
}
