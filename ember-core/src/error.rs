use thiserror::Error;

/// Every way a compilation can fail.
///
/// The first error aborts the compilation; there is no recovery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("structural error: {0}")]
    Structural(String),
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },
    #[error("invalid assignment: {0}")]
    Mutability(String),
    #[error("invalid intrinsic use: {0}")]
    Intrinsic(String),
}

impl CoreError {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        CoreError::Structural(message.into())
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        CoreError::TypeMismatch(message.into())
    }

    pub(crate) fn undefined(name: impl Into<String>) -> Self {
        CoreError::UndefinedSymbol(name.into())
    }

    pub(crate) fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        CoreError::Duplicate {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn mutability(message: impl Into<String>) -> Self {
        CoreError::Mutability(message.into())
    }
}
