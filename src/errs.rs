use std::fmt;

/// The five error kinds named by the error-handling design: bad input,
/// corrupted on-disk artifacts, an artifact that exists but is empty,
/// I/O failure, and an invariant that should be impossible by construction.
#[derive(Debug)]
pub enum DebarcerError {
    InputValidation(String),
    DataCorruption(String),
    EmptyArtifact(String),
    Io(String),
    LogicInvariant(String),
}

impl DebarcerError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputValidation(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::DataCorruption(msg.into())
    }

    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyArtifact(msg.into())
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self::LogicInvariant(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Per-region errors are recoverable: the region driver logs and moves
    /// on. `EmptyArtifact` is never fatal even at the top level.
    pub fn is_region_recoverable(&self) -> bool {
        !matches!(self, Self::LogicInvariant(_))
    }
}

impl fmt::Display for DebarcerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InputValidation(m) => write!(f, "invalid input: {m}"),
            Self::DataCorruption(m) => write!(f, "corrupted data: {m}"),
            Self::EmptyArtifact(m) => write!(f, "empty artifact: {m}"),
            Self::Io(m) => write!(f, "I/O error: {m}"),
            Self::LogicInvariant(m) => write!(f, "internal invariant violated: {m}"),
        }
    }
}

impl std::error::Error for DebarcerError {}

impl From<std::io::Error> for DebarcerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<String> for DebarcerError {
    fn from(s: String) -> Self {
        Self::InputValidation(s)
    }
}

impl From<&str> for DebarcerError {
    fn from(s: &str) -> Self {
        Self::InputValidation(s.to_owned())
    }
}
