use std::path::PathBuf;

use thiserror::Error;

/// The container's record block could not be delimited or tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// A record does not carry the six required fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("record #{position} (line {line}, {title:?}) is missing field `{field}`")]
    MissingField {
        position: usize,
        line: usize,
        title: Option<String>,
        field: &'static str,
    },

    #[error("record #{position} (line {line}, {title:?}) has an empty `{field}`")]
    EmptyField {
        position: usize,
        line: usize,
        title: Option<String>,
        field: &'static str,
    },

    #[error("record #{position} (line {line}, {title:?}) repeats field `{field}`")]
    DuplicateField {
        position: usize,
        line: usize,
        title: Option<String>,
        field: &'static str,
    },
}

/// The rewritten catalog could not be produced or persisted safely.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("count mismatch: expected {expected} records, serialized {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("rendered catalog failed verification: {0}")]
    Verification(String),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that can occur in curator-core and the crates built on it.
#[derive(Debug, Error)]
pub enum CuratorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Audit entry not found: {0}")]
    AuditEntryNotFound(String),

    #[error("Record already present: {0}")]
    RecordAlreadyPresent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CuratorError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Parse(_) => ExitCode::ParseError,
            Self::Classification(_) => ExitCode::ClassificationError,
            Self::Write(_) => ExitCode::WriteError,
            Self::Config(_) | Self::TomlParse(_) | Self::TomlSerialize(_) => {
                ExitCode::ConfigError
            }
            Self::AuditEntryNotFound(_) => ExitCode::NotFound,
            Self::RecordAlreadyPresent(_) | Self::Io(_) | Self::Json(_) => {
                ExitCode::GeneralError
            }
        }
    }
}

/// Process exit codes used by the CLI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    ParseError = 3,
    ClassificationError = 4,
    WriteError = 5,
    ConfigError = 6,
}

pub type Result<T> = std::result::Result<T, CuratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let parse: CuratorError = ParseError::new(3, "bad").into();
        assert_eq!(parse.exit_code(), ExitCode::ParseError);
        assert_eq!(parse.to_string(), "parse error at line 3: bad");

        let write: CuratorError = WriteError::CountMismatch {
            expected: 4,
            actual: 5,
        }
        .into();
        assert_eq!(write.exit_code(), ExitCode::WriteError);
        assert_eq!(write.exit_code() as i32, 5);

        assert_eq!(
            CuratorError::Config("cap".into()).exit_code(),
            ExitCode::ConfigError
        );
        assert_eq!(
            CuratorError::AuditEntryNotFound("0190".into()).exit_code(),
            ExitCode::NotFound
        );
    }
}
