use thiserror::Error;

#[derive(Debug, Error)]
pub enum JtraceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for JtraceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JtraceError>;
