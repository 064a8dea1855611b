use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No active index, malformed field declaration, bad config file
    Configuration,
    /// Caller error in a query; raised before any backend call
    QueryParse,
    /// Index backend unreachable or write rejected; retryable
    Backend,
    /// Entity cannot be projected into a document; not retryable
    MalformedDocument,
    /// Authoritative store could not be consulted while checking staleness
    StalenessCheck,
    /// Visibility predicate could not be evaluated
    PermissionCheck,
    NotFound,
    InvalidArgument,
    Internal,
}

#[derive(Debug, Clone, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn configuration(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Configuration, context.into())
    }

    pub fn query_parse(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::QueryParse, context.into())
    }

    pub fn backend(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Backend, context.into())
    }

    pub fn malformed(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::MalformedDocument, context.into())
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context.into())
    }

    /// Only backend I/O failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Backend
    }

    /// Re-tag an error from a collaborator, keeping its message
    pub fn with_kind(self, kind: ErrorKind) -> Self {
        Error {
            kind,
            context: self.context,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Backend,
            context: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error {
            kind: ErrorKind::Configuration,
            context: format!("TOML parse error: {}", err),
        }
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error {
            kind: ErrorKind::Configuration,
            context: format!("TOML write error: {}", err),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error {
            kind: ErrorKind::Backend,
            context: err.error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
