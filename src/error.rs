use std::{borrow::Cow, fmt::Display};

pub type Result<T> = ::std::result::Result<T, Error>;

/// The fixed, closed set of failure kinds the reporting engine can raise.
///
/// Each kind carries a short machine code (see [`ErrorKind::code`]) that is stable across
/// releases and is what clients and the (external) HTTP layer key off of, as opposed to the
/// human-readable [`Display`] rendering which may change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A registry lookup referenced a dataset key that isn't registered.
    DatasetNotFound,

    /// A filter, sort, or selected-column reference named a column not present in the
    /// dataset's [`ColumnMeta`](crate::value::ColumnMeta) list.
    ColumnNotFound,

    /// A filter group or condition was malformed: wrong shape, bad operator/value pairing,
    /// or (translator-side) a pivot request against a dataset without pivot capability.
    FilterValidationError,

    /// A provider was asked for an aggregation or pivot it cannot fulfil.
    AggregationNotSupported,

    /// The underlying storage (in practice, the SQL backend) failed.
    BackendError,
}

impl ErrorKind {
    /// The short machine code carried over the wire, independent of the message text.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::DatasetNotFound => "dataset_not_found",
            ErrorKind::ColumnNotFound => "column_not_found",
            ErrorKind::FilterValidationError => "filter_validation_error",
            ErrorKind::AggregationNotSupported => "aggregation_not_supported",
            ErrorKind::BackendError => "backend_error",
        }
    }

    /// The HTTP status an external translator should map this kind to.
    ///
    /// Routing is out of scope for this crate, but the mapping table itself has exactly one
    /// correct answer and belongs here rather than being re-derived by every caller.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::DatasetNotFound => 404,
            ErrorKind::ColumnNotFound => 400,
            ErrorKind::FilterValidationError => 400,
            ErrorKind::AggregationNotSupported => 501,
            ErrorKind::BackendError => 400,
        }
    }

    pub fn with_source(self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::from(self).with_source(source)
    }

    pub fn with_message(self, message: impl Into<Cow<'static, str>>) -> Error {
        Error::from(self).with_message(message)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ErrorKind::DatasetNotFound => write!(f, "dataset not found"),
            ErrorKind::ColumnNotFound => write!(f, "column not found"),
            ErrorKind::FilterValidationError => write!(f, "filter validation error"),
            ErrorKind::AggregationNotSupported => write!(f, "aggregation not supported"),
            ErrorKind::BackendError => write!(f, "backend error"),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    message: Option<Cow<'static, str>>,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            source: None,
            message: None,
        }
    }
}

impl Error {
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The machine code carried over the wire for this error's kind.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// A [`ColumnNotFound`](ErrorKind::ColumnNotFound) referencing `name`, the shape every
    /// `query`/`aggregate` parameter check (selected columns, group-by columns, value columns)
    /// raises for an unknown column.
    pub fn unknown_column(name: &str) -> Self {
        ErrorKind::ColumnNotFound.with_message(format!("unknown column: {name}"))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message}"),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source = self.source.as_ref()?;
        Some(&**source)
    }
}
