use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// Result that is a wrapper of `Result<T, tablevault::Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// ErrorKind is all kinds of Error of tablevault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// tablevault doesn't know what happened here, and no actions other than
    /// just returning it back. For example, the database driver returns an
    /// internal error.
    Unexpected,

    /// Configuration is missing or malformed.
    ConfigInvalid,

    /// The table does not exist or its column metadata can't be read.
    SchemaInference,

    /// A row value can't be coerced into the logical type of its field.
    ///
    /// This is a table level failure: a backup never ships a partial
    /// snapshot.
    Serialization,

    /// Network, auth or service failure while talking to the object store.
    StoreTransport,

    /// No backup exists for the requested table.
    NotFound,

    /// The container is corrupt, truncated or doesn't match the expected
    /// layout.
    Format,

    /// A row violates a uniqueness or foreign key rule while being applied.
    Constraint,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::SchemaInference => "SchemaInferenceError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::StoreTransport => "StoreTransportError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Format => "FormatError",
            ErrorKind::Constraint => "ConstraintError",
        }
    }
}

/// Error is the error struct returned by all tablevault functions.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "    {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source: {source:?}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),

            context: Vec::default(),
            source: None,
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(src.into());
        self
    }

    /// Replace the kind of this error, keeping message, context and source.
    pub(crate) fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<apache_avro::Error> for Error {
    fn from(v: apache_avro::Error) -> Self {
        Self::new(ErrorKind::Format, "handling avro data failed").set_source(v)
    }
}

impl From<serde_json::Error> for Error {
    fn from(v: serde_json::Error) -> Self {
        Self::new(ErrorKind::Format, "handling json data failed").set_source(v)
    }
}

impl From<opendal::Error> for Error {
    fn from(v: opendal::Error) -> Self {
        match v.kind() {
            opendal::ErrorKind::NotFound => {
                Self::new(ErrorKind::NotFound, "object not found").set_source(v)
            }
            _ => Self::new(ErrorKind::StoreTransport, "IO operation failed").set_source(v),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(v: rusqlite::Error) -> Self {
        match v.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                Self::new(ErrorKind::Constraint, "row violates a table constraint").set_source(v)
            }
            _ => Self::new(ErrorKind::Unexpected, "database operation failed").set_source(v),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(v: url::ParseError) -> Self {
        Self::new(ErrorKind::ConfigInvalid, "parsing url failed").set_source(v)
    }
}
