// Error taxonomy shared by every stage of a fixture load.
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    FileAccess,
    Connection,
    Parse,
    TypeResolution,
    Structural,
    Insert,
    Cancelled,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    field: Option<String>,
    index: Option<u64>,
    offset: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            field: None,
            index: None,
            offset: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    /// Dotted path to the offending field inside a document.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// 1-based position of the failing document in its source file.
    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// Byte offset of the failing object (or token) in its source file.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Prepend a path segment; called while unwinding out of nested values.
    pub fn within_field(mut self, segment: impl fmt::Display) -> Self {
        self.field = Some(match self.field.take() {
            Some(inner) => format!("{segment}.{inner}"),
            None => segment.to_string(),
        });
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Fill in document position without overwriting a more precise offset
    /// already recorded by the stage that failed.
    pub(crate) fn at_document(mut self, index: u64, offset: u64) -> Self {
        self.index.get_or_insert(index);
        self.offset.get_or_insert(offset);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(field) = &self.field {
            write!(f, " (field: {field})")?;
        }
        if let Some(index) = self.index {
            write!(f, " (document: {index})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::FileAccess => 3,
        ErrorKind::Connection => 4,
        ErrorKind::Parse => 5,
        ErrorKind::TypeResolution => 6,
        ErrorKind::Structural => 7,
        ErrorKind::Insert => 8,
        ErrorKind::Cancelled => 130,
    }
}
