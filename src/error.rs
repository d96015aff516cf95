//! Error types shared by the parser, document model and spine composer.

use core::fmt;

/// Processing phase where a parse error originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// Tag attribute tokenizing.
    Attributes,
    /// Markup tokenizing and tree building.
    Markup,
    /// Package (OPF) metadata parsing.
    Package,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Attributes => "attributes",
            Self::Markup => "markup",
            Self::Package => "package",
        };
        f.write_str(label)
    }
}

/// Structured parse failure.
///
/// Markup failures are fatal for the resource being parsed. Attribute
/// failures are normally caught by the document model and logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// Processing phase where this error originated.
    pub phase: ErrorPhase,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
    /// Character offset of the offending input, when known.
    pub offset: Option<usize>,
    /// Resource path, when known.
    pub path: Option<Box<str>>,
}

impl ParseError {
    pub(crate) fn new(phase: ErrorPhase, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            code,
            message: message.into().into_boxed_str(),
            offset: None,
            path: None,
        }
    }

    pub(crate) fn markup(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorPhase::Markup, code, message)
    }

    pub(crate) fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into().into_boxed_str());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error [{}]: {}", self.phase, self.code, self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " at offset {}", offset)?;
        }
        if let Some(path) = self.path.as_deref() {
            write!(f, " in {}", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Failure reported by a [`crate::reader::ResourceReader`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceError {
    /// No resource with this id exists in the archive.
    NotFound { id: String },
    /// The resource exists but could not be read or decoded.
    Read { id: String, message: String },
}

impl ResourceError {
    /// Resource id the error refers to.
    pub fn id(&self) -> &str {
        match self {
            Self::NotFound { id } | Self::Read { id, .. } => id,
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "resource not found: {}", id),
            Self::Read { id, message } => write!(f, "failed to read resource {}: {}", id, message),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Error returned by spine-level operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EpubError {
    /// A spine resource or the package document failed to parse.
    Parse(ParseError),
    /// A resource could not be read.
    Resource(ResourceError),
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{}", err),
            Self::Resource(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EpubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Resource(err) => Some(err),
        }
    }
}

impl From<ParseError> for EpubError {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<ResourceError> for EpubError {
    fn from(value: ResourceError) -> Self {
        Self::Resource(value)
    }
}
