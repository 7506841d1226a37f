use thiserror::Error;

/// Errors raised while tokenizing, parsing or translating HLSL.
///
/// Every variant carries the 1-based source line the problem was detected on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HlslError {
    #[error("line {line}: unexpected character {found:?}")]
    Tokenize { line: u32, found: char },
    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: u32 },
    #[error("line {line}: expected {expected}, found {found}")]
    Parse {
        line: u32,
        expected: String,
        found: String,
    },
    #[error("line {line}: unknown type `{name}`")]
    UnknownType { line: u32, name: String },
    #[error("line {line}: shader defines more than one `main` function")]
    MultipleMain { line: u32 },
    #[error("line {line}: shader does not define a `main` function")]
    MissingMain { line: u32 },
    #[error("line {line}: unsupported semantic `{semantic}` ({reason})")]
    UnsupportedSemantic {
        line: u32,
        semantic: String,
        reason: &'static str,
    },
    #[error("line {line}: unsupported construct: {what}")]
    Unsupported { line: u32, what: String },
    #[error("line {line}: unknown identifier `{name}`")]
    UnknownIdentifier { line: u32, name: String },
    #[error("line {line}: register {kind}{index} is already assigned to `{other}`")]
    RegisterConflict {
        line: u32,
        kind: char,
        index: u32,
        other: String,
    },
    #[error("line {line}: register {kind}{index} is out of range (max {max} slots)")]
    RegisterOutOfRange {
        line: u32,
        kind: char,
        index: u32,
        max: u32,
    },
}

impl HlslError {
    /// Source line the error refers to.
    pub fn line(&self) -> u32 {
        match self {
            HlslError::Tokenize { line, .. }
            | HlslError::UnterminatedComment { line }
            | HlslError::Parse { line, .. }
            | HlslError::UnknownType { line, .. }
            | HlslError::MultipleMain { line }
            | HlslError::MissingMain { line }
            | HlslError::UnsupportedSemantic { line, .. }
            | HlslError::Unsupported { line, .. }
            | HlslError::UnknownIdentifier { line, .. }
            | HlslError::RegisterConflict { line, .. }
            | HlslError::RegisterOutOfRange { line, .. } => *line,
        }
    }

    pub(crate) fn unsupported(line: u32, what: impl Into<String>) -> Self {
        HlslError::Unsupported {
            line,
            what: what.into(),
        }
    }
}
