/// Errors that can occur while translating or executing a template.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShiboriError {
    #[error("syntax error at line {line}, column {column}: {cause}\n  {source_line}")]
    SyntaxFailure {
        line: usize,
        column: usize,
        source_line: String,
        cause: String,
    },

    #[error("indentation error at line {line}, column {column}: {reason}\n  {source_line}")]
    IndentationFailure {
        line: usize,
        column: usize,
        source_line: String,
        reason: String,
    },

    #[error("runtime error at line {line}, column {column}: {cause}")]
    RuntimeFailure {
        line: usize,
        column: usize,
        #[source]
        cause: Box<ShiboriError>,
    },

    #[error("can't convert '{type_name}' object to str implicitly")]
    TypeMismatch { type_name: String },

    #[error("block bridge at line {line}, column {column} may not introduce a definition: {reason}")]
    GrammarFailure {
        line: usize,
        column: usize,
        reason: String,
    },

    #[error("invalid input: {description}")]
    InputTypeFailure { description: String },

    #[error("host error: {0}")]
    Host(String),
}

impl ShiboriError {
    pub(crate) fn runtime_at(line: usize, column: usize, cause: ShiboriError) -> Self {
        ShiboriError::RuntimeFailure {
            line,
            column,
            cause: Box::new(cause),
        }
    }
}
