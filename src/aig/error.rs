use thiserror::Error;

use super::AigLit;

/// The result of an AIG operation.
pub type Result<T> = std::result::Result<T, AigError>;

/// Error returned when building or reading an AIG failed.
#[derive(Debug, Error)]
pub enum AigError {
    /// A variable is defined twice (by inputs, latches or AND gates).
    #[error("variable of literal {0} is defined more than once")]
    DuplicateDefinition(AigLit),

    /// Inputs, latches and AND gates must be defined by even literals.
    #[error("literal {0} is defined but negated")]
    NegatedDefinition(AigLit),

    /// Variable 0 is the constant false.
    #[error("the constant literal cannot be redefined")]
    ConstantRedefined,

    /// A literal exceeds the maximum variable index of the header.
    #[error("literal {0} exceeds the maximum variable index {1}")]
    VariableOutOfRange(AigLit, u64),

    /// A literal is used but never defined.
    #[error("literal {0} is used but not defined")]
    UndefinedLiteral(AigLit),

    /// AND gates form a cycle which is not broken by a latch.
    #[error("combinational cycle through and gate {0}")]
    CombinationalCycle(AigLit),

    /// Circuits under analysis need at least one output, the last one being the alarm.
    #[error("the circuit has no outputs, the alarm output is mandatory")]
    MissingAlarm,

    /// Just forwarding a [`ParserError`].
    #[error("{0}")]
    ParserError(#[from] ParserError),
}

/// Error returned when parsing from file failed.
///
/// It is defined here because the `parser` module is private.
#[derive(Debug, Error)]
pub enum ParserError {
    /// All features are not supported (only the basics in fact).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Invalid token, something else was expected.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// An IO error occured (file doesn't exist, or doesn't have the right extension, ...).
    #[error("io error: {0}")]
    IoError(String),
}
