use thiserror::Error;

/// Reasons a build can abort.
///
/// Apart from `InvalidOptions`, every variant reports a broken builder invariant: the build cannot continue and
/// whatever was constructed so far is discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Invalid build options: {0}")]
    InvalidOptions(String),

    #[error("Recursion depth {depth} exceeded while {count} primitives were still unassigned")]
    DepthExceeded { depth: usize, count: usize },

    #[error("Losing primitives during build: expected {expected}, found {found}")]
    PrimitivesLost { expected: usize, found: usize },

    #[error("A build worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, BuildError>;
