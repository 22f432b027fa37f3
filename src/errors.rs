use thiserror::Error;

/// Errors surfaced by the matching core.
///
/// `InvalidArgument` is reported to the caller synchronously, before any
/// lock/actor-send happens, and never touches the book. `InvariantViolation`
/// marks a bug: an unreachable state the matching algorithm is supposed to
/// make impossible (e.g. the FOK post-check failing, or `total_qty`
/// desyncing from the sum of resting quantities). It is fatal to the
/// symbol's book, not just to the one submit call.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("symbol actor is no longer accepting submissions")]
    ActorGone,
}

pub type EngineResult<T> = Result<T, EngineError>;
