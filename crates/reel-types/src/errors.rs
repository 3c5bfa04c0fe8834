use thiserror::Error;

pub type Result<T, E = ReelError> = std::result::Result<T, E>;

/// Unified error type covering failure scenarios across subsystems.
///
/// The enum is `Clone + PartialEq` because a terminal error is broadcast to
/// every result-channel subscriber and compared directly in calling code.
/// Renderer failures are carried as their formatted description in
/// [`ReelError::Rendering`]; renderer-internal error types never cross the
/// session boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReelError {
    #[error("recording duration must be greater than zero")]
    IllegalDuration,
    #[error("frames per second must be greater than zero")]
    IllegalFramesPerSecond,
    #[error("rendering error: {reason}")]
    Rendering { reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("surface error: {0}")]
    Surface(String),
}
