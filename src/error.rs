use thiserror::Error;

/// Classified per-profile execution errors.
///
/// Each variant maps to a distinct failure class so call sites can react to
/// the kind (retry credentials, abort the profile, keep siblings running)
/// instead of re-parsing message text.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Missing or unreadable configuration: var file, backend config,
    /// unknown profile. Reported before any subprocess runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// The command vector could not be built for this profile.
    #[error("command build failed: {0}")]
    Build(String),

    /// The external tool could not be spawned or exited nonzero.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Provider session expired and could not be recovered.
    #[error("credential error: {0}")]
    Credential(String),
}
