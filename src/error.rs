use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// The reduce fixpoint ran out of passes, which means a configuration
    /// value (directly or transitively) references itself. Carries the
    /// best-effort text so the walker can log and keep going.
    #[error("expression did not settle after {max} passes: {text:?}")]
    FixpointOverflow { max: usize, text: String },
}
