/// Contract violations reported by the engine.
///
/// I/O and format failures travel as [`anyhow::Error`] with context; this
/// type covers the cases a caller may want to match on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is closed")]
    Closed,
}
