/// Operator-visible output channel, provided by the console layer.
///
/// Distinct from `tracing`: everything sent here is meant for the
/// human at the console, not for diagnostics.
pub trait MessageSink: Send + Sync {
    fn message(&self, text: &str);
}
