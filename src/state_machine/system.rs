use tokio::time::Instant;

/// The [`SystemResource`] trait indicates that a type is a resource inherently provided by the
/// system context of the application.
///
/// State machines never call these themselves. The runner generates the resource and passes it in
/// as input, which keeps the machine replayable.
pub trait SystemResource {
    /// Produce an instance of this resource with no direct input, drawing only from the implicitly
    /// available global system context.
    fn generate() -> Self;
}

/// Uses the tokio clock so that a paused test runtime drives staleness deterministically.
impl SystemResource for Instant {
    fn generate() -> Self {
        Instant::now()
    }
}
