/*!
 * Cooperative cancellation for a card run.
 *
 * A run shares one `CancellationController`. `request_abort` flips the run
 * out of the running state; every suspension point in the pipeline checks
 * `is_running` and stops before starting new work. In-flight provider calls
 * are never interrupted, their results are simply dropped.
 */

use log::info;
use tokio_util::sync::CancellationToken;

/// Shared running flag for one run
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    /// Create a controller in the running state
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Whether the run may keep going
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop the run. Idempotent.
    pub fn request_abort(&self) {
        if self.is_running() {
            info!("Abort requested");
        }
        self.token.cancel();
    }

    /// Resolves once the run has been aborted
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// A controller that stops when this one does, but can also be stopped on its own.
    ///
    /// The orchestrator uses it to halt workers after a fatal error without
    /// reporting the run as aborted.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}
