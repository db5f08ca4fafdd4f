//! Graceful shutdown.
//!
//! Background tasks run in a `JoinSet` and share one cancellation token.
//! Shutdown cancels the token, then waits for the tasks within a grace
//! period before aborting the rest.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{SidecarError, SidecarResult};

type TaskExit = (&'static str, SidecarResult<()>);

/// Owns background tasks and the token that stops them.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: JoinSet<TaskExit>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown starts.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a tracked task.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = SidecarResult<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, future.await) });
    }

    /// Wait for the next task to finish; pends forever when none are
    /// running.
    pub async fn next_exit(&mut self) -> TaskExit {
        match self.tasks.join_next().await {
            Some(Ok(exit)) => exit,
            Some(Err(e)) => ("background task", Err(SidecarError::TaskFailed(e.to_string()))),
            None => std::future::pending().await,
        }
    }

    /// Cancel every task and wait up to `timeout` for them to finish.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!("Initiating graceful shutdown");
        self.token.cancel();

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok((name, Ok(()))) => info!(task = name, "Task stopped"),
                    Ok((name, Err(e))) => warn!(task = name, error = %e, "Task failed during shutdown"),
                    Err(e) => warn!(error = %e, "Task panicked during shutdown"),
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting remaining tasks");
            self.tasks.abort_all();
        }

        info!("Shutdown complete");
    }

    /// Returns the number of active tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Waits for SIGTERM or SIGINT.
///
/// A handler that cannot be installed is logged and treated as never
/// firing.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
