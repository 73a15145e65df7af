//! A concurrent application runner that manages long-running processes with graceful shutdown.
//!
//! Processes run side by side until a shutdown signal arrives or one of them
//! fails. Each process gets a [`CancellationToken`] and is expected to wind
//! down once it fires; the runner waits for every process to return, then
//! runs the registered closers under a timeout.
//!
//! # Example
//!
//! ```no_run
//! use bridge_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let outcome = Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("Cleaning up resources");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Takes a cancellation token and returns the future running the process
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup step run once every process has stopped
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

/// How a [`Runner::run`] ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every process returned cleanly, or shutdown was requested
    Completed,
    /// A process failed or panicked and took the others down
    Failed {
        process: String,
        error: anyhow::Error,
    },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed { .. } => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner with no processes and a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds a process identified by `name` in logs and in [`RunOutcome`].
    ///
    /// If any process returns an error, all processes are cancelled.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds a closer. Closers run after all processes have stopped,
    /// whatever the reason, and one failing closer does not stop the others.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Runs all processes until they return, a signal arrives, or one of
    /// them fails. Closers always run afterwards.
    pub async fn run(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();
        let mut names = HashMap::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            info!(process = %name, "starting app process");
            let handle = join_set.spawn(async move { process(process_token).await });
            names.insert(handle.id(), name);
        }

        let signal_handler = spawn_signal_handler(token.clone());

        let mut outcome = RunOutcome::Completed;
        while let Some(result) = join_set.join_next_with_id().await {
            match result {
                Ok((id, Ok(()))) => {
                    debug!(process = %process_name(&names, id), "app process completed");
                }
                Ok((id, Err(err))) => {
                    let name = process_name(&names, id);
                    if token.is_cancelled() {
                        debug!(process = %name, "app process returned error during shutdown: {:#}", err);
                    } else {
                        error!(process = %name, "app process error: {:#}", err);
                        outcome = RunOutcome::Failed {
                            process: name,
                            error: err,
                        };
                        token.cancel();
                    }
                }
                Err(err) => {
                    let name = process_name(&names, err.id());
                    error!(process = %name, "app process panicked: {}", err);
                    if !outcome.is_failure() {
                        outcome = RunOutcome::Failed {
                            process: name,
                            error: anyhow::anyhow!("app process panicked: {err}"),
                        };
                    }
                    token.cancel();
                }
            }
        }

        signal_handler.abort();

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!(timeout = ?self.closer_timeout, "closers timed out"),
            }
        }

        match &outcome {
            RunOutcome::Completed => info!("application exiting normally"),
            RunOutcome::Failed { process, error } => {
                error!(process = %process, "application exiting with error: {:#}", error)
            }
        }
        outcome
    }
}

fn process_name(names: &HashMap<Id, String>, id: Id) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("task-{id}"))
}

/// Cancel `token` on SIGINT, or SIGTERM on Unix
fn spawn_signal_handler(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("received SIGINT");
                    token.cancel();
                }
                Err(err) => error!("failed to listen for SIGINT: {}", err),
            },
            _ = terminate() => {
                info!("received SIGTERM");
                token.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            error!("failed to set up SIGTERM handler: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Runs all closers concurrently
async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(err)) => error!("closer error: {:#}", err),
            Err(err) => error!("closer panicked: {}", err),
        }
    }
}
