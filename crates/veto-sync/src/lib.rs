//! Background policy sync (specification §4.9): a periodic fetcher that
//! compiles each tool's rules and atomically swaps both the hot and
//! last-known-good cache entries, without ever blocking host shutdown.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use veto_cache::PolicyCache;
use veto_core::error::{Classify, ErrorKind};
use veto_rules::RuleSet;

/// Default sync interval: 30 seconds.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Environment variable consulted for the sync API key when the caller's
/// config does not supply one.
pub const API_KEY_ENV_VAR: &str = "VETO_API_KEY";

/// Error raised by a fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// A transient failure (network blip, 5xx, timeout): worth retrying.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// A permanent failure (auth rejected, 4xx other than 429): not
    /// worth retrying without operator intervention.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
    /// The fetched document failed to compile.
    #[error("compile failure for tool '{tool}': {source}")]
    Compile {
        /// The tool whose rules failed to compile.
        tool: String,
        /// The underlying compiler error.
        source: veto_bytecode::CompileError,
    },
}

impl Classify for FetchError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::NetworkTransient,
            Self::Permanent(_) => ErrorKind::NetworkPermanent,
            Self::Compile { .. } => ErrorKind::Schema,
        }
    }
}

/// Observer notified on every sync tick's outcome.
pub trait SyncObserver: Send + Sync {
    /// Called after a tool's compiled policy has been swapped into the
    /// cache.
    fn on_update(&self, tool: &str);
    /// Called when a tick's fetch or compile step failed. The engine
    /// continues serving cached/last-known-good policies.
    fn on_error(&self, error: &str);
}

/// Configuration for [`spawn`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tick interval. Defaults to [`DEFAULT_SYNC_INTERVAL`].
    pub interval: Duration,
    /// API key for the remote rule source, if any. Falls back to
    /// [`API_KEY_ENV_VAR`] when unset.
    pub api_key: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_SYNC_INTERVAL, api_key: None }
    }
}

impl SyncConfig {
    /// Resolves the effective API key: the configured value, or
    /// `VETO_API_KEY` from the environment.
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
    }
}

/// A running sync task. Dropping this without calling [`Self::stop`]
/// leaves the task running; always `stop` it during host shutdown.
pub struct SyncHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Signals the task to stop and awaits its completion.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Spawns the periodic sync task. `fetch` is called once per tick and
/// must resolve the full remote tool-name-to-ruleset map; since the loop
/// is strictly sequential, at most one fetch is ever in flight.
///
/// The returned [`JoinHandle`] is owned by the caller via [`SyncHandle`]
/// (never detached), so it can never outlive or block process shutdown.
pub fn spawn<F, Fut>(
    cache: Arc<PolicyCache>,
    config: SyncConfig,
    observer: Arc<dyn SyncObserver>,
    fetch: F,
) -> SyncHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<HashMap<String, RuleSet>, FetchError>> + Send,
{
    let (tx, mut rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_tick(&cache, &observer, &fetch).await;
                }
                _ = &mut rx => {
                    info!("policy sync task shutting down");
                    break;
                }
            }
        }
    });
    SyncHandle { shutdown: Some(tx), join }
}

async fn run_tick<F, Fut>(cache: &Arc<PolicyCache>, observer: &Arc<dyn SyncObserver>, fetch: &F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<HashMap<String, RuleSet>, FetchError>>,
{
    let rule_sets = match fetch().await {
        Ok(rule_sets) => rule_sets,
        Err(e) => {
            warn!(error = %e, "policy sync fetch failed");
            observer.on_error(&e.to_string());
            return;
        }
    };

    for (tool, rule_set) in rule_sets {
        match veto_bytecode::compile(&rule_set.rules) {
            Ok(compiled) => {
                cache.set(tool.clone(), Arc::new(compiled));
                info!(tool = %tool, "policy sync updated compiled policy");
                observer.on_update(&tool);
            }
            Err(source) => {
                let err = FetchError::Compile { tool: tool.clone(), source };
                warn!(error = %err, tool = %tool, "policy sync compile failed");
                observer.on_error(&err.to_string());
            }
        }
    }
}
