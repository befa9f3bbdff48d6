use arc_swap::ArcSwap;
use chrono::{DateTime, Local};
use futures::FutureExt;
use log::{error, info, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::batch::{self, panic_message, BatchOutcome};
use crate::cadence::Cadence;
use crate::config::{Config, ConfigLoader};
use crate::error::Result;
use crate::logging;
use crate::providers::CiClient;
use crate::retrier::PipelineRetrier;
use crate::signals::ControlEvent;

/// Builds a CI client for a configuration snapshot.
pub type ClientFactory = Arc<dyn Fn(&Config) -> Result<Arc<dyn CiClient>> + Send + Sync>;

/// Where a reload reads configuration from.
pub trait ConfigSource: Send + Sync {
    fn reload(&self) -> anyhow::Result<Config>;
}

impl ConfigSource for ConfigLoader {
    fn reload(&self) -> anyhow::Result<Config> {
        ConfigLoader::reload(self)
    }
}

/// The configuration snapshot together with the retrier built from it.
///
/// Swapped as one unit so a check never pairs a new configuration with an
/// old client or the other way round.
pub struct ActiveState {
    pub config: Arc<Config>,
    pub retrier: PipelineRetrier,
}

impl ActiveState {
    fn new(config: Config, client: Arc<dyn CiClient>) -> Self {
        let retrier = PipelineRetrier::new(client, config.project_id.clone());
        Self {
            config: Arc::new(config),
            retrier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The new configuration is active. `cadence_change` holds the
    /// registered and the requested expression when they differ.
    Applied {
        cadence_change: Option<(String, String)>,
    },
    /// The previous configuration is still active.
    Rejected(String),
}

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// A termination signal was received.
    Shutdown,
    /// The initial check cycle failed outside the per-pipeline boundary.
    Fatal,
}

pub struct Scheduler {
    active: Arc<ArcSwap<ActiveState>>,
    /// Registered at startup; reloads never replace it.
    cadence: Cadence,
    source: Box<dyn ConfigSource>,
    connect: ClientFactory,
}

impl Scheduler {
    /// Build the client and retrier for `config` and register its cadence.
    ///
    /// # Errors
    ///
    /// Fails if the client cannot be built or the cadence expression is
    /// invalid; both are fatal at startup.
    pub fn initialize(
        config: Config,
        source: Box<dyn ConfigSource>,
        connect: ClientFactory,
    ) -> Result<Self> {
        let client = connect(&config)?;
        let cadence = Cadence::parse(&config.check_interval)?;

        Ok(Self {
            active: Arc::new(ArcSwap::from_pointee(ActiveState::new(config, client))),
            cadence,
            source,
            connect,
        })
    }

    /// The snapshot checks currently run against.
    pub fn active(&self) -> Arc<ActiveState> {
        self.active.load_full()
    }

    /// Run one check cycle against the active snapshot.
    pub async fn run_check_cycle(&self) -> BatchOutcome {
        run_cycle(self.active()).await
    }

    /// Run the mandatory first cycle. A panic escaping the cycle itself is
    /// reported as an error message.
    pub async fn run_initial_check(&self) -> std::result::Result<BatchOutcome, String> {
        settle(self.run_check_cycle()).await
    }

    /// Re-read configuration and swap in a new snapshot.
    ///
    /// Any failure leaves the previous snapshot active. A changed cadence is
    /// accepted for the rest of the configuration but keeps firing on the
    /// registered expression until restart.
    pub fn reload(&self) -> ReloadOutcome {
        info!("Reloading configuration...");

        match self.build_reloaded_state() {
            Ok((state, cadence_change)) => {
                if let Some((registered, requested)) = &cadence_change {
                    warn!(
                        "CHECK_INTERVAL changed from '{registered}' to '{requested}'; \
                         checks keep running on '{registered}' until a full restart"
                    );
                }

                logging::apply(state.config.log_level);
                info!(
                    "Configuration reloaded. Monitoring pipeline IDs: {}",
                    format_ids(&state.config.pipeline_ids)
                );
                self.active.store(Arc::new(state));

                ReloadOutcome::Applied { cadence_change }
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!("Failed to reload configuration, keeping previous configuration: {reason}");
                ReloadOutcome::Rejected(reason)
            }
        }
    }

    fn build_reloaded_state(&self) -> anyhow::Result<(ActiveState, Option<(String, String)>)> {
        let config = self.source.reload()?;

        // Validated even though it cannot take effect before a restart
        let requested = Cadence::parse(&config.check_interval)?;
        let cadence_change = (requested.expression() != self.cadence.expression()).then(|| {
            (
                self.cadence.expression().to_string(),
                requested.expression().to_string(),
            )
        });

        let client = (self.connect)(&config)?;

        Ok((ActiveState::new(config, client), cadence_change))
    }

    /// Drive the scheduler until a shutdown event arrives.
    ///
    /// Runs the initial check, then one cycle per cadence tick. Tick cycles
    /// are spawned so the loop keeps servicing `events` while they run.
    pub async fn run(self, events: mpsc::Receiver<ControlEvent>) -> Exit {
        info!("Running initial check...");
        self.drive(self.run_initial_check(), events).await
    }

    async fn drive<F>(&self, initial: F, mut events: mpsc::Receiver<ControlEvent>) -> Exit
    where
        F: Future<Output = std::result::Result<BatchOutcome, String>>,
    {
        let mut listening = true;
        tokio::pin!(initial);

        loop {
            tokio::select! {
                result = &mut initial => match result {
                    Ok(_) => {
                        info!("Initial check completed");
                        break;
                    }
                    Err(message) => {
                        error!("Fatal error during initial check: {message}");
                        return Exit::Fatal;
                    }
                },
                event = events.recv(), if listening => {
                    if let Some(exit) = self.handle_event(event, &mut listening) {
                        return exit;
                    }
                }
            }
        }

        info!("Scheduling checks with cron: {}", self.cadence.expression());
        info!("Scheduler is running. Press Ctrl+C to stop.");

        let mut last_tick: Option<DateTime<Local>> = None;

        loop {
            let now = Local::now();
            let base = last_tick.map_or(now, |tick| tick.max(now));
            let next_tick = self.cadence.next_after(base);

            let sleep = async move {
                match next_tick {
                    Some(tick) => tokio::time::sleep(Cadence::delay_until(Local::now(), tick)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = sleep => {
                    last_tick = next_tick;
                    self.spawn_tick();
                }
                event = events.recv(), if listening => {
                    if let Some(exit) = self.handle_event(event, &mut listening) {
                        return exit;
                    }
                }
            }
        }
    }

    fn handle_event(&self, event: Option<ControlEvent>, listening: &mut bool) -> Option<Exit> {
        match event {
            Some(ControlEvent::Reload) => {
                self.reload();
                None
            }
            Some(ControlEvent::Shutdown(signal)) => {
                info!("Received {signal}, shutting down gracefully...");
                Some(Exit::Shutdown)
            }
            None => {
                warn!("Control channel closed; signals will no longer be handled");
                *listening = false;
                None
            }
        }
    }

    fn spawn_tick(&self) {
        let active = self.active();
        tokio::spawn(async move {
            info!("Scheduled check triggered");
            run_cycle(active).await;
            info!("Scheduled check completed");
        });
    }
}

/// Await a cycle, turning a panic that escapes it into an error message.
async fn settle<F>(cycle: F) -> std::result::Result<BatchOutcome, String>
where
    F: Future<Output = BatchOutcome>,
{
    AssertUnwindSafe(cycle)
        .catch_unwind()
        .await
        .map_err(|panic| panic_message(panic.as_ref()))
}

async fn run_cycle(active: Arc<ActiveState>) -> BatchOutcome {
    batch::check_and_retry_all_pipelines(&active.retrier, &active.config.pipeline_ids).await
}

pub fn format_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
