use crate::data_sync::{
    config::SyncConfig,
    page::{JsonPageParser, PageParser},
    scheduler::{CycleReport, Scheduler},
    transport::{HttpTransport, PageTransport},
};
use crate::events::{EventBus, EventSink};
use crate::store::Store;
use eyre::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Timer driver around the [`Scheduler`]
///
/// Runs one cycle every `cycle_interval_secs` and hands each report to the
/// caller through a channel. Cycles never overlap within one service.
pub struct UpdateService {
    config: SyncConfig,
    scheduler: Arc<Scheduler>,

    // Channels for communication
    report_tx: mpsc::Sender<CycleReport>,
    report_rx: Option<mpsc::Receiver<CycleReport>>,

    // Task handles
    cycle_task: Option<JoinHandle<()>>,

    // Shutdown coordination
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl UpdateService {
    pub fn new(config: SyncConfig, scheduler: Arc<Scheduler>) -> Self {
        let (report_tx, report_rx) = mpsc::channel(config.channel_buffer_size.max(1));

        Self {
            config,
            scheduler,
            report_tx,
            report_rx: Some(report_rx),
            cycle_task: None,
            shutdown_tx: None,
        }
    }

    /// Start the periodic cycle task and return the report receiver
    pub async fn start(&mut self) -> Result<mpsc::Receiver<CycleReport>> {
        info!("Starting UpdateService (every {:?})", self.config.cycle_interval());

        let report_rx = self
            .report_rx
            .take()
            .ok_or_else(|| eyre::eyre!("UpdateService already started"))?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let scheduler = Arc::clone(&self.scheduler);
        let report_tx = self.report_tx.clone();
        let limit = self.config.cycle_limit;
        let mut ticker = interval(self.config.cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            info!("Cycle task started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {}
                }

                match scheduler.run_cycle(limit).await {
                    Ok(report) => {
                        if let Err(e) = report_tx.try_send(report) {
                            match e {
                                mpsc::error::TrySendError::Full(_) => {
                                    warn!("Report channel is full, dropping cycle report");
                                }
                                mpsc::error::TrySendError::Closed(_) => {
                                    error!("Report channel is closed, stopping cycles");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Update cycle aborted: {}", e);
                    }
                }
            }

            info!("Cycle task ended");
        });

        self.cycle_task = Some(task);
        Ok(report_rx)
    }

    /// Stop the cycle task, letting an in-progress cycle finish
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping UpdateService");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }

        if let Some(cycle_task) = self.cycle_task.take() {
            if let Err(e) = cycle_task.await {
                warn!("Cycle task error during shutdown: {}", e);
            }
        }

        info!("UpdateService stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.cycle_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn get_config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for UpdateService {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("UpdateService dropped while running, cycle task may be orphaned");
        }
    }
}

/// Builder for UpdateService; only the store is mandatory
pub struct UpdateServiceBuilder {
    config: Option<SyncConfig>,
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn PageTransport>>,
    parser: Option<Arc<dyn PageParser>>,
    events: EventBus,
}

impl UpdateServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            transport: None,
            parser: None,
            events: EventBus::new(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn PageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn PageParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn add_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events.add_sink(sink);
        self
    }

    pub fn build(self) -> Result<UpdateService> {
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => SyncConfig::from_env().unwrap_or_else(|e| {
                warn!("Falling back to default config: {}", e);
                SyncConfig::default()
            }),
        };

        let store = self.store.ok_or_else(|| eyre::eyre!("UpdateService needs a store"))?;
        let transport: Arc<dyn PageTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(&config)?),
        };
        let parser: Arc<dyn PageParser> = self.parser.unwrap_or_else(|| Arc::new(JsonPageParser));

        let scheduler = Scheduler::from_config(&config, store, transport, parser, self.events);
        Ok(UpdateService::new(config, Arc::new(scheduler)))
    }
}

impl Default for UpdateServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
