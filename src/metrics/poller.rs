//! The polling loop driving all collectors.

use crate::error::Result;
use crate::metrics::collector::Collector;
use crate::metrics::data::CycleReport;
use crate::metrics::profile::ProfileSet;
use crate::metrics::sink::MetricsSink;
use crate::metrics::traits::SessionFactory;
use crate::miot::{DeviceRegistry, SpecCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Registries shared by all collectors, built once at startup.
#[derive(Debug, Default)]
pub struct Context {
    pub registry: DeviceRegistry,
    pub specs: SpecCache,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Collecting,
    Sleeping,
    Stopped,
}

/// Totals reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
}

/// Runs every collector on a fixed interval until shut down.
pub struct PollLoop<F: SessionFactory> {
    context: Arc<Context>,
    factory: F,
    collectors: Vec<Collector>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    state: PollState,
}

impl<F: SessionFactory> PollLoop<F> {
    pub fn new(
        context: Arc<Context>,
        factory: F,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
    ) -> Self {
        Self {
            context,
            factory,
            collectors: Vec::new(),
            sink,
            interval,
            state: PollState::Idle,
        }
    }

    /// Register one collector. Collectors run in registration order.
    pub fn with_collector(mut self, collector: Collector) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Register one collector per profile, in profile order.
    pub fn with_profiles(mut self, profiles: &ProfileSet, concurrency: usize) -> Self {
        self.collectors.extend(
            profiles
                .models
                .iter()
                .map(|profile| Collector::from_profile(profile).with_concurrency(concurrency)),
        );
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn collectors(&self) -> &[Collector] {
        &self.collectors
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Run one cycle: open a session, refresh the devices, then collect every model.
    ///
    /// Errors returned here abort the whole cycle. Per-model failures are logged and
    /// listed in the report instead.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.state = PollState::Collecting;

        let service = self.factory.open().await?;
        self.context.registry.refresh(&service).await?;

        let mut report = CycleReport::default();
        for collector in &self.collectors {
            match collector
                .collect(
                    &self.context.registry,
                    &self.context.specs,
                    &service,
                    self.sink.as_ref(),
                )
                .await
            {
                Ok(model_report) => {
                    debug!(
                        model = %model_report.model,
                        devices = model_report.devices,
                        samples = model_report.samples,
                        "Collected model"
                    );
                    report.models.push(model_report);
                }
                Err(err) => {
                    if err.is_malformed_data() {
                        error!(model = %collector.model(), "Malformed data, skipping model: {}", err);
                    } else {
                        warn!(model = %collector.model(), "Skipping model this cycle: {}", err);
                    }
                    report
                        .failed_models
                        .push((collector.model().to_string(), err.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Run cycles until `shutdown` completes.
    ///
    /// Shutdown is only observed between cycles; an in-flight cycle always finishes.
    pub async fn run<S>(mut self, shutdown: S) -> PollSummary
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = PollSummary::default();

        info!(
            collectors = self.collectors.len(),
            interval_secs = self.interval.as_secs_f64(),
            "Starting poll loop"
        );

        loop {
            let started = time::Instant::now();
            let outcome = self.run_cycle().await;
            summary.cycles += 1;

            match outcome {
                Ok(report) => {
                    self.sink.record_cycle(true);
                    info!(
                        models = report.models.len(),
                        failed_models = report.failed_models.len(),
                        samples = report.samples(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Cycle complete"
                    );
                }
                Err(err) => {
                    self.sink.record_cycle(false);
                    summary.failed_cycles += 1;
                    if err.is_malformed_data() {
                        error!("Cycle failed on malformed data: {}", err);
                    } else {
                        warn!("Cycle failed: {}", err);
                    }
                }
            }

            self.state = PollState::Sleeping;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = time::sleep(self.interval) => {}
            }
        }

        self.state = PollState::Stopped;
        info!(
            cycles = summary.cycles,
            failed_cycles = summary.failed_cycles,
            "Poll loop stopped"
        );
        summary
    }
}
