//! Shared test fixtures for the engine crate: a context over a mock
//! runner and a small zoo of scripted steps.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use kubexm_context::{ContextBuilder, PipelineContext, StepContext};
use kubexm_host::{Host, Inventory};
use kubexm_runner::{MockRunner, SharedRunner};
use kubexm_step::{Precheck, Step, StepError, StepMeta, StepOutput, StepResult};

/// A context over three cluster hosts and a mock runner.
pub fn context() -> PipelineContext {
    context_with(false)
}

/// Same as [`context`] but in dry-run mode.
pub fn dry_run_context() -> PipelineContext {
    context_with(true)
}

fn context_with(dry_run: bool) -> PipelineContext {
    let config = Arc::new(
        kubexm_config::from_yaml(
            r"
clusterName: test
hosts:
  - name: cp-1
    address: 10.0.0.1
    roles: [master, etcd]
  - name: cp-2
    address: 10.0.0.2
    roles: [master, etcd]
  - name: w-1
    address: 10.0.0.3
    roles: [worker]
",
        )
        .expect("valid spec"),
    );
    let inventory = Arc::new(Inventory::from_spec(&config).expect("valid inventory"));
    let runner: SharedRunner = Arc::new(MockRunner::new());
    ContextBuilder::new(config, inventory, runner)
        .dry_run(dry_run)
        .build()
}

/// The first inventory host.
pub fn host(ctx: &PipelineContext, name: &str) -> Arc<Host> {
    ctx.inventory().require(name).expect("host in inventory")
}

/// Tracks how many step executions overlap.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Succeeds after an optional delay, recording start/end events.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    delay: Duration,
    log: Arc<Mutex<Vec<String>>>,
    gauge: Option<Arc<Gauge>>,
}

impl RecordingStep {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            log,
            gauge: None,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "records its execution")
    }

    async fn run(&self, _ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(format!("start:{}:{}", self.name, host.name()));
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        tokio::time::sleep(self.delay).await;
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(format!("end:{}:{}", self.name, host.name()));
        Ok(StepOutput::message(format!("ran {}", self.name)))
    }
}

/// Fails on the listed hosts (or all hosts when the list is empty);
/// records whether rollback was invoked.
#[derive(Debug)]
pub struct FailingStep {
    name: String,
    fail_hosts: Vec<String>,
    pub rolled_back: Arc<AtomicUsize>,
}

impl FailingStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_hosts: Vec::new(),
            rolled_back: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn only_on(mut self, host: &str) -> Self {
        self.fail_hosts.push(host.to_string());
        self
    }

    fn fails_on(&self, host: &Host) -> bool {
        self.fail_hosts.is_empty() || self.fail_hosts.iter().any(|h| h == host.name())
    }
}

#[async_trait]
impl Step for FailingStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "fails deliberately")
    }

    async fn run(&self, _ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        if self.fails_on(host) {
            Err(StepError::Command {
                message: format!("{} broke", self.name),
                stdout: String::new(),
                stderr: "boom".to_string(),
            })
        } else {
            Ok(StepOutput::message(format!("ran {}", self.name)))
        }
    }

    async fn rollback(&self, _ctx: &StepContext, _host: &Host) -> StepResult<()> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports the state as already satisfied on every host.
#[derive(Debug)]
pub struct SatisfiedStep {
    name: String,
}

impl SatisfiedStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Step for SatisfiedStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "already satisfied everywhere")
    }

    async fn precheck(&self, _ctx: &StepContext, _host: &Host) -> StepResult<Precheck> {
        Ok(Precheck::satisfied("state already present"))
    }

    async fn run(&self, _ctx: &StepContext, _host: &Host) -> StepResult<StepOutput> {
        Err(StepError::Command {
            message: "run must not be called after a satisfied precheck".to_string(),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStep {
    name: String,
    remaining_failures: AtomicU32,
    pub attempts: Arc<AtomicUsize>,
}

impl FlakyStep {
    pub fn new(name: &str, failures: u32) -> Self {
        Self {
            name: name.to_string(),
            remaining_failures: AtomicU32::new(failures),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Step for FlakyStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "fails then recovers")
    }

    async fn run(&self, _ctx: &StepContext, _host: &Host) -> StepResult<StepOutput> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            Err(StepError::Command {
                message: "transient failure".to_string(),
                stdout: String::new(),
                stderr: String::new(),
            })
        } else {
            Ok(StepOutput::message("recovered"))
        }
    }
}

/// Sleeps far longer than any test timeout.
#[derive(Debug)]
pub struct HangingStep {
    name: String,
}

impl HangingStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Step for HangingStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "never finishes on its own")
    }

    async fn run(&self, _ctx: &StepContext, _host: &Host) -> StepResult<StepOutput> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(StepOutput::default())
    }
}

/// Raises the run's cancellation signal, then succeeds.
#[derive(Debug)]
pub struct CancellingStep {
    name: String,
}

impl CancellingStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Step for CancellingStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "cancels the run")
    }

    async fn run(&self, ctx: &StepContext, _host: &Host) -> StepResult<StepOutput> {
        ctx.cancel().cancel();
        Ok(StepOutput::message("raised cancellation"))
    }
}

/// Fails its precheck outright.
#[derive(Debug)]
pub struct BrokenPrecheckStep {
    name: String,
}

impl BrokenPrecheckStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Step for BrokenPrecheckStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, "precheck explodes")
    }

    async fn precheck(&self, _ctx: &StepContext, _host: &Host) -> StepResult<Precheck> {
        Err(StepError::Io {
            message: "cannot stat".to_string(),
        })
    }

    async fn run(&self, _ctx: &StepContext, _host: &Host) -> StepResult<StepOutput> {
        Ok(StepOutput::default())
    }
}
