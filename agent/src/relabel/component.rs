use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use common::error::{Error, Result};
use common::sd::target::{fingerprint_targets, Target};

use crate::common::component::{Component, Options};
use crate::common::registry::{parse_component_name, Params};
use crate::relabel::builtin::Passthrough;
use crate::relabel::metrics::Metrics;
use crate::relabel::stage::{ScriptTransformStage, StageState};

pub const COMPONENT_NAME: &str = "discovery.relabel_script";

const INPUT_BUFFER: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Arguments {
    /// Targets passed in by a service discovery component.
    pub targets: Vec<Target>,
    /// Registered name of the transformation to run.
    pub transformation: String,
    pub params: Params,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            transformation: Passthrough::NAME.to_string(),
            params: Params::new(),
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl Arguments {
    pub fn validate(&self) -> Result<()> {
        if self.transformation.is_empty() {
            return Err(Error::InvalidArguments("transformation must be set".to_string()));
        }
        parse_component_name(&self.transformation)?;
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidArguments("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exports {
    pub output: Vec<Target>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New exports were published.
    Changed,
    /// The cycle produced exactly the exports already in effect.
    Unchanged,
}

/// `discovery.relabel_script`: relabels every discovery cycle's targets and
/// exports the result.
///
/// A failed cycle never replaces the exports; whatever the last successful
/// cycle produced stays in effect.
pub struct RelabelScriptComponent {
    opts: Options,
    args: Arguments,
    stage: ScriptTransformStage,
    exports: Arc<ArcSwap<Exports>>,
    fingerprint: Option<u64>,
    metrics: Metrics,
    input: Option<mpsc::Receiver<Vec<Target>>>,
}

impl RelabelScriptComponent {
    /// Builds the component and runs its first cycle over `args.targets`.
    pub async fn new(opts: Options, args: Arguments) -> Result<Self> {
        args.validate()?;
        let transformation = opts.registry.build(&args.transformation, &args.params)?;
        let metrics = Metrics::new(&opts.registerer, &opts.id).map_err(|err| Error::Metrics(err.to_string()))?;
        let stage = ScriptTransformStage::new(opts.id.clone(), transformation, args.timeout);
        let targets = args.targets.clone();

        let mut component = Self {
            opts,
            args,
            stage,
            exports: Arc::new(ArcSwap::from_pointee(Exports::default())),
            fingerprint: None,
            metrics,
            input: None,
        };
        component.cycle(&targets).await?;
        Ok(component)
    }

    pub fn id(&self) -> &str {
        &self.opts.id
    }

    pub fn arguments(&self) -> &Arguments {
        &self.args
    }

    pub fn state(&self) -> StageState {
        self.stage.state()
    }

    /// The exports currently in effect.
    pub fn exports(&self) -> Arc<Exports> {
        self.exports.load_full()
    }

    /// A handle that keeps observing the exports after the component moves
    /// into its run loop.
    pub fn exports_handle(&self) -> Arc<ArcSwap<Exports>> {
        Arc::clone(&self.exports)
    }

    /// Returns the sender discovery uses to hand over each cycle's targets.
    /// Calling it again replaces the previous channel.
    pub fn input(&mut self) -> mpsc::Sender<Vec<Target>> {
        let (tx, rx) = mpsc::channel(INPUT_BUFFER);
        self.input = Some(rx);
        tx
    }

    /// Applies new arguments and runs a cycle over their targets.
    ///
    /// An unknown transformation leaves the previous configuration in place.
    pub async fn update(&mut self, args: Arguments) -> Result<UpdateOutcome> {
        args.validate()?;
        if args.transformation != self.args.transformation || args.params != self.args.params {
            let transformation = self.opts.registry.build(&args.transformation, &args.params)?;
            info!(
                "{}: switching transformation from {} to {}",
                self.opts.id,
                self.stage.transformation_name(),
                transformation.name()
            );
            self.stage.set_transformation(transformation);
        }
        self.stage.set_timeout(args.timeout);
        let targets = args.targets.clone();
        self.args = args;
        self.cycle(&targets).await
    }

    /// Runs a cycle over freshly discovered targets with the current arguments.
    pub async fn refresh(&mut self, targets: Vec<Target>) -> Result<UpdateOutcome> {
        let outcome = self.cycle(&targets).await;
        self.args.targets = targets;
        outcome
    }

    async fn cycle(&mut self, targets: &[Target]) -> Result<UpdateOutcome> {
        self.metrics.cycles.inc();
        let start = Instant::now();
        let result = self.stage.invoke(targets).await;
        self.metrics.cycle_duration.observe(start.elapsed().as_secs_f64());

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                self.metrics.cycle_failures.inc();
                return Err(err);
            }
        };

        let fingerprint = fingerprint_targets(&output);
        if self.fingerprint == Some(fingerprint) && self.exports.load().output == output {
            self.metrics.unchanged_cycles.inc();
            debug!("{}: {} targets unchanged", self.opts.id, output.len());
            return Ok(UpdateOutcome::Unchanged);
        }

        info!(
            "{}: relabeled {} targets into {}",
            self.opts.id,
            targets.len(),
            output.len()
        );
        self.fingerprint = Some(fingerprint);
        self.metrics.output_targets.set(output.len() as i64);
        let exports = Arc::new(Exports { output });
        self.exports.store(Arc::clone(&exports));
        if let Some(on_state_change) = &self.opts.on_state_change {
            on_state_change(&exports);
        }
        Ok(UpdateOutcome::Changed)
    }

    fn log_failure(&self, err: &Error) {
        let kept = self.exports.load().output.len();
        error!(
            "{}: relabel cycle failed, keeping {} previous targets: {}",
            self.opts.id, kept, err
        );
    }
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves once shutdown is set to `true` or its sender is dropped.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while shutdown.changed().await.is_ok() {
        if is_shutdown(shutdown) {
            return;
        }
    }
}

#[async_trait]
impl Component for RelabelScriptComponent {
    async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if is_shutdown(&shutdown) {
            return Ok(());
        }
        let Some(mut input) = self.input.take() else {
            // Nothing feeds this component; it only serves its exports.
            wait_for_shutdown(&mut shutdown).await;
            return Ok(());
        };

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                next = input.recv() => match next {
                    Some(targets) => {
                        if let Err(err) = self.refresh(targets).await {
                            self.log_failure(&err);
                        }
                    }
                    None => break,
                },
            }
        }
        info!("{}: stopped", self.opts.id);
        Ok(())
    }
}
