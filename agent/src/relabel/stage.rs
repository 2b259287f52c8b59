use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::{JoinError, JoinHandle};

use common::error::{Error, Result};
use common::sd::target::Target;

use crate::relabel::transform::Transformation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Invoking,
    /// The last invocation failed. The next one starts clean.
    Failed,
}

/// Runs one transformation over the full target list of a discovery cycle.
///
/// `invoke` takes `&mut self`, so a stage never runs two invocations at
/// once. An invocation that outlives its timeout keeps running on the
/// blocking pool; until it finishes every new invocation fails.
pub struct ScriptTransformStage {
    id: String,
    transformation: Arc<dyn Transformation>,
    timeout: Option<Duration>,
    state: StageState,
    straggler: Option<JoinHandle<Result<Vec<Target>>>>,
}

impl ScriptTransformStage {
    pub fn new(id: impl Into<String>, transformation: Arc<dyn Transformation>, timeout: Option<Duration>) -> Self {
        Self {
            id: id.into(),
            transformation,
            timeout,
            state: StageState::Idle,
            straggler: None,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn transformation_name(&self) -> &str {
        self.transformation.name()
    }

    pub fn set_transformation(&mut self, transformation: Arc<dyn Transformation>) {
        self.transformation = transformation;
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Relabels `targets` and returns the list that replaces them.
    ///
    /// The caller's slice is only read. On error nothing of the cycle is kept.
    pub async fn invoke(&mut self, targets: &[Target]) -> Result<Vec<Target>> {
        if let Some(handle) = &self.straggler {
            if !handle.is_finished() {
                self.state = StageState::Failed;
                return Err(Error::ScriptExecution(format!(
                    "previous invocation of {} in {} is still running",
                    self.transformation.name(),
                    self.id
                )));
            }
            self.straggler = None;
        }

        self.state = StageState::Invoking;
        debug!("{}: invoking {} on {} targets", self.id, self.transformation.name(), targets.len());
        let result = self.call(targets).await;
        self.state = match result {
            Ok(_) => StageState::Idle,
            Err(_) => StageState::Failed,
        };
        result
    }

    async fn call(&mut self, targets: &[Target]) -> Result<Vec<Target>> {
        let input = targets.to_vec();
        let input_len = input.len();
        let input_duplicates = duplicates(&input);
        let transformation = Arc::clone(&self.transformation);
        let mut handle = tokio::task::spawn_blocking(move || transformation.relabel_targets(input));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.straggler = Some(handle);
                    return Err(Error::Timeout(limit));
                }
            },
            None => handle.await,
        };
        let output = joined.map_err(|err| Error::ScriptExecution(describe_join_error(err)))??;
        self.check_output(input_len, input_duplicates, output)
    }

    fn check_output(&self, input_len: usize, input_duplicates: usize, output: Vec<Target>) -> Result<Vec<Target>> {
        if output.len() > input_len {
            return Err(Error::InvalidOutput(format!(
                "{} returned {} targets for {} inputs",
                self.transformation.name(),
                output.len(),
                input_len
            )));
        }
        let returned = output.len();
        let output: Vec<Target> = output.into_iter().filter(|t| !t.is_empty()).collect();
        if output.len() < returned {
            warn!(
                "{}: skipping {} targets without labels returned by {}",
                self.id,
                returned - output.len(),
                self.transformation.name()
            );
        }
        // Repeats already present in the input may pass through, new ones may not.
        let repeated = duplicates(&output);
        if repeated > input_duplicates {
            return Err(Error::InvalidOutput(format!(
                "{} returned {} duplicated targets",
                self.transformation.name(),
                repeated - input_duplicates
            )));
        }
        Ok(output)
    }
}

/// Number of targets equal to an earlier one in the list.
fn duplicates(targets: &[Target]) -> usize {
    targets.len() - targets.iter().collect::<HashSet<&Target>>().len()
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        format!("relabel_targets panicked: {}", panic_message(err.into_panic()))
    } else {
        format!("relabel_targets was cancelled: {}", err)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
