use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use common::error::Result;

use crate::common::registry::Registry;
use crate::relabel::component::Exports;

/// Invoked with the new exports every time a component publishes a changed output.
pub type OnStateChange = Arc<dyn Fn(&Exports) + Send + Sync>;

#[derive(Clone)]
pub struct Options {
    pub id: String,
    pub registerer: prometheus::Registry,
    pub registry: Arc<Registry>,
    pub on_state_change: Option<OnStateChange>,
}

impl Options {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            registerer: prometheus::Registry::new(),
            registry: Arc::new(Registry::with_builtins()),
            on_state_change: None,
        }
    }

    pub fn with_on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&Exports) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }
}

#[async_trait]
pub trait Component: Send {
    /// Runs until the component's input is exhausted or `shutdown` flips to true.
    async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()>;
}
