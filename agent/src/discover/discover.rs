use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::error::Result;
use common::sd::target::Target;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Arguments {
	pub targets: Vec<Target>
}

/// A source of targets, polled once per discovery cycle.
#[async_trait]
pub trait Discoverer: Send + Sync {
	async fn refresh(&self) -> Result<Vec<Target>>;
}
