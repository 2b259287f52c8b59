pub mod builtin;
pub mod component;
pub mod metrics;
pub mod stage;
pub mod transform;
