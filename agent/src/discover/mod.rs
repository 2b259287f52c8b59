pub mod discover;
pub mod static_discovery;
