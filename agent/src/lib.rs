pub mod common;
pub mod config;
pub mod discover;
pub mod fixture;
pub mod logging;
pub mod relabel;
