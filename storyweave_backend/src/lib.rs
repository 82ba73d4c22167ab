pub mod cli;
pub mod collaborators;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod metrics;
pub mod rewards;
pub mod store;
pub mod story;
pub mod telemetry;
pub mod tree;
pub mod utils;

pub use error::{CoreError, CoreResult};
