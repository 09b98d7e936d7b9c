pub mod cli;
mod config;
pub mod dataflow;
pub mod datasets;
mod error;
pub mod models;
mod training;

pub use config::Config;
pub use error::{ClassifierErr, Result};
pub use training::{Outcome, run, training};
