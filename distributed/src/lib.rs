pub mod auto;
mod backend;
mod check;
mod context;
mod error;
mod launcher;
mod local;
mod tcp;

pub use backend::{Backend, Device};
pub use check::check_rank_sum;
pub use context::{Context, Placement};
pub use error::{DistErr, Result};
pub use launcher::{DEFAULT_MASTER_ADDR, DEFAULT_MASTER_PORT, LaunchOptions, Parallel};
pub use local::LocalGroup;
