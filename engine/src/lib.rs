pub mod checkpoint;
mod engine;
mod error;
pub mod evaluator;
pub mod events;
mod handler;
pub mod handlers;
pub mod metrics;
mod state;

pub use engine::{Engine, Process};
pub use error::{EngineErr, Result};
pub use evaluator::{Evaluator, Metrics};
pub use events::{Event, EventFilter, EventSet};
pub use handler::{FnHandler, Handler, handler_fn};
pub use state::State;
