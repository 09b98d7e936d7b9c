mod bundle;
mod handler;
mod saver;
mod stateful;

pub use bundle::{Bundle, load_checkpoint};
pub use handler::{Checkpoint, save_best_model_by_val_score};
pub use saver::DiskSaver;
pub use stateful::Stateful;
