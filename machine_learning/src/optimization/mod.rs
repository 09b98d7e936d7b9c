mod optimizer;
mod scheduler;
mod sgd;

pub use optimizer::Optimizer;
pub use scheduler::PiecewiseLinear;
pub use sgd::Sgd;
