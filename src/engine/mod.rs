pub mod eta;
pub mod pipeline;
pub mod proximity;
pub mod queue;
pub mod retry;
pub mod sampling;
pub mod sync;
