//! ridgeline-dispatch: batch intake, queue processing, and execution.

pub mod dispatcher;
pub mod executor;

pub use dispatcher::{BatchDispatcher, DispatchError, EnqueueReport, ProcessReport};
pub use executor::ActionExecutor;
