pub mod batches;
pub mod calls;
pub mod conversations;
pub mod error;
pub mod executions;
