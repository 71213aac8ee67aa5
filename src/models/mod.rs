pub mod batch;
pub mod conversation;
pub mod execution;
pub mod status;

pub use batch::*;
pub use conversation::*;
pub use execution::*;
pub use status::*;
