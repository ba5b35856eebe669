mod execution;
mod request;

pub use execution::*;
pub use request::*;
