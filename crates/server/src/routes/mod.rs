mod health;
pub mod nodepools;
pub mod sequence;

pub use health::*;
