pub mod catalog;
pub mod error;
pub mod scheduling;

pub use catalog::*;
pub use scheduling::*;
