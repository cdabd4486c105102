pub mod error;
pub mod evaluation;
pub mod flags;
