pub mod error;
pub mod flags;
pub mod repos;
