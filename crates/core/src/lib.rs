pub mod data;
pub mod error;
pub mod genetics;
pub mod query;
pub mod types;

pub use error::{KinshipError, Result};
