pub mod config;
pub mod error;
pub mod locks;
pub mod terms;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
