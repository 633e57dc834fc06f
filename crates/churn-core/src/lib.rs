pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod storage;
pub mod types;

pub use error::{ChurnError, Result};
