pub mod archive;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod retry;
pub mod script;
pub mod types;

pub use error::{ErrorKind, FrkError, Result};
