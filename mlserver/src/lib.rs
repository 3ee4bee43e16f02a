pub mod config;
pub mod error;
pub mod service;
pub mod session;
pub mod store;

pub use error::{Result, ServerErr};
