pub mod app;
pub mod chat;
pub mod error;
pub mod models;

pub use error::{Error, Result};
