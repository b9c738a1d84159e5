pub mod alert;
pub mod auth;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod health;
pub mod host;
pub mod io;
pub mod paths;
pub mod prepare;
pub mod remote;
pub mod scheduler;
pub mod sequencer;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{RctError, Result};
