//! Core of the Icelect election system: the credential/receipt protocol,
//! the vote recorder, and the Schulze tally engine.

#[cfg(test)]
#[macro_use]
extern crate store_test;

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod recorder;
pub mod tally;

pub use config::Config;
pub use error::{Error, Result};
