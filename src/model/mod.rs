//! Data types of the election protocol and the store they live in.

pub mod ballot;
pub mod credential;
pub mod election;
pub mod receipt;
pub mod results;
pub mod store;
