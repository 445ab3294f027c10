//! Polls a remote endpoint for environmental sensor readings, falling back to
//! locally synthesized readings whenever the endpoint cannot be used.

pub mod client;
pub mod command;
pub mod config;
pub mod panel;
pub mod poller;
pub mod reading;
pub mod synthetic;
