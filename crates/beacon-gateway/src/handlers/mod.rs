//! Dispatch handlers, one module per channel.

pub mod broker;
pub mod comm;
