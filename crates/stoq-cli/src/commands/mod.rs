//! Command handlers

pub mod add;
pub mod config;
pub mod queue;
pub mod status;
pub mod sync;
pub mod watch;
