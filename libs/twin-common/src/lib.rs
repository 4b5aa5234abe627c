//! Shared infrastructure for the twin services: logging and shutdown.

pub mod logging;
pub mod shutdown;
