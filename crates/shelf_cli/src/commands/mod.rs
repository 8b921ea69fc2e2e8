//! CLI subcommand implementations.

pub mod fetch;
pub mod queue;
pub mod status;
pub mod sync;
