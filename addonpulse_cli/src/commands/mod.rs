//! CLI subcommand implementations.

pub mod sweep;
pub mod sync;
pub mod trending;
