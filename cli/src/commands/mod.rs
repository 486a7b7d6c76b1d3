//! One-shot subcommands.

pub mod export;
pub mod kill;
pub mod list;
pub mod stop;
