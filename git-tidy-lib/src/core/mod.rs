//! Core data structures and helpers shared between subcommands.

pub mod config;
pub mod effects;
pub mod formatting;
pub mod prompt;
pub mod tool;
