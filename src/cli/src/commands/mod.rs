//! CLI subcommands.

pub mod config;
pub mod experiment;
pub mod health;
