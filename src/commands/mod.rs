//! Subcommand implementations for the repo-compose CLI.

pub mod ls;
pub mod run;
pub mod validate;
