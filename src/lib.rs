//! Bookshelf application library
//!
//! Project modules plus the bootstrap sequence shared by the server binary and
//! the CLI.

pub mod bootstrap;
pub mod modules;

pub use bootstrap::{migrate, registry, serve};
