//! Test-only adapters that live inside the domain crate for convenience.
//!
//! These are intended for unit testing and local demos. Real adapters
//! (MySQL, SQLite, mail backends) live in separate crates.

pub mod memory_repo;
pub mod spawner;
pub mod stub_notifier;
