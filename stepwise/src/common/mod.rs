//! Common utilities shared across the crate

pub mod env_loader;
