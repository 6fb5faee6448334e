//! BrainCrate library
//!
//! Note storage with spaced-repetition reviews, a per-user tag ledger and
//! embedded image handling.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;
