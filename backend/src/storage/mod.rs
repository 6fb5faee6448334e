//! Storage module
//!
//! Provides file storage for the images embedded in notes.

pub mod image_store;

pub use image_store::ImageStore;
