//! Durable local cache for railpilot.
//!
//! This crate provides a trait-based key/value cache with a JSON file
//! implementation and an in-memory one.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_cache;
pub mod memory;

pub use trait_::{Cache, CacheExt, CacheKey, CacheError, Result};
pub use json_cache::JsonFileCache;
pub use memory::MemoryCache;
