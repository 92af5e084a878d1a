#![forbid(unsafe_code)]

//! Content gateway for a short-drama catalog.
//!
//! The binaries share everything through this crate: the upstream race, the
//! snapshot fallback, the search cache and the session gate in front of the
//! HTTP routes.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod gate;
pub mod logging;
pub mod security;
pub mod stream;
pub mod sync;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;
