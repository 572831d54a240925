//! Brisco Core - Shared types library.
//!
//! This crate provides common types used across all Brisco components:
//! - `engine` - Cart, access gate, and checkout state machines
//! - `storefront` - Public-facing HTTP API
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! persistence. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
