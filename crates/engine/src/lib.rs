//! Brisco Engine - cart, access gate, and checkout state machines.
//!
//! This crate holds the canonical storefront state. It performs no I/O of
//! its own: persistence goes through the [`store::KeyValueStore`] trait,
//! external calls (access-code email, lead capture, payment) go through the
//! traits in [`services`], and time and randomness are injectable via
//! [`time::Clock`] and [`checkout::WaitingRoomStrategy`]. The presentation
//! layer reads immutable snapshots and never mutates engine state directly.
//!
//! # Components
//!
//! - [`cart::CartEngine`] - line items and tiered pricing, persisted across
//!   reloads
//! - [`gate::AccessGate`] - email-then-code storefront gate with a 24 hour
//!   session window
//! - [`checkout::CheckoutFlow`] - linear purchase flow with an optional
//!   waiting-room pre-step and a reentrancy-guarded payment call

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod gate;
pub mod pricing;
pub mod services;
pub mod store;
pub mod time;
