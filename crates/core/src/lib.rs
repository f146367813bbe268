//! Shopfront Core - Shared domain types.
//!
//! This crate provides the types shared between the Shopfront client
//! components:
//! - `client` - session, cart, and checkout engines talking to the backend
//! - `integration-tests` - end-to-end tests against a stub backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. The backend
//! is the source of truth for all of these; the client caches them and never
//! invents values of its own (in particular, it never recomputes a cart
//! subtotal from lines).
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, catalog items, the cart aggregate, orders, and
//!   the user identity

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
