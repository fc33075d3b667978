//! # turnstile-server
//!
//! HTTP server library for the turnstile access-control system.
//!
//! This library provides the API handlers and state management for
//! redeeming access codes over HTTP and reading the derived ledgers.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
