//! Common library for the membership front end
//!
//! This crate provides shared functionality used across the services:
//! configuration loading, the provider REST client, transport errors, the
//! listener registry behind every push notification, and tracing setup.

pub mod config;
pub mod error;
pub mod listeners;
pub mod rest;
pub mod telemetry;

pub use error::{TransportError, TransportResult};
pub use listeners::{Listeners, Subscription};
pub use rest::RestClient;
