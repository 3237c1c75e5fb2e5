//! Vaccine appointment scheduler library crate.
//!
//! # Purpose
//! Exposes the command dispatcher, session gate, reservation workflow,
//! configuration, and storage implementations for use by the binary and tests.
//!
//! # Notes
//! Module boundaries follow the layers a command passes through: parsing,
//! session checks, workflow, then storage.
pub mod app;
pub mod auth;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod session;
pub mod store;
pub mod workflow;
