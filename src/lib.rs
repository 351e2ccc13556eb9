//! Jenkins agent operator
//!
//! Reconciles a Jenkins agent workload from two configuration sources: the
//! operator's static configuration and the agent registrations handed out by
//! related Jenkins units over the peer bus.

pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod peers;
pub mod runtime;

pub use crate::error::{Error, Result};
