//! Identity sync operator
//!
//! Reconciles `IdentitySyncPolicy` objects: a source Secret and a named
//! ServiceAccount are fanned out into every target namespace, and the outcome
//! is reported through status conditions, metrics, and throttled logs.

pub mod config;
pub mod controller;
pub mod crd;
pub mod errclass;
pub mod error;
pub mod outcome;
pub mod rest_api;
pub mod status;
pub mod throttle;

pub use error::{Error, Result};
