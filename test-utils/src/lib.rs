//! Shared test utilities for resilient-client.
//!
//! This crate provides:
//! - A scripted [`Transport`](resilient_client::Transport) double
//! - A recording auth provider
//! - Proptest generators for client configuration and errors
//! - JSON response fixtures

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{MockTransport, RecordingAuthProvider, ScriptedResponse};
