//! qpAdm REST client library.
//!
//! Provides a concurrency-limited request dispatcher, a rate-limit aware
//! retry wrapper, the HTTP backend, the run lifecycle controller and a
//! poll controller that keeps a run list fresh while any run is still
//! queued or processing.

pub mod api;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod lifecycle;
pub mod poller;
pub mod retry;
pub mod token;
