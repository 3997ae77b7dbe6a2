//! qpAdm client domain types and pure logic.
//!
//! Request and run models shared by the client library and the CLI,
//! client-side request validation, the textual command-input parser, and
//! normalisation of the history endpoint's response shapes. Nothing in
//! this crate performs I/O.

pub mod analysis;
pub mod catalog;
pub mod command;
pub mod error;
pub mod population;
pub mod run;
pub mod types;
pub mod usage;
