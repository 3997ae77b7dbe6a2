//! Support code for the `qpadm` command-line client.

pub mod render;
