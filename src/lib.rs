//! `grbl-engine`: a command/response engine for GRBL-compatible CNC
//! controllers over a serial link.
//!
//! See [`machines::grbl`] for the protocol implementation and
//! [`config::EngineConfig`] for how to configure a connection.

pub mod config;
pub mod machines;
