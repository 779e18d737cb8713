//! Application Layer
//!
//! Ports the ledger depends on, the services that implement its behaviour,
//! and the shapes it exchanges with callers.

pub mod dto;
pub mod ports;
pub mod services;
