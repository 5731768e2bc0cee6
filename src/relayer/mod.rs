//! Ciphertext engine behind an HTTP relayer.

pub mod client;
pub mod engine;
pub mod service;

pub use engine::RelayerEngine;
