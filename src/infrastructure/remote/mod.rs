//! Hosted backend adapters.

pub mod client;
pub mod dto;

pub use client::HttpRemote;
