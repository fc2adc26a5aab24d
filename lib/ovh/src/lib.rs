mod client;
mod config;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{Client, Error, escape};
pub use config::{Config, ENDPOINTS, resolve_endpoint};
