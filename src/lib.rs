#[macro_use]
extern crate tracing;

pub mod config;
pub mod ovhcloud;
pub mod trace;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;
