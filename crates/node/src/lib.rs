#![doc = include_str!("../README.md")]
#[cfg(feature = "node")]
pub mod client;
pub mod error;
#[cfg(feature = "node")]
pub mod logging;
#[cfg(feature = "node")]
pub mod native;
#[cfg(feature = "node")]
pub mod processor;
#[cfg(test)]
#[cfg(feature = "node")]
mod tests;
#[cfg(feature = "node")]
pub mod util;
