pub mod cache;
pub mod cli;
pub mod colors;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fsutil;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod platform;
pub mod resolver;
pub mod store;
pub mod tree;
#[cfg(test)]
pub mod tests;
