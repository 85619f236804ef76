pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod project;
pub mod render;

#[cfg(test)]
mod testutil;
