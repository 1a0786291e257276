//! vidsim: sample video frames, index their colour features in Qdrant and
//! find visually similar frames.

pub mod commands;
pub mod config;
pub mod error;
pub mod features;
pub mod media;
pub mod meta;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
