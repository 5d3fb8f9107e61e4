pub mod command;
pub mod config;
pub mod error;
pub mod reader;
pub mod storage;

mod client;
mod writer;

pub use client::Client;
pub use config::CompressionConfig;
pub use error::{Error, Result};
pub use reader::DecompressingReader;
