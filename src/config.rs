use std::{fs, path::Path};

use async_compression::Level;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_LEVEL: u32 = 6;
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Tuning for the compressing write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// gzip level, 0 (store) through 9 (best).
    pub level: u32,
    /// Bytes the pipe between the encoder task and the upload may hold.
    pub pipe_capacity: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.level > 9 {
            return Err(Error::Config(format!(
                "compression level {} is out of range 0..=9",
                self.level
            )));
        }
        if self.pipe_capacity == 0 {
            return Err(Error::Config("pipe capacity must be non-zero".into()));
        }

        Ok(())
    }

    /// Overrides defaults with `OBJZIP_LEVEL` and `OBJZIP_PIPE_CAPACITY`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("OBJZIP_LEVEL") {
            config.level = v
                .parse()
                .map_err(|e| Error::Config(format!("OBJZIP_LEVEL={v}: {e}")))?;
        }
        if let Ok(v) = std::env::var("OBJZIP_PIPE_CAPACITY") {
            config.pipe_capacity = v
                .parse()
                .map_err(|e| Error::Config(format!("OBJZIP_PIPE_CAPACITY={v}: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn gzip_level(&self) -> Level {
        Level::Precise(self.level as i32)
    }
}
