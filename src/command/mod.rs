use crate::error::{Error, Result};

pub mod get;
pub mod put;

fn check_location(bucket: &str, key: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(Error::InvalidRequest("bucket must not be empty".into()));
    }
    if key.is_empty() {
        return Err(Error::InvalidRequest("key must not be empty".into()));
    }

    Ok(())
}
