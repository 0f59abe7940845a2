//! NULL (X.690 §8.8): always zero-length contents.

use crate::error::Error;

pub fn encode() -> Vec<u8> {
    Vec::new()
}

pub fn decode(contents: &[u8]) -> Result<(), Error> {
    if !contents.is_empty() {
        return Err(Error::invalid_value("NULL contents must be empty"));
    }
    Ok(())
}
