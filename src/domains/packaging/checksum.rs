use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::errors::DomainResult;

/// SHA-256 of an in-memory string, hex-encoded.
pub fn hash_string(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file's contents, streamed so large archives never load
/// fully into memory.
pub fn hash_file(path: &Path) -> DomainResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
