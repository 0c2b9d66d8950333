// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Content fingerprints used to recognise a PDF that is already staged.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a file and return its lowercase hex digest.
///
/// # Errors
///
/// Returns an error when the file cannot be opened or fully read.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open file for hashing: {:?}", path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read file for hashing: {:?}", path))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::hash_file;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    #[test]
    fn file_hash_matches_content_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.5 fake").unwrap();

        let from_file = hash_file(&path).unwrap();
        assert_eq!(from_file, format!("{:x}", Sha256::digest(b"%PDF-1.5 fake")));
        assert_eq!(from_file.len(), 64);
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(hash_file(&tmp.path().join("missing.pdf")).is_err());
    }
}
