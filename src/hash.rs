//! Artifact content hashing.
//!
//! On a fully-reproducible verdict the caller gets the SHA256 of every
//! artifact file, keyed by its path relative to the artifact root.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::Result;

/// Hash every regular file under `dir`, in sorted path order.
pub fn hash_artifacts(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .expect("walkdir yields paths under its root")
            .to_string_lossy()
            .into_owned();

        let mut hasher = Sha256::new();
        hasher.update(fs::read(entry.path())?);
        hashes.insert(rel, format!("{:x}", hasher.finalize()));
    }
    Ok(hashes)
}
