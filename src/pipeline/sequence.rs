use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Result;

/// Prefix shared by every file the pipeline writes
pub const FILE_PREFIX: &str = "depthmap-";

/// Hands out collision-free sequence numbers per (directory, base name).
///
/// The next number is one past the highest of the numbers already present as
/// `depthmap-<n>-<base>...` files in the directory and those issued earlier
/// by this allocator, so names stay unique even after intermediates are
/// deleted.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    dir: PathBuf,
    issued: HashMap<String, u32>,
}

impl SequenceAllocator {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            issued: HashMap::new(),
        }
    }

    /// Allocate the next sequence number for `base`
    pub fn next(&mut self, base: &str) -> Result<u32> {
        let on_disk = self.highest_on_disk(base)?;
        let issued = self.issued.get(base).copied().unwrap_or(0);
        let next = on_disk.max(issued) + 1;
        self.issued.insert(base.to_string(), next);
        Ok(next)
    }

    fn highest_on_disk(&self, base: &str) -> Result<u32> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut highest = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(n) = parse_sequence(&name.to_string_lossy(), base) {
                highest = highest.max(n);
            }
        }
        Ok(highest)
    }
}

/// `depthmap-<n>-<base>...` → `n`
fn parse_sequence(file_name: &str, base: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(FILE_PREFIX)?;
    let (number, tail) = rest.split_once('-')?;
    if !tail.starts_with(base) {
        return None;
    }
    number.parse().ok()
}
