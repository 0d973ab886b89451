//! Path handling
//!
//! Paths are slash-separated and root-relative. A single leading slash
//! is tolerated and empty components are ignored; nothing else is
//! normalized ("." and ".." are ordinary names here, and the FAT family
//! never stores them for lookup).

use alloc::string::String;
use alloc::vec::Vec;

/// Path separator
pub const SEPARATOR: char = '/';

/// Strip one leading separator, if present
pub fn strip_root(path: &str) -> &str {
    path.strip_prefix(SEPARATOR).unwrap_or(path)
}

/// Split a path into its non-empty components
pub fn components(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|c| !c.is_empty()).collect()
}

/// Join a listing parent path and an entry name with one separator
///
/// The root path is the empty string, so root listings come out as
/// `/<name>`.
pub fn join(parent: &str, name: &str) -> String {
    let mut path = String::with_capacity(parent.len() + name.len() + 1);
    path.push_str(parent);
    path.push(SEPARATOR);
    path.push_str(name);
    path
}

/// Path of a child reached during resolution
///
/// Unlike [`join`], descending from the root yields a bare name, so a
/// top-level directory resolves to `docs`, not `/docs`.
pub fn descend(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        String::from(name)
    } else {
        join(parent, name)
    }
}
