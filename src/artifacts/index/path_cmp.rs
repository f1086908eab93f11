//! Path ordering for index entries
//!
//! Paths are compared as raw bytes: the common prefix decides first, then the
//! shorter path sorts before the longer one. This is the order entries are
//! persisted in, so every lookup and every merge pass goes through here rather
//! than through `str` or `Path` comparisons.

use std::cmp::Ordering;

/// Path component separator inside index paths
pub const SEPARATOR: u8 = b'/';

/// Compare two encoded paths byte by byte, shorter first on a common prefix.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            unequal => return unequal,
        }
    }

    a.len().cmp(&b.len())
}

/// Compare `(path, stage)` pairs, the sort key of the index table.
pub fn compare_staged(a_path: &[u8], a_stage: u8, b_path: &[u8], b_stage: u8) -> Ordering {
    compare(a_path, b_path).then(a_stage.cmp(&b_stage))
}

/// Check whether `path` lies under `prefix`.
///
/// `prefix` is expected to already end with [`SEPARATOR`]; an empty prefix
/// contains every path.
pub fn is_under(path: &[u8], prefix: &[u8]) -> bool {
    path.starts_with(prefix)
}

/// Every leading directory of `path`, outermost first.
///
/// `a/b/c` yields `a` then `a/b`.
pub fn parent_dirs(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.iter()
        .enumerate()
        .filter(|(_, byte)| **byte == SEPARATOR)
        .map(move |(position, _)| &path[..position])
}

/// Append the separator unless the path already ends with one.
pub fn as_dir_prefix(path: &[u8]) -> Vec<u8> {
    let mut prefix = path.to_vec();
    if !prefix.is_empty() && prefix.last() != Some(&SEPARATOR) {
        prefix.push(SEPARATOR);
    }
    prefix
}
