//! Path algebra between primary-tree and mirror-tree coordinate spaces.
//!
//! # Responsibility
//! - Translate absolute paths into root-relative paths and back.
//! - Provide the prefix substitution used by rename/move computation.
//!
//! # Invariants
//! - `absolutize(relativize(p, root), root) == p` for every `p` strictly
//!   under `root`.
//! - Relative paths never gain empty segments through these functions.

/// Strips `root` from `path`, returning the relative remainder.
///
/// Returns `None` when `path` is not strictly under `root`. A path equal to
/// `root` itself is not "under" it; see [`relativize_or_empty`] for the
/// variant that tolerates equality.
pub fn relativize<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    let rest = rest.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    Some(rest)
}

/// Like [`relativize`], but maps `path == root` to the empty relative path.
///
/// Used for parent-path comparisons where a subject directly under the root
/// has the root itself as parent.
pub fn relativize_or_empty<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if path == root.trim_end_matches('/') {
        return Some("");
    }
    relativize(path, root)
}

/// Prepends `root` to a relative path. The empty relative path maps back to
/// the root itself.
pub fn absolutize(rel: &str, root: &str) -> String {
    let root = root.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return root.to_string();
    }
    format!("{root}/{rel}")
}

/// Substitutes `old_prefix` with `new_prefix` at the start of a relative
/// path, honoring segment boundaries.
///
/// Returns `None` when `rel` does not start with `old_prefix` as a whole
/// segment sequence.
pub fn replace_prefix(rel: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if rel == old_prefix {
        return Some(new_prefix.to_string());
    }
    let rest = rel.strip_prefix(old_prefix)?;
    let rest = rest.strip_prefix('/')?;
    Some(format!("{new_prefix}/{rest}"))
}

/// Returns whether `rel` starts with `prefix` on a segment boundary.
pub fn starts_with_segments(rel: &str, prefix: &str) -> bool {
    rel == prefix
        || rel
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Returns the parent of a path, or `None` for single-segment input.
pub fn parent_path(path: &str) -> Option<&str> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        return Some("/");
    }
    Some(&path[..idx])
}

/// Returns the final path segment.
pub fn leaf_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Splits a relative path into non-empty segments.
pub fn segments(rel: &str) -> impl Iterator<Item = &str> {
    rel.split('/').filter(|segment| !segment.is_empty())
}
