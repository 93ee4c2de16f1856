//! POSIX string-path utilities.
//!
//! The tree is keyed by POSIX-style path strings (`/` separated, rooted at
//! `/`), independent of the host platform. These helpers cover the
//! `parse`/`join` subset the filesystem needs: normalization, splitting a
//! path into (parent directory, base name), and joining a directory with a
//! child name.

/// Normalize a path to an absolute, `/`-separated form.
///
/// Collapses repeated separators, resolves `.` and `..` lexically, strips
/// trailing slashes, and anchors relative input at the root. The empty
/// string normalizes to `/`.
///
/// # Examples
///
/// ```rust
/// use tablefs::path::normalize;
///
/// assert_eq!(normalize("/a//b/"), "/a/b");
/// assert_eq!(normalize("/a/./b/../c"), "/a/c");
/// assert_eq!(normalize(""), "/");
/// ```
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Split a path into its (parent directory, base name) pair.
///
/// Both halves are normalized. The root splits into `("/", "")`, matching
/// the root naming record.
///
/// # Examples
///
/// ```rust
/// use tablefs::path::split;
///
/// assert_eq!(split("/a/b/f.txt"), ("/a/b".to_string(), "f.txt".to_string()));
/// assert_eq!(split("/top"), ("/".to_string(), "top".to_string()));
/// assert_eq!(split("/"), ("/".to_string(), String::new()));
/// ```
pub fn split(path: &str) -> (String, String) {
    let normalized = normalize(path);

    if normalized == "/" {
        return ("/".to_string(), String::new());
    }

    match normalized.rfind('/') {
        Some(0) => ("/".to_string(), normalized[1..].to_string()),
        Some(idx) => (normalized[..idx].to_string(), normalized[idx + 1..].to_string()),
        None => ("/".to_string(), normalized),
    }
}

/// Join a directory path with a child name.
///
/// # Examples
///
/// ```rust
/// use tablefs::path::join;
///
/// assert_eq!(join("/a/b", "c"), "/a/b/c");
/// assert_eq!(join("/", "top"), "/top");
/// assert_eq!(join("/a", ""), "/a");
/// ```
pub fn join(dir: &str, name: &str) -> String {
    if name.is_empty() {
        return normalize(dir);
    }
    normalize(&format!("{dir}/{name}"))
}

/// True if `path` lies strictly inside `ancestor` (separator-boundary
/// aware, so `/ab` is not inside `/a`).
pub fn is_inside(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/";
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
