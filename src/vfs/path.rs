//! Path canonicalization

use alloc::string::String;
use alloc::vec::Vec;

/// Resolve `input` against `cwd` into an absolute path without `.`,
/// `..` or repeated separators. `..` at the root stays at the root.
pub fn canonicalize_path(cwd: &str, input: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let base = if input.starts_with('/') { "" } else { cwd };
    for component in base.split('/').chain(input.split('/')) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        return String::from("/");
    }
    let mut out = String::new();
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Split a canonical path into parent directory and final component.
///
/// Returns `None` for the root, which has no parent entry.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind('/')?;
    let name = &path[idx + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_and_dots() {
        assert_eq!(canonicalize_path("/home/user", "docs/./a.txt"), "/home/user/docs/a.txt");
        assert_eq!(canonicalize_path("/home/user", "../other"), "/home/other");
        assert_eq!(canonicalize_path("/home", "/etc//passwd"), "/etc/passwd");
    }

    #[test]
    fn test_dotdot_at_root() {
        assert_eq!(canonicalize_path("/", "../../.."), "/");
        assert_eq!(canonicalize_path("/", ""), "/");
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/a/b"), Some(("/a", "b")));
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/"), None);
    }
}
