//! Path resolution
//!
//! Turns the user supplied start path into an inode. Three forms are accepted:
//!
//! - `inode:N` addresses an inode directly, without any traversal
//! - a path the engine can resolve in one call (`Meta::resolve`)
//! - any other path, walked one component at a time with access checks and
//!   relative symlinks followed
//!
//! Errors from the engine are returned unmodified.

use crate::error::{MetaError, MetaResult};
use crate::meta::internal::{internal_node_by_name, is_special_name};
use crate::meta::{Attr, Context, Ino, Meta, MODE_MASK_R, MODE_MASK_X};
use tracing::debug;

/// Maximum number of nested symlinks followed while resolving one path
pub const MAX_SYMLINK_DEPTH: usize = 40;

const INODE_PREFIX: &str = "inode:";

/// Resolve `path` to an inode and its attributes
pub fn resolve(meta: &dyn Meta, ctx: &Context, path: &str) -> MetaResult<(Ino, Attr)> {
    resolve_nested(meta, ctx, path, 0)
}

fn resolve_nested(
    meta: &dyn Meta,
    ctx: &Context,
    path: &str,
    depth: usize,
) -> MetaResult<(Ino, Attr)> {
    if depth > MAX_SYMLINK_DEPTH {
        return Err(MetaError::TooManySymlinks {
            path: path.to_string(),
        });
    }

    if let Some(number) = path.strip_prefix(INODE_PREFIX) {
        if let Ok(ino) = number.parse::<u64>() {
            let ino = Ino(ino);
            return Ok((ino, meta.getattr(ctx, ino)?));
        }
    }

    let path = path.trim_matches('/');
    match meta.resolve(ctx, Ino::ROOT, path) {
        Err(e) if e.is_not_supported() => {}
        other => return other,
    }

    debug!(path = %path, "Resolving path component by component");

    let components: Vec<&str> = path.split('/').collect();
    let last = components.len() - 1;
    let mut parent = Ino::ROOT;
    let mut found: Option<(Ino, Attr)> = None;

    for (i, name) in components.iter().enumerate() {
        if name.is_empty() {
            continue;
        }

        if parent.is_root() && i == last && is_special_name(name) {
            if let Some(node) = internal_node_by_name(name) {
                parent = node.0;
                found = Some(node);
                break;
            }
        }

        if i > 0 {
            meta.access(ctx, parent, MODE_MASK_R | MODE_MASK_X)?;
        }

        let (mut ino, mut attr) = meta.lookup(ctx, parent, name)?;
        if attr.typ.is_symlink() {
            let target = String::from_utf8_lossy(&meta.readlink(ctx, ino)?).into_owned();
            if target.starts_with('/') || target.contains("://") {
                return Err(MetaError::NotSupported(format!(
                    "symlink '{}' points outside the volume: '{}'",
                    name, target
                )));
            }
            let joined = join_clean(&components[..i].join("/"), &target);
            (ino, attr) = resolve_nested(meta, ctx, &joined, depth + 1)?;
        }

        parent = ino;
        found = Some((ino, attr));
    }

    match found {
        Some(node) if !parent.is_root() => Ok(node),
        _ => Ok((Ino::ROOT, meta.getattr(ctx, Ino::ROOT)?)),
    }
}

/// Join two slash separated paths and lexically clean the result
///
/// Leading `..` of a relative result are kept; an empty result becomes `.`.
pub fn join_clean(base: &str, rel: &str) -> String {
    let joined = match (base.is_empty(), rel.is_empty()) {
        (true, true) => return String::new(),
        (true, false) => rel.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, rel),
    };
    clean(&joined)
}

fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    match (rooted, parts.is_empty()) {
        (true, _) => format!("/{}", parts.join("/")),
        (false, true) => ".".to_string(),
        (false, false) => parts.join("/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::internal::{STATS_INODE, TRASH_INODE};
    use crate::meta::{Format, MemMeta, Slice};

    struct Tree {
        meta: MemMeta,
        a: Ino,
        b: Ino,
        file: Ino,
    }

    fn tree(bulk: bool) -> Tree {
        let meta = MemMeta::new(Format::default()).with_bulk_resolve(bulk);
        let a = meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        let b = meta.mkdir(a, "b", 0o755).unwrap();
        let file = meta
            .create(b, "file", 0o644, vec![Slice::new(1, 10)], 0)
            .unwrap();
        Tree { meta, a, b, file }
    }

    #[test]
    fn test_join_clean() {
        assert_eq!(join_clean("a", "b"), "a/b");
        assert_eq!(join_clean("a/b", "../c"), "a/c");
        assert_eq!(join_clean("a", "../../x"), "../x");
        assert_eq!(join_clean("", "b/./c/"), "b/c");
        assert_eq!(join_clean("a", ".."), ".");
        assert_eq!(join_clean("", ""), "");
        assert_eq!(join_clean("/a", "../../b"), "/b");
    }

    #[test]
    fn test_resolve_inode_reference() {
        let t = tree(false);
        let (ino, attr) = resolve(&t.meta, &Context::root(), &format!("inode:{}", t.file)).unwrap();
        assert_eq!(ino, t.file);
        assert!(attr.typ.is_file());

        // Not a number: treated as an ordinary (missing) path
        assert!(matches!(
            resolve(&t.meta, &Context::root(), "inode:abc"),
            Err(MetaError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_component_wise() {
        let t = tree(false);
        let ctx = Context::root();
        assert_eq!(resolve(&t.meta, &ctx, "/a/b/file").unwrap().0, t.file);
        assert_eq!(resolve(&t.meta, &ctx, "a//b/").unwrap().0, t.b);
        assert_eq!(resolve(&t.meta, &ctx, "/a").unwrap().0, t.a);
    }

    #[test]
    fn test_resolve_root() {
        let t = tree(false);
        let ctx = Context::root();
        for path in ["", "/", "//"] {
            let (ino, attr) = resolve(&t.meta, &ctx, path).unwrap();
            assert_eq!(ino, Ino::ROOT);
            assert!(attr.typ.is_dir());
        }
        assert_eq!(resolve(&t.meta, &ctx, "/a/..").unwrap().0, Ino::ROOT);
    }

    #[test]
    fn test_resolve_missing() {
        let t = tree(false);
        assert!(matches!(
            resolve(&t.meta, &Context::root(), "/a/nope"),
            Err(MetaError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_relative_symlink() {
        let t = tree(false);
        t.meta.symlink(t.a, "link", "b/file").unwrap();
        t.meta.symlink(t.b, "up", "../b").unwrap();
        let ctx = Context::root();

        assert_eq!(resolve(&t.meta, &ctx, "/a/link").unwrap().0, t.file);
        assert_eq!(resolve(&t.meta, &ctx, "/a/b/up/file").unwrap().0, t.file);
    }

    #[test]
    fn test_resolve_absolute_symlink_unsupported() {
        let t = tree(false);
        t.meta.symlink(t.a, "abs", "/a/b").unwrap();
        t.meta.symlink(t.a, "remote", "s3://bucket/key").unwrap();
        let ctx = Context::root();

        assert!(resolve(&t.meta, &ctx, "/a/abs").unwrap_err().is_not_supported());
        assert!(resolve(&t.meta, &ctx, "/a/remote")
            .unwrap_err()
            .is_not_supported());
    }

    #[test]
    fn test_resolve_symlink_cycle() {
        let t = tree(false);
        t.meta.symlink(t.a, "loop", "loop").unwrap();
        assert!(matches!(
            resolve(&t.meta, &Context::root(), "/a/loop"),
            Err(MetaError::TooManySymlinks { .. })
        ));
    }

    #[test]
    fn test_resolve_checks_access() {
        let t = tree(false);
        t.meta
            .update_attr(t.a, |attr| {
                attr.mode = 0o700;
                attr.uid = 1000;
            })
            .unwrap();
        let other = Context::new(2000, 2000, vec![2000]);
        let owner = Context::new(1000, 1000, vec![1000]);

        // Root is not checked, so the first component is always reachable
        assert_eq!(resolve(&t.meta, &other, "/a").unwrap().0, t.a);
        assert!(matches!(
            resolve(&t.meta, &other, "/a/b"),
            Err(MetaError::PermissionDenied { .. })
        ));
        assert_eq!(resolve(&t.meta, &owner, "/a/b").unwrap().0, t.b);
    }

    #[test]
    fn test_resolve_internal_names() {
        let t = tree(false);
        let ctx = Context::root();
        assert_eq!(resolve(&t.meta, &ctx, "/.trash").unwrap().0, TRASH_INODE);
        assert_eq!(resolve(&t.meta, &ctx, ".stats").unwrap().0, STATS_INODE);
        // Only at the volume root
        assert!(resolve(&t.meta, &ctx, "/a/.stats").is_err());
    }

    #[test]
    fn test_resolve_uses_bulk_capability() {
        let t = tree(true);
        t.meta.symlink(t.a, "link", "b").unwrap();
        let ctx = Context::root();
        assert_eq!(resolve(&t.meta, &ctx, "/a/link/file").unwrap().0, t.file);
        // Bulk errors are returned as-is, no fallback
        assert!(matches!(
            resolve(&t.meta, &ctx, "/a/missing"),
            Err(MetaError::NotFound(_))
        ));
    }
}
