//! In-memory metadata engine
//!
//! Holds a whole namespace in a single `RwLock`. Used for dump-backed checks
//! and as the engine in tests. Faults can be injected per operation so the
//! checker's recovery paths can be exercised.

use super::internal::internal_node_by_ino;
use super::types::{Attr, Entry, FileType, Format, Ino, Slice};
use super::{Context, Meta};
use crate::error::{MetaError, MetaResult};
use crate::resolve::{join_clean, MAX_SYMLINK_DEPTH};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};

/// Payload of a node being inserted
#[derive(Debug, Clone)]
pub enum NodeData {
    Dir,
    File(Vec<Slice>),
    Symlink(String),
    /// Fifo, device or socket
    Special,
}

#[derive(Debug, Clone)]
struct Node {
    attr: Attr,
    children: BTreeMap<String, Ino>,
    target: Vec<u8>,
    slices: Vec<Slice>,
    links: Vec<(Ino, String)>,
}

#[derive(Debug, Clone, Copy)]
struct DeletedFile {
    length: u64,
    expire: i64,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<Ino, Node>,
    next_ino: u64,
    deleted: BTreeMap<Ino, DeletedFile>,
}

#[derive(Debug, Default)]
struct Faults {
    readdir: HashMap<Ino, MetaError>,
    slices: HashMap<Ino, MetaError>,
    scan: Option<MetaError>,
}

/// Metadata engine backed by process memory
pub struct MemMeta {
    format: Format,
    state: RwLock<State>,
    faults: Mutex<Faults>,
    bulk_resolve: bool,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl MemMeta {
    /// Create an engine holding an empty volume
    pub fn new(format: Format) -> Self {
        let mut root_attr = Attr::directory(0o777, now());
        root_attr.parent = Ino::ROOT;

        let mut nodes = HashMap::new();
        nodes.insert(
            Ino::ROOT,
            Node {
                attr: root_attr,
                children: BTreeMap::new(),
                target: Vec::new(),
                slices: Vec::new(),
                links: Vec::new(),
            },
        );

        Self {
            format,
            state: RwLock::new(State {
                nodes,
                next_ino: 2,
                deleted: BTreeMap::new(),
            }),
            faults: Mutex::new(Faults::default()),
            bulk_resolve: false,
        }
    }

    /// Enable or disable the one-call `resolve` capability
    pub fn with_bulk_resolve(mut self, enabled: bool) -> Self {
        self.bulk_resolve = enabled;
        self
    }

    /// Volume format served by `load`
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Create a directory
    pub fn mkdir(&self, parent: Ino, name: &str, mode: u16) -> MetaResult<Ino> {
        self.insert(parent, name, None, Attr::directory(mode, now()), NodeData::Dir)
    }

    /// Create a regular file made of `slices`
    pub fn create(
        &self,
        parent: Ino,
        name: &str,
        mode: u16,
        slices: Vec<Slice>,
        ctime: i64,
    ) -> MetaResult<Ino> {
        let length = slices.iter().map(|s| s.len as u64).sum();
        self.insert(
            parent,
            name,
            None,
            Attr::file(mode, length, ctime),
            NodeData::File(slices),
        )
    }

    /// Create a symlink
    pub fn symlink(&self, parent: Ino, name: &str, target: &str) -> MetaResult<Ino> {
        self.insert(
            parent,
            name,
            None,
            Attr::symlink(target.len(), now()),
            NodeData::Symlink(target.to_string()),
        )
    }

    /// Insert a node, optionally with a fixed inode number
    pub fn insert(
        &self,
        parent: Ino,
        name: &str,
        ino: Option<Ino>,
        mut attr: Attr,
        data: NodeData,
    ) -> MetaResult<Ino> {
        let mut state = self.state.write();

        let parent_node = state
            .nodes
            .get(&parent)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", parent)))?;
        if !parent_node.attr.typ.is_dir() {
            return Err(MetaError::NotDir { ino: parent });
        }
        if parent_node.children.contains_key(name) {
            return Err(MetaError::AlreadyExists(name.to_string()));
        }

        let ino = match ino {
            Some(ino) => {
                if state.nodes.contains_key(&ino) {
                    return Err(MetaError::AlreadyExists(format!("inode {}", ino)));
                }
                state.next_ino = state.next_ino.max(ino.0 + 1);
                ino
            }
            None => {
                let ino = Ino(state.next_ino);
                state.next_ino += 1;
                ino
            }
        };

        attr.parent = parent;
        let (slices, target) = match data {
            NodeData::Dir => {
                attr.typ = FileType::Directory;
                (Vec::new(), Vec::new())
            }
            NodeData::File(slices) => {
                attr.typ = FileType::File;
                (slices, Vec::new())
            }
            NodeData::Symlink(target) => {
                attr.typ = FileType::Symlink;
                (Vec::new(), target.into_bytes())
            }
            NodeData::Special => (Vec::new(), Vec::new()),
        };
        let is_dir = attr.typ.is_dir();

        state.nodes.insert(
            ino,
            Node {
                attr,
                children: BTreeMap::new(),
                target,
                slices,
                links: vec![(parent, name.to_string())],
            },
        );

        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.insert(name.to_string(), ino);
            if is_dir {
                parent_node.attr.nlink += 1;
            }
        }

        Ok(ino)
    }

    /// Add a hard link to an existing non-directory inode
    pub fn link(&self, ino: Ino, parent: Ino, name: &str) -> MetaResult<()> {
        let mut state = self.state.write();

        let target = state
            .nodes
            .get(&ino)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", ino)))?;
        if target.attr.typ.is_dir() {
            return Err(MetaError::InvalidArgument(format!(
                "cannot hard link directory {}",
                ino
            )));
        }
        let parent_node = state
            .nodes
            .get(&parent)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", parent)))?;
        if !parent_node.attr.typ.is_dir() {
            return Err(MetaError::NotDir { ino: parent });
        }
        if parent_node.children.contains_key(name) {
            return Err(MetaError::AlreadyExists(name.to_string()));
        }

        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.insert(name.to_string(), ino);
        }
        if let Some(node) = state.nodes.get_mut(&ino) {
            node.links.push((parent, name.to_string()));
            node.attr.nlink += 1;
        }
        Ok(())
    }

    /// Remove a directory entry
    ///
    /// A file losing its last link stays in the engine without a path and is
    /// registered as pending deletion.
    pub fn unlink(&self, parent: Ino, name: &str) -> MetaResult<()> {
        let mut state = self.state.write();

        let ino = {
            let parent_node = state
                .nodes
                .get(&parent)
                .ok_or_else(|| MetaError::NotFound(format!("inode {}", parent)))?;
            *parent_node
                .children
                .get(name)
                .ok_or_else(|| MetaError::NotFound(name.to_string()))?
        };

        let (is_dir, empty) = match state.nodes.get(&ino) {
            Some(node) => (node.attr.typ.is_dir(), node.children.is_empty()),
            None => return Err(MetaError::NotFound(format!("inode {}", ino))),
        };
        if is_dir && !empty {
            return Err(MetaError::InvalidArgument(format!(
                "directory '{}' not empty",
                name
            )));
        }

        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.remove(name);
            if is_dir {
                parent_node.attr.nlink = parent_node.attr.nlink.saturating_sub(1);
            }
        }

        if is_dir {
            state.nodes.remove(&ino);
            return Ok(());
        }

        let orphaned = match state.nodes.get_mut(&ino) {
            Some(node) => {
                node.links.retain(|(p, n)| !(*p == parent && n == name));
                node.attr.nlink = node.attr.nlink.saturating_sub(1);
                node.links.is_empty().then_some(node.attr.length)
            }
            None => None,
        };
        if let Some(length) = orphaned {
            state.deleted.insert(
                ino,
                DeletedFile {
                    length,
                    expire: now(),
                },
            );
        }
        Ok(())
    }

    /// Register an inode as pending deletion without touching the tree
    pub fn mark_deleted(&self, ino: Ino, length: u64, expire: i64) {
        self.state
            .write()
            .deleted
            .insert(ino, DeletedFile { length, expire });
    }

    /// Modify the attributes of an inode in place
    pub fn update_attr<F>(&self, ino: Ino, f: F) -> MetaResult<()>
    where
        F: FnOnce(&mut Attr),
    {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(&ino)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", ino)))?;
        f(&mut node.attr);
        Ok(())
    }

    /// Make `readdir` of `ino` fail with `err`
    pub fn inject_readdir_error(&self, ino: Ino, err: MetaError) {
        self.faults.lock().readdir.insert(ino, err);
    }

    /// Make `list_slices` of `ino` fail with `err`
    pub fn inject_slices_error(&self, ino: Ino, err: MetaError) {
        self.faults.lock().slices.insert(ino, err);
    }

    /// Make `scan_deleted_objects` fail with `err`
    pub fn inject_scan_error(&self, err: MetaError) {
        self.faults.lock().scan = Some(err);
    }

    /// Number of inodes (including root)
    pub fn inode_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    fn getattr_locked(state: &State, ino: Ino) -> MetaResult<Attr> {
        if let Some(attr) = internal_node_by_ino(ino) {
            return Ok(attr);
        }
        state
            .nodes
            .get(&ino)
            .map(|n| n.attr.clone())
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", ino)))
    }

    fn lookup_locked(state: &State, parent: Ino, name: &str) -> MetaResult<(Ino, Attr)> {
        let node = state
            .nodes
            .get(&parent)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", parent)))?;
        if !node.attr.typ.is_dir() {
            return Err(MetaError::NotDir { ino: parent });
        }

        let ino = match name {
            "." => parent,
            ".." => node.attr.parent,
            _ => *node
                .children
                .get(name)
                .ok_or_else(|| MetaError::NotFound(name.to_string()))?,
        };
        Ok((ino, Self::getattr_locked(state, ino)?))
    }

    fn resolve_locked(
        state: &State,
        parent: Ino,
        path: &str,
        depth: usize,
    ) -> MetaResult<(Ino, Attr)> {
        if depth > MAX_SYMLINK_DEPTH {
            return Err(MetaError::TooManySymlinks {
                path: path.to_string(),
            });
        }

        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let mut current = (parent, Self::getattr_locked(state, parent)?);

        for (i, name) in components.iter().enumerate() {
            let mut next = Self::lookup_locked(state, current.0, name)?;
            if next.1.typ.is_symlink() {
                let target = state
                    .nodes
                    .get(&next.0)
                    .map(|n| String::from_utf8_lossy(&n.target).into_owned())
                    .unwrap_or_default();
                if target.starts_with('/') || target.contains("://") {
                    return Err(MetaError::NotSupported(format!(
                        "symlink target '{}'",
                        target
                    )));
                }
                let joined = join_clean(&components[..i].join("/"), &target);
                next = Self::resolve_locked(state, parent, &joined, depth + 1)?;
            }
            current = next;
        }

        Ok(current)
    }

    fn paths_locked(state: &State, ino: Ino, depth: usize) -> Vec<String> {
        if ino.is_root() {
            return vec!["/".to_string()];
        }
        let node = match state.nodes.get(&ino) {
            Some(node) if depth < 1024 => node,
            _ => return Vec::new(),
        };

        let mut paths = Vec::new();
        for (parent, name) in &node.links {
            for prefix in Self::paths_locked(state, *parent, depth + 1) {
                if prefix == "/" {
                    paths.push(format!("/{}", name));
                } else {
                    paths.push(format!("{}/{}", prefix, name));
                }
            }
        }
        paths.sort();
        paths
    }

    fn permits(ctx: &Context, attr: &Attr, mask: u8) -> bool {
        if ctx.uid() == 0 {
            return true;
        }
        let mode = attr.mode;
        let perm = if ctx.uid() == attr.uid {
            (mode >> 6) & 7
        } else if ctx.gid() == attr.gid || ctx.gids().contains(&attr.gid) {
            (mode >> 3) & 7
        } else {
            mode & 7
        };
        (perm as u8) & mask == mask
    }
}

impl Meta for MemMeta {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> MetaResult<Format> {
        Ok(self.format.clone())
    }

    fn getattr(&self, _ctx: &Context, ino: Ino) -> MetaResult<Attr> {
        Self::getattr_locked(&self.state.read(), ino)
    }

    fn lookup(&self, _ctx: &Context, parent: Ino, name: &str) -> MetaResult<(Ino, Attr)> {
        Self::lookup_locked(&self.state.read(), parent, name)
    }

    fn resolve(&self, _ctx: &Context, parent: Ino, path: &str) -> MetaResult<(Ino, Attr)> {
        if !self.bulk_resolve {
            return Err(MetaError::NotSupported("resolve".into()));
        }
        Self::resolve_locked(&self.state.read(), parent, path, 0)
    }

    fn access(&self, ctx: &Context, ino: Ino, mask: u8) -> MetaResult<()> {
        let attr = Self::getattr_locked(&self.state.read(), ino)?;
        if Self::permits(ctx, &attr, mask) {
            Ok(())
        } else {
            Err(MetaError::PermissionDenied { ino })
        }
    }

    fn readdir(&self, _ctx: &Context, ino: Ino) -> MetaResult<Vec<Entry>> {
        if let Some(err) = self.faults.lock().readdir.get(&ino) {
            return Err(err.clone());
        }

        let state = self.state.read();
        let node = state
            .nodes
            .get(&ino)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", ino)))?;
        if !node.attr.typ.is_dir() {
            return Err(MetaError::NotDir { ino });
        }

        let mut entries = Vec::with_capacity(node.children.len() + 2);
        entries.push(Entry {
            inode: ino,
            name: ".".into(),
            attr: node.attr.clone(),
        });
        entries.push(Entry {
            inode: node.attr.parent,
            name: "..".into(),
            attr: Self::getattr_locked(&state, node.attr.parent)?,
        });
        for (name, child) in &node.children {
            entries.push(Entry {
                inode: *child,
                name: name.clone(),
                attr: Self::getattr_locked(&state, *child)?,
            });
        }
        Ok(entries)
    }

    fn readlink(&self, _ctx: &Context, ino: Ino) -> MetaResult<Vec<u8>> {
        let state = self.state.read();
        let node = state
            .nodes
            .get(&ino)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", ino)))?;
        if !node.attr.typ.is_symlink() {
            return Err(MetaError::InvalidArgument(format!(
                "inode {} is not a symlink",
                ino
            )));
        }
        Ok(node.target.clone())
    }

    fn list_slices(&self, _ctx: &Context, ino: Ino) -> MetaResult<Vec<Slice>> {
        if let Some(err) = self.faults.lock().slices.get(&ino) {
            return Err(err.clone());
        }

        let state = self.state.read();
        let node = state
            .nodes
            .get(&ino)
            .ok_or_else(|| MetaError::NotFound(format!("inode {}", ino)))?;
        if node.attr.typ.is_file() {
            Ok(node.slices.clone())
        } else {
            Ok(Vec::new())
        }
    }

    fn scan_deleted_objects(
        &self,
        _ctx: &Context,
        visit: &mut dyn FnMut(Ino, u64, i64),
    ) -> MetaResult<()> {
        if let Some(err) = self.faults.lock().scan.clone() {
            return Err(err);
        }

        // Snapshot first so the visitor runs without holding the lock
        let deleted: Vec<(Ino, DeletedFile)> = self
            .state
            .read()
            .deleted
            .iter()
            .map(|(ino, file)| (*ino, *file))
            .collect();

        for (ino, file) in deleted {
            visit(ino, file.length, file.expire);
        }
        Ok(())
    }

    fn get_paths(&self, _ctx: &Context, ino: Ino) -> Vec<String> {
        Self::paths_locked(&self.state.read(), ino, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{MODE_MASK_R, MODE_MASK_X};

    fn ctx() -> Context {
        Context::root()
    }

    #[test]
    fn test_mkdir_and_lookup() {
        let meta = MemMeta::new(Format::default());
        let a = meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        let (ino, attr) = meta.lookup(&ctx(), Ino::ROOT, "a").unwrap();
        assert_eq!(ino, a);
        assert!(attr.typ.is_dir());
        assert_eq!(attr.parent, Ino::ROOT);

        assert_eq!(meta.lookup(&ctx(), a, "..").unwrap().0, Ino::ROOT);
        assert_eq!(meta.lookup(&ctx(), Ino::ROOT, "..").unwrap().0, Ino::ROOT);
        assert!(matches!(
            meta.lookup(&ctx(), a, "missing"),
            Err(MetaError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let meta = MemMeta::new(Format::default());
        meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        assert!(matches!(
            meta.mkdir(Ino::ROOT, "a", 0o755),
            Err(MetaError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_readdir_includes_dot_entries() {
        let meta = MemMeta::new(Format::default());
        let a = meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        meta.create(a, "f", 0o644, vec![Slice::new(1, 10)], 100)
            .unwrap();

        let entries = meta.readdir(&ctx(), a).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "f"]);
        assert_eq!(entries[1].inode, Ino::ROOT);
        assert_eq!(entries[2].attr.ctime, 100);
        assert_eq!(entries[2].attr.length, 10);
    }

    #[test]
    fn test_readdir_of_file_fails() {
        let meta = MemMeta::new(Format::default());
        let f = meta.create(Ino::ROOT, "f", 0o644, vec![], 0).unwrap();
        assert!(matches!(
            meta.readdir(&ctx(), f),
            Err(MetaError::NotDir { .. })
        ));
    }

    #[test]
    fn test_access_checks_mode_bits() {
        let meta = MemMeta::new(Format::default());
        let secret = meta.mkdir(Ino::ROOT, "secret", 0o700).unwrap();
        meta.update_attr(secret, |a| a.uid = 1000).unwrap();

        let owner = Context::new(1000, 1000, vec![1000]);
        let other = Context::new(2000, 2000, vec![2000]);

        assert!(meta
            .access(&owner, secret, MODE_MASK_R | MODE_MASK_X)
            .is_ok());
        assert!(matches!(
            meta.access(&other, secret, MODE_MASK_R | MODE_MASK_X),
            Err(MetaError::PermissionDenied { .. })
        ));
        assert!(meta.access(&ctx(), secret, MODE_MASK_R).is_ok());
    }

    #[test]
    fn test_bulk_resolve_disabled_by_default() {
        let meta = MemMeta::new(Format::default());
        assert!(meta
            .resolve(&ctx(), Ino::ROOT, "a")
            .unwrap_err()
            .is_not_supported());
    }

    #[test]
    fn test_bulk_resolve_follows_relative_symlink() {
        let meta = MemMeta::new(Format::default()).with_bulk_resolve(true);
        let a = meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        let b = meta.mkdir(a, "b", 0o755).unwrap();
        meta.symlink(a, "link", "b").unwrap();

        let (ino, _) = meta.resolve(&ctx(), Ino::ROOT, "a/link").unwrap();
        assert_eq!(ino, b);
    }

    #[test]
    fn test_get_paths_hard_links() {
        let meta = MemMeta::new(Format::default());
        let a = meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        let f = meta.create(a, "f", 0o644, vec![], 0).unwrap();
        meta.link(f, Ino::ROOT, "g").unwrap();

        assert_eq!(meta.get_paths(&ctx(), f), vec!["/a/f", "/g"]);
        assert_eq!(meta.getattr(&ctx(), f).unwrap().nlink, 2);
    }

    #[test]
    fn test_unlink_last_link_registers_deletion() {
        let meta = MemMeta::new(Format::default());
        let f = meta
            .create(Ino::ROOT, "f", 0o644, vec![Slice::new(3, 64)], 0)
            .unwrap();
        meta.unlink(Ino::ROOT, "f").unwrap();

        let mut seen = Vec::new();
        meta.scan_deleted_objects(&ctx(), &mut |ino, len, _| seen.push((ino, len)))
            .unwrap();
        assert_eq!(seen, vec![(f, 64)]);
        assert!(meta.get_paths(&ctx(), f).is_empty());
        assert_eq!(meta.list_slices(&ctx(), f).unwrap().len(), 1);
    }

    #[test]
    fn test_injected_faults() {
        let meta = MemMeta::new(Format::default());
        meta.inject_readdir_error(Ino::ROOT, MetaError::Io("disk".into()));
        meta.inject_scan_error(MetaError::Io("scan".into()));

        assert!(meta.readdir(&ctx(), Ino::ROOT).is_err());
        assert!(meta
            .scan_deleted_objects(&ctx(), &mut |_, _, _| {})
            .is_err());
    }

    #[test]
    fn test_insert_with_fixed_inode() {
        let meta = MemMeta::new(Format::default());
        let ino = meta
            .insert(
                Ino::ROOT,
                "x",
                Some(Ino(100)),
                Attr::file(0o644, 0, 0),
                NodeData::File(vec![]),
            )
            .unwrap();
        assert_eq!(ino, Ino(100));
        let next = meta.mkdir(Ino::ROOT, "y", 0o755).unwrap();
        assert_eq!(next, Ino(101));
    }
}
