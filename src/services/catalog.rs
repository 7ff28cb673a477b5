//! File catalog: the in-memory tree of decompiled files grouped by source archive.
//!
//! Classification is purely path based. A file at `<root>/<group>/<rest>` belongs to
//! `<group>`; files directly under the root and unknown extensions are ignored.

use crate::error::Result;
use crate::models::{ArchiveGroup, Entry, EntryKind};
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Every regular file under `root`, in a stable (file-name sorted) order.
///
/// Any directory that cannot be listed fails the whole walk.
pub fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();

    for item in WalkDir::new(root).sort_by_file_name() {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }

        match Utf8PathBuf::from_path_buf(item.into_path()) {
            Ok(path) => files.push(path),
            Err(path) => tracing::warn!("Skipping non UTF-8 path: {}", path.display()),
        }
    }

    Ok(files)
}

/// Name of the group `path` belongs to, i.e. its first segment under `root`.
pub fn group_key(root: &Utf8Path, path: &Utf8Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    // A file directly under the root has no group
    components.next()?;
    Some(first.as_str().to_string())
}

/// Walk `root` and build the catalog from scratch.
///
/// Groups appear in walk order. Selection and expansion start cleared; use
/// [`carry_expansion`] to keep the tree layout of a previous catalog.
pub fn rebuild(root: &Utf8Path) -> Result<Vec<ArchiveGroup>> {
    let mut catalog = Vec::new();

    for path in walk_files(root)? {
        if !add_entry(&mut catalog, root, &path) {
            tracing::debug!("Not cataloged: {}", path);
        }
    }

    tracing::info!(
        "Catalog rebuilt from {}: {} groups, {} entries",
        root,
        catalog.len(),
        catalog.iter().map(|g| g.entries.len()).sum::<usize>()
    );

    Ok(catalog)
}

/// Find or create the owning group for `path` and append an entry for it.
///
/// New groups go to the end; existing groups keep their position. The group is
/// deduplicated by path afterwards, keeping the first occurrence.
///
/// # Returns
/// `false` if the path is outside a group or has an unknown extension
pub fn add_entry(catalog: &mut Vec<ArchiveGroup>, root: &Utf8Path, path: &Utf8Path) -> bool {
    let Some(kind) = EntryKind::from_path(path) else {
        return false;
    };
    let Some(key) = group_key(root, path) else {
        return false;
    };

    let index = match catalog.iter().position(|g| g.name == key) {
        Some(index) => index,
        None => {
            catalog.push(ArchiveGroup::new(key.clone()));
            catalog.len() - 1
        }
    };

    let group = &mut catalog[index];
    group.entries.push(Entry::new(key, path.to_path_buf(), kind));
    group.dedup_entries();
    true
}

/// Remove every entry for `path` and prune groups left empty.
///
/// # Returns
/// The number of entries removed
pub fn remove_entry(catalog: &mut Vec<ArchiveGroup>, path: &Utf8Path) -> usize {
    let mut removed = 0;
    for group in catalog.iter_mut() {
        let before = group.entries.len();
        group.entries.retain(|e| e.path != path);
        removed += before - group.entries.len();
    }
    catalog.retain(|g| !g.entries.is_empty());
    removed
}

/// Copy each group's `expanded` flag from `previous` onto the group of the same name.
pub fn carry_expansion(previous: &[ArchiveGroup], next: &mut [ArchiveGroup]) {
    for group in next.iter_mut() {
        if let Some(old) = previous.iter().find(|g| g.name == group.name) {
            group.expanded = old.expanded;
        }
    }
}

/// Path an entry occupies inside a rebuilt archive.
///
/// `<exml_dir>/<group>/models/foo.exml` maps to `models/foo.exml`.
pub fn archive_relative_path(exml_dir: &Utf8Path, entry: &Entry) -> Option<Utf8PathBuf> {
    entry
        .path
        .strip_prefix(exml_dir.join(&entry.group))
        .ok()
        .map(Utf8Path::to_path_buf)
}
