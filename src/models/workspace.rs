use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::fmt;

/// Directory holding the extracted binary-model tree.
pub const MBIN_DIR: &str = "MBINs";

/// Directory holding the decompiled text tree plus passthrough files.
pub const EXML_DIR: &str = "EXMLs";

/// Transient tree assembled before recompilation.
pub const STAGING_DIR: &str = "staging";

pub const ARCHIVE_EXTENSION: &str = "pak";
pub const BINARY_MODEL_EXTENSION: &str = "MBIN";
pub const TEXT_EXTENSION: &str = "exml";

/// Case-insensitive extension check.
pub fn has_extension(path: &Utf8Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Group key for the entries extracted from an archive file.
///
/// `NMSARC.Foo.pak` extracts to `MBINs/_NMSARC.Foo`, so its group is `_NMSARC.Foo`.
pub fn group_name_for_archive(archive: &Utf8Path) -> Option<String> {
    archive.file_stem().map(|stem| format!("_{}", stem))
}

/// Kind of a catalog entry, derived from its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Decompiled binary model, editable and mergeable
    Text,
    /// Texture carried through verbatim
    Image,
    /// Raw binary carried through verbatim
    RawBinary,
}

impl EntryKind {
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let ext = path.extension()?.to_ascii_lowercase();
        match ext.as_str() {
            "exml" => Some(Self::Text),
            "dds" => Some(Self::Image),
            "bin" => Some(Self::RawBinary),
            _ => None,
        }
    }

    pub fn is_mergeable(self) -> bool {
        self == Self::Text
    }

    pub fn is_passthrough(self) -> bool {
        !self.is_mergeable()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "binary-image",
            Self::RawBinary => "raw-binary",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file tracked by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Name of the owning group (a back-reference by key, not ownership)
    pub group: String,
    pub name: String,
    pub path: Utf8PathBuf,
    pub kind: EntryKind,
    pub selected: bool,
}

impl Entry {
    pub fn new(group: impl Into<String>, path: Utf8PathBuf, kind: EntryKind) -> Self {
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        Self {
            group: group.into(),
            name,
            path,
            kind,
            selected: false,
        }
    }
}

/// The entries originating from one source archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveGroup {
    pub name: String,
    pub entries: Vec<Entry>,
    pub selected: bool,
    /// Tree expansion, preserved across rebuilds by group name
    pub expanded: bool,
}

impl ArchiveGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            selected: false,
            expanded: false,
        }
    }

    /// Drop later duplicates of the same path, keeping the first occurrence.
    pub fn dedup_entries(&mut self) {
        let mut seen = HashSet::new();
        self.entries.retain(|entry| seen.insert(entry.path.clone()));
    }
}

/// Which pipeline currently owns the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PipelinePhase {
    #[default]
    Idle = 0,
    Importing = 1,
    Compiling = 2,
    Clearing = 3,
}

impl PipelinePhase {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Importing,
            2 => Self::Compiling,
            3 => Self::Clearing,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Importing => "importing",
            Self::Compiling => "compiling",
            Self::Clearing => "clearing",
        };
        f.write_str(name)
    }
}

/// Process-wide workspace state.
///
/// Owned by [`crate::state::StateManager`]; only the orchestrator and the catalog
/// mutate it, always through `StateManager::update()`.
#[derive(Clone, Debug)]
pub struct WorkspaceState {
    pub work_dir: Utf8PathBuf,
    pub catalog: Vec<ArchiveGroup>,
    pub active_file: Option<Utf8PathBuf>,
    /// Text of the open entry, as last loaded or saved
    pub editor_content: String,
    pub multi_threading: bool,
    /// Binary-model paths that failed to decompile; never retried
    pub failures: HashSet<Utf8PathBuf>,
}

impl WorkspaceState {
    pub fn new(work_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            catalog: Vec::new(),
            active_file: None,
            editor_content: String::new(),
            multi_threading: false,
            failures: HashSet::new(),
        }
    }

    pub fn mbin_dir(&self) -> Utf8PathBuf {
        self.work_dir.join(MBIN_DIR)
    }

    pub fn exml_dir(&self) -> Utf8PathBuf {
        self.work_dir.join(EXML_DIR)
    }

    pub fn staging_dir(&self) -> Utf8PathBuf {
        self.work_dir.join(STAGING_DIR)
    }

    pub fn entry_count(&self) -> usize {
        self.catalog.iter().map(|g| g.entries.len()).sum()
    }

    pub fn find_group(&self, name: &str) -> Option<&ArchiveGroup> {
        self.catalog.iter().find(|g| g.name == name)
    }

    /// Every entry that takes part in a compile.
    ///
    /// A selected group contributes all of its entries; otherwise only its
    /// individually selected entries are included.
    pub fn selected_entries(&self) -> Vec<Entry> {
        let mut selected = Vec::new();
        for group in &self.catalog {
            if group.selected {
                selected.extend(group.entries.iter().cloned());
            } else {
                selected.extend(group.entries.iter().filter(|e| e.selected).cloned());
            }
        }
        selected
    }

    pub fn ready_status_text(&self) -> String {
        let groups = self.catalog.len();
        let entries = self.entry_count();
        format!(
            "{} archive{}, {} file{} loaded from {}",
            groups,
            if groups == 1 { "" } else { "s" },
            entries,
            if entries == 1 { "" } else { "s" },
            self.exml_dir()
        )
    }

    pub fn selected_status_text(&self) -> String {
        match self.selected_entries().len() {
            0 => self.ready_status_text(),
            1 => "1 file selected".to_string(),
            n => format!("{} files selected", n),
        }
    }
}
