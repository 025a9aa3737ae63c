//! Project context building.
//!
//! Walks a project tree, prunes ignored directories and file extensions, and
//! concatenates every readable UTF-8 file into one labeled text that seeds the
//! conversation.  Failures are per file: an unreadable file is reported as
//! skipped and never aborts the walk.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::observability::{CONTEXT_BYTES, CONTEXT_FILES_INCLUDED, CONTEXT_FILES_SKIPPED};

/// The sentence every context starts with.
pub const INTRODUCTION: &str =
    "Here is the complete source code of the project. Analyze it to answer questions.\n\n";

/// Directory names pruned from the walk by default.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    "venv",
    "env",
    ".idea",
    ".vscode",
    "build",
    "dist",
];

/// File extensions skipped by default.
pub const DEFAULT_IGNORE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".ico", ".pdf", ".exe", ".bin", ".lock", ".pyc",
];

/// A progress marker is emitted every this many included files.
pub const PROGRESS_INTERVAL: usize = 10;

////////////////////////////////////////// ContextConfig //////////////////////////////////////////

/// What to walk and what to leave out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Root of the walk.  Section headers are relative to it.
    pub root: PathBuf,
    /// Directory names never descended into, at any depth.
    pub ignore_dirs: BTreeSet<String>,
    /// Lower-cased extensions, with their leading dot.
    pub ignore_extensions: BTreeSet<String>,
}

impl ContextConfig {
    /// Creates a configuration for `root` with the default ignore lists.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
            ignore_extensions: DEFAULT_IGNORE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replaces the ignored directory names.
    pub fn with_ignore_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the ignored extensions.  `png`, `.png` and `.PNG` are equivalent.
    pub fn with_ignore_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore_extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self
    }

    /// Returns true if a directory with this name is pruned.
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignore_dirs.contains(name)
    }

    /// Returns true if a file with this name is skipped for its extension.
    pub fn is_ignored_file(&self, name: &str) -> bool {
        extension_of(name).is_some_and(|ext| self.ignore_extensions.contains(&ext))
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// The lower-cased extension of a file name, with its dot.  Dotfiles such as
/// `.bashrc` have no extension.
fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/////////////////////////////////////////// FileOutcome ///////////////////////////////////////////

/// A file that made it into the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the root, `/`-separated.
    pub path: String,
    /// Full text of the file.
    pub content: String,
}

/// Why a file was left out of the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The extension is in the ignore list.
    IgnoredExtension,
    /// The path cannot be represented as UTF-8.
    NonUtf8Path,
    /// The content is not valid UTF-8 (binary files land here).
    NotUtf8,
    /// The file could not be read.
    Io(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IgnoredExtension => write!(f, "ignored extension"),
            SkipReason::NonUtf8Path => write!(f, "path is not UTF-8"),
            SkipReason::NotUtf8 => write!(f, "not UTF-8 text"),
            SkipReason::Io(err) => write!(f, "unreadable: {err}"),
        }
    }
}

/// The result of considering one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file is part of the context.
    Included(SourceFile),
    /// The file was left out.
    Skipped {
        /// Path relative to the root (lossy if not UTF-8).
        path: String,
        /// Why it was left out.
        reason: SkipReason,
    },
}

////////////////////////////////////////// ProjectContext //////////////////////////////////////////

/// The concatenated project text, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    text: String,
    file_count: usize,
    skipped: Vec<(String, SkipReason)>,
}

impl ProjectContext {
    /// The full context text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of files included.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Files left out, with the reason.
    pub fn skipped(&self) -> &[(String, SkipReason)] {
        &self.skipped
    }

    /// Consumes the context, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Returns true if a section for `path` is present.
    pub fn contains_file(&self, path: &str) -> bool {
        self.text.contains(&section_header(path))
    }
}

/// Receives progress while a context is being built.
pub trait ContextProgress {
    /// Called after each included file with the running count.
    fn file_included(&mut self, count: usize) {
        _ = count;
    }

    /// Called once the context is complete.
    fn finished(&mut self, context: &ProjectContext) {
        _ = context;
    }
}

impl ContextProgress for () {}

fn section_header(path: &str) -> String {
    format!("--- FILE: {path} ---\n")
}

//////////////////////////////////////////////// walk ////////////////////////////////////////////////

/// Considers every file under the root and reports one outcome per file.
///
/// Directories are visited depth-first with entries in file-name order.
/// Ignore files and hidden-file rules play no part; only the configured
/// directory names and extensions are left out.
pub fn collect_files(config: &ContextConfig) -> Vec<FileOutcome> {
    let mut outcomes = Vec::new();
    walk(config, &mut |outcome| outcomes.push(outcome));
    outcomes
}

/// Builds the project context, reporting progress along the way.
pub fn build_context(config: &ContextConfig, progress: &mut dyn ContextProgress) -> ProjectContext {
    let mut text = String::from(INTRODUCTION);
    let mut file_count = 0;
    let mut skipped = Vec::new();

    walk(config, &mut |outcome| match outcome {
        FileOutcome::Included(file) => {
            text.push_str(&section_header(&file.path));
            text.push_str(&file.content);
            text.push_str("\n\n");
            file_count += 1;
            CONTEXT_FILES_INCLUDED.click();
            CONTEXT_BYTES.count(file.content.len() as u64);
            progress.file_included(file_count);
        }
        FileOutcome::Skipped { path, reason } => {
            CONTEXT_FILES_SKIPPED.click();
            skipped.push((path, reason));
        }
    });

    let context = ProjectContext {
        text,
        file_count,
        skipped,
    };
    progress.finished(&context);
    context
}

fn walk(config: &ContextConfig, emit: &mut dyn FnMut(FileOutcome)) {
    let root = config.root.clone();
    let ignore_dirs = config.ignore_dirs.clone();
    let walker = WalkBuilder::new(&root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            entry.depth() == 0
                || !entry.file_type().is_some_and(|ty| ty.is_dir())
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ignore_dirs.contains(name))
        })
        .build();

    // Unreadable directories and entries contribute nothing.
    for entry in walker.filter_map(|entry| entry.ok()) {
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        if file_type.is_file() {
            emit(consider_file(config, path, relative.to_path_buf()));
        } else if file_type.is_symlink() {
            // Symlinked files are read; symlinked directories are not followed.
            if fs::metadata(path).is_ok_and(|meta| meta.is_file()) {
                emit(consider_file(config, path, relative.to_path_buf()));
            }
        }
    }
}

fn consider_file(config: &ContextConfig, path: &Path, relative: PathBuf) -> FileOutcome {
    let display = relative.to_string_lossy().replace('\\', "/");
    let relative = match utf8path::Path::try_from(relative) {
        Ok(relative) => relative.as_str().replace('\\', "/"),
        Err(_) => {
            return FileOutcome::Skipped {
                path: display,
                reason: SkipReason::NonUtf8Path,
            };
        }
    };

    let name = relative.rsplit('/').next().unwrap_or(&relative);
    if config.is_ignored_file(name) {
        return FileOutcome::Skipped {
            path: relative,
            reason: SkipReason::IgnoredExtension,
        };
    }

    match fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(content) => FileOutcome::Included(SourceFile {
                path: relative,
                content,
            }),
            Err(_) => FileOutcome::Skipped {
                path: relative,
                reason: SkipReason::NotUtf8,
            },
        },
        Err(err) => FileOutcome::Skipped {
            path: relative,
            reason: SkipReason::Io(err.to_string()),
        },
    }
}
