use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;

/// Source lines surrounding a frame.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceContext {
    /// Lines before the frame's line, oldest first.
    pub pre_context: Vec<String>,
    /// The frame's line.
    pub context_line: Option<String>,
    /// Lines after the frame's line.
    pub post_context: Vec<String>,
}

/// Looks up source lines for stack frames.
pub trait LineCache: Send + Sync {
    /// Returns up to `context` lines before and after the 1-based line `lineno` of `path`.
    fn get_file_context(&self, path: &str, lineno: u32, context: usize) -> Option<SourceContext>;
}

/// The default number of files held by a [`FileLineCache`].
pub const DEFAULT_MAX_FILES: usize = 100;

/// A [`LineCache`] reading source files from disk.
///
/// Files are read once and kept until the cache holds `max_files` entries. Past that, an
/// arbitrary file is evicted for each new one. Files are read without holding the lock.
#[derive(Debug)]
pub struct FileLineCache {
    files: Mutex<HashMap<String, Option<Arc<[String]>>>>,
    max_files: usize,
}

impl FileLineCache {
    /// Creates an empty cache holding up to [`DEFAULT_MAX_FILES`] files.
    pub fn new() -> Self {
        Self::with_max_files(DEFAULT_MAX_FILES)
    }

    /// Creates an empty cache holding up to `max_files` files.
    pub fn with_max_files(max_files: usize) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            max_files,
        }
    }

    /// Returns the number of cached files, including files that could not be read.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    /// Returns `true` if no file is cached.
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    fn lines(&self, path: &str) -> Option<Arc<[String]>> {
        if let Some(lines) = self.files.lock().get(path) {
            return lines.clone();
        }

        let lines: Option<Arc<[String]>> = fs::read_to_string(path)
            .ok()
            .map(|contents| contents.lines().map(str::to_owned).collect());

        if self.max_files > 0 {
            let mut files = self.files.lock();
            if files.len() >= self.max_files
                && !files.contains_key(path)
                && let Some(evicted) = files.keys().next().cloned()
            {
                files.remove(&evicted);
            }
            files.insert(path.to_owned(), lines.clone());
        }

        lines
    }
}

impl Default for FileLineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCache for FileLineCache {
    fn get_file_context(&self, path: &str, lineno: u32, context: usize) -> Option<SourceContext> {
        let lines = self.lines(path)?;
        let index = usize::try_from(lineno).ok()?.checked_sub(1)?;
        let context_line = lines.get(index)?.clone();

        let start = index.saturating_sub(context);
        let end = index.saturating_add(context).saturating_add(1).min(lines.len());

        Some(SourceContext {
            pre_context: lines[start..index].to_vec(),
            context_line: Some(context_line),
            post_context: lines[index + 1..end].to_vec(),
        })
    }
}
