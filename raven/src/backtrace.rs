use std::sync::{Arc, LazyLock};

use raven_config::StacktraceConfig;
use raven_protocol::{Frame, Stacktrace};
use regex::Regex;

use crate::linecache::LineCache;

/// Grammar of a single backtrace line: `<file>:<line>(:in `<method>`)?`.
static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*((?:[a-zA-Z]:)?[^:]+|<.*>):(\d+)(?::in [`']([^'`]+)['`])?\s*$").unwrap()
});

/// A parsed line of a raw backtrace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    /// The file as it appears in the backtrace.
    pub file: String,
    /// The 1-based line number.
    pub number: u32,
    /// The method name without its module path.
    pub method: Option<String>,
    /// The module path of the method, if it was qualified.
    pub module_name: Option<String>,
    /// Whether the line belongs to the application.
    pub in_app: bool,
}

/// Returns the remainder of `path` below the directory `dir`.
fn strip_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let dir = dir.trim_end_matches('/');
    path.strip_prefix(dir)?.strip_prefix('/')
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('<')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

fn split_method(method: &str) -> (Option<String>, String) {
    match method.rsplit_once("::") {
        Some((module, name)) if !module.is_empty() && !name.is_empty() => {
            (Some(module.to_owned()), name.to_owned())
        }
        _ => (None, method.to_owned()),
    }
}

/// Converts raw backtraces into stack frames.
///
/// Frames are classified as in-app when they are neither below a load path nor below an excluded
/// prefix of the project root, and are either relative or below the project root.
#[derive(Clone, Default)]
pub struct BacktraceParser {
    project_root: Option<String>,
    in_app_exclude: Vec<String>,
    load_paths: Vec<String>,
    context_lines: Option<usize>,
    linecache: Option<Arc<dyn LineCache>>,
}

impl BacktraceParser {
    /// Creates a parser from the stacktrace settings.
    pub fn new(config: &StacktraceConfig) -> Self {
        Self {
            project_root: config.project_root.clone(),
            in_app_exclude: config.in_app_exclude.clone(),
            load_paths: config.load_paths.clone(),
            context_lines: config.context_lines,
            linecache: None,
        }
    }

    /// Attaches source context from the given line cache when context lines are configured.
    pub fn with_linecache(mut self, linecache: Arc<dyn LineCache>) -> Self {
        self.linecache = Some(linecache);
        self
    }

    /// Parses a single line. Returns `None` if the line does not match the grammar.
    pub fn parse_line(&self, line: &str) -> Option<Line> {
        let captures = LINE_REGEX.captures(line)?;

        let file = captures.get(1)?.as_str().to_owned();
        let number = captures.get(2)?.as_str().parse().ok()?;
        let (module_name, method) = match captures.get(3) {
            Some(method) => {
                let (module, method) = split_method(method.as_str());
                (module, Some(method))
            }
            None => (None, None),
        };

        let in_app = self.is_in_app(&file);

        Some(Line {
            file,
            number,
            method,
            module_name,
            in_app,
        })
    }

    /// Parses all valid lines in input order. Invalid lines are skipped.
    pub fn parse<S: AsRef<str>>(&self, backtrace: &[S]) -> Vec<Line> {
        backtrace
            .iter()
            .filter_map(|line| self.parse_line(line.as_ref()))
            .collect()
    }

    /// Converts a backtrace into frames.
    ///
    /// The backtrace lists the innermost frame first. Frames are returned outermost first, the
    /// order the collector expects. Frames without a filename are dropped.
    pub fn frames<S: AsRef<str>>(&self, backtrace: &[S]) -> Vec<Frame> {
        self.parse(backtrace)
            .into_iter()
            .rev()
            .filter_map(|line| self.frame(line))
            .collect()
    }

    /// Converts a backtrace into a stack trace. See [`frames`](Self::frames).
    pub fn stacktrace<S: AsRef<str>>(&self, backtrace: &[S]) -> Stacktrace {
        Stacktrace::new(self.frames(backtrace))
    }

    fn frame(&self, line: Line) -> Option<Frame> {
        let filename = self.filename(&line.file, line.in_app)?;

        let mut frame = Frame {
            filename: Some(filename),
            function: line.method,
            module: line.module_name,
            lineno: Some(line.number),
            in_app: line.in_app,
            ..Frame::default()
        };

        if let (Some(context), Some(linecache)) = (self.context_lines, &self.linecache)
            && let Some(source) = linecache.get_file_context(&line.file, line.number, context)
        {
            frame.pre_context = source.pre_context;
            frame.context_line = source.context_line;
            frame.post_context = source.post_context;
        }

        frame.abs_path = Some(line.file);
        Some(frame)
    }

    fn under_project_root(&self, path: &str) -> bool {
        self.project_root
            .as_deref()
            .is_some_and(|root| strip_dir(path, root).is_some())
    }

    fn longest_load_path(&self, path: &str) -> Option<&str> {
        self.load_paths
            .iter()
            .filter(|load_path| strip_dir(path, load_path).is_some())
            .max_by_key(|load_path| load_path.len())
            .map(String::as_str)
    }

    fn is_in_app(&self, path: &str) -> bool {
        if self.longest_load_path(path).is_some() {
            return false;
        }

        let relative = match self.project_root.as_deref().and_then(|root| strip_dir(path, root)) {
            Some(relative) => relative,
            None if is_absolute(path) => return false,
            None => path,
        };

        !self
            .in_app_exclude
            .iter()
            .any(|prefix| relative.starts_with(prefix.as_str()))
    }

    /// Returns the path relative to the project root or the longest matching load path.
    fn filename(&self, path: &str, in_app: bool) -> Option<String> {
        let under_root = self.under_project_root(path);
        let prefix = if under_root && in_app {
            self.project_root.as_deref()
        } else if under_root {
            self.longest_load_path(path).or(self.project_root.as_deref())
        } else {
            self.longest_load_path(path)
        };

        let filename = match prefix {
            Some(prefix) => strip_dir(path, prefix)?,
            None => path,
        };

        (!filename.is_empty()).then(|| filename.to_owned())
    }
}

impl std::fmt::Debug for BacktraceParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktraceParser")
            .field("project_root", &self.project_root)
            .field("in_app_exclude", &self.in_app_exclude)
            .field("load_paths", &self.load_paths)
            .field("context_lines", &self.context_lines)
            .finish_non_exhaustive()
    }
}
