use serde::{Deserialize, Serialize};

use crate::Object;

/// A single frame of a stack trace.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Frame {
    /// Path of the source file, relative to the project root or load path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Absolute path of the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,

    /// Name of the function being called.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Name of the containing module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Line number, starting at 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,

    /// Whether the frame belongs to the application rather than a library.
    #[serde(default)]
    pub in_app: bool,

    /// Local variables at the time of the capture.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub vars: Object,

    /// Source lines before the context line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_context: Vec<String>,

    /// The source line of the frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_line: Option<String>,

    /// Source lines after the context line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_context: Vec<String>,
}

/// A stack trace, innermost frame last.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Stacktrace {
    /// The frames of this stack trace.
    #[serde(default)]
    pub frames: Vec<Frame>,
}

impl Stacktrace {
    /// Creates a stack trace from frames.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Returns `true` if this stack trace has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;

    use super::*;

    #[test]
    fn test_frame_omits_empty_context() {
        let frame = Frame {
            filename: Some("src/main.rs".to_owned()),
            abs_path: Some("/app/src/main.rs".to_owned()),
            function: Some("main".to_owned()),
            lineno: Some(7),
            in_app: true,
            ..Frame::default()
        };

        assert_json_snapshot!(Stacktrace::new(vec![frame]), @r#"
        {
          "frames": [
            {
              "filename": "src/main.rs",
              "abs_path": "/app/src/main.rs",
              "function": "main",
              "lineno": 7,
              "in_app": true
            }
          ]
        }
        "#);
    }

    #[test]
    fn test_frame_with_context() {
        let frame = Frame {
            filename: Some("lib.rs".to_owned()),
            lineno: Some(2),
            pre_context: vec!["fn a() {".to_owned()],
            context_line: Some("    panic!()".to_owned()),
            post_context: vec!["}".to_owned()],
            ..Frame::default()
        };

        assert_json_snapshot!(frame, @r#"
        {
          "filename": "lib.rs",
          "lineno": 2,
          "in_app": false,
          "pre_context": [
            "fn a() {"
          ],
          "context_line": "    panic!()",
          "post_context": [
            "}"
          ]
        }
        "#);
    }
}
