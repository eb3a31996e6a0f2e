//! Small helpers shared by several modules.

use std::path::Path;

/// Replace whitespace with visible symbols for protocol logs.
///
/// Line feeds keep a real line break after their symbol so multi-line
/// traffic stays readable.
#[must_use]
pub fn visible_whitespace(text: &str) -> String {
    let mut visible = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            ' ' => visible.push('␠'),
            '\r' => visible.push('␍'),
            '\n' => visible.push_str("␊\n"),
            '\t' => visible.push('↹'),
            other => visible.push(other),
        }
    }
    visible
}

/// Convert a file-system path to a `file://` URI.
#[must_use]
pub fn path_to_file_uri(path: &Path) -> String {
    let text = path.to_string_lossy();
    let forward = text.replace('\\', "/");
    if forward.starts_with('/') {
        format!("file://{forward}")
    } else {
        // Windows drive letter: C:/… → file:///C:/…
        format!("file:///{forward}")
    }
}
