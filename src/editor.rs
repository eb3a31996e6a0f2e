//! Editor collaborator interfaces and placeholder substitution.
//!
//! The editor UI is not part of this crate. It is represented by
//! [`EditorState`], which answers questions about the current buffer, and
//! [`StatusSink`], which receives one-line messages for the status bar.

/// Placeholder replaced by the path of the current file.
pub const FILE_PATH_PLACEHOLDER: &str = "$FilePath";

/// Placeholder replaced by the current text selection.
pub const SELECTION_PLACEHOLDER: &str = "$Selection";

/// Read access to the editor's current state.
pub trait EditorState: Send + Sync {
    /// Path of the file in the focused edit window; empty when unsaved.
    fn current_file_path(&self) -> String;

    /// Currently selected text; empty when nothing is selected.
    fn current_selection(&self) -> String;

    /// Full text of the current buffer.
    fn current_buffer(&self) -> String;

    /// Opaque token that changes whenever the buffer changes.
    ///
    /// Results computed against an older token are stale.
    fn state_token(&self) -> u64;
}

/// Receives single-line, human-readable messages about tool activity.
pub trait StatusSink: Send + Sync {
    /// Report `message`.
    fn report(&self, message: &str);
}

/// Status sink that forwards messages to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn report(&self, message: &str) {
        tracing::warn!(status = message, "tool status");
    }
}

/// Fixed editor state, used by the command line front end and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorSnapshot {
    /// Current file path.
    pub file_path: String,
    /// Current selection.
    pub selection: String,
    /// Current buffer text.
    pub buffer: String,
    /// State token.
    pub token: u64,
}

impl EditorState for EditorSnapshot {
    fn current_file_path(&self) -> String {
        self.file_path.clone()
    }

    fn current_selection(&self) -> String {
        self.selection.clone()
    }

    fn current_buffer(&self) -> String {
        self.buffer.clone()
    }

    fn state_token(&self) -> u64 {
        self.token
    }
}

/// Replace `$FilePath` and `$Selection` in `text` with the editor's values.
///
/// The text is scanned once from left to right. Substituted values are
/// copied verbatim and never scanned again, so a selection that itself
/// contains `$FilePath` stays as typed.
#[must_use]
pub fn resolve_placeholders(text: &str, editor: &dyn EditorState) -> String {
    if !text.contains('$') {
        return text.to_owned();
    }

    let mut file_path = None;
    let mut selection = None;
    let mut resolved = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        resolved.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        if candidate.starts_with(FILE_PATH_PLACEHOLDER) {
            resolved.push_str(file_path.get_or_insert_with(|| editor.current_file_path()));
            rest = &candidate[FILE_PATH_PLACEHOLDER.len()..];
        } else if candidate.starts_with(SELECTION_PLACEHOLDER) {
            resolved.push_str(selection.get_or_insert_with(|| editor.current_selection()));
            rest = &candidate[SELECTION_PLACEHOLDER.len()..];
        } else {
            resolved.push('$');
            rest = &candidate[1..];
        }
    }
    resolved.push_str(rest);
    resolved
}
