//! Mapping collected tool output onto its configured target.

use crate::ansi::{render_styled, strip_control_sequences, StyledSpan};
use crate::editor::EditorState;
use crate::models::tool::OutputTarget;

/// What the editor should do with a piece of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// Nothing: the output was empty or its target is `ignore`.
    Ignored,
    /// Open a read-only window with the styled text.
    Popup {
        /// Window title.
        title: String,
        /// Whether the text came from standard error.
        is_error: bool,
        /// Styled content.
        spans: Vec<StyledSpan>,
    },
    /// Insert the text, without control sequences, at the cursor.
    Paste(String),
    /// Replace the current document with the styled text.
    ReplaceDocument(Vec<StyledSpan>),
    /// Append the styled text to the console.
    Console(Vec<StyledSpan>),
    /// The document changed while the tool ran; the edit was not applied.
    Stale {
        /// Target that was skipped.
        target: OutputTarget,
    },
}

/// Context of the run that produced some output.
#[derive(Debug, Clone, Copy)]
pub struct OutputOrigin<'a> {
    /// Tool name, used as the window title.
    pub title: &'a str,
    /// Whether the output is standard error.
    pub is_error: bool,
    /// Editor state token when the tool was launched.
    pub launched_token: u64,
}

/// Decide how to present `output` for `target`.
///
/// Targets that edit the document (`paste`, `replace_document`) are skipped
/// with [`Presentation::Stale`] when the editor's state token no longer
/// matches the one captured at launch.
#[must_use]
pub fn present(
    output: &[u8],
    target: OutputTarget,
    origin: OutputOrigin<'_>,
    editor: &dyn EditorState,
) -> Presentation {
    if output.is_empty() {
        return Presentation::Ignored;
    }

    let edits_document = matches!(target, OutputTarget::Paste | OutputTarget::ReplaceDocument);
    if edits_document && editor.state_token() != origin.launched_token {
        tracing::info!(
            tool = origin.title,
            ?target,
            "document changed while the tool ran; discarding its output"
        );
        return Presentation::Stale { target };
    }

    match target {
        OutputTarget::Ignore => Presentation::Ignored,
        OutputTarget::Popup => Presentation::Popup {
            title: origin.title.to_owned(),
            is_error: origin.is_error,
            spans: render_styled(output),
        },
        OutputTarget::Paste => Presentation::Paste(strip_control_sequences(output)),
        OutputTarget::ReplaceDocument => Presentation::ReplaceDocument(render_styled(output)),
        OutputTarget::Console => Presentation::Console(render_styled(output)),
    }
}
