//! Builds the bounded text blob submitted to the classifier for one commit.

use crate::source::{CommitDetail, CommitRef, FileChange};

/// Maximum characters of patch text kept per file.
pub const MAX_PATCH_CHARS: usize = 4000;

/// Message used when a commit has neither file changes nor a message.
pub const NO_DIFF_PLACEHOLDER: &str = "(No diff available)";

/// Separator placed between file blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Truncates `patch` to at most [`MAX_PATCH_CHARS`] characters.
#[must_use]
pub fn truncate_patch(patch: &str) -> &str {
    match patch.char_indices().nth(MAX_PATCH_CHARS) {
        Some((byte_index, _)) => &patch[..byte_index],
        None => patch,
    }
}

/// Renders one file block, or `None` for files without signal.
fn file_block(change: &FileChange) -> Option<String> {
    match change {
        FileChange::Patch { filename, patch } => {
            Some(format!("File: {filename}\n{}", truncate_patch(patch)))
        }
        FileChange::StatOnly {
            filename,
            additions,
            deletions,
        } => Some(format!(
            "File: {filename}\n+{additions} lines, -{deletions} lines"
        )),
        FileChange::Empty { .. } => None,
    }
}

/// Summarizes a commit's changes.
///
/// A commit without any file entries falls back to its message, or to
/// [`NO_DIFF_PLACEHOLDER`]. When entries exist but none carry signal the
/// message is used if present. Returns `None` when the resulting text is
/// blank; such commits are not classified.
#[must_use]
pub fn summarize_commit(commit: &CommitRef, detail: &CommitDetail) -> Option<String> {
    let message = commit
        .message
        .as_deref()
        .filter(|message| !message.trim().is_empty());

    let text = if detail.files.is_empty() {
        message_block(message.unwrap_or(NO_DIFF_PLACEHOLDER))
    } else {
        let blocks: Vec<String> = detail.files.iter().filter_map(file_block).collect();
        match (blocks.is_empty(), message) {
            (true, Some(message)) => message_block(message),
            _ => blocks.join(BLOCK_SEPARATOR),
        }
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn message_block(message: &str) -> String {
    format!("Commit message: {message}")
}
