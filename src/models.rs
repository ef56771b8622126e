use serde::{Deserialize, Serialize};
use std::fmt;

/// One vocabulary phrase with its optional external link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyEntry {
    pub phrase: String,
    pub link_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
}

/// Per-book linked phrase as served by the book API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedWord {
    pub phrase: String,
    pub url: String,
}

/// A position inside the rendered publication: spine item plus a character
/// offset into that item's plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub spine_index: usize,
    pub char_offset: usize,
}

impl Position {
    pub fn new(spine_index: usize, char_offset: usize) -> Self {
        Self {
            spine_index,
            char_offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}:{}", self.spine_index, self.char_offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Ready,
    Relocating,
    Destroying,
    Destroyed,
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Ready | SessionState::Relocating
        )
    }
}

/// How a session lays out its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Paginated,
    Scrolled,
}

/// Where a session mounts its engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub name: String,
    pub flow: Flow,
}

impl RenderTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flow: Flow::Paginated,
        }
    }
}

/// Result of dispatching one click on a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click did not land on a marker.
    Ignored,
    /// The link was confirmed and handed to the opener.
    OpenedLink { word: String, url: String },
    /// The user declined to follow the link.
    Declined { word: String },
    /// The link was confirmed but the opener failed.
    LinkFailed { word: String, url: String },
    /// A definition lookup was requested for the literal word.
    Lookup { word: String },
}

/// Inline message shown after a word submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMessage {
    Submitted,
    AlreadyExists,
    Failed,
}

impl fmt::Display for FeedbackMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FeedbackMessage::Submitted => "Word submitted successfully!",
            FeedbackMessage::AlreadyExists => "Word already exists.",
            FeedbackMessage::Failed => "Error submitting the word.",
        };
        f.write_str(text)
    }
}

/// Counters from one annotation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationStats {
    pub markers_created: usize,
    pub linked_markers: usize,
    pub text_nodes_scanned: usize,
    pub markers_refreshed: usize,
}
