//! Click handling for rendered chapters: one delegated listener per chapter
//! resolves clicks to the nearest marker and either follows its link or asks
//! for a definition.

use crate::dom::{ATTR_LINK, ATTR_WORD, NodePath};
use crate::engine::{ChapterContents, ListenerId};
use crate::logging;
use crate::models::ClickOutcome;
use eyre::Result;
use std::collections::HashMap;

/// The reader-side capabilities a click may need.
pub trait ReaderHost {
    /// Ask the user a yes/no question.
    fn confirm(&mut self, message: &str) -> bool;
    /// Open `url` in a new browsing context.
    fn open_link(&mut self, url: &str) -> Result<()>;
    /// Show a definition for `word` to the user.
    fn lookup(&mut self, word: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub target: NodePath,
    default_prevented: bool,
}

impl ClickEvent {
    pub fn new(target: NodePath) -> Self {
        Self {
            target,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

pub fn link_prompt(word: &str) -> String {
    format!("Visit product for \"{word}\"?")
}

#[derive(Debug)]
pub struct InteractionLayer {
    confirm_links: bool,
    next_listener: u64,
    bound: HashMap<usize, ListenerId>,
}

impl Default for InteractionLayer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InteractionLayer {
    pub fn new(confirm_links: bool) -> Self {
        Self {
            confirm_links,
            next_listener: 1,
            bound: HashMap::new(),
        }
    }

    /// Attach this layer's click listener to `contents`, replacing the one it
    /// attached earlier for the same chapter.
    pub fn bind(&mut self, contents: &mut ChapterContents) -> ListenerId {
        if let Some(previous) = self.bound.remove(&contents.spine_index) {
            contents.remove_click_listener(previous);
        }
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        contents.add_click_listener(id);
        self.bound.insert(contents.spine_index, id);
        id
    }

    pub fn unbind(&mut self, contents: &mut ChapterContents) {
        if let Some(previous) = self.bound.remove(&contents.spine_index) {
            contents.remove_click_listener(previous);
        }
    }

    pub fn unbind_all(&mut self) {
        self.bound.clear();
    }

    pub fn owns(&self, id: ListenerId) -> bool {
        self.bound.values().any(|bound| *bound == id)
    }

    /// Deliver `event` to every listener this layer has on `contents`.
    pub fn dispatch(
        &self,
        contents: &ChapterContents,
        event: &mut ClickEvent,
        host: &mut dyn ReaderHost,
    ) -> Vec<ClickOutcome> {
        contents
            .listeners()
            .iter()
            .filter(|id| self.owns(**id))
            .map(|_| self.handle_click(contents, event, host))
            .collect()
    }

    pub fn handle_click(
        &self,
        contents: &ChapterContents,
        event: &mut ClickEvent,
        host: &mut dyn ReaderHost,
    ) -> ClickOutcome {
        let chain = contents.body.element_chain(&event.target);
        let Some(marker) = chain.into_iter().rev().find(|element| element.is_marker()) else {
            return ClickOutcome::Ignored;
        };
        event.prevent_default();

        let word = marker
            .attr(ATTR_WORD)
            .map(str::to_string)
            .unwrap_or_else(|| marker.text_content());

        match marker.attr(ATTR_LINK) {
            Some(url) => {
                if self.confirm_links && !host.confirm(&link_prompt(&word)) {
                    return ClickOutcome::Declined { word };
                }
                match host.open_link(url) {
                    Ok(()) => ClickOutcome::OpenedLink {
                        word,
                        url: url.to_string(),
                    },
                    Err(err) => {
                        logging::warn(format!("Could not open {url}: {err}"));
                        ClickOutcome::LinkFailed {
                            word,
                            url: url.to_string(),
                        }
                    }
                }
            }
            None => {
                host.lookup(&word);
                ClickOutcome::Lookup { word }
            }
        }
    }
}
