//! The session's vocabulary: base list, server-supplied feedback words,
//! user submissions and per-book linked phrases, merged case-insensitively.

use crate::api::{SubmitStatus, VocabularyService};
use crate::logging;
use crate::models::{FeedbackMessage, LinkedWord, VocabularyEntry};
use crate::pattern::{self, CompiledPattern};
use eyre::Result;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_BASE_WORDS: &[&str] = &["abstruse", "arcane", "esoteric", "conundrum"];

/// Lowercase phrase → link URL.
pub type LinkMap = HashMap<String, String>;

pub fn normalize_key(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// An immutable snapshot of the vocabulary. A new snapshot with a higher
/// generation is built whenever an entry arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularySet {
    order: Vec<String>,
    keys: HashSet<String>,
    links: LinkMap,
    generation: u64,
}

impl VocabularySet {
    pub fn merge<B, S, L>(
        base: B,
        server_words: S,
        local_additions: L,
        link_entries: &[LinkedWord],
        generation: u64,
    ) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        let mut set = VocabularySet {
            generation,
            ..Default::default()
        };
        for word in base.into_iter() {
            set.insert(word.as_ref());
        }
        for word in server_words.into_iter() {
            set.insert(word.as_ref());
        }
        for word in local_additions.into_iter() {
            set.insert(word.as_ref());
        }
        for entry in link_entries {
            let key = normalize_key(&entry.phrase);
            if key.is_empty() || entry.url.trim().is_empty() {
                continue;
            }
            set.insert(&key);
            set.links.insert(key, entry.url.trim().to_string());
        }
        set
    }

    fn insert(&mut self, phrase: &str) -> bool {
        let key = normalize_key(phrase);
        if key.is_empty() || self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key.clone());
        self.order.push(key);
        true
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.keys.contains(&normalize_key(phrase))
    }

    pub fn link_for(&self, phrase: &str) -> Option<&str> {
        self.links.get(&normalize_key(phrase)).map(String::as_str)
    }

    pub fn links(&self) -> &LinkMap {
        &self.links
    }

    /// Lowercase phrases in merge order.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn entries(&self) -> Vec<VocabularyEntry> {
        self.order
            .iter()
            .map(|phrase| VocabularyEntry {
                phrase: phrase.clone(),
                link_url: self.links.get(phrase).cloned(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn compile(&self) -> CompiledPattern {
        pattern::compile(self.phrases(), self.generation)
    }
}

/// Owns the inputs of the vocabulary for one reading session and rebuilds the
/// snapshot on every change.
#[derive(Debug, Clone)]
pub struct VocabularyManager {
    base: Vec<String>,
    server_words: Vec<String>,
    local_additions: Vec<String>,
    linked_words: Vec<LinkedWord>,
    generation: u64,
    current: VocabularySet,
}

impl Default for VocabularyManager {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_WORDS.iter().copied())
    }
}

impl VocabularyManager {
    pub fn new<I>(base: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut manager = Self {
            base: base.into_iter().map(|w| w.as_ref().to_string()).collect(),
            server_words: Vec::new(),
            local_additions: Vec::new(),
            linked_words: Vec::new(),
            generation: 0,
            current: VocabularySet::default(),
        };
        manager.rebuild();
        manager
    }

    pub fn current(&self) -> &VocabularySet {
        &self.current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn local_additions(&self) -> &[String] {
        &self.local_additions
    }

    fn rebuild(&mut self) {
        self.generation += 1;
        self.current = VocabularySet::merge(
            &self.base,
            &self.server_words,
            &self.local_additions,
            &self.linked_words,
            self.generation,
        );
        logging::debug(format!(
            "Vocabulary rebuilt: generation={} phrases={} links={}",
            self.generation,
            self.current.len(),
            self.current.links().len()
        ));
    }

    /// Union `words` into the server-supplied input. Words already present are
    /// ignored; nothing is ever removed.
    pub fn add_server_words(&mut self, words: Vec<String>) {
        let mut known: HashSet<String> = self.server_words.iter().map(|w| normalize_key(w)).collect();
        let before = self.server_words.len();
        for word in words {
            if known.insert(normalize_key(&word)) {
                self.server_words.push(word);
            }
        }
        if self.server_words.len() != before {
            self.rebuild();
        }
    }

    /// Union `entries` into the linked phrases. A phrase that arrives again
    /// with a different URL takes the newer link.
    pub fn add_linked_words(&mut self, entries: Vec<LinkedWord>) {
        let mut changed = false;
        for entry in entries {
            let key = normalize_key(&entry.phrase);
            let url = entry.url.trim();
            if key.is_empty() || url.is_empty() {
                continue;
            }
            if self.current.links().get(&key).map(String::as_str) != Some(url) {
                self.linked_words.push(entry);
                changed = true;
            }
        }
        if changed {
            self.rebuild();
        }
    }

    /// Add a user-submitted word. Returns `false` when it is blank or already
    /// part of the vocabulary under case-insensitive comparison.
    pub fn add_local(&mut self, word: &str) -> bool {
        let key = normalize_key(word);
        if key.is_empty() || self.current.contains(&key) {
            return false;
        }
        self.local_additions.push(key);
        self.rebuild();
        true
    }

    /// Pull feedback words, and linked words for `book_id` when given. Fetch
    /// failures are logged and leave the corresponding input untouched; successful
    /// fetches only add entries.
    pub fn refresh_from(&mut self, service: &dyn VocabularyService, book_id: Option<&str>) {
        match service.fetch_feedback_words() {
            Ok(words) => self.add_server_words(words),
            Err(err) => logging::warn(format!("Failed to fetch feedback words: {err}")),
        }
        if let Some(book_id) = book_id {
            match service.fetch_linked_words(book_id) {
                Ok(entries) => self.add_linked_words(entries),
                Err(err) => logging::warn(format!("Failed to fetch linkedWords: {err}")),
            }
        }
    }

    /// Submit a word to the feedback service. Blank input is rejected before any
    /// request is made. Both a fresh accept and a duplicate response add the
    /// word locally.
    pub fn submit(&mut self, word: &str, service: &dyn VocabularyService) -> Result<FeedbackMessage> {
        let key = normalize_key(word);
        if key.is_empty() {
            return Err(eyre::eyre!("Cannot submit an empty word"));
        }
        let message = match service.submit_word(word.trim()) {
            Ok(SubmitStatus::Created) => FeedbackMessage::Submitted,
            Ok(SubmitStatus::Conflict) => FeedbackMessage::AlreadyExists,
            Err(err) => {
                logging::warn(format!("Word submission failed: {err}"));
                return Ok(FeedbackMessage::Failed);
            }
        };
        self.add_local(&key);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeService {
        words: Option<Vec<String>>,
        linked: Option<Vec<LinkedWord>>,
        submit_status: Option<SubmitStatus>,
        submitted: RefCell<Vec<String>>,
    }

    impl VocabularyService for FakeService {
        fn fetch_feedback_words(&self) -> Result<Vec<String>> {
            self.words.clone().ok_or_else(|| eyre::eyre!("offline"))
        }

        fn fetch_linked_words(&self, _book_id: &str) -> Result<Vec<LinkedWord>> {
            self.linked.clone().ok_or_else(|| eyre::eyre!("offline"))
        }

        fn submit_word(&self, word: &str) -> Result<SubmitStatus> {
            self.submitted.borrow_mut().push(word.to_string());
            self.submit_status.ok_or_else(|| eyre::eyre!("500"))
        }
    }

    fn linked(phrase: &str, url: &str) -> LinkedWord {
        LinkedWord {
            phrase: phrase.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_merge_is_case_insensitive_union() {
        let set = VocabularySet::merge(
            ["Arcane", "esoteric"],
            ["ARCANE", "paradigm"],
            ["Paradigm", "juxtaposition"],
            &[],
            1,
        );
        let phrases: Vec<&str> = set.phrases().collect();
        assert_eq!(phrases, vec!["arcane", "esoteric", "paradigm", "juxtaposition"]);
        assert!(set.contains("ESOTERIC"));
        assert!(!set.contains("cat"));
    }

    #[test]
    fn test_link_entries_join_vocabulary() {
        let set = VocabularySet::merge(
            ["widget"],
            Vec::<String>::new(),
            Vec::<String>::new(),
            &[linked("Widget", "https://shop.example/widget"), linked("Gizmo Pro", "https://g")],
            1,
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.link_for("WIDGET"), Some("https://shop.example/widget"));
        assert_eq!(set.link_for("gizmo  pro"), Some("https://g"));
        let entries = set.entries();
        assert_eq!(entries[0].phrase, "widget");
        assert_eq!(entries[0].link_url.as_deref(), Some("https://shop.example/widget"));
    }

    #[test]
    fn test_later_link_overwrites_and_blank_links_ignored() {
        let set = VocabularySet::merge(
            Vec::<String>::new(),
            Vec::<String>::new(),
            Vec::<String>::new(),
            &[linked("widget", "https://a"), linked("WIDGET", "https://b"), linked("thing", " ")],
            1,
        );
        assert_eq!(set.link_for("widget"), Some("https://b"));
        assert!(!set.contains("thing"));
    }

    #[test]
    fn test_add_local_is_idempotent() {
        let mut manager = VocabularyManager::default();
        let generation = manager.generation();
        assert!(manager.add_local("Paradigm"));
        assert_eq!(manager.generation(), generation + 1);
        assert!(!manager.add_local("paradigm"));
        assert!(!manager.add_local("PARADIGM "));
        assert!(!manager.add_local("esoteric"));
        assert!(!manager.add_local("   "));
        assert_eq!(manager.generation(), generation + 1);
        assert_eq!(manager.local_additions(), &["paradigm".to_string()]);
    }

    #[test]
    fn test_adding_word_keeps_existing_link() {
        let mut manager = VocabularyManager::new(Vec::<String>::new());
        manager.add_linked_words(vec![linked("widget", "https://shop.example/widget")]);
        assert!(!manager.add_local("Widget"));
        assert_eq!(
            manager.current().link_for("widget"),
            Some("https://shop.example/widget")
        );
    }

    #[test]
    fn test_refresh_degrades_to_base_on_failure() {
        let mut manager = VocabularyManager::default();
        manager.refresh_from(&FakeService::default(), Some("book-1"));
        let phrases: Vec<&str> = manager.current().phrases().collect();
        assert_eq!(phrases, DEFAULT_BASE_WORDS.to_vec());
    }

    #[test]
    fn test_refresh_merges_server_data() {
        let service = FakeService {
            words: Some(vec!["Paradigm".to_string()]),
            linked: Some(vec![linked("widget", "https://shop.example/widget")]),
            ..Default::default()
        };
        let mut manager = VocabularyManager::default();
        manager.refresh_from(&service, Some("book-1"));
        assert!(manager.current().contains("paradigm"));
        assert_eq!(
            manager.current().link_for("widget"),
            Some("https://shop.example/widget")
        );
    }

    #[test]
    fn test_second_refresh_only_grows() {
        let mut manager = VocabularyManager::default();
        manager.refresh_from(
            &FakeService {
                words: Some(vec!["Paradigm".to_string(), "zeitgeist".to_string()]),
                linked: Some(vec![linked("widget", "https://a"), linked("gizmo", "https://g")]),
                ..Default::default()
            },
            Some("book-1"),
        );
        let generation = manager.generation();

        manager.refresh_from(
            &FakeService {
                words: Some(vec!["paradigm".to_string()]),
                linked: Some(vec![linked("Widget", "https://a")]),
                ..Default::default()
            },
            Some("book-1"),
        );
        assert_eq!(manager.generation(), generation);
        assert!(manager.current().contains("zeitgeist"));
        assert_eq!(manager.current().link_for("gizmo"), Some("https://g"));

        manager.refresh_from(
            &FakeService {
                words: Some(Vec::new()),
                linked: Some(vec![linked("widget", "https://b")]),
                ..Default::default()
            },
            Some("book-1"),
        );
        assert_eq!(manager.generation(), generation + 1);
        assert_eq!(manager.current().link_for("widget"), Some("https://b"));
        assert_eq!(manager.current().link_for("gizmo"), Some("https://g"));
        assert!(manager.current().contains("paradigm"));
    }

    #[test]
    fn test_submit_blank_is_rejected_without_request() {
        let service = FakeService {
            submit_status: Some(SubmitStatus::Created),
            ..Default::default()
        };
        let mut manager = VocabularyManager::default();
        assert!(manager.submit("  ", &service).is_err());
        assert!(service.submitted.borrow().is_empty());
    }

    #[test]
    fn test_submit_created_adds_word() {
        let service = FakeService {
            submit_status: Some(SubmitStatus::Created),
            ..Default::default()
        };
        let mut manager = VocabularyManager::default();
        let message = manager.submit(" Quixotic ", &service).unwrap();
        assert_eq!(message, FeedbackMessage::Submitted);
        assert_eq!(service.submitted.borrow().as_slice(), &["Quixotic".to_string()]);
        assert!(manager.current().contains("quixotic"));
    }

    #[test]
    fn test_submit_conflict_is_success_for_local_state() {
        let service = FakeService {
            submit_status: Some(SubmitStatus::Conflict),
            ..Default::default()
        };
        let mut manager = VocabularyManager::default();
        let before = manager.current().clone();
        let message = manager.submit("Esoteric", &service).unwrap();
        assert_eq!(message, FeedbackMessage::AlreadyExists);
        assert_eq!(manager.current(), &before);

        let message = manager.submit("obscure", &service).unwrap();
        assert_eq!(message, FeedbackMessage::AlreadyExists);
        assert!(manager.current().contains("obscure"));
    }

    #[test]
    fn test_submit_failure_leaves_vocabulary() {
        let service = FakeService::default();
        let mut manager = VocabularyManager::default();
        let message = manager.submit("obscure", &service).unwrap();
        assert_eq!(message, FeedbackMessage::Failed);
        assert!(!manager.current().contains("obscure"));
    }

    #[test]
    fn test_compile_carries_generation() {
        let mut manager = VocabularyManager::default();
        manager.add_local("paradigm");
        let pattern = manager.current().compile();
        assert_eq!(pattern.generation(), manager.generation());
        assert!(pattern.is_match("a new paradigm"));
    }
}
