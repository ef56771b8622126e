use crate::engine::{ChapterContents, EngineEvent, EventSink, RenderingEngine, SourceDocument};
use crate::locations::LocationIndex;
use crate::logging;
use crate::models::{BookMetadata, Position, RenderTarget};
use crate::parser::{parse_chapter, plain_text_len};
use epub::doc::EpubDoc;
use eyre::{Result, WrapErr, eyre};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub trait Ebook {
    fn label(&self) -> &str;
    fn contents(&self) -> &[ContentItem];
    fn get_meta(&self) -> &BookMetadata;

    fn initialize(&mut self, source: &SourceDocument) -> Result<()>;
    fn get_raw_text(&mut self, index: usize) -> Result<String>;
    fn cleanup(&mut self) -> Result<()>;
}

/// One readable document in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub idref: String,
    /// Index into the package spine, which may include skipped navigation items.
    pub spine_index: usize,
    pub href: String,
}

#[derive(Default)]
pub struct Epub {
    label: String,
    doc: Option<EpubDoc<Cursor<Vec<u8>>>>,
    contents: Vec<ContentItem>,
    metadata: BookMetadata,
}

impl Epub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn href(&self, index: usize) -> Option<&str> {
        self.contents.get(index).map(|item| item.href.as_str())
    }
}

impl Ebook for Epub {
    fn label(&self) -> &str {
        &self.label
    }

    fn contents(&self) -> &[ContentItem] {
        &self.contents
    }

    fn get_meta(&self) -> &BookMetadata {
        &self.metadata
    }

    fn initialize(&mut self, source: &SourceDocument) -> Result<()> {
        let bytes = match source {
            SourceDocument::Path(path) => std::fs::read(path)
                .wrap_err_with(|| format!("Could not open {}", path.display()))?,
            SourceDocument::Bytes(bytes) => bytes.clone(),
        };
        let doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|err| eyre!("Could not read {}: {err}", source.describe()))?;

        self.contents = doc
            .spine
            .iter()
            .enumerate()
            .filter_map(|(spine_index, item)| {
                let resource = doc.resources.get(&item.idref);
                if let Some(resource) = resource {
                    // EPUB 2 NCX and EPUB 3 nav documents are not reading content
                    if resource.mime == "application/x-dtbncx+xml" {
                        return None;
                    }
                    if let Some(properties) = &resource.properties {
                        if properties.split_whitespace().any(|p| p == "nav") {
                            return None;
                        }
                    }
                }
                Some(ContentItem {
                    idref: item.idref.clone(),
                    spine_index,
                    href: resource
                        .map(|r| r.path.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                })
            })
            .collect();

        let mut metadata = BookMetadata::default();
        if let Some(title) = doc.mdata("title") {
            metadata.title = Some(title.value.clone());
        }
        if let Some(creator) = doc.mdata("creator") {
            metadata.creator = Some(creator.value.clone());
        }
        if let Some(language) = doc.mdata("language") {
            metadata.language = Some(language.value.clone());
        }
        if let Some(identifier) = doc.mdata("identifier") {
            metadata.identifier = Some(identifier.value.clone());
        }
        self.metadata = metadata;
        self.label = source.describe();
        self.doc = Some(doc);
        Ok(())
    }

    fn get_raw_text(&mut self, index: usize) -> Result<String> {
        if let (Some(doc), Some(item)) = (self.doc.as_mut(), self.contents.get(index)) {
            if doc.set_current_chapter(item.spine_index) {
                if let Some((content, _)) = doc.get_current_str() {
                    return Ok(content);
                }
            }
        }
        Err(eyre!("Content not found"))
    }

    fn cleanup(&mut self) -> Result<()> {
        self.doc = None;
        self.contents.clear();
        Ok(())
    }
}

/// Characters per page until `generate_locations` sets the granularity.
const DEFAULT_PAGE_CHARS: usize = 1600;

/// Renders an EPUB chapter by chapter. A page is one location: `page_chars`
/// characters of a chapter's reading text. The location index is built on a
/// worker thread.
pub struct EpubEngine {
    book: Option<Epub>,
    events: Option<EventSink>,
    page_chars: usize,
    chapter_lengths: HashMap<usize, usize>,
    locations: Arc<Mutex<Option<LocationIndex>>>,
    worker: Option<JoinHandle<()>>,
    /// Stop flag shared with the location worker.
    cancel: Arc<AtomicBool>,
    rendered: Option<usize>,
    current: Option<Position>,
}

impl EpubEngine {
    pub fn new() -> Self {
        Self {
            book: None,
            events: None,
            page_chars: DEFAULT_PAGE_CHARS,
            chapter_lengths: HashMap::new(),
            locations: Arc::new(Mutex::new(None)),
            worker: None,
            cancel: Arc::new(AtomicBool::new(false)),
            rendered: None,
            current: None,
        }
    }

    pub fn page_chars(&self) -> usize {
        self.page_chars
    }

    pub fn metadata(&self) -> Option<&BookMetadata> {
        self.book.as_ref().map(|book| book.get_meta())
    }

    pub fn chapter_count(&self) -> usize {
        self.book.as_ref().map_or(0, |book| book.contents().len())
    }

    pub fn current(&self) -> Option<Position> {
        self.current
    }

    fn book_mut(&mut self) -> Result<&mut Epub> {
        self.book
            .as_mut()
            .ok_or_else(|| eyre!("No publication is mounted"))
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            if !events.emit(event) {
                logging::debug("Engine event dropped: session receiver is gone");
            }
        }
    }

    fn chapter_len(&mut self, index: usize) -> Result<usize> {
        if let Some(len) = self.chapter_lengths.get(&index) {
            return Ok(*len);
        }
        let raw = self.book_mut()?.get_raw_text(index)?;
        let len = plain_text_len(&raw)?;
        self.chapter_lengths.insert(index, len);
        Ok(len)
    }

    fn page_start(&self, offset: usize) -> usize {
        offset / self.page_chars * self.page_chars
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                logging::warn("Location worker panicked");
            }
        }
    }
}

impl Default for EpubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderingEngine for EpubEngine {
    fn mount(&mut self, source: &SourceDocument, target: &RenderTarget, events: EventSink) -> Result<()> {
        let mut book = Epub::new();
        book.initialize(source)?;
        logging::info(format!(
            "Mounted {} on {} ({} chapters)",
            book.label(),
            target.name,
            book.contents().len()
        ));
        let readable = !book.contents().is_empty();
        self.book = Some(book);
        self.events = Some(events);
        if readable {
            self.emit(EngineEvent::Ready);
        } else {
            self.emit(EngineEvent::Failed(format!(
                "{} has no readable chapters",
                source.describe()
            )));
        }
        Ok(())
    }

    fn generate_locations(&mut self, chars_per_location: usize) -> Result<()> {
        self.join_worker();
        self.page_chars = chars_per_location.max(1);
        let book = self.book_mut()?;
        let mut chapters = Vec::with_capacity(book.contents().len());
        for index in 0..book.contents().len() {
            chapters.push(book.get_raw_text(index).unwrap_or_default());
        }

        let cancel = Arc::clone(&self.cancel);
        let slot = Arc::clone(&self.locations);
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name("location-index".to_string())
            .spawn(move || {
                let mut lengths = Vec::with_capacity(chapters.len());
                for raw in &chapters {
                    if cancel.load(Ordering::Acquire) {
                        logging::debug("Location generation cancelled");
                        return;
                    }
                    lengths.push(plain_text_len(raw).unwrap_or_else(|err| {
                        logging::warn(format!("Could not measure chapter text: {err}"));
                        0
                    }));
                }
                let index = LocationIndex::generate(&lengths, chars_per_location);
                let total = index.len();
                match slot.lock() {
                    Ok(mut guard) => *guard = Some(index),
                    Err(_) => {
                        logging::warn("Location index lock poisoned");
                        return;
                    }
                }
                if cancel.load(Ordering::Acquire) {
                    return;
                }
                if let Some(events) = events {
                    events.emit(EngineEvent::LocationsGenerated { total });
                }
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    fn location_from_position(&self, position: &Position) -> Result<usize> {
        let guard = self
            .locations
            .lock()
            .map_err(|_| eyre!("Location index lock poisoned"))?;
        let index = guard
            .as_ref()
            .ok_or_else(|| eyre!("Locations have not been generated"))?;
        index
            .location_from_position(position)
            .ok_or_else(|| eyre!("No location contains {position}"))
    }

    fn position_from_location(&self, location: usize) -> Result<Position> {
        let guard = self
            .locations
            .lock()
            .map_err(|_| eyre!("Location index lock poisoned"))?;
        let index = guard
            .as_ref()
            .ok_or_else(|| eyre!("Locations have not been generated"))?;
        index
            .position_from_location(location)
            .ok_or_else(|| eyre!("Location {location} is out of range"))
    }

    fn display(&mut self, position: Option<Position>) -> Result<()> {
        let count = self.chapter_count();
        if count == 0 {
            return Err(eyre!("No publication is mounted"));
        }
        let requested = position.unwrap_or_default();
        let spine_index = requested.spine_index.min(count - 1);
        let len = self.chapter_len(spine_index)?;
        let offset = self.page_start(requested.char_offset.min(len.saturating_sub(1)));
        let start = Position::new(spine_index, offset);

        if self.rendered != Some(spine_index) {
            let book = self.book_mut()?;
            let raw = book.get_raw_text(spine_index)?;
            let href = book.href(spine_index).unwrap_or_default().to_string();
            let contents = ChapterContents::new(spine_index, href, parse_chapter(&raw));
            self.rendered = Some(spine_index);
            self.emit(EngineEvent::Rendered(contents));
        }
        self.current = Some(start);
        self.emit(EngineEvent::Relocated { start });
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        let Some(current) = self.current else {
            return self.display(None);
        };
        let len = self.chapter_len(current.spine_index)?;
        let offset = current.char_offset + self.page_chars;
        if offset < len {
            self.display(Some(Position::new(current.spine_index, offset)))
        } else if current.spine_index + 1 < self.chapter_count() {
            self.display(Some(Position::new(current.spine_index + 1, 0)))
        } else {
            // Already on the last page: report the unchanged position.
            self.display(Some(current))
        }
    }

    fn prev(&mut self) -> Result<()> {
        let Some(current) = self.current else {
            return self.display(None);
        };
        if current.char_offset > 0 {
            let offset = self.page_start(current.char_offset - 1);
            self.display(Some(Position::new(current.spine_index, offset)))
        } else if current.spine_index > 0 {
            let previous = current.spine_index - 1;
            let len = self.chapter_len(previous)?;
            let offset = self.page_start(len.saturating_sub(1));
            self.display(Some(Position::new(previous, offset)))
        } else {
            self.display(Some(current))
        }
    }

    fn destroy(&mut self) -> Result<()> {
        self.cancel.store(true, Ordering::Release);
        self.join_worker();
        self.events = None;
        self.rendered = None;
        self.current = None;
        self.chapter_lengths.clear();
        match self.book.take() {
            Some(mut book) => book.cleanup(),
            None => Err(eyre!("Engine already destroyed")),
        }
    }
}

impl Drop for EpubEngine {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionId;
    use std::sync::mpsc;

    #[test]
    fn test_epub_initialize_nonexistent() {
        let mut epub = Epub::new();
        let source = SourceDocument::Path("tests/fixtures/nonexistent.epub".into());
        let err = epub.initialize(&source).unwrap_err();
        assert!(err.to_string().contains("Could not open"));
        assert!(epub.contents().is_empty());
    }

    #[test]
    fn test_epub_initialize_garbage_bytes() {
        let mut epub = Epub::new();
        let source = SourceDocument::Bytes(b"not a zip archive".to_vec());
        assert!(epub.initialize(&source).is_err());
    }

    #[test]
    fn test_get_raw_text_before_initialize() {
        let mut epub = Epub::new();
        let err = epub.get_raw_text(0).unwrap_err();
        assert!(err.to_string().contains("Content not found"));
    }

    #[test]
    fn test_engine_without_publication() {
        let (tx, rx) = mpsc::channel();
        let mut engine = EpubEngine::new();
        let source = SourceDocument::Path("missing.epub".into());
        let sink = EventSink::new(SessionId(1), tx);
        assert!(engine.mount(&source, &RenderTarget::new("viewer"), sink).is_err());
        assert!(rx.try_recv().is_err());
        assert!(engine.display(None).is_err());
        assert!(engine.position_from_location(1).is_err());
        assert!(engine.destroy().is_err());
    }
}
