//! The contract the reader needs from a rendering engine, and an adapter that
//! keeps engine faults from escaping into the session's own control flow.

use crate::dom::Element;
use crate::logging;
use crate::models::{Position, RenderTarget, SessionId};
use eyre::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::Sender;

/// Where the packaged publication comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDocument {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl SourceDocument {
    pub fn describe(&self) -> String {
        match self {
            SourceDocument::Path(path) => path.display().to_string(),
            SourceDocument::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// One rendered chapter as handed to content hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterContents {
    pub spine_index: usize,
    pub href: String,
    pub body: Element,
    listeners: Vec<ListenerId>,
}

impl ChapterContents {
    pub fn new(spine_index: usize, href: impl Into<String>, body: Element) -> Self {
        Self {
            spine_index,
            href: href.into(),
            body,
            listeners: Vec::new(),
        }
    }

    pub fn add_click_listener(&mut self, id: ListenerId) {
        self.listeners.push(id);
    }

    pub fn remove_click_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|existing| *existing != id);
        self.listeners.len() != before
    }

    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The publication is open and can be displayed.
    Ready,
    /// Asynchronous startup failed.
    Failed(String),
    LocationsGenerated { total: usize },
    /// A chapter was (re-)rendered; content hooks run on it.
    Rendered(ChapterContents),
    Relocated { start: Position },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub session: SessionId,
    pub event: EngineEvent,
}

/// Notification channel handed to an engine at mount time. Every event carries
/// the id of the session that mounted the engine.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: Sender<TaggedEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: Sender<TaggedEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns `false` once the receiving side is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Locations are numbered from 1.
pub trait RenderingEngine {
    /// Open `source` and mount it on `target`. Readiness is reported later
    /// through `events`.
    fn mount(&mut self, source: &SourceDocument, target: &RenderTarget, events: EventSink) -> Result<()>;
    /// Start building the location index; completion arrives as
    /// [`EngineEvent::LocationsGenerated`].
    fn generate_locations(&mut self, chars_per_location: usize) -> Result<()>;
    fn location_from_position(&self, position: &Position) -> Result<usize>;
    fn position_from_location(&self, location: usize) -> Result<Position>;
    /// Display `position`, or the start of the publication for `None`.
    fn display(&mut self, position: Option<Position>) -> Result<()>;
    fn next(&mut self) -> Result<()>;
    fn prev(&mut self) -> Result<()>;
    fn destroy(&mut self) -> Result<()>;
}

/// Wraps an engine so that every call site catches both errors and panics,
/// logs them and reports `None` instead.
pub struct GuardedEngine<E> {
    inner: E,
}

impl<E: RenderingEngine> GuardedEngine<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn guard_mut<T>(&mut self, hook: &str, call: impl FnOnce(&mut E) -> Result<T>) -> Option<T> {
        let inner = &mut self.inner;
        contain(hook, panic::catch_unwind(AssertUnwindSafe(|| call(inner))))
    }

    fn guard<T>(&self, hook: &str, call: impl FnOnce(&E) -> Result<T>) -> Option<T> {
        let inner = &self.inner;
        contain(hook, panic::catch_unwind(AssertUnwindSafe(|| call(inner))))
    }

    pub fn mount(&mut self, source: &SourceDocument, target: &RenderTarget, events: EventSink) -> Option<()> {
        self.guard_mut("mount", |engine| engine.mount(source, target, events))
    }

    pub fn generate_locations(&mut self, chars_per_location: usize) -> Option<()> {
        self.guard_mut("generate_locations", |engine| {
            engine.generate_locations(chars_per_location)
        })
    }

    pub fn location_from_position(&self, position: &Position) -> Option<usize> {
        self.guard("location_from_position", |engine| {
            engine.location_from_position(position)
        })
    }

    pub fn position_from_location(&self, location: usize) -> Option<Position> {
        self.guard("position_from_location", |engine| {
            engine.position_from_location(location)
        })
    }

    pub fn display(&mut self, position: Option<Position>) -> Option<()> {
        self.guard_mut("display", |engine| engine.display(position))
    }

    pub fn next(&mut self) -> Option<()> {
        self.guard_mut("next", |engine| engine.next())
    }

    pub fn prev(&mut self) -> Option<()> {
        self.guard_mut("prev", |engine| engine.prev())
    }

    pub fn destroy(&mut self) -> Option<()> {
        self.guard_mut("destroy", |engine| engine.destroy())
    }
}

fn contain<T>(hook: &str, outcome: std::thread::Result<Result<T>>) -> Option<T> {
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            logging::warn(format!("Ignored engine {hook} error: {err}"));
            None
        }
        Err(payload) => {
            logging::warn(format!(
                "Ignored engine {hook} panic: {}",
                panic_message(payload.as_ref())
            ));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
