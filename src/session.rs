//! Rendering session lifecycle: mounts an engine, annotates each rendered
//! chapter before the interaction layer is bound to it, tracks the location
//! counter and tears everything down exactly once.

use crate::annotate::annotate;
use crate::dom::NodePath;
use crate::engine::{
    ChapterContents, EngineEvent, EventSink, GuardedEngine, RenderingEngine, SourceDocument,
    TaggedEvent,
};
use crate::interaction::{ClickEvent, InteractionLayer, ReaderHost};
use crate::logging;
use crate::models::{AnnotationStats, ClickOutcome, Position, RenderTarget, SessionId, SessionState};
use crate::pattern::CompiledPattern;
use crate::vocabulary::VocabularySet;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSession {
    pub id: SessionId,
    pub source: SourceDocument,
    pub target: RenderTarget,
    pub state: SessionState,
    /// 1-based; `None` until the location index exists.
    pub current_location: Option<usize>,
    pub total_locations: usize,
    pub last_position: Option<Position>,
}

impl RenderSession {
    fn new(id: SessionId, source: SourceDocument, target: RenderTarget) -> Self {
        Self {
            id,
            source,
            target,
            state: SessionState::Initializing,
            current_location: None,
            total_locations: 0,
            last_position: None,
        }
    }
}

pub struct SessionController<E: RenderingEngine> {
    session: Option<RenderSession>,
    engine: Option<GuardedEngine<E>>,
    chapter: Option<ChapterContents>,
    vocabulary: VocabularySet,
    pattern: CompiledPattern,
    interaction: InteractionLayer,
    events_tx: Sender<TaggedEvent>,
    events_rx: Receiver<TaggedEvent>,
    next_session: u64,
    chars_per_location: usize,
    last_stats: AnnotationStats,
}

impl<E: RenderingEngine> SessionController<E> {
    pub fn new(vocabulary: &VocabularySet, chars_per_location: usize, confirm_links: bool) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            session: None,
            engine: None,
            chapter: None,
            pattern: vocabulary.compile(),
            vocabulary: vocabulary.clone(),
            interaction: InteractionLayer::new(confirm_links),
            events_tx,
            events_rx,
            next_session: 1,
            chars_per_location: chars_per_location.max(1),
            last_stats: AnnotationStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |session| session.state)
    }

    pub fn session(&self) -> Option<&RenderSession> {
        self.session.as_ref()
    }

    pub fn current_location(&self) -> Option<usize> {
        self.session.as_ref().and_then(|s| s.current_location)
    }

    pub fn total_locations(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.total_locations)
    }

    /// "Page N of M" once locations exist.
    pub fn chars_per_location(&self) -> usize {
        self.chars_per_location
    }

    pub fn page_label(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        let current = session.current_location?;
        Some(format!("Page {current} of {}", session.total_locations))
    }

    pub fn chapter(&self) -> Option<&ChapterContents> {
        self.chapter.as_ref()
    }

    pub fn last_stats(&self) -> AnnotationStats {
        self.last_stats
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref().map(GuardedEngine::inner)
    }

    /// Start a new session on `source`. Any live session is torn down first.
    pub fn open(&mut self, source: SourceDocument, target: RenderTarget, engine: E) -> SessionId {
        if self.session.is_some() {
            self.close();
        }
        let id = SessionId(self.next_session);
        self.next_session += 1;
        logging::info(format!("Opening {} in {id}", source.describe()));

        let mut engine = GuardedEngine::new(engine);
        let sink = EventSink::new(id, self.events_tx.clone());
        let mounted = engine.mount(&source, &target, sink);
        self.session = Some(RenderSession::new(id, source, target));
        self.engine = Some(engine);
        if mounted.is_none() {
            self.fail("engine could not mount the publication");
        }
        id
    }

    /// Handle every queued engine event. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(tagged) = self.events_rx.try_recv() {
            if self.handle(tagged) {
                applied += 1;
            }
        }
        applied
    }

    fn handle(&mut self, tagged: TaggedEvent) -> bool {
        let Some(session) = self.session.as_ref() else {
            logging::debug(format!("Dropping event for {} with no session", tagged.session));
            return false;
        };
        if session.id != tagged.session || !session.state.is_live() {
            logging::debug(format!(
                "Dropping stale event for {} (current {}, {:?})",
                tagged.session, session.id, session.state
            ));
            return false;
        }
        let state = session.state;

        match tagged.event {
            EngineEvent::Ready => {
                if state != SessionState::Initializing {
                    return false;
                }
                let chars = self.chars_per_location;
                let Some(engine) = self.engine.as_mut() else {
                    return false;
                };
                if engine.display(None).is_none() || engine.generate_locations(chars).is_none() {
                    self.fail("engine could not display the publication");
                }
            }
            EngineEvent::Failed(reason) => {
                if state == SessionState::Initializing {
                    self.fail(&reason);
                } else {
                    logging::warn(format!("Engine reported a failure after startup: {reason}"));
                }
            }
            EngineEvent::LocationsGenerated { total } => {
                let current = self
                    .last_position()
                    .and_then(|position| self.locate(&position))
                    .unwrap_or(1);
                if let Some(session) = self.session.as_mut() {
                    session.total_locations = total;
                    session.current_location = Some(current.min(total.max(1)));
                    if session.state == SessionState::Initializing {
                        session.state = SessionState::Ready;
                        logging::info(format!("{} ready with {total} locations", session.id));
                    }
                }
            }
            EngineEvent::Rendered(contents) => self.install_chapter(contents),
            EngineEvent::Relocated { start } => {
                let location = if self.total_locations() > 0 {
                    self.locate(&start)
                } else {
                    None
                };
                if let Some(session) = self.session.as_mut() {
                    session.last_position = Some(start);
                    if location.is_some() {
                        session.current_location = location;
                    }
                    if session.state == SessionState::Relocating {
                        session.state = SessionState::Ready;
                    }
                }
            }
        }
        true
    }

    fn last_position(&self) -> Option<Position> {
        self.session.as_ref().and_then(|s| s.last_position)
    }

    fn locate(&self, position: &Position) -> Option<usize> {
        self.engine.as_ref()?.location_from_position(position)
    }

    fn fail(&mut self, reason: &str) {
        if let Some(session) = self.session.as_mut() {
            logging::warn(format!("{} failed to initialize: {reason}", session.id));
            session.state = SessionState::Failed;
        }
        self.release_engine();
    }

    fn install_chapter(&mut self, mut contents: ChapterContents) {
        if self.pattern.generation() != self.vocabulary.generation() {
            self.pattern = self.vocabulary.compile();
        }
        self.last_stats = annotate(&mut contents.body, &self.pattern, self.vocabulary.links());
        logging::debug(format!(
            "Annotated {} with {} new markers",
            contents.href, self.last_stats.markers_created
        ));
        if let Some(previous) = self.chapter.as_mut() {
            self.interaction.unbind(previous);
        }
        self.interaction.bind(&mut contents);
        self.chapter = Some(contents);
    }

    fn begin_relocation(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) if session.state == SessionState::Ready => {
                session.state = SessionState::Relocating;
                true
            }
            _ => false,
        }
    }

    fn finish_relocation(&mut self, accepted: bool) -> bool {
        if !accepted {
            if let Some(session) = self.session.as_mut() {
                if session.state == SessionState::Relocating {
                    session.state = SessionState::Ready;
                }
            }
        }
        accepted
    }

    /// Returns `false` when the request was ignored.
    pub fn next(&mut self) -> bool {
        if !self.begin_relocation() {
            return false;
        }
        let accepted = self.engine.as_mut().and_then(GuardedEngine::next).is_some();
        self.finish_relocation(accepted)
    }

    pub fn prev(&mut self) -> bool {
        if !self.begin_relocation() {
            return false;
        }
        let accepted = self.engine.as_mut().and_then(GuardedEngine::prev).is_some();
        self.finish_relocation(accepted)
    }

    /// Jump to 1-based `location`. Out-of-range requests do nothing.
    pub fn go_to(&mut self, location: usize) -> bool {
        if self.state() != SessionState::Ready {
            return false;
        }
        if location < 1 || location > self.total_locations() {
            logging::debug(format!("Ignoring jump to location {location}"));
            return false;
        }
        let Some(position) = self
            .engine
            .as_ref()
            .and_then(|engine| engine.position_from_location(location))
        else {
            return false;
        };
        if !self.begin_relocation() {
            return false;
        }
        let accepted = self
            .engine
            .as_mut()
            .and_then(|engine| engine.display(Some(position)))
            .is_some();
        self.finish_relocation(accepted)
    }

    /// Adopt a new vocabulary. When its generation differs from the current
    /// one the pattern is recompiled and the displayed chapter re-annotated.
    pub fn set_vocabulary(&mut self, vocabulary: &VocabularySet) -> Option<AnnotationStats> {
        if vocabulary.generation() == self.vocabulary.generation() {
            return None;
        }
        self.vocabulary = vocabulary.clone();
        self.pattern = self.vocabulary.compile();
        let contents = self.chapter.take()?;
        self.install_chapter(contents);
        Some(self.last_stats)
    }

    pub fn click(&mut self, target: NodePath, host: &mut dyn ReaderHost) -> Vec<ClickOutcome> {
        let Some(contents) = self.chapter.as_ref() else {
            return Vec::new();
        };
        let mut event = ClickEvent::new(target);
        self.interaction.dispatch(contents, &mut event, host)
    }

    fn release_engine(&mut self) {
        if let Some(contents) = self.chapter.as_mut() {
            self.interaction.unbind(contents);
        }
        self.chapter = None;
        self.interaction.unbind_all();
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }

    /// Tear down the current session. Always completes, whatever the engine
    /// does during destroy.
    pub fn close(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state == SessionState::Destroyed {
            return;
        }
        logging::debug(format!("Closing {}", session.id));
        let failed = session.state == SessionState::Failed;
        session.state = SessionState::Destroying;
        self.release_engine();
        if let Some(session) = self.session.as_mut() {
            session.state = if failed {
                SessionState::Failed
            } else {
                SessionState::Destroyed
            };
        }
        // Drain anything queued by the old engine; it can never apply now.
        while self.events_rx.try_recv().is_ok() {}
    }
}

impl<E: RenderingEngine> Drop for SessionController<E> {
    fn drop(&mut self) {
        self.close();
    }
}
