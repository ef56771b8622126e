//! Line-oriented terminal front end: opens a book in a rendering session and
//! drives paging, marker clicks and word submission from typed commands.

use crate::api::{ApiClient, DefinitionService, definition_message};
use crate::config::Config;
use crate::dom::{ATTR_LINK, ATTR_WORD, Node};
use crate::ebook::EpubEngine;
use crate::engine::SourceDocument;
use crate::interaction::ReaderHost;
use crate::logging;
use crate::models::{ClickOutcome, RenderTarget, SessionState};
use crate::parser::render_page;
use crate::session::SessionController;
use crate::vocabulary::VocabularyManager;
use eyre::{Result, eyre};
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const HELP: &str = "\
Commands:
  n         next page
  p         previous page
  g N       go to page N
  t         show the current page again
  m         list highlighted words
  c N       click highlighted word N
  a WORD    submit a word to the vocabulary service
  h         this help
  q         quit";

pub struct Reader {
    config: Config,
    api: ApiClient,
    vocabulary: VocabularyManager,
    controller: SessionController<EpubEngine>,
}

impl Reader {
    pub fn new(config: Config, api: ApiClient, vocabulary: VocabularyManager) -> Self {
        let settings = &config.settings;
        let controller = SessionController::new(
            vocabulary.current(),
            settings.chars_per_location,
            settings.confirm_links,
        );
        Self {
            config,
            api,
            vocabulary,
            controller,
        }
    }

    pub fn controller(&self) -> &SessionController<EpubEngine> {
        &self.controller
    }

    /// Open `path` and wait for the session to become ready.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let engine = EpubEngine::new();
        self.controller.open(
            SourceDocument::Path(path.to_path_buf()),
            RenderTarget::new("terminal"),
            engine,
        );
        match self.settle()? {
            SessionState::Ready => Ok(()),
            state => Err(eyre!("Could not open {} ({state:?})", path.display())),
        }
    }

    /// Pump engine events until the session leaves its transitional states.
    fn settle(&mut self) -> Result<SessionState> {
        let start = Instant::now();
        loop {
            self.controller.pump();
            let state = self.controller.state();
            if !matches!(state, SessionState::Initializing | SessionState::Relocating) {
                return Ok(state);
            }
            if start.elapsed() >= SETTLE_TIMEOUT {
                return Err(eyre!(
                    "Rendering did not settle after {}s",
                    SETTLE_TIMEOUT.as_secs()
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn go_to(&mut self, location: usize) -> Result<bool> {
        let accepted = self.controller.go_to(location);
        self.settle()?;
        Ok(accepted)
    }

    /// Annotated HTML of the chapter at `location` (or the start).
    pub fn dump(&mut self, location: Option<usize>) -> Result<String> {
        if let Some(location) = location {
            if !self.go_to(location)? {
                logging::warn(format!(
                    "Location {location} is outside 1..={}",
                    self.controller.total_locations()
                ));
            }
        }
        let chapter = self
            .controller
            .chapter()
            .ok_or_else(|| eyre!("Nothing is rendered"))?;
        Ok(chapter.body.inner_html())
    }

    /// Text of the page currently displayed, markers rendered as `[word]`.
    /// The page is the same slice of reading text the location index counts,
    /// wrapped to the configured width.
    pub fn page_text(&self) -> Result<String> {
        let Some(chapter) = self.controller.chapter() else {
            return Ok(String::new());
        };
        let offset = self
            .controller
            .session()
            .and_then(|session| session.last_position)
            .map_or(0, |position| position.char_offset);
        let page = render_page(&chapter.body, offset, self.controller.chars_per_location())?;
        let width = self.config.settings.text_width;
        let lines: Vec<String> = page
            .lines()
            .flat_map(|line| textwrap::wrap(line, width))
            .map(|line| line.into_owned())
            .collect();
        Ok(lines.join("\n"))
    }

    /// `(word, link)` for every marker in the rendered chapter, in order.
    pub fn markers(&self) -> Vec<(String, Option<String>)> {
        let Some(chapter) = self.controller.chapter() else {
            return Vec::new();
        };
        chapter
            .body
            .marker_paths()
            .iter()
            .filter_map(|path| chapter.body.node_at(path).and_then(Node::as_element))
            .map(|marker| {
                let word = marker
                    .attr(ATTR_WORD)
                    .map(str::to_string)
                    .unwrap_or_else(|| marker.text_content());
                (word, marker.attr(ATTR_LINK).map(str::to_string))
            })
            .collect()
    }

    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> Result<()> {
        self.show_page(&mut output)?;
        writeln!(output, "Type h for help.")?;
        loop {
            write!(output, "> ")?;
            output.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            let (command, argument) = match line.split_once(char::is_whitespace) {
                Some((command, argument)) => (command, argument.trim()),
                None => (line, ""),
            };
            match command {
                "" => {}
                "q" | "quit" => break,
                "h" | "help" => writeln!(output, "{HELP}")?,
                "n" => {
                    self.controller.next();
                    self.settle()?;
                    self.show_page(&mut output)?;
                }
                "p" => {
                    self.controller.prev();
                    self.settle()?;
                    self.show_page(&mut output)?;
                }
                "g" => {
                    let moved = match argument.parse::<usize>() {
                        Ok(location) => self.go_to(location)?,
                        Err(_) => false,
                    };
                    if moved {
                        self.show_page(&mut output)?;
                    } else {
                        writeln!(
                            output,
                            "Enter a page between 1 and {}.",
                            self.controller.total_locations()
                        )?;
                    }
                }
                "t" => self.show_page(&mut output)?,
                "m" => self.list_markers(&mut output)?,
                "c" => self.click(argument, &mut input, &mut output)?,
                "a" => self.submit(argument, &mut output)?,
                other => writeln!(output, "Unknown command '{other}'. Type h for help.")?,
            }
        }
        self.controller.close();
        Ok(())
    }

    fn show_page<W: Write>(&self, output: &mut W) -> Result<()> {
        writeln!(output, "{}", self.page_text()?)?;
        if let Some(label) = self.controller.page_label() {
            writeln!(output, "-- {label} --")?;
        }
        Ok(())
    }

    fn list_markers<W: Write>(&self, output: &mut W) -> Result<()> {
        let markers = self.markers();
        if markers.is_empty() {
            writeln!(output, "No highlighted words in this chapter.")?;
        }
        for (index, (word, link)) in markers.iter().enumerate() {
            match link {
                Some(url) => writeln!(output, "{:>3}. {word} -> {url}", index + 1)?,
                None => writeln!(output, "{:>3}. {word}", index + 1)?,
            }
        }
        Ok(())
    }

    fn click<R: BufRead, W: Write>(&mut self, argument: &str, input: &mut R, output: &mut W) -> Result<()> {
        let paths = self
            .controller
            .chapter()
            .map(|chapter| chapter.body.marker_paths())
            .unwrap_or_default();
        let Some(path) = argument
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| paths.get(index).cloned())
        else {
            writeln!(output, "Enter a word number between 1 and {}.", paths.len())?;
            return Ok(());
        };

        let settings = &self.config.settings;
        let mut host = TerminalHost {
            input,
            output: &mut *output,
            opener: &settings.link_opener,
            definitions: &self.api,
            width: settings.text_width,
        };
        let outcomes = self.controller.click(path, &mut host);
        for outcome in outcomes {
            if let ClickOutcome::LinkFailed { url, .. } = outcome {
                writeln!(output, "Could not open {url}.")?;
            }
        }
        Ok(())
    }

    fn submit<W: Write>(&mut self, word: &str, output: &mut W) -> Result<()> {
        if word.trim().is_empty() {
            writeln!(output, "Usage: a WORD")?;
            return Ok(());
        }
        let message = self.vocabulary.submit(word, &self.api)?;
        writeln!(output, "{message}")?;
        if self.controller.set_vocabulary(self.vocabulary.current()).is_some() {
            logging::debug("Re-annotated the current chapter");
        }
        Ok(())
    }
}

struct TerminalHost<'a, R: BufRead, W: Write> {
    input: &'a mut R,
    output: &'a mut W,
    opener: &'a str,
    definitions: &'a dyn DefinitionService,
    width: usize,
}

impl<R: BufRead, W: Write> ReaderHost for TerminalHost<'_, R, W> {
    fn confirm(&mut self, message: &str) -> bool {
        if write!(self.output, "{message} [y/N] ").is_err() || self.output.flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    fn open_link(&mut self, url: &str) -> Result<()> {
        let (program, args) = build_opener_command(self.opener, url)?;
        logging::info(format!("Opening {url} with {program}"));
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }

    fn lookup(&mut self, word: &str) {
        let message = definition_message(self.definitions, word);
        let text = format!("{word}: {message}");
        for line in textwrap::wrap(&text, self.width) {
            if writeln!(self.output, "{line}").is_err() {
                break;
            }
        }
    }
}

fn split_command_template(template: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = template.chars();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if !in_single => match chars.next() {
                Some(next) => current.push(next),
                None => return Err(eyre!("Invalid opener command: trailing escape")),
            },
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if in_single || in_double {
        return Err(eyre!("Invalid opener command: unmatched quote"));
    }
    if !current.is_empty() {
        args.push(current);
    }
    Ok(args)
}

/// Expand an opener template into a program and its arguments. `%u` is
/// replaced by the URL; without it the URL is appended.
pub fn build_opener_command(template: &str, url: &str) -> Result<(String, Vec<String>)> {
    let mut parts = split_command_template(template)?;
    if parts.is_empty() {
        return Err(eyre!("Opener command is empty"));
    }
    let mut has_placeholder = false;
    for part in parts.iter_mut() {
        if part.contains("%u") {
            *part = part.replace("%u", url);
            has_placeholder = true;
        }
    }
    if !has_placeholder {
        parts.push(url.to_string());
    }
    let program = parts.remove(0);
    Ok((program, parts))
}
