//! HTTP collaborators: the bookstore API (feedback words, linked words, word
//! submission) and the public dictionary.

use crate::auth::AuthSession;
use crate::logging;
use crate::models::LinkedWord;
use crate::settings::Settings;
use eyre::Result;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Created,
    /// The service already knew the word.
    Conflict,
}

pub trait VocabularyService {
    fn fetch_feedback_words(&self) -> Result<Vec<String>>;
    fn fetch_linked_words(&self, book_id: &str) -> Result<Vec<LinkedWord>>;
    fn submit_word(&self, word: &str) -> Result<SubmitStatus>;
}

pub trait DefinitionService {
    /// First definition of the first meaning, or `None` when the dictionary has
    /// no usable entry.
    fn define(&self, word: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct FeedbackResponse {
    #[serde(default)]
    words: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BookReadResponse {
    book: Option<BookPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookPayload {
    #[serde(default)]
    linked_words: Vec<LinkedWord>,
}

#[derive(Debug, Deserialize)]
struct DictionaryEntry {
    #[serde(default)]
    meanings: Vec<DictionaryMeaning>,
}

#[derive(Debug, Deserialize)]
struct DictionaryMeaning {
    #[serde(default)]
    definitions: Vec<DictionaryDefinition>,
}

#[derive(Debug, Deserialize)]
struct DictionaryDefinition {
    definition: String,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    dictionary_url: String,
    auth: Option<AuthSession>,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .user_agent("lexicon-reader");
        let base = settings.api_base_url.as_str();
        if base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost") {
            builder = builder.no_proxy();
        }
        Ok(Self {
            client: builder.build()?,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            dictionary_url: settings.dictionary_url.trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    pub fn with_auth(mut self, auth: AuthSession) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn auth(&self) -> Option<&AuthSession> {
        self.auth.as_ref()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.as_ref().and_then(AuthSession::bearer) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        build_url(&self.base_url, segments)
    }
}

/// Join `segments` onto `base`, percent-encoding each one.
pub fn build_url(base: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| eyre::eyre!("Cannot build request URL from {base}"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

impl VocabularyService for ApiClient {
    fn fetch_feedback_words(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint(&["api", "feedback"])?)
            .send()?
            .error_for_status()?;
        let parsed: FeedbackResponse = response.json()?;
        Ok(parsed.words)
    }

    fn fetch_linked_words(&self, book_id: &str) -> Result<Vec<LinkedWord>> {
        let request = self
            .client
            .get(self.endpoint(&["api", "books", book_id, "read"])?);
        let response = self.authorized(request).send()?.error_for_status()?;
        let parsed: BookReadResponse = response.json()?;
        Ok(parsed.book.map(|b| b.linked_words).unwrap_or_default())
    }

    fn submit_word(&self, word: &str) -> Result<SubmitStatus> {
        let request = self
            .client
            .post(self.endpoint(&["api", "feedback"])?)
            .json(&serde_json::json!({ "word": word }));
        let response = self.authorized(request).send()?;
        match response.status() {
            StatusCode::CONFLICT => Ok(SubmitStatus::Conflict),
            status if status.is_success() => Ok(SubmitStatus::Created),
            status => Err(eyre::eyre!("Word submission returned {status}")),
        }
    }
}

impl DefinitionService for ApiClient {
    fn define(&self, word: &str) -> Result<Option<String>> {
        let url = build_url(&self.dictionary_url, &[word])?;
        let response = self.client.get(url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entries: Vec<DictionaryEntry> = response.error_for_status()?.json()?;
        Ok(first_definition(&entries))
    }
}

fn first_definition(entries: &[DictionaryEntry]) -> Option<String> {
    entries
        .first()?
        .meanings
        .first()?
        .definitions
        .first()
        .map(|d| d.definition.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// The inline text shown for a lookup: the definition, or a message.
pub fn definition_message(service: &dyn DefinitionService, word: &str) -> String {
    match service.define(word) {
        Ok(Some(definition)) => definition,
        Ok(None) => "No definition found.".to_string(),
        Err(err) => {
            logging::warn(format!("Definition lookup for '{word}' failed: {err}"));
            "Error fetching definition.".to_string()
        }
    }
}
