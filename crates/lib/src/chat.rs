//! Chat sessions over attached papers.
//!
//! Sessions are kept in insertion order and at most one is active. The first
//! message of every session is the budgeted system prompt, regenerated from
//! the session's paper list whenever that list changes. Generation aborts are
//! process-wide on the client, not per session: cancelling stops whichever
//! chat call is in flight, even if the active session changed meanwhile.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, OllamaClient, OllamaError};

pub const DEFAULT_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_CONTEXT_BUDGET: usize = 24_000;

const LABEL_MAX_CHARS: usize = 30;

/// Paper metadata and extracted text, supplied by an external extractor.
/// The engine reads it and never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub item_type: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub text: String,
}

/// One multi-turn conversation bound to a set of papers.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    pub label: String,
    pub papers: Vec<PaperContext>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("no active chat session")]
    NoSession,
    #[error(transparent)]
    Llm(#[from] OllamaError),
}

/// Owns every chat session and the active-session pointer.
pub struct ChatSessionManager {
    model: String,
    context_budget: usize,
    sessions: Vec<ChatSession>,
    active_id: String,
}

impl ChatSessionManager {
    pub fn new(model: impl Into<String>, context_budget: usize) -> Self {
        Self {
            model: model.into(),
            context_budget,
            sessions: Vec::new(),
            active_id: String::new(),
        }
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn active_session_id(&self) -> &str {
        &self.active_id
    }

    pub fn get_all_sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn get_active_session(&self) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == self.active_id)
    }

    fn active_session_mut(&mut self) -> Option<&mut ChatSession> {
        let id = self.active_id.clone();
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Start a session for `papers` and make it active. An existing id is
    /// overwritten in place (keeping its position); the default id is derived
    /// from the current time.
    pub fn start_chat(&mut self, papers: Vec<PaperContext>, session_id: Option<String>) -> String {
        let id = session_id.unwrap_or_else(|| {
            format!("session-{}", chrono::Utc::now().timestamp_millis())
        });
        let session = ChatSession {
            id: id.clone(),
            label: session_label(&papers),
            messages: vec![ChatMessage::system(build_system_prompt(
                &papers,
                self.context_budget,
            ))],
            papers,
        };
        log::info!(
            "chat session {} started with {} paper(s), model={}",
            id,
            session.papers.len(),
            self.model
        );
        match self.sessions.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = session,
            None => self.sessions.push(session),
        }
        self.active_id = id.clone();
        id
    }

    /// Append papers to the active session, rebuilding the system prompt over
    /// the new total paper list and refreshing the label. No-op without an
    /// active session.
    pub fn add_papers(&mut self, papers: Vec<PaperContext>) {
        let budget = self.context_budget;
        let added = papers.len();
        let Some(session) = self.active_session_mut() else {
            return;
        };
        session.papers.extend(papers);
        let prompt = ChatMessage::system(build_system_prompt(&session.papers, budget));
        if session.messages.is_empty() {
            session.messages.push(prompt);
        } else {
            session.messages[0] = prompt;
        }
        session.label = session_label(&session.papers);
        log::info!(
            "added {} paper(s) to {}, total={}",
            added,
            session.id,
            session.papers.len()
        );
    }

    /// Run one turn: append the user message, stream the reply, append it as
    /// the assistant message. On any failure the user message is removed
    /// again, so history only ever holds confirmed exchanges.
    pub async fn send_message(
        &mut self,
        client: &OllamaClient,
        text: &str,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ChatError> {
        let model = self.model.clone();
        let Some(session) = self.active_session_mut() else {
            return Err(ChatError::NoSession);
        };
        session.messages.push(ChatMessage::user(text));
        let history = session.messages.clone();
        match client.chat(&model, history, on_token).await {
            Ok(reply) => {
                session.messages.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                session.messages.pop();
                Err(ChatError::Llm(e))
            }
        }
    }

    /// Make `id` active; returns false (and changes nothing) if it does not exist.
    pub fn switch_session(&mut self, id: &str) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            self.active_id = id.to_string();
            true
        } else {
            false
        }
    }

    /// Remove a session. If it was active, the most recently inserted
    /// remaining session becomes active, or none if no sessions remain.
    pub fn close_session(&mut self, id: &str) {
        self.sessions.retain(|s| s.id != id);
        if self.active_id == id {
            self.active_id = self
                .sessions
                .last()
                .map(|s| s.id.clone())
                .unwrap_or_default();
        }
    }

    /// Drop every session and clear the active pointer.
    pub fn clear_chat(&mut self) {
        self.sessions.clear();
        self.active_id.clear();
    }
}

/// Build the system prompt over `papers` within a total character budget.
///
/// Each paper gets floor(budget / N) characters. Header and abstract are
/// always included whole; the full text gets whatever remains of the paper's
/// allotment (floored at zero) and is truncated with a marker naming the
/// omitted character count. Counts are Unicode scalars, not bytes.
pub fn build_system_prompt(papers: &[PaperContext], budget: usize) -> String {
    if papers.is_empty() {
        return "You are a helpful research assistant. The user has not loaded any papers yet."
            .to_string();
    }

    let per_paper = budget / papers.len();

    let sections: Vec<String> = papers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut header = format!("--- Paper {} ---\nTitle: {}\n", i + 1, p.title);
            if !p.authors.is_empty() {
                header.push_str(&format!("Authors: {}\n", p.authors));
            }
            if !p.year.is_empty() {
                header.push_str(&format!("Year: {}\n", p.year));
            }
            if !p.item_type.is_empty() {
                header.push_str(&format!("Type: {}\n", p.item_type));
            }

            let abstract_section = if p.abstract_text.is_empty() {
                String::new()
            } else {
                format!("\nAbstract:\n{}\n", p.abstract_text)
            };

            let reserved = header.chars().count() + abstract_section.chars().count();
            let text_budget = per_paper.saturating_sub(reserved);
            let text_section = if p.text.is_empty() {
                "\n(No full text available)\n".to_string()
            } else {
                format!("\nFull Text:\n{}\n", truncate_chars(&p.text, text_budget))
            };

            format!("{}{}{}", header, abstract_section, text_section)
        })
        .collect();

    let intro = if papers.len() == 1 {
        "You are a helpful research assistant. The user is asking about the following paper. \
         Answer questions based on its content. Be precise and cite specific parts when possible."
            .to_string()
    } else {
        format!(
            "You are a helpful research assistant. The user is asking about the following {} \
             papers. You can compare, contrast, summarize, and answer questions about them. \
             Reference papers by their title or number.",
            papers.len()
        )
    };

    format!("{}\n\n{}", intro, sections.join("\n"))
}

/// Truncate to `max` characters, appending a marker with the omitted count.
/// Text at or under the limit is returned unchanged, with no marker.
fn truncate_chars(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!(
        "{}\n\n[... truncated, {} characters omitted ...]",
        kept,
        total - max
    )
}

fn session_label(papers: &[PaperContext]) -> String {
    if papers.len() == 1 {
        let title = if papers[0].title.is_empty() {
            "Untitled"
        } else {
            papers[0].title.as_str()
        };
        title.chars().take(LABEL_MAX_CHARS).collect()
    } else {
        format!("{} papers", papers.len())
    }
}
