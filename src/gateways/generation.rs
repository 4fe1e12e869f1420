//! Generation gateway: turns a question into a short in-voice reply.
//!
//! One prediction lookup is chosen by keyword classification, folded into the
//! system prompt, and the model is asked for a reply. Strategies are tried in
//! order until one yields a plausible reply; if none does, a static apology
//! is returned. Every reply is sanitized and capped at a sentence boundary.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;

use crate::config::GenerationConfig;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::queue::UserContext;
use crate::store::{ChatTurn, TurnRole};

use super::prediction::{PredictionGateway, PredictionQuery};

/// Returned when every strategy fails.
pub const APOLOGY: &str = "Sorry, I'm having trouble with my cosmic connection right now 🌙 \
     Could you try asking again in a moment? 🙏";

/// Replies shorter than this (after sanitizing) count as failures.
pub const MIN_PLAUSIBLE_CHARS: usize = 20;

const REPLY_TOKENS: u32 = 150;
const THINKING_TOKENS: u32 = 2048;

static THINK_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think(?:ing)?>.*?</think(?:ing)?>\s*").expect("static think pair pattern")
});
static THINK_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<think(?:ing)?>").expect("static think open pattern"));
static THINK_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</think(?:ing)?>").expect("static think close pattern"));
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("static fence pattern"));
static BRACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("static brace pattern"));
static BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").expect("static bracket pattern"));
static RATINGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:rating|score)\s*:\s*\d+(?:\s*/\s*10)?|\b\d+\s*/\s*10\b")
        .expect("static rating pattern")
});
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("static spaces pattern"));
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,!?])").expect("static punct pattern"));

/// Remove deliberation blocks. Unterminated blocks are dropped to the end of
/// the text; a stray closing tag drops everything before it.
pub fn strip_deliberation(text: &str) -> String {
    let mut out = THINK_PAIR.replace_all(text, "").into_owned();
    if let Some(last) = THINK_CLOSE.find_iter(&out).last() {
        out = out[last.end()..].to_string();
    }
    if let Some(open) = THINK_OPEN.find(&out) {
        out.truncate(open.start());
    }
    out.trim().to_string()
}

/// Strip deliberation, code fences, JSON-like fragments and numeric ratings.
pub fn sanitize_reply(text: &str) -> String {
    let out = strip_deliberation(text);
    let out = CODE_FENCE.replace_all(&out, "");
    let out = out.replace("```", "");
    // Nested structures peel one level per pass.
    let mut out = out;
    loop {
        let next = BRACKETS
            .replace_all(&BRACES.replace_all(&out, ""), "")
            .into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    let out = RATINGS.replace_all(&out, "");
    let out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1");
    let out = SPACES.replace_all(&out, " ");
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cap `text` at `max_chars`, cutting after the last complete sentence that
/// fits. When no sentence end is in range, or the fitting sentences are
/// shorter than [`MIN_PLAUSIBLE_CHARS`], cut at the last word and mark the
/// elision.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentence_end = None;
    for (i, &(byte, c)) in chars.iter().enumerate().take(max_chars) {
        if matches!(c, '.' | '!' | '?') {
            let next_is_break = chars.get(i + 1).is_none_or(|&(_, n)| n.is_whitespace());
            if next_is_break {
                sentence_end = Some(byte + c.len_utf8());
            }
        }
    }
    if let Some(end) = sentence_end {
        let kept = text[..end].trim_end();
        if kept.chars().count() >= MIN_PLAUSIBLE_CHARS {
            return kept.to_string();
        }
    }

    // Leave room for the ellipsis.
    let limit = max_chars.saturating_sub(1);
    let cut = chars
        .iter()
        .take(limit + 1)
        .filter(|(_, c)| c.is_whitespace())
        .map(|&(byte, _)| byte)
        .last()
        .unwrap_or_else(|| chars.get(limit).map(|&(b, _)| b).unwrap_or(text.len()));
    format!("{}…", text[..cut].trim_end())
}

/// Ordered fallbacks. The first plausible reply wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Full prompt with the prediction payload.
    Informed,
    /// No lookup data; general insight only.
    Simplified,
}

const STRATEGIES: [Strategy; 2] = [Strategy::Informed, Strategy::Simplified];

pub struct GenerationGateway {
    llm: Arc<dyn LlmProvider>,
    prediction: Arc<dyn PredictionGateway>,
    max_reply_chars: usize,
    enable_thinking: bool,
}

impl GenerationGateway {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prediction: Arc<dyn PredictionGateway>,
        config: &GenerationConfig,
        enable_thinking: bool,
    ) -> Self {
        Self {
            llm,
            prediction,
            max_reply_chars: config.max_reply_chars,
            enable_thinking,
        }
    }

    /// Produce a reply for `query`. Never fails; falls back to [`APOLOGY`].
    pub async fn generate(
        &self,
        context: &UserContext,
        history: &[ChatTurn],
        query: &str,
    ) -> String {
        let lookup = PredictionQuery::classify(query);
        let payload = match &lookup {
            Some(q) => {
                tracing::debug!(lookup = q.label(), "Prediction lookup selected");
                Some(self.prediction.lookup(&context.birth_details(), q).await)
            }
            None => None,
        };

        for strategy in STRATEGIES {
            match self
                .attempt(strategy, context, history, query, payload.as_deref())
                .await
            {
                Ok(reply) => {
                    tracing::info!(?strategy, chars = reply.chars().count(), "Reply generated");
                    return reply;
                }
                Err(reason) => {
                    tracing::warn!(?strategy, %reason, "Generation strategy failed");
                }
            }
        }
        truncate_at_sentence(APOLOGY, self.max_reply_chars)
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        context: &UserContext,
        history: &[ChatTurn],
        query: &str,
        payload: Option<&str>,
    ) -> Result<String, String> {
        let thinking = self.enable_thinking && strategy == Strategy::Informed;
        let payload = match strategy {
            Strategy::Informed => payload,
            Strategy::Simplified => None,
        };
        let mut system = system_prompt(context, payload, thinking);
        if strategy == Strategy::Simplified {
            system.push_str(
                "\n\nNote: Provide a general astrological insight without relying on specific prediction data.",
            );
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(&turn.content),
            TurnRole::Assistant => ChatMessage::assistant(&turn.content),
        }));
        messages.push(ChatMessage::user(query));

        let request = CompletionRequest::new(messages)
            .with_max_tokens(if thinking { THINKING_TOKENS } else { REPLY_TOKENS })
            .with_temperature(if thinking { 0.6 } else { 0.8 });

        let response = self.llm.complete(request).await.map_err(|e| e.to_string())?;
        if thinking {
            tracing::debug!(raw = %response.content.chars().take(500).collect::<String>(), "Raw reply");
        }

        let reply = sanitize_reply(&response.content);
        let chars = reply.chars().count();
        if chars < MIN_PLAUSIBLE_CHARS {
            return Err(format!("implausibly short reply ({chars} chars)"));
        }
        Ok(truncate_at_sentence(&reply, self.max_reply_chars))
    }
}

fn system_prompt(context: &UserContext, payload: Option<&str>, thinking: bool) -> String {
    let today = Utc::now().format("%Y-%m-%d");
    let mut prompt = String::from(
        "You are Rudie 🌿, a 22-year-old woman from Bowral, Australia and a friendly, \
         down-to-earth Vedic astrologer who blends intuition with precision.\n\n\
         STYLE:\n\
         - Warm and conversational, like texting a close friend.\n\
         - One short paragraph of 4-6 sentences, at most 80 words.\n\
         - No markdown, lists, bullet points or bold text.\n\
         - Two or three fitting emojis (🌞🌙✨💫💖🙏🌻).\n\n\
         STRUCTURE:\n\
         1. Two or three key insights in everyday words.\n\
         2. One line of practical advice.\n\
         3. A warm closing takeaway.\n\n\
         RULES:\n\
         - Never repeat raw prediction data or JSON.\n\
         - Never mention numeric ratings or scores.\n\
         - Translate technical terms: \"Venus transiting 10th house\" becomes \
         \"Venus is boosting your career\".\n",
    );
    if thinking {
        prompt.push_str(
            "\nBefore answering, reason privately inside <think></think> tags about which \
             insights matter most and how to say them simply. Only the text after the \
             closing tag is shown to the user.\n",
        );
    }

    prompt.push_str(&format!("\nToday's date: {today}\n"));
    prompt.push_str(&format!(
        "\n<user_info>\nName: {}\nDate of Birth: {}\nTime of Birth: {}\nPlace of Birth: {}",
        context.name, context.date_of_birth, context.time_of_birth, context.place_of_birth
    ));
    if let Some(memories) = context.memories.as_deref().filter(|m| !m.trim().is_empty()) {
        prompt.push_str(&format!("\nUser Context: {memories}"));
    }
    prompt.push_str("\n</user_info>");

    if let Some(payload) = payload {
        prompt.push_str(&format!(
            "\n\n<prediction_data>\n{payload}\n</prediction_data>\n\
             Base your reply on this data. If it reports an error, give a gentle general \
             insight instead and do not mention the error."
        ));
    }
    prompt
}
