//! services/monitor/src/adapters/summary_llm.rs
//!
//! This module contains the adapter for the paper-summarizing LLM.
//! It implements the `SummaryService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use paper_watch_core::{
    domain::Paper,
    ports::{PortError, PortResult, SummaryService},
};

const SYSTEM_INSTRUCTIONS: &str = "You are an expert scientist writing short digests of research papers. \
Summarize the paper you are given: its core idea, the methods used and the main results. \
Write plain text only: short paragraphs separated by blank lines, and bullet points as lines starting with \"- \". \
Do not use Markdown headings, bold text, HTML or code fences.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SummaryService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSummaryAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    language: String,
}

impl OpenAiSummaryAdapter {
    /// Creates a new `OpenAiSummaryAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, language: String) -> Self {
        Self {
            client,
            model,
            language,
        }
    }
}

fn user_prompt(paper: &Paper, language: &str) -> String {
    format!(
        "Write the summary in {}.\n\nTITLE: {}\n\nABSTRACT: {}",
        language, paper.title, paper.abstract_text
    )
}

/// Strips code fences some models wrap their answer in.
fn clean_summary(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

//=========================================================================================
// `SummaryService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SummaryService for OpenAiSummaryAdapter {
    async fn summarize(&self, paper: &Paper) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt(paper, &self.language))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Provider(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Provider("Summary LLM response contained no text content.".to_string())
            })?;

        let summary = clean_summary(&content);
        if summary.is_empty() {
            return Err(PortError::Provider("Summary LLM returned an empty summary.".to_string()));
        }
        Ok(summary)
    }
}
