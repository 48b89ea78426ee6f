use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{HandRecord, SolverResult};
use crate::pipeline::ExplainService;

const TEMPERATURE: f64 = 0.3;
const SYSTEM_ROLE: &str = "You're a world-class poker GTO expert. Analyze solver output and provide strategic insights in clear, actionable terms.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for the natural-language explanation service: one synchronous
/// chat-completion request per selected hand, free text back.
pub struct ExplanationClient {
    client: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ExplanationClient {
    /// The API key is a batch-level precondition: stage 2 refuses to start
    /// without credentials rather than failing hand by hand.
    pub fn new(api_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is not set; the explanation service requires credentials")?;

        let client = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build explanation http client")?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key,
            model: model.to_string(),
            timeout,
        })
    }

    pub fn explain(&self, hand: &HandRecord, solver: &SolverResult) -> Result<String> {
        let prompt = build_analysis_prompt(hand, solver);
        let request = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_ROLE,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        debug!(hand_id = %hand.hand_id, model = %self.model, "requesting explanation");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .with_context(|| format!("explanation request failed for hand {}", hand.hand_id))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("explanation service returned {}: {}", status.as_u16(), body);
        }

        let parsed: ChatResponse = response
            .json()
            .context("explanation response was not valid JSON")?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("explanation response carried no content"))?;

        info!(hand_id = %hand.hand_id, chars = text.len(), "explanation received");
        Ok(text)
    }
}

impl ExplainService for ExplanationClient {
    fn explain(&self, hand: &HandRecord, solver: &SolverResult) -> Result<String> {
        ExplanationClient::explain(self, hand, solver)
    }
}

pub(crate) fn build_analysis_prompt(hand: &HandRecord, solver: &SolverResult) -> String {
    let ranges = to_pretty_json(&solver.ranges);
    let frequencies = to_pretty_json(&solver.frequencies);
    let ev_deltas = to_pretty_json(&solver.ev_deltas);

    format!(
        "Analyze this poker hand using GTO solver output:\n\n\
         HAND DETAILS:\n\
         - Hand ID: {hand_id}\n\
         - Stakes: {stakes}\n\
         - Game: {game_type}\n\n\
         HAND HISTORY:\n{history}\n\n\
         SOLVER ANALYSIS:\n{narrative}\n\n\
         RANGES:\n{ranges}\n\n\
         FREQUENCIES:\n{frequencies}\n\n\
         EV ANALYSIS:\n{ev_deltas}\n\n\
         Please provide:\n\
         1. Strategic assessment of the played line\n\
         2. Key deviations from GTO recommendations\n\
         3. EV impact of any mistakes\n\
         4. Specific improvement suggestions\n\
         5. Learning points for similar spots\n\n\
         Format your response with clear sections and actionable insights.\n",
        hand_id = hand.hand_id,
        stakes = hand.stakes,
        game_type = hand.game_type.as_str(),
        history = hand.raw_text,
        narrative = solver.narrative,
    )
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
