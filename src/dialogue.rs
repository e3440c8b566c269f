//! Caption generation: one prompt per request to a generative-text service,
//! parsed into a top/bottom pair with fixed fallbacks when the service says
//! too little.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const FALLBACK_TOP: &str = "Emaindhi asalu?";
pub const FALLBACK_BOTTOM: &str = "Adhi kaadhu, idhi kaadhu!";

const PROMPT_TEMPLATE: &str = r#"You are a hilarious Tenglish (Telugu-English) comedy writer. Write two EXTREMELY FUNNY dialogues for a meme with the emotion: {emotion}

Rules:
- Mix Telugu words written in English script with English, the way people actually talk.
- Be genuinely funny: relatable situations, wordplay, cultural references.
- First dialogue sets up the situation, second delivers the punchline or reaction.
- Each dialogue should be 50-80 characters so it reads well on an image.
- Use popular Telugu expressions mixed with English slang.

Emotion guidance with examples:
Happy (celebrations, achievements, good news):
"Friend: Bro first salary vachesindi!"
"Me: Arre, party ki budget separate ga undhaa?"
Sad (disappointments, failures, heartbreak):
"Crush: I think we should be just friends..."
"Me: Anthey, na heart ki funeral arrange cheyyandi"
Angry (frustration, arguments, annoyances):
"Mom: AC enduku? Fan tho adjust avvakunda?"
"Me: Amma, summer heat ki responsible nenu kaadhu sun!"
Surprise (unexpected twists, shocking news):
"Friend: Naku marriage fix aipoyindi ra!"
"Me: Enti?! Bachelor gang lo last survivor nenu aa?"
Neutral (everyday situations):
"Morning coffee lekunda day start ayyindi"
"Brain: Aiyyo, today productivity mode off cheyyandi"
Fear (nervous moments, close calls):
"Teacher: Tomorrow surprise test untundi"
"Me: Syllabus entha? Na prayers ki kuda limit undi!"
Disgust (gross food, bad habits):
"Roommate: Ee socks inka oka week vesukovachu"
"Me: Bro, vaasana ki separate room book chey!"

RETURN ONLY TWO DIALOGUES, ONE PER LINE. NO EXPLANATIONS, NO FORMATTING."#;

/// Prompt for the given emotion label. The label is the only parameter.
pub fn build_prompt(emotion: &str) -> String {
    PROMPT_TEMPLATE.replace("{emotion}", emotion)
}

/// The two lines rendered onto a meme. Both are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionPair {
    pub top: String,
    pub bottom: String,
}

impl CaptionPair {
    pub fn new(top: impl Into<String>, bottom: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            bottom: bottom.into(),
        }
    }
}

/// Split raw service output into trimmed, non-empty lines and pick captions.
pub fn parse_captions(raw: &str) -> CaptionPair {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    captions_from_lines(&lines)
}

/// Fallback ladder, first matching rule wins:
/// two or more lines use the first two, one line keeps it on top with the
/// fallback below, none uses both fallbacks.
pub fn captions_from_lines(lines: &[&str]) -> CaptionPair {
    match lines {
        [top, bottom, ..] => CaptionPair::new(*top, *bottom),
        [top] => {
            log::warn!("Only one dialogue received, using fallback for the second line");
            CaptionPair::new(*top, FALLBACK_BOTTOM)
        }
        [] => {
            log::warn!("No dialogues generated, using default captions");
            CaptionPair::new(FALLBACK_TOP, FALLBACK_BOTTOM)
        }
    }
}

/// A generative-text backend: prompt in, free text out.
///
/// Errors are transport or service failures; a short or empty answer is not
/// an error.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct DialogueSynthesizer {
    generator: Box<dyn TextGenerator + Send + Sync>,
}

impl DialogueSynthesizer {
    pub fn new(generator: Box<dyn TextGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    /// One service call, no retry. Transport failures propagate.
    pub fn synthesize(&self, emotion: &str) -> Result<CaptionPair> {
        log::info!("Generating meme dialogues for emotion '{}'", emotion);
        let raw = self
            .generator
            .generate(&build_prompt(emotion))
            .context("calling text-generation service")?;
        let captions = parse_captions(&raw);
        log::debug!("captions: {:?}", captions);
        Ok(captions)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first candidate, parts joined in order.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

/// Gemini `generateContent` over blocking HTTP.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_base: &str, model: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                api_base.trim_end_matches('/'),
                model
            ),
            api_key,
        })
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = resp.status();
        let body = resp.text().context("reading text service response")?;
        read_reply(status, &body)
    }
}

/// Candidate text from a `generateContent` reply. Any non-success status is
/// a service failure.
fn read_reply(status: StatusCode, body: &str) -> Result<String> {
    if !status.is_success() {
        anyhow::bail!("text service returned {}: {}", status, body.trim());
    }
    let parsed: GenerateResponse =
        serde_json::from_str(body).context("decoding text service response")?;
    let text = parsed.into_text();
    if text.trim().is_empty() {
        log::warn!("text service returned no candidate text");
    }
    Ok(text)
}
