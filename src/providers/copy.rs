//! Parsing of generated social copy
//!
//! Text models are asked for a JSON object, but replies often arrive wrapped
//! in markdown fences or surrounded by prose.

use crate::models::GeneratedContent;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("valid fence regex"));

static HASHTAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").expect("valid hashtag regex"));

#[derive(Deserialize)]
struct CopyJson {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    hashtags: Hashtags,
    #[serde(default)]
    call_to_action: Option<String>,
}

/// Models return hashtags as a list or as one space separated string
#[derive(Deserialize, Default)]
#[serde(untagged)]
enum Hashtags {
    #[default]
    None,
    List(Vec<String>),
    Text(String),
}

impl Hashtags {
    fn into_vec(self) -> Vec<String> {
        let raw = match self {
            Self::None => Vec::new(),
            Self::List(list) => list,
            Self::Text(text) => text.split_whitespace().map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Extract headline, body, hashtags and call to action from model output.
///
/// When no JSON object can be found the whole text becomes the body and
/// inline `#tags` become hashtags. `provider` and `model` are left empty.
pub fn parse_generated_copy(text: &str) -> GeneratedContent {
    let unfenced = FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    if let Some(parsed) = json_object(unfenced).or_else(|| json_object(text)) {
        if !parsed.headline.trim().is_empty() || !parsed.body.trim().is_empty() {
            return GeneratedContent {
                headline: parsed.headline.trim().to_string(),
                body: parsed.body.trim().to_string(),
                hashtags: parsed.hashtags.into_vec(),
                call_to_action: parsed
                    .call_to_action
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
                ..Default::default()
            };
        }
    }

    let body = text.trim().to_string();
    let hashtags = HASHTAG
        .captures_iter(&body)
        .map(|c| c[1].to_string())
        .collect();
    GeneratedContent {
        body,
        hashtags,
        ..Default::default()
    }
}

/// Parse the outermost `{...}` span of `text`
fn json_object(text: &str) -> Option<CopyJson> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
