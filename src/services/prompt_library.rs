//! Linked prompt library
//!
//! Prompt templates are tagged with the industries, audiences, platforms,
//! tones and keywords they were written for. A brief is scored against each
//! template's tags and the best match is rendered with Tera.
//!
//! Scoring, per template:
//!
//! | signal                      | weight |
//! |-----------------------------|--------|
//! | industry equal              | 3      |
//! | each shared audience token  | 2      |
//! | platform listed             | 2      |
//! | tone equal                  | 1      |
//! | each shared keyword token   | 1      |
//!
//! Templates scoring 0 never match.

use crate::models::{AssetKind, CampaignBrief, GeneratedContent, Platform};
use crate::services::brand::augment_prompt;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tera::Tera;

const EMBEDDED_LIBRARY: &str = include_str!("prompt_library.yml");

const INDUSTRY_WEIGHT: u32 = 3;
const AUDIENCE_WEIGHT: u32 = 2;
const PLATFORM_WEIGHT: u32 = 2;
const TONE_WEIGHT: u32 = 1;
const KEYWORD_WEIGHT: u32 = 1;

/// Id recorded on campaigns generated from the fallback template
pub const GENERIC_TEMPLATE_ID: &str = "generic";

const GENERIC_TEMPLATE: &str = "Write a {{ tone }} {{ platform }} post promoting {{ product }}.\n\
What it is: {{ description }}\n\
Audience: {{ audience }}. Open with a hook, give one clear benefit and end with a call to action.\n\
{% if keywords %}Work in: {{ keywords }}.{% endif %}\n";

const STOP_WORDS: &[&str] = &[
    "and", "are", "but", "can", "for", "from", "has", "have", "her", "his", "into", "its", "more",
    "most", "not", "our", "out", "per", "she", "that", "the", "their", "them", "they", "this",
    "very", "was", "were", "what", "when", "who", "will", "with", "you", "your",
];

const COPY_FORMAT_INSTRUCTIONS: &str = "Respond with a JSON object with the keys \
\"headline\" (string), \"body\" (string), \"hashtags\" (array of strings without '#') and \
\"call_to_action\" (string). Do not add any other text.";

/// A tagged prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub audiences: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub tones: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub template: String,
}

/// A template with its score against one brief
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTemplate {
    pub template: PromptTemplate,
    pub score: u32,
}

/// A rendered generation prompt
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub prompt: String,
    pub template_id: String,
}

#[derive(Deserialize)]
struct LibraryFile {
    templates: Vec<PromptTemplate>,
}

pub struct PromptLibrary {
    templates: Vec<PromptTemplate>,
}

impl PromptLibrary {
    /// The library compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(EMBEDDED_LIBRARY).context("Embedded prompt library is invalid")
    }

    /// Parse a library document. Every template must compile.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let file: LibraryFile =
            serde_yaml::from_str(source).context("Failed to parse prompt library")?;

        let mut seen = BTreeSet::new();
        let mut tera = Tera::default();
        for template in &file.templates {
            if !seen.insert(template.id.as_str()) {
                anyhow::bail!("Duplicate prompt template id: {}", template.id);
            }
            tera.add_raw_template(&template.id, &template.template)
                .with_context(|| format!("Invalid prompt template: {}", template.id))?;
        }

        Ok(Self {
            templates: file.templates,
        })
    }

    pub fn all(&self) -> &[PromptTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Best templates for a brief, highest score first, ties by id
    pub fn match_brief(
        &self,
        brief: &CampaignBrief,
        platform: Platform,
        limit: usize,
    ) -> Vec<ScoredTemplate> {
        let signals = BriefSignals::from_brief(brief);

        let mut scored: Vec<ScoredTemplate> = self
            .templates
            .iter()
            .map(|t| ScoredTemplate {
                score: score_template(t, &signals, platform),
                template: t.clone(),
            })
            .filter(|s| s.score > 0)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.template.id.cmp(&b.template.id))
        });
        scored.truncate(limit);
        scored
    }

    /// Render the best template (or the generic one) and apply the brand
    pub fn build_prompt(&self, brief: &CampaignBrief, platform: Platform) -> Result<BuiltPrompt> {
        let best = self.match_brief(brief, platform, 1).into_iter().next();

        let (template_id, rendered) = match best {
            Some(scored) => (
                scored.template.id.clone(),
                render(&scored.template.template, brief, platform)?,
            ),
            None => (
                GENERIC_TEMPLATE_ID.to_string(),
                render(GENERIC_TEMPLATE, brief, platform)?,
            ),
        };

        let mut prompt = format!("{}\n\n{}", rendered.trim_end(), COPY_FORMAT_INSTRUCTIONS);
        if let Some(brand) = &brief.brand {
            prompt = augment_prompt(&prompt, brand);
        }

        Ok(BuiltPrompt {
            prompt,
            template_id,
        })
    }
}

/// Prompt for an image or video, seeded from the brief and any generated copy
pub fn build_media_prompt(
    brief: &CampaignBrief,
    platform: Platform,
    kind: AssetKind,
    content: Option<&GeneratedContent>,
) -> String {
    let format = match (kind, platform) {
        (AssetKind::Video, Platform::YouTube) => "a 16:9 promotional video",
        (AssetKind::Video, _) => "a short vertical 9:16 promotional video",
        (AssetKind::Image, Platform::Instagram) => "a square social media image",
        (AssetKind::Image, _) => "a social media advertising image",
    };

    let mut prompt = format!(
        "Create {} for {}. {}",
        format,
        brief.product_name,
        brief.description.trim()
    );
    if let Some(content) = content.filter(|c| !c.headline.is_empty()) {
        prompt.push_str(&format!(" Theme: \"{}\".", content.headline));
    }
    if let Some(audience) = &brief.target_audience {
        prompt.push_str(&format!(" Appeal to {}.", audience));
    }
    if let Some(tone) = &brief.tone {
        prompt.push_str(&format!(" Mood: {}.", tone));
    }
    prompt.push_str(" No text overlays.");

    match &brief.brand {
        Some(brand) => augment_prompt(&prompt, brand),
        None => prompt,
    }
}

/// Render a template body with the brief's fields
pub fn render(template: &str, brief: &CampaignBrief, platform: Platform) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("product", &brief.product_name);
    context.insert("description", brief.description.trim());
    context.insert(
        "audience",
        brief.target_audience.as_deref().unwrap_or("a broad audience"),
    );
    context.insert("tone", brief.tone.as_deref().unwrap_or("friendly"));
    context.insert("platform", platform_name(platform));
    context.insert("keywords", &brief.keywords.join(", "));

    Tera::one_off(template, &context, false).context("Failed to render prompt template")
}

fn platform_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Facebook => "Facebook",
        Platform::Instagram => "Instagram",
        Platform::TikTok => "TikTok",
        Platform::YouTube => "YouTube",
    }
}

/// Normalised tokens and labels pulled from a brief once per match
struct BriefSignals {
    industry: Option<String>,
    tone: Option<String>,
    audience: BTreeSet<String>,
    keywords: BTreeSet<String>,
}

impl BriefSignals {
    fn from_brief(brief: &CampaignBrief) -> Self {
        let mut keywords = BTreeSet::new();
        for keyword in &brief.keywords {
            keywords.extend(tokenize(keyword));
        }
        keywords.extend(tokenize(&brief.description));

        Self {
            industry: brief.industry.as_deref().map(normalize).filter(|s| !s.is_empty()),
            tone: brief.tone.as_deref().map(normalize).filter(|s| !s.is_empty()),
            audience: brief
                .target_audience
                .as_deref()
                .map(tokenize)
                .unwrap_or_default(),
            keywords,
        }
    }
}

fn score_template(template: &PromptTemplate, brief: &BriefSignals, platform: Platform) -> u32 {
    let mut score = 0;

    if let Some(industry) = &brief.industry {
        if template.industries.iter().any(|i| normalize(i) == *industry) {
            score += INDUSTRY_WEIGHT;
        }
    }

    let audience: BTreeSet<String> = template.audiences.iter().flat_map(|a| tokenize(a)).collect();
    score += AUDIENCE_WEIGHT * brief.audience.intersection(&audience).count() as u32;

    if template.platforms.contains(&platform) {
        score += PLATFORM_WEIGHT;
    }

    if let Some(tone) = &brief.tone {
        if template.tones.iter().any(|t| normalize(t) == *tone) {
            score += TONE_WEIGHT;
        }
    }

    let keywords: BTreeSet<String> = template.keywords.iter().flat_map(|k| tokenize(k)).collect();
    score += KEYWORD_WEIGHT * brief.keywords.intersection(&keywords).count() as u32;

    score
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Lowercase alphanumeric words of at least 3 chars, minus stop words
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrandConcept;
    use crate::test_support::coffee_brief;
    use proptest::prelude::*;

    fn library() -> PromptLibrary {
        PromptLibrary::embedded().unwrap()
    }

    #[test]
    fn test_embedded_library_loads() {
        let library = library();
        assert!(library.all().len() >= 10);
        assert!(library.get("food-playful-social").is_some());
        assert!(library.get("missing").is_none());
    }

    #[test]
    fn test_tokenize_drops_short_and_stop_words() {
        let tokens = tokenize("The best coffee for you & your team, on-the-go!");
        let expected: BTreeSet<String> = ["best", "coffee", "team"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_coffee_brief_matches_food_template_first() {
        let matches = library().match_brief(&coffee_brief(), Platform::Instagram, 3);

        assert_eq!(matches[0].template.id, "food-playful-social");
        // industry 3 + audience (young, professionals, students) 6 + platform 2
        // + tone 1 + keywords (coffee, energy, brew) 3
        assert_eq!(matches[0].score, 15);
        assert!(matches.len() <= 3);
    }

    #[test]
    fn test_empty_brief_only_matches_on_platform() {
        let brief = CampaignBrief {
            product_name: "Thing".into(),
            ..Default::default()
        };
        let matches = library().match_brief(&brief, Platform::Facebook, 100);
        assert!(!matches.is_empty());
        for m in &matches {
            assert_eq!(m.score, PLATFORM_WEIGHT);
            assert!(m.template.platforms.contains(&Platform::Facebook));
        }
    }

    #[test]
    fn test_untagged_template_never_matches() {
        let library = PromptLibrary::from_yaml(
            "templates:\n  - id: bare\n    name: Bare\n    template: \"{{ product }}\"\n",
        )
        .unwrap();
        assert!(library
            .match_brief(&coffee_brief(), Platform::TikTok, 5)
            .is_empty());
    }

    #[test]
    fn test_ties_break_by_id() {
        let library = PromptLibrary::from_yaml(
            r#"
templates:
  - id: b-template
    name: B
    platforms: [tiktok]
    template: "b"
  - id: a-template
    name: A
    platforms: [tiktok]
    template: "a"
"#,
        )
        .unwrap();
        let brief = CampaignBrief::default();
        let ids: Vec<String> = library
            .match_brief(&brief, Platform::TikTok, 5)
            .into_iter()
            .map(|s| s.template.id)
            .collect();
        assert_eq!(ids, vec!["a-template", "b-template"]);
    }

    #[test]
    fn test_invalid_library_rejected() {
        assert!(PromptLibrary::from_yaml("templates: [").is_err());
        assert!(PromptLibrary::from_yaml(
            "templates:\n  - id: x\n    name: X\n    template: \"{% if %}\"\n"
        )
        .is_err());
        assert!(PromptLibrary::from_yaml(
            "templates:\n  - {id: x, name: X, template: a}\n  - {id: x, name: Y, template: b}\n"
        )
        .is_err());
    }

    #[test]
    fn test_render_fills_brief_fields() {
        let rendered = render(
            "{{ product }} for {{ audience }} on {{ platform }} ({{ tone }}): {{ keywords }}",
            &coffee_brief(),
            Platform::TikTok,
        )
        .unwrap();
        assert_eq!(
            rendered,
            "Night Owl Cold Brew for young professionals and students on TikTok (playful): coffee, energy"
        );
    }

    #[test]
    fn test_build_prompt_uses_best_template_and_brand() {
        let mut brief = coffee_brief();
        brief.brand = Some(BrandConcept {
            name: "Night Owl".into(),
            ..Default::default()
        });

        let built = library().build_prompt(&brief, Platform::Instagram).unwrap();
        assert_eq!(built.template_id, "food-playful-social");
        assert!(built.prompt.contains("Night Owl Cold Brew"));
        assert!(built.prompt.contains("\"headline\""));
        assert!(built.prompt.ends_with("- Brand name: Night Owl"));
    }

    #[test]
    fn test_build_prompt_falls_back_to_generic() {
        let library = PromptLibrary::from_yaml("templates: []").unwrap();
        let built = library
            .build_prompt(&coffee_brief(), Platform::YouTube)
            .unwrap();
        assert_eq!(built.template_id, GENERIC_TEMPLATE_ID);
        assert!(built.prompt.contains("YouTube post promoting Night Owl Cold Brew"));
    }

    #[test]
    fn test_media_prompt() {
        let prompt = build_media_prompt(&coffee_brief(), Platform::TikTok, AssetKind::Video, None);
        assert!(prompt.starts_with("Create a short vertical 9:16 promotional video for Night Owl Cold Brew."));
        assert!(prompt.contains("Mood: playful."));
    }

    proptest! {
        #[test]
        fn prop_matches_sorted_positive_and_limited(
            industry in proptest::option::of("[a-z &]{0,20}"),
            audience in proptest::option::of("[a-z ]{0,40}"),
            description in "[a-z ]{0,80}",
            limit in 0usize..8,
            platform_index in 0usize..4,
        ) {
            let brief = CampaignBrief {
                product_name: "Product".into(),
                description,
                industry,
                target_audience: audience,
                ..Default::default()
            };
            let matches = library().match_brief(&brief, Platform::ALL[platform_index], limit);

            prop_assert!(matches.len() <= limit);
            for m in &matches {
                prop_assert!(m.score > 0);
            }
            for pair in matches.windows(2) {
                prop_assert!(
                    pair[0].score > pair[1].score
                        || (pair[0].score == pair[1].score && pair[0].template.id < pair[1].template.id)
                );
            }
        }
    }
}
