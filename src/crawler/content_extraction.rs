//! Content extraction functionality for the crawler module
//!
//! Picks the main content region of a wiki page, strips boilerplate inside
//! it, and returns cleaned paragraphs. Extraction is a pure function of the
//! HTML and the configuration.

use crate::crawler::error::ExtractError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

static FOOTNOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static LEADING_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[。，、；：？！\s]+").unwrap());

/// A candidate content region and the text length it must exceed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSelector {
    pub selector: String,
    #[serde(default)]
    pub min_chars: usize,
}

impl RegionSelector {
    pub fn new(selector: impl Into<String>, min_chars: usize) -> Self {
        Self {
            selector: selector.into(),
            min_chars,
        }
    }
}

/// Configuration for content extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Candidate regions in priority order
    pub region_selectors: Vec<RegionSelector>,

    /// Boilerplate removed from the chosen region
    pub exclude_selectors: Vec<String>,

    pub paragraph_selector: String,

    /// Headings tried in order for the page title
    pub title_selectors: Vec<String>,

    /// Extra elements consulted when too few paragraphs qualify
    pub supplement_selector: Option<String>,
    pub supplement_below: usize,
    pub supplement_min_chars: usize,
    pub supplement_limit: usize,

    /// A paragraph must be longer than this after cleaning
    pub min_paragraph_chars: usize,
    pub min_paragraphs: usize,
    pub max_paragraphs: usize,
    pub min_content_chars: usize,
    pub max_content_chars: usize,

    /// Literal wiki markers stripped from every paragraph
    pub noise_markers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            region_selectors: vec![
                RegionSelector::new("div.mw-content-ltr.mw-parser-output", 100),
                RegionSelector::new("div.mw-parser-output", 100),
                RegionSelector::new("div#mw-content-text .mw-parser-output", 100),
                RegionSelector::new("div#mw-content-text", 100),
            ],
            exclude_selectors: [
                "table.infobox",
                "div.toc",
                "div.reflist",
                "div.navbox",
                "div.mw-references-wrap",
                "div.printfooter",
                "div.mw-indicator",
                "div.catlinks",
                "div.sister-project",
                "div.ambox",
                "div.metadata",
                "span.mw-editsection",
                "sup.reference",
                "ol.references",
                "table.wikitable",
                "div.thumb",
                "div.gallery",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            paragraph_selector: "p".to_string(),
            title_selectors: vec![
                "h1#firstHeading".to_string(),
                "h1.page-header__title".to_string(),
                "h1".to_string(),
            ],
            supplement_selector: None,
            supplement_below: 3,
            supplement_min_chars: 20,
            supplement_limit: 10,
            min_paragraph_chars: 10,
            min_paragraphs: 1,
            max_paragraphs: 20,
            min_content_chars: 50,
            max_content_chars: 3000,
            noise_markers: ["[编辑]", "[查]", "[论]", "[阅]"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Builder for ExtractorConfig
#[derive(Debug, Default)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ExtractorConfig::default(),
        }
    }

    pub fn region_selectors(mut self, selectors: Vec<RegionSelector>) -> Self {
        self.config.region_selectors = selectors;
        self
    }

    pub fn exclude_selectors(mut self, selectors: Vec<String>) -> Self {
        self.config.exclude_selectors = selectors;
        self
    }

    pub fn paragraph_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.paragraph_selector = selector.into();
        self
    }

    pub fn supplement_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.supplement_selector = Some(selector.into());
        self
    }

    pub fn min_paragraph_chars(mut self, chars: usize) -> Self {
        self.config.min_paragraph_chars = chars;
        self
    }

    pub fn min_paragraphs(mut self, count: usize) -> Self {
        self.config.min_paragraphs = count;
        self
    }

    pub fn max_paragraphs(mut self, count: usize) -> Self {
        self.config.max_paragraphs = count;
        self
    }

    pub fn min_content_chars(mut self, chars: usize) -> Self {
        self.config.min_content_chars = chars;
        self
    }

    pub fn max_content_chars(mut self, chars: usize) -> Self {
        self.config.max_content_chars = chars;
        self
    }

    pub fn build(self) -> ExtractorConfig {
        self.config
    }
}

impl ExtractorConfig {
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::new()
    }
}

/// Cleaned content of one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub paragraphs: Vec<String>,
    /// Paragraphs joined with blank lines and capped
    pub content: String,
    /// Character count of the chosen region before cleaning
    pub raw_length: usize,
    /// Region selector that won, `None` for the whole-document fallback
    pub matched_selector: Option<String>,
}

/// Extracts cleaned content with pre-parsed selectors
#[derive(Debug)]
pub struct ContentExtractor {
    config: ExtractorConfig,
    regions: Vec<(Selector, usize, String)>,
    excludes: Vec<Selector>,
    paragraph: Selector,
    titles: Vec<Selector>,
    supplement: Option<Selector>,
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

impl ContentExtractor {
    /// Create an extractor, failing on any selector that does not parse
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let regions = config
            .region_selectors
            .iter()
            .map(|r| Ok((parse_selector(&r.selector)?, r.min_chars, r.selector.clone())))
            .collect::<Result<Vec<_>, ExtractError>>()?;
        let excludes = config
            .exclude_selectors
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>, _>>()?;
        let titles = config
            .title_selectors
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>, _>>()?;
        let paragraph = parse_selector(&config.paragraph_selector)?;
        let supplement = config
            .supplement_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;

        Ok(Self {
            config,
            regions,
            excludes,
            paragraph,
            titles,
            supplement,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the title and cleaned paragraphs from `html`
    pub fn extract(
        &self,
        html: &str,
        fallback_title: &str,
    ) -> Result<ExtractedContent, ExtractError> {
        let mut document = Html::parse_document(html);
        let title = self.title(&document).unwrap_or_else(|| fallback_title.trim().to_string());

        let (region_id, matched_selector, raw_length) = match self.select_region(&document) {
            Some((element, selector)) => (element.id(), Some(selector), text_chars(element)),
            None => {
                let root = document.root_element();
                debug!("No content region qualified, scanning the whole document");
                (root.id(), None, text_chars(root))
            }
        };

        let doomed: Vec<_> = match document.tree.get(region_id).and_then(ElementRef::wrap) {
            Some(region) => self
                .excludes
                .iter()
                .flat_map(|selector| region.select(selector).map(|e| e.id()))
                .collect(),
            None => Vec::new(),
        };
        for id in doomed {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        let region = document
            .tree
            .get(region_id)
            .and_then(ElementRef::wrap)
            .unwrap_or_else(|| document.root_element());

        let mut paragraphs: Vec<String> = region
            .select(&self.paragraph)
            .map(|p| self.clean_text(&p.text().collect::<String>()))
            .filter(|text| text.chars().count() > self.config.min_paragraph_chars)
            .collect();

        if paragraphs.len() < self.config.supplement_below {
            if let Some(selector) = &self.supplement {
                self.supplement(region, selector, &mut paragraphs);
            }
        }

        if paragraphs.is_empty() {
            return Err(ExtractError::NoParagraphs);
        }
        if paragraphs.len() < self.config.min_paragraphs {
            return Err(ExtractError::TooFewParagraphs {
                found: paragraphs.len(),
                required: self.config.min_paragraphs,
            });
        }

        paragraphs.truncate(self.config.max_paragraphs.max(1));
        let joined = paragraphs.join("\n\n");
        let length = joined.chars().count();
        if length < self.config.min_content_chars {
            return Err(ExtractError::TooShort {
                length,
                minimum: self.config.min_content_chars,
            });
        }

        Ok(ExtractedContent {
            title,
            paragraphs,
            content: cap_chars(joined, self.config.max_content_chars),
            raw_length,
            matched_selector,
        })
    }

    fn title(&self, document: &Html) -> Option<String> {
        self.titles.iter().find_map(|selector| {
            document
                .select(selector)
                .map(|h| {
                    WHITESPACE
                        .replace_all(h.text().collect::<String>().trim(), " ")
                        .into_owned()
                })
                .find(|t| !t.is_empty())
        })
    }

    fn select_region<'a>(&self, document: &'a Html) -> Option<(ElementRef<'a>, String)> {
        self.regions.iter().find_map(|(selector, min_chars, source)| {
            document
                .select(selector)
                .find(|element| text_chars(*element) > *min_chars)
                .map(|element| (element, source.clone()))
        })
    }

    fn supplement(
        &self,
        region: ElementRef<'_>,
        selector: &Selector,
        paragraphs: &mut Vec<String>,
    ) {
        for element in region.select(selector) {
            if paragraphs.len() >= self.config.supplement_limit {
                break;
            }
            let text = self.clean_text(&element.text().collect::<String>());
            if text.chars().count() <= self.config.supplement_min_chars {
                continue;
            }
            if paragraphs.iter().any(|p| p.contains(text.as_str())) {
                continue;
            }
            paragraphs.push(text);
        }
    }

    /// Remove wiki markers and footnotes, collapse whitespace, trim leading punctuation
    pub fn clean_text(&self, text: &str) -> String {
        let mut text = text.to_string();
        for marker in &self.config.noise_markers {
            text = text.replace(marker.as_str(), "");
        }
        let text = FOOTNOTE.replace_all(&text, "");
        let text = WHITESPACE.replace_all(&text, " ");
        let text = LEADING_PUNCTUATION.replace(&text, "");
        text.trim().to_string()
    }
}

fn text_chars(element: ElementRef<'_>) -> usize {
    element.text().collect::<String>().trim().chars().count()
}

/// Truncate to at most `max` characters, ending with "..." when cut
fn cap_chars(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    let keep = max.saturating_sub(3);
    let mut capped: String = text.chars().take(keep).collect();
    capped.push_str("...");
    capped
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html><head><title>ignored</title></head><body>
        <div id="sidebar"><p>侧边栏导航内容不应当出现在正文之中的文字</p></div>
        <h1 id="firstHeading">阿尔伯特·爱因斯坦</h1>
        <div id="mw-content-text"><div class="mw-content-ltr mw-parser-output">
          <table class="infobox"><tr><td><p>信息框里的出生日期与地点等内容</p></td></tr></table>
          <p>阿尔伯特·爱因斯坦[编辑]是出生于德国的理论物理学家[1]。</p>
          <p>，他创立了狭义相对论和广义相对论，被誉为现代物理学之父。</p>
          <p>短句。</p>
          <div class="navbox"><p>导航框中的链接列表不属于正文内容部分</p></div>
          <p>他因光电效应的研究获得了一九二一年诺贝尔物理学奖。</p>
        </div></div>
        </body></html>
    "#;

    fn extractor(min_content_chars: usize) -> ContentExtractor {
        ContentExtractor::new(
            ExtractorConfig::builder()
                .region_selectors(vec![
                    RegionSelector::new("div.mw-content-ltr.mw-parser-output", 20),
                    RegionSelector::new("div#mw-content-text", 20),
                ])
                .min_paragraph_chars(10)
                .min_content_chars(min_content_chars)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_extracts_cleaned_paragraphs() {
        let content = extractor(30).extract(ARTICLE, "fallback").unwrap();

        assert_eq!(content.title, "阿尔伯特·爱因斯坦");
        assert_eq!(
            content.matched_selector.as_deref(),
            Some("div.mw-content-ltr.mw-parser-output")
        );
        assert_eq!(
            content.paragraphs,
            vec![
                "阿尔伯特·爱因斯坦是出生于德国的理论物理学家。",
                "他创立了狭义相对论和广义相对论，被誉为现代物理学之父。",
                "他因光电效应的研究获得了一九二一年诺贝尔物理学奖。",
            ]
        );
        assert!(!content.content.contains("信息框"));
        assert!(!content.content.contains("导航框"));
        assert!(!content.content.contains("侧边栏"));
    }

    #[test]
    fn test_content_floor_boundary() {
        let err = extractor(100).extract(ARTICLE, "fallback").unwrap_err();
        assert!(matches!(err, ExtractError::TooShort { minimum: 100, .. }));
        assert!(err.is_too_short());

        assert!(extractor(30).extract(ARTICLE, "fallback").is_ok());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = extractor(30);
        let first = extractor.extract(ARTICLE, "fallback").unwrap();
        let second = extractor.extract(ARTICLE, "fallback").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fallback_scans_whole_document() {
        let html = "<html><body><p>这是一个没有任何维基容器的普通页面正文段落内容。</p></body></html>";
        let extractor = ContentExtractor::new(
            ExtractorConfig::builder().min_content_chars(10).build(),
        )
        .unwrap();
        let content = extractor.extract(html, "普通页面").unwrap();
        assert_eq!(content.title, "普通页面");
        assert_eq!(content.matched_selector, None);
        assert_eq!(content.paragraphs.len(), 1);
    }

    #[test]
    fn test_no_paragraphs() {
        let extractor = ContentExtractor::new(ExtractorConfig::default()).unwrap();
        let err = extractor.extract("<html><body><p>短</p></body></html>", "x").unwrap_err();
        assert_eq!(err, ExtractError::NoParagraphs);
    }

    #[test]
    fn test_supplement_adds_list_items() {
        let html = r#"<div class="mw-parser-output">
            <p>柯南是一部长篇侦探推理漫画作品的主人公。</p>
            <ul>
              <li>工藤新一被灌下毒药后身体缩小成为小学生模样的侦探。</li>
              <li>柯南是一部长篇侦探推理漫画作品的主人公。</li>
              <li>太短的条目</li>
            </ul>
        </div>"#;
        let extractor = ContentExtractor::new(
            ExtractorConfig::builder()
                .region_selectors(vec![RegionSelector::new("div.mw-parser-output", 10)])
                .supplement_selector("li")
                .min_content_chars(10)
                .build(),
        )
        .unwrap();
        let content = extractor.extract(html, "柯南").unwrap();
        assert_eq!(content.paragraphs.len(), 2);
        assert!(content.paragraphs[1].starts_with("工藤新一"));
    }

    #[test]
    fn test_content_is_capped_with_ellipsis() {
        let paragraph = "物".repeat(40);
        let html = format!(
            "<div class=\"mw-parser-output\">{}</div>",
            format!("<p>{}</p>", paragraph).repeat(5)
        );
        let extractor = ContentExtractor::new(
            ExtractorConfig::builder()
                .region_selectors(vec![RegionSelector::new("div.mw-parser-output", 10)])
                .max_content_chars(100)
                .build(),
        )
        .unwrap();
        let content = extractor.extract(&html, "x").unwrap();
        assert_eq!(content.content.chars().count(), 100);
        assert!(content.content.ends_with("..."));
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let config = ExtractorConfig::builder()
            .paragraph_selector("p[[")
            .build();
        assert!(matches!(
            ContentExtractor::new(config),
            Err(ExtractError::InvalidSelector { .. })
        ));
    }
}
