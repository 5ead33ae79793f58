use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::dom::{DomIndex, NodeRef};
use crate::model::ContentSections;

static STRIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<iframe\b.*?</iframe>|<!--.*?-->",
    )
    .unwrap()
});
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Headings that open and close a topic section.
const SECONDARY: &[&str] = &["h1", "h2", "h3"];
/// Elements accumulated under a topic heading.
const BLOCKS: &[&str] = &["p", "ul", "ol", "blockquote", "h4", "h5", "h6"];
const NOISE_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "ins"];
const MIN_BLOCK_CHARS: usize = 10;
const FALLBACK_CHARS: std::ops::RangeInclusive<usize> = 50..=1000;

/// Split the page into the four labeled free-text sections.
///
/// Deterministic for a given page: the same input always yields byte-identical output.
pub fn segment(dom: &DomIndex, catalog: &Catalog) -> ContentSections {
    let mut sections = ContentSections::default();

    for heading in dom.find_all(&["h2", "h3"]) {
        let text = heading.text();
        let Some(topic) = catalog.topic_for(&text) else {
            continue;
        };
        if !sections.get(topic).is_empty() {
            debug!("Ignoring later {:?} heading {:?}", topic, text);
            continue;
        }
        let body = accumulate(heading);
        if body.is_empty() {
            continue;
        }
        debug!("Heading {:?} -> {:?}", text, topic);
        *sections.slot(topic) = body;
    }

    for topic in catalog.topics() {
        if !sections.get(topic).is_empty() {
            continue;
        }
        match fallback(dom, catalog.topic_keywords(topic)) {
            Some(found) => *sections.slot(topic) = found,
            None => warn!("No content found for {:?}", topic),
        }
    }

    sections
}

/// Whole-page display fragment: every counter/item/weakness/strategy heading
/// with its accumulated blocks, in document order.
pub fn formatted_content(dom: &DomIndex, catalog: &Catalog) -> String {
    let parts: Vec<String> = dom
        .find_all(&["h2", "h3"])
        .into_iter()
        .filter(|h| catalog.is_relevant_heading(&h.text()))
        .map(|h| {
            let mut part = sanitize(&h.outer_html_filtered(&is_noise));
            let body = accumulate(h);
            if !body.is_empty() {
                part.push(' ');
                part.push_str(&body);
            }
            part
        })
        .collect();
    parts.join(" ")
}

fn accumulate(heading: NodeRef<'_>) -> String {
    let parts: Vec<String> = heading
        .next_element_siblings()
        .into_iter()
        .take_while(|s| !s.has_tag(SECONDARY))
        .filter(|s| s.is_tag(BLOCKS) && !is_noise(*s))
        .filter(|s| s.text().chars().count() >= MIN_BLOCK_CHARS)
        .map(|s| sanitize(&s.outer_html_filtered(&is_noise)))
        .filter(|html| !html.is_empty())
        .collect();
    parts.join(" ")
}

/// First generic paragraph/div whose text mentions the topic and is 50-1000 chars.
fn fallback(dom: &DomIndex, keywords: &[String]) -> Option<String> {
    if keywords.is_empty() {
        return None;
    }
    dom.find_all(&["p", "div"])
        .into_iter()
        .filter(|n| !is_noise(*n) && !n.ancestors().any(is_noise))
        .find(|n| {
            let text = n.text();
            FALLBACK_CHARS.contains(&text.chars().count()) && {
                let lower = text.to_lowercase();
                keywords.iter().any(|k| lower.contains(k.as_str()))
            }
        })
        .map(|n| sanitize(&n.outer_html_filtered(&is_noise)))
}

/// Scripts, styles, embeds and anything whose class/id marks it as advertising.
pub fn is_noise(node: NodeRef<'_>) -> bool {
    if node.is_tag(NOISE_TAGS) {
        return true;
    }
    node.class_tokens().iter().any(|t| {
        t == "ad"
            || t == "ads"
            || t.starts_with("ad-")
            || t.starts_with("ads-")
            || t.ends_with("-ad")
            || t.contains("advert")
            || t.contains("adsbygoogle")
            || t.contains("sponsor")
            || t.contains("banner")
    })
}

/// Drop script/style/embed markup and comments, collapse whitespace.
pub fn sanitize(fragment: &str) -> String {
    let stripped = STRIP_RE.replace_all(fragment, "");
    WS_RE.replace_all(&stripped, " ").trim().to_string()
}
