use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

use crate::catalog::Catalog;
use crate::model::{normalize_id, Portrait};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\p{L}' ]{2,20}$").unwrap());
static TRAILING_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\d]+$").unwrap());

/// A portrait that passed identification and name validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub opponent_id: String,
    pub name: String,
    pub image_url: String,
    pub dom_position: usize,
}

/// Identify a portrait against the catalog and extract a validated display name.
///
/// `None` when the image is not a known character or no candidate name passes
/// validation. Both are logged and skipped, never fatal.
pub fn resolve(portrait: &Portrait, catalog: &Catalog, page_url: &str) -> Option<Candidate> {
    let stem = file_stem(&portrait.src_url);
    let known = [
        portrait.alt_text.as_str(),
        portrait.title_text.as_str(),
        stem.as_deref().unwrap_or_default(),
    ]
    .into_iter()
    .filter(|c| !c.is_empty())
    .find_map(|c| catalog.lookup(c))?;

    let Some(name) = display_name(portrait, stem.as_deref(), known) else {
        warn!(
            "Skipping portrait {:?}: no valid name (alt={:?}, title={:?})",
            known, portrait.alt_text, portrait.title_text
        );
        return None;
    };

    Some(Candidate {
        opponent_id: normalize_id(known),
        name,
        image_url: absolutize(page_url, &portrait.src_url),
        dom_position: portrait.dom_position,
    })
}

/// alt text, then title, then the capitalized file stem: the first that validates
/// and names `known` itself. Otherwise the catalog name, if it validates.
pub fn display_name(portrait: &Portrait, stem: Option<&str>, known: &str) -> Option<String> {
    let known_id = normalize_id(known);
    let candidates = [
        Some(portrait.alt_text.trim().to_string()),
        Some(portrait.title_text.trim().to_string()),
        stem.map(capitalize_words),
    ];
    let name = candidates
        .into_iter()
        .flatten()
        .find(|c| is_valid_name(c) && normalize_id(c) == known_id)
        .or_else(|| Some(known.to_string()).filter(|k| is_valid_name(k)));
    name
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name) && !name.trim().is_empty()
}

/// `/img/champion/Miss_Fortune_0.png?v=2` -> `Miss Fortune`
pub fn file_stem(src: &str) -> Option<String> {
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    let stem = match last.rfind('.') {
        Some(dot) if dot > 0 => &last[..dot],
        _ => last,
    };
    let spaced = stem.replace(['_', '-', '+'], " ");
    let trimmed = TRAILING_DIGITS_RE.replace(&spaced, "");
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn capitalize_words(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `src` against the page URL; returned unchanged when either side is unparseable.
pub fn absolutize(page_url: &str, src: &str) -> String {
    if src.is_empty() {
        return String::new();
    }
    Url::parse(page_url)
        .and_then(|base| base.join(src))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| src.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portrait(alt: &str, title: &str, src: &str) -> Portrait {
        Portrait {
            alt_text: alt.into(),
            src_url: src.into(),
            title_text: title.into(),
            dom_position: 7,
        }
    }

    #[test]
    fn stems() {
        assert_eq!(
            file_stem("/img/champion/Miss_Fortune_0.png?v=2").as_deref(),
            Some("Miss Fortune")
        );
        assert_eq!(file_stem("https://cdn.x/jinx.webp").as_deref(), Some("jinx"));
        assert_eq!(file_stem("https://cdn.x/12345.png"), None);
        assert_eq!(file_stem(""), None);
    }

    #[test]
    fn names_validate() {
        assert!(is_valid_name("Kai'Sa"));
        assert!(is_valid_name("Lee Sin"));
        assert!(!is_valid_name("X"));
        assert!(!is_valid_name("Dr. Mundo"));
        assert!(!is_valid_name("A name that is far too long to be real"));
        assert!(!is_valid_name("Jinx<script>"));
    }

    #[test]
    fn prefers_alt_then_title_then_stem() {
        let p = portrait("Jinx", "Jinx the Loose", "/jinx.png");
        assert_eq!(display_name(&p, Some("jinx"), "Jinx").as_deref(), Some("Jinx"));
        let p = portrait("", "Jinx", "/jinx.png");
        assert_eq!(display_name(&p, Some("jinx"), "Jinx").as_deref(), Some("Jinx"));
        let p = portrait("", "", "/lee_sin.png");
        assert_eq!(display_name(&p, Some("lee sin"), "Lee Sin").as_deref(), Some("Lee Sin"));
    }

    #[test]
    fn catalog_name_when_labels_describe_something_else() {
        let p = portrait("Jinx icon", "Click to view", "/img/jinx_square_0.png");
        assert_eq!(display_name(&p, Some("jinx square"), "Jinx").as_deref(), Some("Jinx"));

        let catalog = Catalog::default();
        let c = resolve(&p, &catalog, "https://site.com/counter/zeri").unwrap();
        assert_eq!(c.name, "Jinx");
        assert_eq!(c.opponent_id, "jinx");
    }

    #[test]
    fn loader_and_banner_images_are_not_characters() {
        let catalog = Catalog::default();
        let loader = portrait("", "", "/static/ajax-loader.gif");
        assert!(resolve(&loader, &catalog, "https://site.com/").is_none());
        let banner = portrait("", "", "/img/optimized-banner.png");
        assert!(resolve(&banner, &catalog, "https://site.com/").is_none());
    }

    #[test]
    fn resolve_identifies_from_filename() {
        let catalog = Catalog::default();
        let p = portrait("", "", "//cdn.site.com/champ/Caitlyn_0.jpg");
        let c = resolve(&p, &catalog, "https://site.com/counter/zeri").unwrap();
        assert_eq!(c.opponent_id, "caitlyn");
        assert_eq!(c.name, "Caitlyn");
        assert_eq!(c.image_url, "https://cdn.site.com/champ/Caitlyn_0.jpg");
    }

    #[test]
    fn resolve_rejects_unknown_and_invalid() {
        let catalog = Catalog::default();
        let logo = portrait("Site logo", "", "/logo.png");
        assert!(resolve(&logo, &catalog, "https://site.com/").is_none());
        // known character but every name candidate fails validation
        let dotted = portrait("Dr. Mundo", "", "/img/123.png");
        assert!(resolve(&dotted, &catalog, "https://site.com/").is_none());
    }

    #[test]
    fn absolutize_relative_paths() {
        assert_eq!(
            absolutize("https://site.com/counter/zeri", "/img/a.png"),
            "https://site.com/img/a.png"
        );
        assert_eq!(
            absolutize("https://site.com/counter/zeri", "img/a.png"),
            "https://site.com/counter/img/a.png"
        );
        assert_eq!(absolutize("not a url", "img/a.png"), "img/a.png");
    }
}
