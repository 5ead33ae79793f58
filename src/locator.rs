use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::dom::{DomIndex, NodeId, NodeRef, HEADING_TAGS};
use crate::model::{Category, ContentBlock, Heading, Portrait};

const IMG: &[&str] = &["img"];
const LAZY_SRC_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];
/// How far the locator climbs when a heading is wrapped in its own container.
const MAX_CLIMB: usize = 2;

#[derive(Debug, Clone)]
pub struct LocatedSection {
    pub heading: Heading,
    pub category: Category,
    pub block: ContentBlock,
}

/// Find category headings and the portrait block each one owns.
///
/// Output is in consumption order: StrongAgainst/BestLaneCounters before
/// WeakAgainst, shorter heading text first on ties, document order after that.
pub fn locate(dom: &DomIndex, catalog: &Catalog) -> Vec<LocatedSection> {
    let headings = dom.find_all(HEADING_TAGS);
    let heading_ids: Vec<NodeId> = headings.iter().map(|h| h.id()).collect();
    let mut sections = Vec::new();

    for h in &headings {
        let text = h.text();
        let Some(category) = catalog.match_heading(&text) else {
            continue;
        };

        let Some(container) = resolve_block(*h) else {
            warn!("No portrait block found after heading {:?}", text);
            continue;
        };

        let portraits = portraits_in(container);
        let Some(first) = portraits.first() else {
            continue;
        };

        if let Some(other) = intervening_heading(&heading_ids, h.id(), first.dom_position) {
            warn!(
                "Rejected block for {:?}: heading {:?} sits in between",
                text,
                dom.node(other).text()
            );
            continue;
        }

        debug!(
            "Heading {:?} -> {:?} ({} portraits)",
            text,
            category,
            portraits.len()
        );
        sections.push(LocatedSection {
            heading: Heading {
                text,
                dom_position: h.id(),
                matched_category: Some(category),
            },
            category,
            block: ContentBlock {
                nodes: vec![container.id()],
                portraits,
            },
        });
    }

    sections.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then_with(|| {
                a.heading
                    .text
                    .chars()
                    .count()
                    .cmp(&b.heading.text.chars().count())
            })
    });
    sections
}

/// Next sibling if it holds a portrait, else the first portrait-bearing sibling
/// before the next heading, else the same search from up to two wrapping ancestors.
fn resolve_block(heading: NodeRef<'_>) -> Option<NodeRef<'_>> {
    if let Some(found) = scan_siblings(heading) {
        return Some(found);
    }
    heading
        .ancestors()
        .take_while(|a| !a.is_tag(&["body", "html"]))
        .take(MAX_CLIMB)
        .find_map(scan_siblings)
}

fn scan_siblings(anchor: NodeRef<'_>) -> Option<NodeRef<'_>> {
    let siblings = anchor.next_element_siblings();
    let first = siblings.first()?;
    if first.has_tag(IMG) {
        return Some(*first);
    }
    siblings
        .into_iter()
        .take_while(|s| !s.has_tag(HEADING_TAGS))
        .find(|s| s.has_tag(IMG))
}

fn intervening_heading(heading_ids: &[NodeId], anchor: NodeId, target: NodeId) -> Option<NodeId> {
    heading_ids
        .iter()
        .copied()
        .find(|&id| id > anchor && id < target)
}

pub fn portraits_in(container: NodeRef<'_>) -> Vec<Portrait> {
    if container.is_tag(IMG) {
        return vec![portrait(container)];
    }
    container.find_all(IMG).into_iter().map(portrait).collect()
}

/// Every image on the page, in document order.
pub fn page_portraits(dom: &DomIndex) -> Vec<Portrait> {
    dom.find_all(IMG).into_iter().map(portrait).collect()
}

fn portrait(img: NodeRef<'_>) -> Portrait {
    let src = LAZY_SRC_ATTRS
        .iter()
        .filter_map(|a| img.attr(a))
        .map(str::trim)
        .find(|s| !s.is_empty() && !s.starts_with("data:"))
        .unwrap_or_default();
    Portrait {
        alt_text: img.attr("alt").unwrap_or_default().trim().to_string(),
        src_url: src.to_string(),
        title_text: img.attr("title").unwrap_or_default().trim().to_string(),
        dom_position: img.id(),
    }
}
