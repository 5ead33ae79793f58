use tracing::debug;

use super::names;
use super::{build_relation, Classification, ClassifyContext, Tier};
use crate::locator::LocatedSection;

/// Tier A: portraits inside located heading blocks.
///
/// Sections arrive in consumption order; once a category has entries, later
/// sections for the same category are ignored.
pub fn apply(
    prev: Classification,
    ctx: &ClassifyContext<'_>,
    sections: &[LocatedSection],
) -> Classification {
    let mut next = prev;
    for section in sections {
        if !next.list(section.category).is_empty() {
            debug!(
                "Skipping {:?} section {:?}: category already filled",
                section.heading.matched_category, section.heading.text
            );
            continue;
        }
        debug!(
            "Reading {:?} block {:?} under heading at node {}",
            section.category, section.block.nodes, section.heading.dom_position
        );
        for portrait in &section.block.portraits {
            let Some(candidate) = names::resolve(portrait, ctx.catalog, ctx.page_url) else {
                continue;
            };
            let relation = build_relation(section.category, &candidate, ctx.subject);
            next = next.with(section.category, relation, Tier::Structural);
        }
    }
    next
}
