use super::names::Candidate;
use super::{build_relation, Classification, ClassifyContext, Tier};
use crate::model::Category;

/// Tier C, last resort and low confidence: bucket by ordinal among all page images.
/// First 30% -> WeakAgainst, last 30% -> StrongAgainst, middle -> BestLaneCounters.
pub fn apply(
    prev: Classification,
    ctx: &ClassifyContext<'_>,
    unmatched: &[Candidate],
) -> Classification {
    let images: Vec<usize> = ctx.dom.find_all(&["img"]).iter().map(|n| n.id()).collect();
    let total = images.len();

    unmatched.iter().fold(prev, |acc, candidate| {
        let Some(ordinal) = images.iter().position(|&id| id == candidate.dom_position) else {
            return acc;
        };
        let category = bucket(ordinal, total);
        acc.with(
            category,
            build_relation(category, candidate, ctx.subject),
            Tier::Positional,
        )
    })
}

fn bucket(ordinal: usize, total: usize) -> Category {
    if ordinal * 10 < total * 3 {
        Category::WeakAgainst
    } else if ordinal * 10 >= total * 7 {
        Category::StrongAgainst
    } else {
        Category::BestLaneCounters
    }
}
