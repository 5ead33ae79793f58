//! Three-tier relation classifier.
//!
//! Each tier takes the classification so far by value and returns the next
//! one: structural (located heading blocks), then contextual (keyword context
//! around every page portrait) only when structural found no WeakAgainst
//! entries, then positional for whatever contextual could not place.

pub mod contextual;
pub mod names;
pub mod positional;
pub mod structural;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::dom::DomIndex;
use crate::locator::LocatedSection;
use crate::model::{Category, CounterRelation};
use names::Candidate;

/// Read-only inputs every tier needs.
#[derive(Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub dom: &'a DomIndex,
    pub catalog: &'a Catalog,
    pub subject: &'a str,
    pub page_url: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub structural: usize,
    pub contextual: usize,
    pub positional: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Structural,
    Contextual,
    Positional,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub weak_against: Vec<CounterRelation>,
    pub strong_against: Vec<CounterRelation>,
    pub best_lane_counters: Vec<CounterRelation>,
    pub worst_lane_counters: Vec<CounterRelation>,
    pub tiers: TierCounts,
}

impl Classification {
    pub fn list(&self, category: Category) -> &[CounterRelation] {
        match category {
            Category::WeakAgainst => &self.weak_against,
            Category::StrongAgainst => &self.strong_against,
            Category::BestLaneCounters => &self.best_lane_counters,
            Category::WorstLaneCounters => &self.worst_lane_counters,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<CounterRelation> {
        match category {
            Category::WeakAgainst => &mut self.weak_against,
            Category::StrongAgainst => &mut self.strong_against,
            Category::BestLaneCounters => &mut self.best_lane_counters,
            Category::WorstLaneCounters => &mut self.worst_lane_counters,
        }
    }

    /// Names are unique within one category only; the same opponent may sit in several.
    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.list(category).iter().any(|r| r.opponent_name == name)
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.list(*c).is_empty())
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.list(*c).len()).sum()
    }

    /// Add a relation unless the name is already in that category's list.
    pub fn with(mut self, category: Category, relation: CounterRelation, tier: Tier) -> Self {
        if self.contains(category, &relation.opponent_name) {
            debug!(
                "Duplicate {} in {:?}, skipped",
                relation.opponent_name, category
            );
            return self;
        }
        self.list_mut(category).push(relation);
        match tier {
            Tier::Structural => self.tiers.structural += 1,
            Tier::Contextual => self.tiers.contextual += 1,
            Tier::Positional => self.tiers.positional += 1,
        }
        self
    }

    /// WeakAgainst by descending win rate, StrongAgainst ascending. Stable.
    pub fn sorted(mut self) -> Self {
        self.weak_against
            .sort_by(|a, b| b.win_rate.total_cmp(&a.win_rate));
        self.strong_against
            .sort_by(|a, b| a.win_rate.total_cmp(&b.win_rate));
        self
    }
}

/// Run all tiers over a parsed page.
pub fn classify(ctx: &ClassifyContext<'_>, sections: &[LocatedSection]) -> Classification {
    let structural = structural::apply(Classification::default(), ctx, sections);

    let result = if structural.weak_against.is_empty() {
        warn!(
            "Structural detection found no WeakAgainst entries for {}, falling back to context",
            ctx.subject
        );
        let outcome = contextual::apply(structural, ctx);
        if !outcome.unmatched.is_empty() {
            warn!(
                "{} portraits without context cues, classifying by position (low confidence)",
                outcome.unmatched.len()
            );
        }
        positional::apply(outcome.classification, ctx, &outcome.unmatched)
    } else {
        structural
    };

    if result.is_empty() {
        warn!("No relations found for {}", ctx.subject);
    } else {
        info!(
            "Classified {} relations for {} (structural {}, contextual {}, positional {})",
            result.len(),
            ctx.subject,
            result.tiers.structural,
            result.tiers.contextual,
            result.tiers.positional
        );
    }
    result.sorted()
}

/// Synthetic stats: the guide pages carry no numbers, only membership.
pub fn build_relation(category: Category, candidate: &Candidate, subject: &str) -> CounterRelation {
    CounterRelation {
        opponent_id: candidate.opponent_id.clone(),
        opponent_name: candidate.name.clone(),
        win_rate: 50.0,
        counter_rating: 5.0,
        game_count: 100,
        gold_differential_at_15: 0.0,
        difficulty: "Medium".to_string(),
        tips: tips_for(category, &candidate.name, subject),
        image_url: candidate.image_url.clone(),
    }
}

fn tips_for(category: Category, opponent: &str, subject: &str) -> String {
    match category {
        Category::WeakAgainst => format!(
            "{opponent} counters {subject}. Respect their damage windows and avoid extended trades."
        ),
        Category::StrongAgainst => format!(
            "{subject} is favored against {opponent}. Look for aggressive trades and punish mistakes."
        ),
        Category::BestLaneCounters => format!(
            "{opponent} wins the early laning phase against {subject}. Farm safely and play for scaling."
        ),
        Category::WorstLaneCounters => format!(
            "{opponent} struggles in lane against {subject}. Pressure early to build a lead."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::locate;

    fn names(list: &[CounterRelation]) -> Vec<&str> {
        list.iter().map(|r| r.opponent_name.as_str()).collect()
    }

    fn run(html: &str) -> Classification {
        let dom = DomIndex::parse(html);
        let catalog = Catalog::default();
        let ctx = ClassifyContext {
            dom: &dom,
            catalog: &catalog,
            subject: "Zeri",
            page_url: "https://site.com/counter/zeri",
        };
        let sections = locate(&dom, &catalog);
        classify(&ctx, &sections)
    }

    fn relation(name: &str, win_rate: f64) -> CounterRelation {
        let candidate = Candidate {
            opponent_id: name.to_lowercase(),
            name: name.into(),
            image_url: String::new(),
            dom_position: 0,
        };
        CounterRelation {
            win_rate,
            ..build_relation(Category::WeakAgainst, &candidate, "Zeri")
        }
    }

    #[test]
    fn zeri_example_end_to_end() {
        let html = std::fs::read_to_string("tests/fixtures/zeri.html").unwrap();
        let result = run(&html);
        assert_eq!(names(&result.weak_against), vec!["Caitlyn", "Jinx"]);
        assert_eq!(names(&result.strong_against), vec!["Vayne"]);
        assert!(result.best_lane_counters.is_empty());
        assert_eq!(result.tiers.contextual + result.tiers.positional, 0);
    }

    #[test]
    fn n_sections_fill_n_lists_structurally() {
        let html = r#"<body>
            <h2>Weak against</h2><div><img alt="Jinx" src="j.png"><img alt="Ashe" src="a.png"></div>
            <h2>Strong against</h2><div><img alt="Vayne" src="v.png"></div>
            <h2>Best lane counters</h2><div><img alt="Draven" src="d.png"><img alt="Lucian" src="l.png"><img alt="Sivir" src="s.png"></div>
        </body>"#;
        let result = run(html);
        assert_eq!(result.weak_against.len(), 2);
        assert_eq!(result.strong_against.len(), 1);
        assert_eq!(result.best_lane_counters.len(), 3);
        assert!(result.worst_lane_counters.is_empty());
        assert_eq!(
            result.tiers,
            TierCounts {
                structural: 6,
                contextual: 0,
                positional: 0
            }
        );
    }

    #[test]
    fn missing_weak_block_triggers_context_even_with_other_sections() {
        let html = r#"<body>
            <h2>Strong against</h2><div class="grid"><img alt="Vayne" src="v.png"></div>
            <section>
                <div class="card"><img alt="Jinx" src="j.png"><span>Jinx khắc chế Zeri</span></div>
                <div class="card"><img alt="Ashe" src="a.png"><span>Ashe yếu hơn Zeri</span></div>
            </section>
        </body>"#;
        let result = run(html);
        assert_eq!(result.tiers.structural, 1);
        assert!(result.tiers.contextual > 0);
        assert!(result.contains(Category::StrongAgainst, "Vayne"));
        assert!(result.contains(Category::StrongAgainst, "Ashe"));
        assert!(result.contains(Category::WeakAgainst, "Jinx"));
    }

    #[test]
    fn cross_category_duplicates_are_kept() {
        let html = r#"<body>
            <h2>Weak against</h2><div><img alt="Jinx" src="j.png"></div>
            <h2>Strong against</h2><div><img alt="Jinx" src="j.png"></div>
        </body>"#;
        let result = run(html);
        assert_eq!(names(&result.weak_against), vec!["Jinx"]);
        assert_eq!(names(&result.strong_against), vec!["Jinx"]);
    }

    #[test]
    fn empty_page_is_not_an_error() {
        let result = run("<html><body><p>Nothing to see</p></body></html>");
        assert!(result.is_empty());
        assert_eq!(result.tiers, TierCounts::default());
    }

    #[test]
    fn with_dedups_per_category() {
        let c = Classification::default()
            .with(Category::WeakAgainst, relation("Jinx", 50.0), Tier::Structural)
            .with(Category::WeakAgainst, relation("Jinx", 50.0), Tier::Structural)
            .with(Category::StrongAgainst, relation("Jinx", 50.0), Tier::Contextual);
        assert_eq!(c.weak_against.len(), 1);
        assert_eq!(c.strong_against.len(), 1);
        assert_eq!(c.tiers.structural, 1);
        assert_eq!(c.tiers.contextual, 1);
    }

    #[test]
    fn sort_orders() {
        let mut c = Classification::default();
        for (n, w) in [("A", 48.0), ("B", 55.0), ("C", 51.0)] {
            c = c
                .with(Category::WeakAgainst, relation(n, w), Tier::Structural)
                .with(Category::StrongAgainst, relation(n, w), Tier::Structural);
        }
        let c = c.sorted();
        let weak: Vec<f64> = c.weak_against.iter().map(|r| r.win_rate).collect();
        let strong: Vec<f64> = c.strong_against.iter().map(|r| r.win_rate).collect();
        assert!(weak.windows(2).all(|w| w[0] >= w[1]));
        assert!(strong.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn tips_mention_both_sides() {
        let rel = relation("Jinx", 50.0);
        assert!(rel.tips.contains("Jinx"));
        assert!(rel.tips.contains("Zeri"));
        assert_eq!(rel.difficulty, "Medium");
        assert_eq!(rel.game_count, 100);
    }
}
