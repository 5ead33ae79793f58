use tracing::debug;

use super::names::{self, Candidate};
use super::{build_relation, Classification, ClassifyContext, Tier};
use crate::dom::NodeRef;
use crate::locator::page_portraits;
use crate::model::{normalize_id, Category};

const MAX_ANCESTOR_LEVELS: usize = 3;

pub struct ContextOutcome {
    pub classification: Classification,
    /// Known characters whose surroundings carried no keyword.
    pub unmatched: Vec<Candidate>,
}

/// Tier B: classify every known portrait on the page by the text around it.
pub fn apply(prev: Classification, ctx: &ClassifyContext<'_>) -> ContextOutcome {
    let mut next = prev;
    let mut unmatched = Vec::new();
    let subject_id = normalize_id(ctx.subject);

    for portrait in page_portraits(ctx.dom) {
        let Some(candidate) = names::resolve(&portrait, ctx.catalog, ctx.page_url) else {
            continue;
        };
        // the subject's own header portrait sits next to the page's own keywords
        if candidate.opponent_id == subject_id {
            debug!("Skipping portrait of the subject {}", candidate.name);
            continue;
        }
        let node = ctx.dom.node(portrait.dom_position);
        match classify_surroundings(node, ctx) {
            Some(category) => {
                debug!("Context places {} in {:?}", candidate.name, category);
                let relation = build_relation(category, &candidate, ctx.subject);
                next = next.with(category, relation, Tier::Contextual);
            }
            None => unmatched.push(candidate),
        }
    }

    ContextOutcome {
        classification: next,
        unmatched,
    }
}

/// Widen the context one level at a time (the image's siblings, then up to three
/// ancestors) and stop at the first level whose accumulated text hits a keyword.
fn classify_surroundings(img: NodeRef<'_>, ctx: &ClassifyContext<'_>) -> Option<Category> {
    let mut context = sibling_text(img);
    if let Some(category) = ctx.catalog.classify_context(&context) {
        return Some(category);
    }

    for ancestor in img
        .ancestors()
        .take_while(|a| !a.is_tag(&["body", "html"]))
        .take(MAX_ANCESTOR_LEVELS)
    {
        context.push(' ');
        context.push_str(&ancestor.text());
        if let Some(category) = ctx.catalog.classify_context(&context) {
            return Some(category);
        }
    }
    None
}

fn sibling_text(node: NodeRef<'_>) -> String {
    let prev = node.prev_element_siblings().into_iter().next();
    let next = node.next_element_siblings().into_iter().next();
    [prev, next]
        .into_iter()
        .flatten()
        .map(|s| s.text())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::dom::DomIndex;

    fn contextual(html: &str) -> ContextOutcome {
        let dom = DomIndex::parse(html);
        let catalog = Catalog::default();
        let ctx = ClassifyContext {
            dom: &dom,
            catalog: &catalog,
            subject: "Zeri",
            page_url: "https://site.com/counter/zeri",
        };
        apply(Classification::default(), &ctx)
    }

    #[test]
    fn keywords_near_portraits() {
        let out = contextual(
            r#"<body>
            <div class="card"><img alt="Jinx" src="/j.png"><span>Jinx khắc chế Zeri</span></div>
            <div class="card"><img alt="Vayne" src="/v.png"><span>Vayne yếu hơn Zeri</span></div>
            <div class="card"><img alt="Draven" src="/d.png"><span>Mạnh ở giai đoạn đi đường</span></div>
            <div class="card"><img alt="Ashe" src="/a.png"><span>Ashe</span></div>
            </body>"#,
        );
        let c = &out.classification;
        assert_eq!(c.weak_against[0].opponent_name, "Jinx");
        assert_eq!(c.strong_against[0].opponent_name, "Vayne");
        assert_eq!(c.best_lane_counters[0].opponent_name, "Draven");
        assert_eq!(c.tiers.contextual, 3);
        assert_eq!(out.unmatched.len(), 1);
        assert_eq!(out.unmatched[0].name, "Ashe");
    }

    #[test]
    fn subject_portrait_is_skipped() {
        let out = contextual(
            r#"<body>
            <header><img alt="Zeri" src="/zeri.png"><h1>Khắc chế Zeri</h1></header>
            <div class="card"><img alt="Jinx" src="/j.png"><span>Jinx khắc chế Zeri</span></div>
            </body>"#,
        );
        let names: Vec<_> = out
            .classification
            .weak_against
            .iter()
            .map(|r| r.opponent_name.as_str())
            .collect();
        assert_eq!(names, vec!["Jinx"]);
        assert!(out.unmatched.iter().all(|c| c.name != "Zeri"));
    }

    #[test]
    fn ui_images_are_not_read_as_characters() {
        let out = contextual(
            r#"<body>
            <div><img src="/static/ajax-loader.gif"><span>Top counter picks loading</span></div>
            <div><img src="/img/optimized-banner.png" alt=""><span>hard matchup</span></div>
            </body>"#,
        );
        assert!(out.classification.is_empty());
        assert!(out.unmatched.is_empty());
    }

    #[test]
    fn ancestor_text_counts() {
        let out = contextual(
            r#"<body><section><p>Những tướng counter Zeri</p>
            <div><div><img alt="Caitlyn" src="/c.png"></div></div></section></body>"#,
        );
        assert_eq!(out.classification.weak_against.len(), 1);
        assert!(out.unmatched.is_empty());
    }

    #[test]
    fn keeps_existing_entries_and_dedups() {
        let dom = DomIndex::parse(
            r#"<body><div><img alt="Jinx" src="/j.png"><span>khắc chế</span></div></body>"#,
        );
        let catalog = Catalog::default();
        let ctx = ClassifyContext {
            dom: &dom,
            catalog: &catalog,
            subject: "Zeri",
            page_url: "https://site.com/counter/zeri",
        };
        let candidate = Candidate {
            opponent_id: "jinx".into(),
            name: "Jinx".into(),
            image_url: String::new(),
            dom_position: 0,
        };
        let prev = Classification::default().with(
            Category::WeakAgainst,
            build_relation(Category::WeakAgainst, &candidate, "Zeri"),
            Tier::Structural,
        );
        let out = apply(prev, &ctx);
        assert_eq!(out.classification.weak_against.len(), 1);
        assert_eq!(out.classification.tiers.contextual, 0);
    }
}
