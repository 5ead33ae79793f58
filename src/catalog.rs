use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{normalize_id, Category, Topic};

/// Immutable lookup tables shared by the locator, classifier and segmenter.
///
/// Built once (default or from JSON) and passed by reference; nothing in the
/// pipeline mutates it, so alternate catalogs can be swapped in per test.
#[derive(Debug, Clone)]
pub struct Catalog {
    phrases: Vec<(String, Category)>,
    context_keywords: Vec<(String, Category)>,
    topics: Vec<(Topic, Vec<String>)>,
    characters: Vec<String>,
    by_id: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    phrases: Vec<(String, Category)>,
    #[serde(default)]
    context_keywords: Vec<(String, Category)>,
    #[serde(default)]
    topics: Vec<(Topic, Vec<String>)>,
    characters: Vec<String>,
}

impl Catalog {
    pub fn new(
        phrases: Vec<(String, Category)>,
        context_keywords: Vec<(String, Category)>,
        topics: Vec<(Topic, Vec<String>)>,
        characters: Vec<String>,
    ) -> Self {
        let lower = |v: Vec<(String, Category)>| -> Vec<(String, Category)> {
            v.into_iter().map(|(p, c)| (p.to_lowercase(), c)).collect()
        };
        let topics = topics
            .into_iter()
            .map(|(t, kws)| (t, kws.into_iter().map(|k| k.to_lowercase()).collect()))
            .collect();
        let by_id = characters
            .iter()
            .enumerate()
            .map(|(i, name)| (normalize_id(name), i))
            .filter(|(id, _)| !id.is_empty())
            .collect();

        Catalog {
            phrases: lower(phrases),
            context_keywords: lower(context_keywords),
            topics,
            characters,
            by_id,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {:?}", path))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid catalog JSON in {:?}", path))?;
        let defaults = Catalog::default();
        let context = if file.context_keywords.is_empty() {
            defaults.context_keywords
        } else {
            file.context_keywords
        };
        let topics = if file.topics.is_empty() {
            defaults.topics
        } else {
            file.topics
        };
        Ok(Catalog::new(file.phrases, context, topics, file.characters))
    }

    /// First phrase contained in the lower-cased heading wins.
    pub fn match_heading(&self, heading: &str) -> Option<Category> {
        first_hit(&self.phrases, heading)
    }

    pub fn classify_context(&self, context: &str) -> Option<Category> {
        first_hit(&self.context_keywords, context)
    }

    pub fn topic_for(&self, heading: &str) -> Option<Topic> {
        let lower = heading.to_lowercase();
        self.topics
            .iter()
            .find(|(_, kws)| kws.iter().any(|k| lower.contains(k.as_str())))
            .map(|(t, _)| *t)
    }

    pub fn topic_keywords(&self, topic: Topic) -> &[String] {
        self.topics
            .iter()
            .find(|(t, _)| *t == topic)
            .map(|(_, kws)| kws.as_slice())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.topics.iter().map(|(t, _)| *t)
    }

    /// Headings worth keeping in the whole-page display fragment.
    pub fn is_relevant_heading(&self, heading: &str) -> bool {
        self.topic_for(heading).is_some() || self.match_heading(heading).is_some()
    }

    /// Resolve a candidate (alt text, title, file stem) to a catalog display name.
    ///
    /// Exact normalized match first, then the longest identifier spelled by a run
    /// of whole adjacent tokens (`Caitlyn_0`, `viktor splash`), never a fragment
    /// of one (`ajax-loader` is not Jax). Identifiers shorter than 3 characters
    /// only match exactly.
    pub fn lookup(&self, candidate: &str) -> Option<&str> {
        let norm = normalize_id(candidate);
        if norm.is_empty() {
            return None;
        }
        if let Some(&i) = self.by_id.get(&norm) {
            return Some(&self.characters[i]);
        }

        let tokens: Vec<String> = candidate
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        let mut best: Option<(&str, usize)> = None;
        for start in 0..tokens.len() {
            let mut run = String::new();
            for token in &tokens[start..] {
                run.push_str(token);
                if run.len() < 3 {
                    continue;
                }
                let Some((id, &i)) = self.by_id.get_key_value(&run) else {
                    continue;
                };
                let better = match best {
                    None => true,
                    Some((b, _)) => id.len() > b.len() || (id.len() == b.len() && id.as_str() < b),
                };
                if better {
                    best = Some((id.as_str(), i));
                }
            }
        }
        best.map(|(_, i)| self.characters[i].as_str())
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }
}

fn first_hit(table: &[(String, Category)], text: &str) -> Option<Category> {
    let lower = text.to_lowercase();
    table
        .iter()
        .find(|(p, _)| lower.contains(p.as_str()))
        .map(|(_, c)| *c)
}

fn owned(pairs: &[(&str, Category)]) -> Vec<(String, Category)> {
    pairs.iter().map(|(p, c)| (p.to_string(), *c)).collect()
}

impl Default for Catalog {
    fn default() -> Self {
        use Category::*;

        // lane phrases must precede the generic "khắc chế"
        let phrases = owned(&[
            ("best lane counter", BestLaneCounters),
            ("lane counter", BestLaneCounters),
            ("early game", BestLaneCounters),
            ("giai đoạn đi đường", BestLaneCounters),
            ("đi đường", BestLaneCounters),
            ("đầu trận", BestLaneCounters),
            ("yếu hơn", StrongAgainst),
            ("weaker than", StrongAgainst),
            ("strong against", StrongAgainst),
            ("good against", StrongAgainst),
            ("bị khắc chế", WeakAgainst),
            ("weak against", WeakAgainst),
            ("countered by", WeakAgainst),
            ("counters to", WeakAgainst),
            ("khắc chế", WeakAgainst),
            ("counter", WeakAgainst),
        ]);

        let context_keywords = owned(&[
            ("đi đường", BestLaneCounters),
            ("đầu trận", BestLaneCounters),
            ("early game", BestLaneCounters),
            ("wins lane", BestLaneCounters),
            ("lane counter", BestLaneCounters),
            ("yếu hơn", StrongAgainst),
            ("weaker", StrongAgainst),
            ("easy matchup", StrongAgainst),
            ("dễ đối đầu", StrongAgainst),
            ("khắc chế", WeakAgainst),
            ("mạnh hơn", WeakAgainst),
            ("counter", WeakAgainst),
            ("stronger", WeakAgainst),
            ("hard matchup", WeakAgainst),
        ]);

        let kws = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        let topics = vec![
            (
                Topic::CounterItems,
                kws(&["trang bị khắc chế", "counter item", "trang bị", "items"]),
            ),
            (Topic::Weaknesses, kws(&["điểm yếu", "weakness"])),
            (
                Topic::Strategies,
                kws(&[
                    "chiến thuật",
                    "cách chơi",
                    "cách khắc chế",
                    "strategy",
                    "how to counter",
                    "how to beat",
                ]),
            ),
            (Topic::AdditionalTips, kws(&["mẹo", "lưu ý", "tips"])),
        ];

        let characters = CHAMPIONS.iter().map(|c| c.to_string()).collect();
        Catalog::new(phrases, context_keywords, topics, characters)
    }
}

const CHAMPIONS: &[&str] = &[
    "Aatrox", "Ahri", "Akali", "Akshan", "Alistar", "Ambessa", "Amumu", "Anivia", "Annie",
    "Aphelios", "Ashe", "Aurelion Sol", "Aurora", "Azir", "Bard", "Bel'Veth", "Blitzcrank",
    "Brand", "Braum", "Briar", "Caitlyn", "Camille", "Cassiopeia", "Cho'Gath", "Corki",
    "Darius", "Diana", "Dr. Mundo", "Draven", "Ekko", "Elise", "Evelynn", "Ezreal",
    "Fiddlesticks", "Fiora", "Fizz", "Galio", "Gangplank", "Garen", "Gnar", "Gragas", "Graves",
    "Gwen", "Hecarim", "Heimerdinger", "Hwei", "Illaoi", "Irelia", "Ivern", "Janna",
    "Jarvan IV", "Jax", "Jayce", "Jhin", "Jinx", "K'Sante", "Kai'Sa", "Kalista", "Karma",
    "Karthus", "Kassadin", "Katarina", "Kayle", "Kayn", "Kennen", "Kha'Zix", "Kindred", "Kled",
    "Kog'Maw", "LeBlanc", "Lee Sin", "Leona", "Lillia", "Lissandra", "Lucian", "Lulu", "Lux",
    "Malphite", "Malzahar", "Maokai", "Master Yi", "Mel", "Milio", "Miss Fortune", "Mordekaiser",
    "Morgana", "Naafiri", "Nami", "Nasus", "Nautilus", "Neeko", "Nidalee", "Nilah", "Nocturne",
    "Nunu", "Olaf", "Orianna", "Ornn", "Pantheon", "Poppy", "Pyke", "Qiyana", "Quinn", "Rakan",
    "Rammus", "Rek'Sai", "Rell", "Renata Glasc", "Renekton", "Rengar", "Riven", "Rumble",
    "Ryze", "Samira", "Sejuani", "Senna", "Seraphine", "Sett", "Shaco", "Shen", "Shyvana",
    "Singed", "Sion", "Sivir", "Skarner", "Smolder", "Sona", "Soraka", "Swain", "Sylas",
    "Syndra", "Tahm Kench", "Taliyah", "Talon", "Taric", "Teemo", "Thresh", "Tristana",
    "Trundle", "Tryndamere", "Twisted Fate", "Twitch", "Udyr", "Urgot", "Varus", "Vayne",
    "Veigar", "Vel'Koz", "Vex", "Vi", "Viego", "Viktor", "Vladimir", "Volibear", "Warwick",
    "Wukong", "Xayah", "Xerath", "Xin Zhao", "Yasuo", "Yone", "Yorick", "Yunara", "Yuumi", "Zac",
    "Zed", "Zeri", "Ziggs", "Zilean", "Zoe", "Zyra",
];
