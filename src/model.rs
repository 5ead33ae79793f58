use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dom::NodeId;

/// One fetched guide page. Lives for a single run.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Opponents that beat the subject.
    WeakAgainst,
    /// Opponents the subject beats.
    StrongAgainst,
    BestLaneCounters,
    WorstLaneCounters,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::WeakAgainst,
        Category::StrongAgainst,
        Category::BestLaneCounters,
        Category::WorstLaneCounters,
    ];

    /// Lower sorts first when locating sections.
    pub fn priority(self) -> u8 {
        match self {
            Category::StrongAgainst | Category::BestLaneCounters | Category::WorstLaneCounters => 0,
            Category::WeakAgainst => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::WeakAgainst => "weakAgainst",
            Category::StrongAgainst => "strongAgainst",
            Category::BestLaneCounters => "bestLaneCounters",
            Category::WorstLaneCounters => "worstLaneCounters",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Heading {
    pub text: String,
    pub dom_position: NodeId,
    pub matched_category: Option<Category>,
}

/// The container node the locator resolved for a heading, plus the portraits inside it.
#[derive(Debug, Clone)]
pub struct ContentBlock {
    pub nodes: Vec<NodeId>,
    pub portraits: Vec<Portrait>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portrait {
    pub alt_text: String,
    pub src_url: String,
    pub title_text: String,
    pub dom_position: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRelation {
    pub opponent_id: String,
    pub opponent_name: String,
    pub win_rate: f64,
    pub counter_rating: f64,
    pub game_count: u32,
    #[serde(rename = "goldDifferentialAt15")]
    pub gold_differential_at_15: f64,
    pub difficulty: String,
    pub tips: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Weaknesses,
    CounterItems,
    Strategies,
    AdditionalTips,
}

/// The four labeled free-text sections, already sanitized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSections {
    pub weaknesses: String,
    pub counter_items: String,
    pub strategies: String,
    pub additional_tips: String,
}

impl ContentSections {
    pub fn get(&self, topic: Topic) -> &str {
        match topic {
            Topic::Weaknesses => &self.weaknesses,
            Topic::CounterItems => &self.counter_items,
            Topic::Strategies => &self.strategies,
            Topic::AdditionalTips => &self.additional_tips,
        }
    }

    pub fn slot(&mut self, topic: Topic) -> &mut String {
        match topic {
            Topic::Weaknesses => &mut self.weaknesses,
            Topic::CounterItems => &mut self.counter_items,
            Topic::Strategies => &mut self.strategies,
            Topic::AdditionalTips => &mut self.additional_tips,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    pub subject_id: String,
    pub subject_name: String,
    pub role: String,
    pub patch: String,
    pub rank: String,
    pub region: String,
    pub weak_against: Vec<CounterRelation>,
    pub strong_against: Vec<CounterRelation>,
    pub best_lane_counters: Vec<CounterRelation>,
    pub worst_lane_counters: Vec<CounterRelation>,
    pub weaknesses_content: String,
    pub counter_items_content: String,
    pub strategies_content: String,
    pub additional_tips_content: String,
    pub additional_data: serde_json::Value,
    pub errors: Vec<String>,
}

impl CounterRecord {
    pub fn relation_count(&self) -> usize {
        self.weak_against.len()
            + self.strong_against.len()
            + self.best_lane_counters.len()
            + self.worst_lane_counters.len()
    }

    pub fn list(&self, category: Category) -> &[CounterRelation] {
        match category {
            Category::WeakAgainst => &self.weak_against,
            Category::StrongAgainst => &self.strong_against,
            Category::BestLaneCounters => &self.best_lane_counters,
            Category::WorstLaneCounters => &self.worst_lane_counters,
        }
    }
}

/// Lower-case ASCII alphanumerics only: `Kai'Sa` -> `kaisa`, `Dr. Mundo` -> `drmundo`.
pub fn normalize_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
