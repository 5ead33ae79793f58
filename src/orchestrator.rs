use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::classifier::{classify, Classification, ClassifyContext, TierCounts};
use crate::dom::DomIndex;
use crate::error::{AttemptError, ExtractError, StoreError};
use crate::fetcher::{page_url, Fetcher};
use crate::locator::locate;
use crate::model::{normalize_id, ContentSections, CounterRecord, RawPage};
use crate::segmenter::{formatted_content, segment};
use crate::settings::Settings;

/// Where finished records go. Uniqueness on
/// `(subject_id, role, patch, rank, region)` is the store's responsibility.
pub trait Repository {
    fn create(&self, record: &CounterRecord) -> Result<(), StoreError>;
    fn find(&self, filter: &RecordFilter) -> Result<Vec<CounterRecord>, StoreError>;
}

/// Any field left `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub subject_id: Option<String>,
    pub role: Option<String>,
    pub patch: Option<String>,
    pub rank: Option<String>,
    pub region: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_backoff: Duration::from_secs(settings.backoff_base_secs),
        }
    }

    /// Wait after the failed attempt with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Parsing,
    Persisting,
    Retrying,
    Done,
    Failed,
}

fn enter(state: &mut RunState, next: RunState, subject: &str) {
    debug!("{}: {:?} -> {:?}", subject, state, next);
    *state = next;
}

/// Identity of one run after defaults are applied.
struct RunKey<'a> {
    subject: &'a str,
    role: &'a str,
    patch: &'a str,
    rank: &'a str,
}

/// Everything pulled out of one page, before it becomes a record.
pub struct Analysis {
    pub classification: Classification,
    pub sections: ContentSections,
    pub formatted: String,
}

/// Parse, locate, classify and segment a fetched page. Never fails: an empty
/// analysis is a valid outcome.
pub fn analyze(page: &RawPage, subject: &str, catalog: &Catalog) -> Analysis {
    let dom = DomIndex::parse(&page.html);
    debug!("Parsed {} into {} nodes", page.url, dom.len());

    let located = locate(&dom, catalog);
    let ctx = ClassifyContext {
        dom: &dom,
        catalog,
        subject,
        page_url: &page.url,
    };
    Analysis {
        classification: classify(&ctx, &located),
        sections: segment(&dom, catalog),
        formatted: formatted_content(&dom, catalog),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub stored: usize,
    /// Stored, but no relation was found on the page.
    pub empty: usize,
    pub exhausted: usize,
    pub conflicts: usize,
}

pub struct Extractor<F, R> {
    fetcher: F,
    repo: R,
    catalog: Catalog,
    base_url: String,
    region: String,
    default_patch: String,
    default_rank: String,
    retry: RetryPolicy,
    batch_delay: Duration,
}

impl<F: Fetcher, R: Repository> Extractor<F, R> {
    pub fn new(fetcher: F, repo: R, catalog: Catalog, settings: &Settings) -> Self {
        Self {
            fetcher,
            repo,
            catalog,
            base_url: settings.base_url.clone(),
            region: settings.region.clone(),
            default_patch: settings.default_patch.clone(),
            default_rank: settings.default_rank.clone(),
            retry: RetryPolicy::from_settings(settings),
            batch_delay: settings.batch_delay(),
        }
    }

    #[cfg(test)]
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// One extraction run. Always yields a record unless the store reports a
    /// duplicate key; network and storage failures are retried from the fetch,
    /// and exhaustion produces an empty record carrying every attempt's error.
    pub async fn run(
        &self,
        subject: &str,
        role: &str,
        patch: Option<&str>,
        rank: Option<&str>,
    ) -> Result<CounterRecord, ExtractError> {
        let key = RunKey {
            subject: subject.trim(),
            role,
            patch: patch.unwrap_or(&self.default_patch),
            rank: rank.unwrap_or(&self.default_rank),
        };
        let url = page_url(&self.base_url, key.subject);
        let attempts = self.retry.attempts();
        let mut state = RunState::Idle;
        let mut errors: Vec<String> = Vec::new();

        info!("Extracting {} ({}) from {}", key.subject, key.role, url);

        for attempt in 0..attempts {
            enter(&mut state, RunState::Fetching, key.subject);
            match self.attempt(&key, &url, attempt + 1, &errors, &mut state).await {
                Ok(record) => {
                    enter(&mut state, RunState::Done, key.subject);
                    info!(
                        "Stored {} ({}): {} relations after {} attempt(s)",
                        record.subject_name,
                        record.role,
                        record.relation_count(),
                        attempt + 1
                    );
                    return Ok(record);
                }
                Err(AttemptError::Store(e @ StoreError::DuplicateKey { .. })) => {
                    enter(&mut state, RunState::Failed, key.subject);
                    warn!("{}", e);
                    return Err(ExtractError::PersistenceConflict(e));
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        attempts,
                        key.subject,
                        e
                    );
                    errors.push(format!("attempt {}: {}", attempt + 1, e));
                    if attempt + 1 < attempts {
                        enter(&mut state, RunState::Retrying, key.subject);
                        let backoff = self.retry.backoff(attempt);
                        warn!(
                            "Retrying {} in {:.1}s",
                            key.subject,
                            backoff.as_secs_f64()
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        enter(&mut state, RunState::Failed, key.subject);
        warn!(
            "Giving up on {} after {} attempts, returning empty record",
            key.subject, attempts
        );
        Ok(self.empty_record(&key, &url, errors))
    }

    async fn attempt(
        &self,
        key: &RunKey<'_>,
        url: &str,
        attempt_no: u32,
        prior_errors: &[String],
        state: &mut RunState,
    ) -> Result<CounterRecord, AttemptError> {
        let page = self.fetcher.fetch(url).await?;

        enter(state, RunState::Parsing, key.subject);
        let analysis = analyze(&page, key.subject, &self.catalog);
        let record = self.build_record(key, &page, analysis, attempt_no, prior_errors.to_vec());

        enter(state, RunState::Persisting, key.subject);
        self.repo.create(&record)?;
        Ok(record)
    }

    fn subject_name(&self, subject: &str) -> String {
        self.catalog
            .lookup(subject)
            .filter(|name| normalize_id(name) == normalize_id(subject))
            .unwrap_or(subject)
            .to_string()
    }

    fn build_record(
        &self,
        key: &RunKey<'_>,
        page: &RawPage,
        analysis: Analysis,
        attempt_no: u32,
        errors: Vec<String>,
    ) -> CounterRecord {
        let Analysis {
            classification,
            sections,
            formatted,
        } = analysis;
        CounterRecord {
            subject_id: normalize_id(key.subject),
            subject_name: self.subject_name(key.subject),
            role: key.role.to_string(),
            patch: key.patch.to_string(),
            rank: key.rank.to_string(),
            region: self.region.clone(),
            weak_against: classification.weak_against,
            strong_against: classification.strong_against,
            best_lane_counters: classification.best_lane_counters,
            worst_lane_counters: classification.worst_lane_counters,
            weaknesses_content: sections.weaknesses,
            counter_items_content: sections.counter_items,
            strategies_content: sections.strategies,
            additional_tips_content: sections.additional_tips,
            additional_data: json!({
                "sourceUrl": page.url,
                "fetchedAt": page.fetched_at.to_rfc3339(),
                "attempts": attempt_no,
                "tiers": classification.tiers,
                "formattedContent": formatted,
            }),
            errors,
        }
    }

    fn empty_record(&self, key: &RunKey<'_>, url: &str, errors: Vec<String>) -> CounterRecord {
        CounterRecord {
            subject_id: normalize_id(key.subject),
            subject_name: self.subject_name(key.subject),
            role: key.role.to_string(),
            patch: key.patch.to_string(),
            rank: key.rank.to_string(),
            region: self.region.clone(),
            weak_against: Vec::new(),
            strong_against: Vec::new(),
            best_lane_counters: Vec::new(),
            worst_lane_counters: Vec::new(),
            weaknesses_content: String::new(),
            counter_items_content: String::new(),
            strategies_content: String::new(),
            additional_tips_content: String::new(),
            additional_data: json!({
                "sourceUrl": url,
                "attempts": self.retry.attempts(),
                "tiers": TierCounts::default(),
            }),
            errors,
        }
    }

    /// A successful run carries at most `max_retries` errors; an exhausted one carries one per attempt.
    pub fn is_exhausted(&self, record: &CounterRecord) -> bool {
        record.errors.len() > self.retry.max_retries as usize
    }

    /// Sequential runs with a politeness delay between them. A duplicate key
    /// is counted and skipped, never fatal for the batch.
    pub async fn run_batch(
        &self,
        subjects: &[String],
        role: &str,
        patch: Option<&str>,
        rank: Option<&str>,
    ) -> Result<BatchSummary> {
        let pb = ProgressBar::new(subjects.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        let mut summary = BatchSummary::default();
        for (i, subject) in subjects.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            pb.set_message(subject.clone());

            match self.run(subject, role, patch, rank).await {
                Ok(record) if self.is_exhausted(&record) => summary.exhausted += 1,
                Ok(record) => {
                    summary.stored += 1;
                    if record.relation_count() == 0 {
                        summary.empty += 1;
                    }
                }
                Err(e) => {
                    warn!("Skipping {}: {}", subject, e);
                    summary.conflicts += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "Batch done: {} stored ({} empty), {} exhausted, {} conflicts",
            summary.stored, summary.empty, summary.exhausted, summary.conflicts
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::error::FetchError;

    /// Fails the first `failures` calls, then serves `html`.
    struct StubFetcher {
        failures: usize,
        calls: AtomicUsize,
        html: String,
    }

    impl StubFetcher {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                html: std::fs::read_to_string("tests/fixtures/zeri.html").unwrap(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                });
            }
            Ok(RawPage {
                url: url.to_string(),
                html: self.html.clone(),
                fetched_at: Utc::now(),
            })
        }
    }

    fn matches(filter: &RecordFilter, record: &CounterRecord) -> bool {
        let eq = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);
        eq(&filter.subject_id, &record.subject_id)
            && eq(&filter.role, &record.role)
            && eq(&filter.patch, &record.patch)
            && eq(&filter.rank, &record.rank)
            && eq(&filter.region, &record.region)
    }

    #[derive(Default)]
    struct MemoryRepo {
        records: Mutex<Vec<CounterRecord>>,
        backend_failures: AtomicUsize,
    }

    impl Repository for MemoryRepo {
        fn create(&self, record: &CounterRecord) -> Result<(), StoreError> {
            let pending = self.backend_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.backend_failures.store(pending - 1, Ordering::SeqCst);
                return Err(StoreError::Backend(rusqlite::Error::InvalidQuery));
            }
            let mut records = self.records.lock().unwrap();
            let key = RecordFilter {
                subject_id: Some(record.subject_id.clone()),
                role: Some(record.role.clone()),
                patch: Some(record.patch.clone()),
                rank: Some(record.rank.clone()),
                region: Some(record.region.clone()),
                limit: None,
            };
            if records.iter().any(|r| matches(&key, r)) {
                return Err(StoreError::DuplicateKey {
                    key: record.subject_id.clone(),
                });
            }
            records.push(record.clone());
            Ok(())
        }

        fn find(&self, filter: &RecordFilter) -> Result<Vec<CounterRecord>, StoreError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .rev()
                .filter(|r| matches(filter, r))
                .take(filter.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect())
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            backoff_base_secs: 0,
            batch_delay_ms: 0,
            ..Settings::default()
        }
    }

    fn extractor(fetcher: StubFetcher, repo: MemoryRepo) -> Extractor<StubFetcher, MemoryRepo> {
        Extractor::new(fetcher, repo, Catalog::default(), &fast_settings())
    }

    fn names(list: &[crate::model::CounterRelation]) -> Vec<&str> {
        list.iter().map(|r| r.opponent_name.as_str()).collect()
    }

    #[tokio::test]
    async fn recovers_after_two_failures() {
        let ex = extractor(StubFetcher::new(2), MemoryRepo::default());
        let record = ex.run("Zeri", "adc", None, None).await.unwrap();

        assert_eq!(record.errors.len(), 2);
        assert_eq!(names(&record.weak_against), vec!["Caitlyn", "Jinx"]);
        assert_eq!(names(&record.strong_against), vec!["Vayne"]);
        assert!(record.best_lane_counters.is_empty());
        assert_eq!(record.additional_data["attempts"], 3);
        assert_eq!(ex.fetcher.calls(), 3);
        assert!(!ex.is_exhausted(&record));

        let stored = ex.repository().find(&RecordFilter::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].patch, "latest");
        assert_eq!(stored[0].rank, "all");
    }

    #[tokio::test]
    async fn exhaustion_returns_empty_record() {
        let ex = extractor(StubFetcher::new(usize::MAX), MemoryRepo::default());
        let record = ex.run("Zeri", "adc", Some("14.10"), None).await.unwrap();

        assert_eq!(record.errors.len(), 4);
        assert_eq!(record.relation_count(), 0);
        assert!(record.weaknesses_content.is_empty());
        assert_eq!(record.subject_id, "zeri");
        assert_eq!(record.patch, "14.10");
        assert_eq!(ex.fetcher.calls(), 4);
        assert!(ex.is_exhausted(&record));
        assert!(ex.repository().find(&RecordFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_key_is_surfaced_without_retry() {
        let ex = extractor(StubFetcher::new(0), MemoryRepo::default());
        ex.run("Zeri", "adc", None, None).await.unwrap();

        let err = ex.run("Zeri", "adc", None, None).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::PersistenceConflict(StoreError::DuplicateKey { .. })
        ));
        assert_eq!(ex.fetcher.calls(), 2);

        // other roles are distinct keys
        assert!(ex.run("Zeri", "mid", None, None).await.is_ok());
    }

    #[tokio::test]
    async fn backend_failure_restarts_from_fetch() {
        let repo = MemoryRepo::default();
        repo.backend_failures.store(1, Ordering::SeqCst);
        let ex = extractor(StubFetcher::new(0), repo);

        let record = ex.run("Zeri", "adc", None, None).await.unwrap();
        assert_eq!(record.errors.len(), 1);
        assert_eq!(ex.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn record_carries_content_and_metadata() {
        let ex = extractor(StubFetcher::new(0), MemoryRepo::default());
        let record = ex.run("zeri", "adc", None, None).await.unwrap();

        assert_eq!(record.subject_name, "Zeri");
        assert_eq!(record.region, "World");
        assert!(record.counter_items_content.contains("Giáp Gai"));
        assert!(record.errors.is_empty());
        let data = &record.additional_data;
        assert_eq!(data["sourceUrl"], "https://www.counterstats.net/counter/zeri");
        assert!(data["fetchedAt"].is_string());
        assert_eq!(data["tiers"]["structural"], 3);
        assert!(data["formattedContent"]
            .as_str()
            .unwrap()
            .contains("Tướng khắc chế Zeri"));
    }

    #[tokio::test]
    async fn batch_counts_conflicts_and_keeps_going() {
        let ex = extractor(StubFetcher::new(0), MemoryRepo::default());
        let subjects: Vec<String> = ["Zeri", "Jinx", "Zeri"].iter().map(|s| s.to_string()).collect();

        let summary = ex.run_batch(&subjects, "adc", None, None).await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                stored: 2,
                empty: 0,
                exhausted: 0,
                conflicts: 1
            }
        );
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.attempts(), 4);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        // large retry counts saturate instead of overflowing
        assert!(policy.backoff(40) >= policy.backoff(31));
        assert_eq!(policy.backoff(64), Duration::from_secs(u32::MAX as u64));
    }
}
