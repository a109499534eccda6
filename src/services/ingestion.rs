// src/services/ingestion.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::models::RateQuote;
use super::db::{DbStore, InsertOutcome};
use super::error::{RateError, RateResult};
use super::rate_parser::{self, is_plausible_rate};
use super::rate_source::DocumentSource;

const EXPECTED_TERMS: [u32; 3] = [15, 20, 30];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateFreshness {
    /// Fetched and parsed during this call.
    Fresh,
    /// Served from the in-memory cache within its TTL.
    Cached,
    /// Today's quotes were already in the store.
    Stored,
    /// Fetch failed; last known good quotes.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentRates {
    pub quotes: Vec<RateQuote>,
    pub freshness: RateFreshness,
    pub as_of: DateTime<Utc>,
}

impl CurrentRates {
    pub fn for_term(&self, term_years: u32) -> Option<&RateQuote> {
        self.quotes.iter().find(|q| q.term_years == term_years)
    }
}

#[derive(Debug, Clone)]
struct CachedRates {
    quotes: Vec<RateQuote>,
    fetched_at: Instant,
    as_of: DateTime<Utc>,
}

/// Calendar date in New York, where the rate source publishes.
pub fn new_york_today() -> NaiveDate {
    Utc::now().with_timezone(&New_York).date_naive()
}

#[derive(Debug, Default)]
struct CacheState {
    rates: Option<CachedRates>,
    // When the last fetch cycle gave up, and why
    last_failure: Option<(Instant, RateError)>,
}

/// Fetches, parses and persists market rates. Holds the rate cache; the
/// cache lock is held for the whole fetch so only one runs at a time.
pub struct RateIngestor<S: DocumentSource> {
    source: S,
    store: Arc<DbStore>,
    ttl: Duration,
    retry_attempts: u32,
    retry_base_delay: Duration,
    cache: Mutex<CacheState>,
}

impl<S: DocumentSource> RateIngestor<S> {
    pub fn new(source: S, store: Arc<DbStore>, ttl: Duration, retry_attempts: u32, retry_base_delay: Duration) -> Self {
        Self {
            source,
            store,
            ttl,
            retry_attempts,
            retry_base_delay,
            cache: Mutex::new(CacheState::default()),
        }
    }

    pub fn from_config(source: S, store: Arc<DbStore>, config: &AppConfig) -> Self {
        Self::new(source, store, config.cache_ttl, config.retry_attempts, config.retry_base_delay)
    }

    pub fn store(&self) -> &Arc<DbStore> {
        &self.store
    }

    pub async fn clear_cache(&self) {
        *self.cache.lock().await = CacheState::default();
        info!("Rate cache cleared");
    }

    pub async fn current_rates(&self, force: bool) -> RateResult<CurrentRates> {
        self.current_rates_on(force, new_york_today()).await
    }

    pub async fn current_rates_on(&self, force: bool, today: NaiveDate) -> RateResult<CurrentRates> {
        let requested_at = Instant::now();
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.rates.as_ref() {
            // Another caller refreshed while this one waited for the lock
            if cached.fetched_at >= requested_at {
                debug!("Using rates fetched by a concurrent request");
                return Ok(cached_rates(cached));
            }
            if !force && cached.fetched_at.elapsed() < self.ttl {
                debug!("Using cached rates, age {:?}", cached.fetched_at.elapsed());
                return Ok(cached_rates(cached));
            }
        }

        // A concurrent fetch cycle already failed while this one waited
        if let Some((failed_at, err)) = cache.last_failure.as_ref() {
            if *failed_at >= requested_at {
                debug!("Concurrent fetch failed, skipping straight to fallback");
                let err = err.clone();
                return self.fallback(cache.rates.as_ref(), err).await;
            }
        }

        if !force {
            let stored = self.store.rates_for_date(today).await;
            if EXPECTED_TERMS.iter().all(|t| stored.iter().any(|q| q.term_years == *t)) {
                info!("Returning existing rates for {}", today);
                let entry = CachedRates {
                    quotes: stored,
                    fetched_at: Instant::now(),
                    as_of: Utc::now(),
                };
                let rates = CurrentRates {
                    quotes: entry.quotes.clone(),
                    freshness: RateFreshness::Stored,
                    as_of: entry.as_of,
                };
                cache.rates = Some(entry);
                return Ok(rates);
            }
        }

        match self.fetch_with_retry(today).await {
            Ok(quotes) => {
                self.persist(&quotes).await;
                let entry = CachedRates {
                    quotes,
                    fetched_at: Instant::now(),
                    as_of: Utc::now(),
                };
                let rates = CurrentRates {
                    quotes: entry.quotes.clone(),
                    freshness: RateFreshness::Fresh,
                    as_of: entry.as_of,
                };
                cache.rates = Some(entry);
                cache.last_failure = None;
                Ok(rates)
            }
            Err(e) => {
                error!("Failed to fetch rates: {}", e);
                cache.last_failure = Some((Instant::now(), e.clone()));
                self.fallback(cache.rates.as_ref(), e).await
            }
        }
    }

    /// Last known good quotes after a failed fetch: the expired cache, else
    /// the newest persisted quote per term.
    async fn fallback(&self, cached: Option<&CachedRates>, err: RateError) -> RateResult<CurrentRates> {
        if let Some(cached) = cached {
            warn!("Using expired cache after fetch failure, age {:?}", cached.fetched_at.elapsed());
            return Ok(CurrentRates {
                quotes: cached.quotes.clone(),
                freshness: RateFreshness::Stale,
                as_of: cached.as_of,
            });
        }

        let persisted = self.store.latest_rates().await;
        let newest = persisted.iter().map(|q| q.observed_date).max();
        match newest.and_then(|d| d.and_hms_opt(0, 0, 0)) {
            Some(observed) => {
                warn!("Using last persisted quotes after fetch failure");
                Ok(CurrentRates {
                    quotes: persisted,
                    freshness: RateFreshness::Stale,
                    as_of: observed.and_utc(),
                })
            }
            None => Err(err),
        }
    }

    async fn fetch_once(&self, today: NaiveDate) -> RateResult<Vec<RateQuote>> {
        let document = self
            .source
            .fetch_document()
            .await
            .map_err(|e| RateError::extraction(format!("rate page unavailable: {}", e)))?;
        let quotes = rate_parser::parse(&document, today)?;

        let (valid, rejected): (Vec<RateQuote>, Vec<RateQuote>) =
            quotes.into_iter().partition(|q| is_plausible_rate(q.rate_percent));
        for q in &rejected {
            warn!("Dropping implausible {}-year rate {}", q.term_years, q.rate_percent);
        }
        Ok(valid)
    }

    async fn fetch_with_retry(&self, today: NaiveDate) -> RateResult<Vec<RateQuote>> {
        let mut attempt = 0;
        loop {
            info!("Starting rate fetch attempt {}", attempt + 1);
            match self.fetch_once(today).await {
                Ok(quotes) => {
                    info!("Successfully fetched {} rates", quotes.len());
                    return Ok(quotes);
                }
                Err(e) if attempt < self.retry_attempts => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
                    warn!("Fetch attempt {} failed ({}), retrying in {:?}", attempt + 1, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn persist(&self, quotes: &[RateQuote]) {
        for quote in quotes {
            match self.store.insert_rate_quote(quote.clone()).await {
                InsertOutcome::Inserted => {
                    debug!("Stored {}-year rate for {}", quote.term_years, quote.observed_date);
                }
                InsertOutcome::DuplicateIgnored => {
                    debug!("Rate for {} ({}y) already stored", quote.observed_date, quote.term_years);
                }
            }
        }
    }
}

fn cached_rates(cached: &CachedRates) -> CurrentRates {
    CurrentRates {
        quotes: cached.quotes.clone(),
        freshness: RateFreshness::Cached,
        as_of: cached.as_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const PAGE: &str = r#"<div class="current-mtg-rate"><div class="rate">7.000%</div></div>"#;

    struct ScriptedSource {
        responses: StdMutex<VecDeque<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            let responses = responses
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect();
            Self {
                responses: StdMutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DocumentSource for ScriptedSource {
        async fn fetch_document(&self) -> Result<String, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers queue up behind the cache lock
            tokio::time::sleep(Duration::from_millis(5)).await;
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(page)) => Ok(page),
                Some(Err(e)) => Err(e.into()),
                None => Err("no more responses".into()),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()
    }

    fn ingestor(source: ScriptedSource, ttl: Duration, retries: u32) -> RateIngestor<ScriptedSource> {
        RateIngestor::new(source, Arc::new(DbStore::new()), ttl, retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fetch_persists_and_caches() {
        let ing = ingestor(ScriptedSource::new(vec![Ok(PAGE)]), Duration::from_secs(60), 0);

        let first = ing.current_rates_on(false, today()).await.unwrap();
        assert_eq!(first.freshness, RateFreshness::Fresh);
        assert_eq!(first.for_term(15).unwrap().rate_percent, 6.375);
        assert_eq!(ing.store().rates_for_date(today()).await.len(), 3);

        let second = ing.current_rates_on(false, today()).await.unwrap();
        assert_eq!(second.freshness, RateFreshness::Cached);
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stored_rates_skip_fetch() {
        let ing = ingestor(ScriptedSource::new(vec![]), Duration::from_secs(60), 0);
        for q in rate_parser::derive_quotes(today(), 6.9) {
            ing.store().insert_rate_quote(q).await;
        }
        let rates = ing.current_rates_on(false, today()).await.unwrap();
        assert_eq!(rates.freshness, RateFreshness::Stored);
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let source = ScriptedSource::new(vec![Err("timeout"), Ok("<html>maintenance</html>"), Ok(PAGE)]);
        let ing = ingestor(source, Duration::from_secs(60), 3);
        let rates = ing.current_rates_on(true, today()).await.unwrap();
        assert_eq!(rates.freshness, RateFreshness::Fresh);
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_serves_stale_cache() {
        let source = ScriptedSource::new(vec![Ok(PAGE), Err("down")]);
        let ing = ingestor(source, Duration::from_secs(60), 0);
        ing.current_rates_on(false, today()).await.unwrap();

        let rates = ing.current_rates_on(true, today()).await.unwrap();
        assert_eq!(rates.freshness, RateFreshness::Stale);
        assert_eq!(rates.for_term(30).unwrap().rate_percent, 7.0);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_store_then_errors() {
        let ing = ingestor(ScriptedSource::new(vec![Err("down"), Err("down")]), Duration::from_secs(60), 0);
        let err = ing.current_rates_on(false, today()).await.unwrap_err();
        assert!(matches!(err, RateError::ExtractionFailed(_)));

        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        ing.store().insert_rate_quote(RateQuote::fixed(yesterday, 30, 6.8)).await;
        let rates = ing.current_rates_on(false, today()).await.unwrap();
        assert_eq!(rates.freshness, RateFreshness::Stale);
        assert_eq!(rates.quotes[0].observed_date, yesterday);
        assert_eq!(rates.as_of.date_naive(), yesterday);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failed_cycle() {
        let failures = vec![Err("down"); 40];
        let ing = Arc::new(ingestor(ScriptedSource::new(failures), Duration::from_secs(60), 3));
        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        ing.store().insert_rate_quote(RateQuote::fixed(yesterday, 30, 6.8)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ing = ing.clone();
            handles.push(tokio::spawn(async move { ing.current_rates_on(false, today()).await }));
        }
        for handle in handles {
            let rates = handle.await.unwrap().unwrap();
            assert_eq!(rates.freshness, RateFreshness::Stale);
            assert_eq!(rates.for_term(30).unwrap().rate_percent, 6.8);
        }
        // One cycle: the first attempt plus three retries
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 4);

        // A later caller starts a new cycle
        ing.current_rates_on(false, today()).await.unwrap();
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let source = ScriptedSource::new(vec![Ok(PAGE), Ok(PAGE)]);
        let ing = ingestor(source, Duration::from_secs(60), 0);
        let tomorrow = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();

        ing.current_rates_on(false, today()).await.unwrap();
        assert_eq!(ing.current_rates_on(false, tomorrow).await.unwrap().freshness, RateFreshness::Cached);

        ing.clear_cache().await;
        let rates = ing.current_rates_on(false, tomorrow).await.unwrap();
        assert_eq!(rates.freshness, RateFreshness::Fresh);
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let ing = Arc::new(ingestor(ScriptedSource::new(vec![Ok(PAGE)]), Duration::from_secs(60), 0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ing = ing.clone();
            handles.push(tokio::spawn(async move { ing.current_rates_on(true, today()).await }));
        }
        for handle in handles {
            let rates = handle.await.unwrap().unwrap();
            assert_eq!(rates.for_term(30).unwrap().rate_percent, 7.0);
        }
        assert_eq!(ing.source.calls.load(Ordering::SeqCst), 1);
    }
}
