// src/services/db.rs
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use chrono::NaiveDate;
use csv::Reader;
use log::{info, warn};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::models::{ClientMortgage, RateQuote};
use crate::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateIgnored,
}

#[derive(Debug, Default)]
struct StoreState {
    // (date, term) is unique
    rates: BTreeMap<(NaiveDate, u32), RateQuote>,
    clients: HashMap<String, ClientMortgage>,
    target_states: HashMap<String, bool>,
}

/// In-process rate history and client book.
#[derive(Debug, Default)]
pub struct DbStore {
    state: RwLock<StoreState>,
}

#[derive(Debug, Deserialize)]
struct RateHistoryRow {
    rate_date: NaiveDate,
    term_years: u32,
    rate_value: f64,
}

impl DbStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_rate_quote(&self, quote: RateQuote) -> InsertOutcome {
        let mut state = self.state.write().await;
        let key = (quote.observed_date, quote.term_years);
        if state.rates.contains_key(&key) {
            return InsertOutcome::DuplicateIgnored;
        }
        state.rates.insert(key, quote);
        InsertOutcome::Inserted
    }

    pub async fn get_latest_rate_quote(&self, term_years: u32) -> Option<RateQuote> {
        let state = self.state.read().await;
        state
            .rates
            .values()
            .rev()
            .find(|q| q.term_years == term_years)
            .cloned()
    }

    /// All quotes observed on `date`, ordered by term.
    pub async fn rates_for_date(&self, date: NaiveDate) -> Vec<RateQuote> {
        let state = self.state.read().await;
        state
            .rates
            .range((date, 0)..=(date, u32::MAX))
            .map(|(_, q)| q.clone())
            .collect()
    }

    /// Latest quote for each term, ordered by term.
    pub async fn latest_rates(&self) -> Vec<RateQuote> {
        let state = self.state.read().await;
        let mut latest: BTreeMap<u32, RateQuote> = BTreeMap::new();
        for quote in state.rates.values() {
            latest.insert(quote.term_years, quote.clone());
        }
        latest.into_values().collect()
    }

    pub async fn rate_history(
        &self,
        term_years: u32,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Vec<RateQuote> {
        let state = self.state.read().await;
        state
            .rates
            .values()
            .filter(|q| q.term_years == term_years)
            .filter(|q| from.map_or(true, |d| q.observed_date >= d))
            .filter(|q| to.map_or(true, |d| q.observed_date <= d))
            .cloned()
            .collect()
    }

    pub async fn upsert_client(&self, client: ClientMortgage) {
        let mut state = self.state.write().await;
        state.clients.insert(client.client_id.clone(), client);
    }

    pub async fn get_client_mortgages(&self, broker_id: &str) -> Vec<ClientMortgage> {
        let state = self.state.read().await;
        let mut clients: Vec<ClientMortgage> = state
            .clients
            .values()
            .filter(|c| c.broker_id == broker_id)
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        clients
    }

    pub async fn last_target_state(&self, client_id: &str) -> Option<bool> {
        self.state.read().await.target_states.get(client_id).copied()
    }

    pub async fn record_target_state(&self, client_id: &str, is_target_met: bool) {
        let mut state = self.state.write().await;
        state.target_states.insert(client_id.to_string(), is_target_met);
    }

    /// Load `rate_date,term_years,rate_value` rows. Returns the number inserted.
    pub async fn load_rate_history<R: Read>(&self, reader: R) -> Result<usize, BoxError> {
        let mut rdr = Reader::from_reader(reader);
        let mut inserted = 0;
        for row in rdr.deserialize::<RateHistoryRow>() {
            let row = row?;
            let quote = RateQuote::fixed(row.rate_date, row.term_years, row.rate_value);
            match self.insert_rate_quote(quote).await {
                InsertOutcome::Inserted => inserted += 1,
                InsertOutcome::DuplicateIgnored => {
                    warn!("Skipping duplicate rate for {} ({}y)", row.rate_date, row.term_years);
                }
            }
        }
        info!("Loaded {} rate history rows", inserted);
        Ok(inserted)
    }

    /// Load client rows with the `ClientMortgage` field names as headers.
    pub async fn load_clients<R: Read>(&self, reader: R) -> Result<usize, BoxError> {
        let mut rdr = Reader::from_reader(reader);
        let mut loaded = 0;
        for row in rdr.deserialize::<ClientMortgage>() {
            self.upsert_client(row?).await;
            loaded += 1;
        }
        info!("Loaded {} clients", loaded);
        Ok(loaded)
    }
}
