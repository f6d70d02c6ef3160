//! In-memory prediction store.
//!
//! Records are kept in timestamp order. With a capacity set, inserting past
//! the limit drops the oldest records first.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::models::PredictionRecord;
use super::PredictionStore;
use crate::drift::BaselineSnapshot;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    /// (timestamp, id) → record
    ordered: BTreeMap<(DateTime<Utc>, String), PredictionRecord>,
    /// id → timestamp, to find the ordered key
    index: HashMap<String, DateTime<Utc>>,
    capacity: Option<usize>,
    baseline: Option<BaselineSnapshot>,
}

impl StoreInner {
    fn insert(&mut self, record: &PredictionRecord) {
        if let Some(old_ts) = self.index.remove(&record.id) {
            self.ordered.remove(&(old_ts, record.id.clone()));
        }
        self.index.insert(record.id.clone(), record.timestamp);
        self.ordered
            .insert((record.timestamp, record.id.clone()), record.clone());

        if let Some(cap) = self.capacity {
            while self.ordered.len() > cap {
                match self.ordered.pop_first() {
                    Some(((_, id), _)) => {
                        self.index.remove(&id);
                    }
                    None => break,
                }
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.capacity = Some(capacity.max(1));
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.ordered.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PredictionStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<PredictionRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .index
            .get(id)
            .and_then(|ts| inner.ordered.get(&(*ts, id.to_string())))
            .cloned())
    }

    fn put(&self, record: &PredictionRecord) -> Result<()> {
        self.lock()?.insert(record);
        Ok(())
    }

    fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PredictionRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .ordered
            .values()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect())
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.lock()?;
        for id in ids {
            if let Some(ts) = inner.index.remove(id) {
                inner.ordered.remove(&(ts, id.clone()));
            }
        }
        Ok(())
    }

    fn get_baseline(&self) -> Result<Option<BaselineSnapshot>> {
        Ok(self.lock()?.baseline.clone())
    }

    fn put_baseline(&self, baseline: Option<&BaselineSnapshot>) -> Result<()> {
        self.lock()?.baseline = baseline.cloned();
        Ok(())
    }

    fn replace_all(
        &self,
        records: &[PredictionRecord],
        baseline: Option<&BaselineSnapshot>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ordered.clear();
        inner.index.clear();
        for record in records {
            inner.insert(record);
        }
        inner.baseline = baseline.cloned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MarketOdds, PredictionVector};
    use chrono::{Duration, TimeZone};

    fn record(id: &str, minutes: i64) -> PredictionRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        PredictionRecord::new(
            id,
            ts,
            "Home",
            "Away",
            "Serie A",
            PredictionVector::new(0.4, 0.3, 0.3, 0.5),
            MarketOdds::new(2.4, Some(3.2), 3.1),
        )
    }

    #[test]
    fn evicts_oldest_first() {
        let store = MemoryStore::with_capacity(2);
        store.put(&record("late", 30)).unwrap();
        store.put(&record("early", 0)).unwrap();
        store.put(&record("mid", 15)).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("early").unwrap().is_none());
        assert!(store.get("mid").unwrap().is_some());
        assert!(store.get("late").unwrap().is_some());
    }

    #[test]
    fn put_replaces_existing_id() {
        let store = MemoryStore::new();
        store.put(&record("a", 0)).unwrap();
        store.put(&record("a", 5)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().unwrap().timestamp, record("a", 5).timestamp);
    }

    #[test]
    fn range_filters_by_timestamp() {
        let store = MemoryStore::new();
        for (id, m) in [("a", 0), ("b", 10), ("c", 20)] {
            store.put(&record(id, m)).unwrap();
        }
        let got = store
            .range(record("x", 5).timestamp, record("x", 25).timestamp)
            .unwrap();
        let ids: Vec<&str> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn remove_and_replace_all() {
        let store = MemoryStore::new();
        for (id, m) in [("a", 0), ("b", 10), ("c", 20)] {
            store.put(&record(id, m)).unwrap();
        }
        store.remove(&["b".to_string()]).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("b").unwrap().is_none());

        store.replace_all(&[record("d", 30)], None).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("d").unwrap().is_some());
        assert_eq!(store.get_baseline().unwrap(), None);
    }
}
