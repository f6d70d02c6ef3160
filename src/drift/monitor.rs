use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::metrics::RollingMetrics;
use crate::alerts::Notifier;
use crate::db::models::{BetOutcome, Outcome, PredictionRecord};
use crate::db::PredictionStore;
use crate::error::{EngineError, Result};

// ── Policy ──

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftSeverity::None => "none",
            DriftSeverity::Low => "low",
            DriftSeverity::Medium => "medium",
            DriftSeverity::High => "high",
            DriftSeverity::Critical => "critical",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            DriftSeverity::None => "Model performance is stable; no action needed",
            DriftSeverity::Low => "Minor movement in performance; keep monitoring",
            DriftSeverity::Medium => "Performance is degrading; review recent predictions and reduce stakes",
            DriftSeverity::High => "Significant drift; cut stakes sharply and schedule retraining",
            DriftSeverity::Critical => "Model is no longer reliable; stop betting and retrain before resuming",
        }
    }
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cut-offs turning a drift magnitude into a level 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub minor: f64,
    pub moderate: f64,
    pub severe: f64,
}

impl LevelThresholds {
    pub fn level(&self, drift: f64) -> u8 {
        if drift >= self.severe {
            3
        } else if drift >= self.moderate {
            2
        } else if drift >= self.minor {
            1
        } else {
            0
        }
    }
}

/// Drift magnitudes are oriented so that positive means worse: accuracy and
/// ROI drops, Brier increases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriftThresholds {
    pub accuracy: LevelThresholds,
    pub brier: LevelThresholds,
    pub roi: LevelThresholds,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            accuracy: LevelThresholds {
                minor: 0.03,
                moderate: 0.07,
                severe: 0.12,
            },
            brier: LevelThresholds {
                minor: 0.01,
                moderate: 0.03,
                severe: 0.06,
            },
            roi: LevelThresholds {
                minor: 0.05,
                moderate: 0.15,
                severe: 0.30,
            },
        }
    }
}

impl DriftThresholds {
    /// Combine per-metric levels. Critical needs a real accuracy loss and a
    /// calibration loss at the same time.
    pub fn classify(&self, drift: &DriftMetrics) -> DriftSeverity {
        let acc = self.accuracy.level(drift.accuracy_drift);
        let brier = self.brier.level(drift.brier_drift);
        let roi = self.roi.level(drift.roi_drift);

        if acc >= 2 && brier >= 2 {
            DriftSeverity::Critical
        } else if acc >= 3 || brier >= 3 || (acc >= 2 && (brier >= 1 || roi >= 2)) {
            DriftSeverity::High
        } else if acc >= 2 || brier >= 2 || roi >= 3 || (acc >= 1 && brier >= 1) {
            DriftSeverity::Medium
        } else if acc >= 1 || brier >= 1 || roi >= 1 {
            DriftSeverity::Low
        } else {
            DriftSeverity::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriftConfig {
    /// Log capacity
    pub max_records: usize,
    /// Records older than this relative to the newest one are evicted
    pub max_age_days: i64,
    /// Settled predictions frozen into the baseline
    pub baseline_sample_size: usize,
    /// Most recent settled predictions compared against the baseline
    pub recent_window: usize,
    /// Minimum recent settled predictions before drift is scored
    pub min_samples: usize,
    /// Lowest severity handed to the notifier
    pub alert_severity: DriftSeverity,
    pub thresholds: DriftThresholds,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            max_records: 1000,
            max_age_days: 90,
            baseline_sample_size: 50,
            recent_window: 50,
            min_samples: 30,
            alert_severity: DriftSeverity::High,
            thresholds: DriftThresholds::default(),
        }
    }
}

impl DriftConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(EngineError::invalid("max_records must be at least 1"));
        }
        if self.max_age_days <= 0 {
            return Err(EngineError::invalid("max_age_days must be positive"));
        }
        if self.baseline_sample_size == 0 || self.recent_window == 0 {
            return Err(EngineError::invalid(
                "baseline_sample_size and recent_window must be at least 1",
            ));
        }
        if self.min_samples > self.recent_window {
            return Err(EngineError::invalid(format!(
                "min_samples ({}) cannot exceed recent_window ({})",
                self.min_samples, self.recent_window
            )));
        }
        if self.baseline_sample_size < self.min_samples {
            return Err(EngineError::invalid(format!(
                "baseline_sample_size ({}) cannot be below min_samples ({})",
                self.baseline_sample_size, self.min_samples
            )));
        }
        Ok(())
    }
}

// ── Reports ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftMetrics {
    /// Baseline accuracy minus recent accuracy
    pub accuracy_drift: f64,
    /// Recent Brier score minus baseline Brier score
    pub brier_drift: f64,
    /// Baseline ROI minus recent ROI; 0 unless both windows carry bets
    pub roi_drift: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub drift_detected: bool,
    pub severity: DriftSeverity,
    pub recommendation: String,
    pub metrics: DriftMetrics,
    pub sufficient_data: bool,
    /// Why drift could not be scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub baseline_samples: usize,
    pub recent_samples: usize,
    pub alert_delivered: bool,
}

/// Frozen reference performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineSnapshot {
    pub created_at: DateTime<Utc>,
    pub sample_ids: Vec<String>,
    pub metrics: RollingMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub predictions: Vec<PredictionRecord>,
    pub baseline: Option<BaselineSnapshot>,
}

// ── Monitor ──

#[derive(Default)]
struct MonitorState {
    /// Ordered by prediction timestamp
    log: VecDeque<PredictionRecord>,
    baseline: Option<BaselineSnapshot>,
}

/// Rolling log of predictions and their outcomes, scored against a frozen
/// baseline.
///
/// All methods take `&self`; state sits behind one mutex so the monitor can
/// be shared across request handlers. Writes go through to the optional
/// store before the in-memory log changes.
pub struct DriftMonitor {
    config: DriftConfig,
    state: Mutex<MonitorState>,
    store: Option<Arc<dyn PredictionStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig) -> Self {
        DriftMonitor {
            config,
            state: Mutex::new(MonitorState::default()),
            store: None,
            notifier: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PredictionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Rebuild a monitor from the store. The stored baseline is kept as is;
    /// a new one is frozen only when none was stored. Rows that fall outside
    /// the window are deleted from the store.
    pub fn restore(config: DriftConfig, store: Arc<dyn PredictionStore>) -> Result<Self> {
        config.validate()?;
        let records = store.range(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)?;
        let baseline = store.get_baseline()?;
        let loaded = records.len();
        let monitor = DriftMonitor::new(config).with_store(store);
        {
            let mut state = monitor.lock()?;
            state.log = records.into_iter().collect();
            state.log.make_contiguous().sort_by_key(|r| r.timestamp);
            let evicted = monitor.evict(&mut state);
            monitor.prune(&evicted)?;
            state.baseline = baseline;
            monitor.maybe_freeze_baseline(&mut state)?;
            info!(
                "Restored drift monitor with {} of {} stored prediction(s), baseline {}",
                state.log.len(),
                loaded,
                if state.baseline.is_some() { "frozen" } else { "pending" }
            );
        }
        Ok(monitor)
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, MonitorState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Storage("drift monitor mutex poisoned".into()))
    }

    fn persist(&self, record: &PredictionRecord) -> Result<()> {
        if let Some(store) = &self.store {
            store.put(record)?;
        }
        Ok(())
    }

    fn persist_baseline(&self, baseline: Option<&BaselineSnapshot>) -> Result<()> {
        if let Some(store) = &self.store {
            store.put_baseline(baseline)?;
        }
        Ok(())
    }

    /// Delete evicted records from the store.
    fn prune(&self, ids: &[String]) -> Result<()> {
        match &self.store {
            Some(store) if !ids.is_empty() => Ok(store.remove(ids)?),
            _ => Ok(()),
        }
    }

    /// Add an unsettled prediction to the log.
    pub fn track_prediction(&self, record: PredictionRecord) -> Result<()> {
        record.validate()?;
        let mut state = self.lock()?;
        if state.log.iter().any(|r| r.id == record.id) {
            return Err(EngineError::invalid(format!(
                "Prediction {} is already tracked",
                record.id
            )));
        }
        self.persist(&record)?;

        debug!("Tracking prediction {} ({})", record.id, record.matchup);
        let at = state.log.partition_point(|r| r.timestamp <= record.timestamp);
        state.log.insert(at, record);
        let evicted = self.evict(&mut state);
        if let Err(e) = self.prune(&evicted) {
            // restore drops them on the next start
            warn!("Evicted predictions could not be removed from the store: {}", e);
        }
        Ok(())
    }

    /// Settle a tracked prediction now.
    pub fn update_outcome(
        &self,
        id: &str,
        actual: Outcome,
        bet_outcome: Option<BetOutcome>,
        bet_profit: Option<f64>,
    ) -> Result<PredictionRecord> {
        self.update_outcome_at(id, actual, bet_outcome, bet_profit, Utc::now())
    }

    /// Settle a tracked prediction with an explicit settlement time.
    pub fn update_outcome_at(
        &self,
        id: &str,
        actual: Outcome,
        bet_outcome: Option<BetOutcome>,
        bet_profit: Option<f64>,
        settled_at: DateTime<Utc>,
    ) -> Result<PredictionRecord> {
        let mut state = self.lock()?;
        let idx = state
            .log
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| EngineError::invalid(format!("Unknown prediction id {}", id)))?;

        let mut settled = state.log[idx].clone();
        settled.settle(actual, bet_outcome, bet_profit, settled_at)?;
        self.persist(&settled)?;

        debug!(
            "Settled {}: actual={} correct={:?} profit={:?}",
            settled.id, actual, settled.correct, settled.bet_profit
        );
        state.log[idx] = settled.clone();
        self.maybe_freeze_baseline(&mut state)?;
        Ok(settled)
    }

    /// Metrics over every record in the window.
    pub fn get_metrics(&self) -> Result<RollingMetrics> {
        let state = self.lock()?;
        Ok(RollingMetrics::compute(&state.log))
    }

    pub fn baseline(&self) -> Result<Option<BaselineSnapshot>> {
        Ok(self.lock()?.baseline.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compare recent performance against the baseline.
    ///
    /// Never fails: missing data is reported on the result and notifier
    /// errors are only logged.
    pub fn detect_drift(&self) -> DriftReport {
        let mut report = match self.lock() {
            Ok(state) => self.score(&state),
            Err(e) => insufficient(format!("{}", e), 0, 0),
        };

        if report.sufficient_data && report.severity >= self.config.alert_severity {
            if let Some(notifier) = &self.notifier {
                match notifier.notify(&report) {
                    Ok(()) => report.alert_delivered = true,
                    Err(e) => warn!("Drift alert could not be delivered: {:#}", e),
                }
            }
        }
        report
    }

    fn score(&self, state: &MonitorState) -> DriftReport {
        let Some(baseline) = &state.baseline else {
            let settled = state.log.iter().filter(|r| r.is_settled()).count();
            return insufficient(
                format!(
                    "Baseline not established: {} of {} settled predictions",
                    settled, self.config.baseline_sample_size
                ),
                0,
                0,
            );
        };

        let in_baseline: HashSet<&str> = baseline.sample_ids.iter().map(String::as_str).collect();
        let recent: Vec<&PredictionRecord> = state
            .log
            .iter()
            .rev()
            .filter(|r| r.is_settled() && !in_baseline.contains(r.id.as_str()))
            .take(self.config.recent_window)
            .collect();
        let baseline_samples = baseline.sample_ids.len();

        if recent.len() < self.config.min_samples {
            return insufficient(
                format!(
                    "Need {} recent settled predictions outside the baseline, have {}",
                    self.config.min_samples,
                    recent.len()
                ),
                baseline_samples,
                recent.len(),
            );
        }

        let now = RollingMetrics::compute(recent.iter().copied());
        let base = &baseline.metrics;
        let roi_drift = if base.total_staked > 0.0 && now.total_staked > 0.0 {
            base.roi - now.roi
        } else {
            0.0
        };
        let metrics = DriftMetrics {
            accuracy_drift: base.accuracy - now.accuracy,
            brier_drift: now.brier_score - base.brier_score,
            roi_drift,
        };
        let severity = self.config.thresholds.classify(&metrics);

        if severity >= DriftSeverity::Medium {
            warn!(
                "Model drift {}: accuracy {:.3} → {:.3}, brier {:.4} → {:.4}",
                severity, base.accuracy, now.accuracy, base.brier_score, now.brier_score
            );
        } else {
            debug!("Drift check: severity {}", severity);
        }

        DriftReport {
            drift_detected: severity >= DriftSeverity::Medium,
            severity,
            recommendation: severity.recommendation().to_string(),
            metrics,
            sufficient_data: true,
            reason: None,
            baseline_samples,
            recent_samples: recent.len(),
            alert_delivered: false,
        }
    }

    /// Drop the current baseline and re-freeze it from the latest settled
    /// predictions, if there are enough of them.
    pub fn reset_baseline(&self) -> Result<Option<BaselineSnapshot>> {
        let mut state = self.lock()?;
        let baseline = freeze(&state.log, self.config.baseline_sample_size, true);
        self.persist_baseline(baseline.as_ref())?;
        state.baseline = baseline;
        match &state.baseline {
            Some(b) => info!("Baseline reset to the latest {} predictions", b.sample_ids.len()),
            None => info!("Baseline cleared; waiting for more settled predictions"),
        }
        Ok(state.baseline.clone())
    }

    pub fn export_data(&self) -> Result<ExportData> {
        let state = self.lock()?;
        Ok(ExportData {
            predictions: state.log.iter().cloned().collect(),
            baseline: state.baseline.clone(),
        })
    }

    /// Replace the monitor's state with an export.
    ///
    /// Every record is checked before anything changes. With a store, its
    /// contents are swapped for the imported window in one step.
    pub fn import_data(&self, data: ExportData) -> Result<()> {
        let mut seen = HashSet::new();
        for record in &data.predictions {
            record.validate_fields()?;
            if !seen.insert(record.id.as_str()) {
                return Err(EngineError::invalid(format!(
                    "Duplicate prediction id {} in import",
                    record.id
                )));
            }
        }

        let mut next = MonitorState {
            log: data.predictions.into_iter().collect(),
            baseline: data.baseline,
        };
        next.log.make_contiguous().sort_by_key(|r| r.timestamp);
        self.evict(&mut next);
        if next.baseline.is_none() {
            next.baseline = self.freeze_initial(&next.log);
        }

        let mut state = self.lock()?;
        if let Some(store) = &self.store {
            store.replace_all(next.log.make_contiguous(), next.baseline.as_ref())?;
        }
        *state = next;
        info!("Imported {} prediction(s)", state.log.len());
        Ok(())
    }

    /// Apply the capacity and age limits; returns the ids dropped.
    fn evict(&self, state: &mut MonitorState) -> Vec<String> {
        let mut evicted = Vec::new();
        while state.log.len() > self.config.max_records {
            evicted.extend(state.log.pop_front().map(|r| r.id));
        }
        if let Some(newest) = state.log.back().map(|r| r.timestamp) {
            let cutoff = newest - Duration::days(self.config.max_age_days);
            while state.log.front().map_or(false, |r| r.timestamp < cutoff) {
                evicted.extend(state.log.pop_front().map(|r| r.id));
            }
        }
        if !evicted.is_empty() {
            debug!("Evicted {} prediction(s) from the rolling window", evicted.len());
        }
        evicted
    }

    fn maybe_freeze_baseline(&self, state: &mut MonitorState) -> Result<()> {
        if state.baseline.is_some() {
            return Ok(());
        }
        let baseline = self.freeze_initial(&state.log);
        if baseline.is_some() {
            self.persist_baseline(baseline.as_ref())?;
            state.baseline = baseline;
        }
        Ok(())
    }

    fn freeze_initial(&self, log: &VecDeque<PredictionRecord>) -> Option<BaselineSnapshot> {
        let baseline = freeze(log, self.config.baseline_sample_size, false)?;
        info!(
            "Baseline frozen: {} predictions, accuracy {:.3}, brier {:.4}",
            baseline.sample_ids.len(),
            baseline.metrics.accuracy,
            baseline.metrics.brier_score
        );
        Some(baseline)
    }
}

fn insufficient(reason: String, baseline_samples: usize, recent_samples: usize) -> DriftReport {
    debug!("Drift not scored: {}", reason);
    DriftReport {
        recommendation: "Collect more settled predictions before assessing drift".to_string(),
        reason: Some(reason),
        baseline_samples,
        recent_samples,
        ..DriftReport::default()
    }
}

/// Snapshot `size` settled records, oldest first or latest first.
fn freeze(
    log: &VecDeque<PredictionRecord>,
    size: usize,
    latest: bool,
) -> Option<BaselineSnapshot> {
    let settled = log.iter().filter(|r| r.is_settled());
    let mut sample: Vec<&PredictionRecord> = if latest {
        settled.rev().take(size).collect()
    } else {
        settled.take(size).collect()
    };
    if sample.len() < size {
        return None;
    }
    sample.sort_by_key(|r| r.timestamp);

    let metrics = RollingMetrics::compute(sample.iter().copied());
    let created_at = metrics
        .updated_at
        .or_else(|| sample.last().map(|r| r.timestamp))?;
    Some(BaselineSnapshot {
        created_at,
        sample_ids: sample.iter().map(|r| r.id.clone()).collect(),
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MarketOdds, PredictionVector};
    use crate::db::MemoryStore;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str, minutes: i64) -> PredictionRecord {
        PredictionRecord::new(
            id,
            t0() + Duration::minutes(minutes),
            "Home FC",
            "Away FC",
            "EPL",
            PredictionVector::new(0.5, 0.3, 0.2, 0.7),
            MarketOdds::new(2.0, Some(3.4), 4.5),
        )
    }

    fn small_config() -> DriftConfig {
        DriftConfig {
            baseline_sample_size: 40,
            recent_window: 50,
            min_samples: 30,
            ..DriftConfig::default()
        }
    }

    /// Track and settle `n` predictions starting at `offset`; the first
    /// `correct` of them are right (home), the rest wrong (away).
    fn feed(monitor: &DriftMonitor, prefix: &str, offset: i64, n: usize, correct: usize) {
        for i in 0..n {
            let id = format!("{}-{}", prefix, i);
            let minutes = offset + i as i64;
            monitor.track_prediction(record(&id, minutes)).unwrap();
            let actual = if i < correct { Outcome::Home } else { Outcome::Away };
            monitor
                .update_outcome_at(&id, actual, None, None, t0() + Duration::minutes(minutes + 120))
                .unwrap();
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _report: &DriftReport) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _report: &DriftReport) -> anyhow::Result<()> {
            anyhow::bail!("webhook unreachable")
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let m = DriftMonitor::new(DriftConfig::default());
        m.track_prediction(record("a", 0)).unwrap();
        assert!(matches!(
            m.track_prediction(record("a", 5)),
            Err(EngineError::InvalidInput(_))
        ));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn unknown_or_settled_updates_are_rejected() {
        let m = DriftMonitor::new(DriftConfig::default());
        assert!(m.update_outcome("nope", Outcome::Home, None, None).is_err());

        m.track_prediction(record("a", 0)).unwrap();
        let settled = m.update_outcome("a", Outcome::Draw, None, None).unwrap();
        assert_eq!(settled.correct, Some(false));
        assert!(matches!(
            m.update_outcome("a", Outcome::Home, None, None),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let m = DriftMonitor::new(DriftConfig {
            max_records: 3,
            ..DriftConfig::default()
        });
        for i in 0..5 {
            m.track_prediction(record(&format!("p{}", i), i)).unwrap();
        }
        let ids: Vec<String> = m.export_data().unwrap().predictions.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn age_evicts_relative_to_newest_record() {
        let m = DriftMonitor::new(DriftConfig {
            max_age_days: 10,
            ..DriftConfig::default()
        });
        m.track_prediction(record("old", 0)).unwrap();
        m.track_prediction(record("mid", 60 * 24 * 5)).unwrap();
        m.track_prediction(record("new", 60 * 24 * 12)).unwrap();
        let ids: Vec<String> = m.export_data().unwrap().predictions.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["mid", "new"]);
    }

    #[test]
    fn out_of_order_tracking_keeps_timestamp_order() {
        let m = DriftMonitor::new(DriftConfig::default());
        m.track_prediction(record("b", 10)).unwrap();
        m.track_prediction(record("a", 0)).unwrap();
        let ids: Vec<String> = m.export_data().unwrap().predictions.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn not_enough_data_is_a_normal_result() {
        let m = DriftMonitor::new(small_config());
        let report = m.detect_drift();
        assert!(!report.sufficient_data);
        assert_eq!(report.severity, DriftSeverity::None);
        assert!(report.reason.is_some());

        feed(&m, "base", 0, 40, 22);
        let report = m.detect_drift();
        assert!(!report.sufficient_data);
        assert_eq!(report.baseline_samples, 40);
        assert_eq!(report.recent_samples, 0);
    }

    #[test]
    fn accuracy_collapse_is_high_or_worse() {
        let m = DriftMonitor::new(small_config());
        feed(&m, "base", 0, 40, 22); // 0.55
        feed(&m, "recent", 1000, 50, 20); // 0.40

        let report = m.detect_drift();
        assert!(report.sufficient_data);
        assert_eq!(report.recent_samples, 50);
        assert_relative_eq!(report.metrics.accuracy_drift, 0.15, epsilon = 1e-9);
        assert!(report.severity >= DriftSeverity::High);
        assert!(report.drift_detected);
    }

    #[test]
    fn stable_accuracy_is_none_or_low() {
        let m = DriftMonitor::new(small_config());
        feed(&m, "base", 0, 40, 22); // 0.55
        feed(&m, "recent", 1000, 50, 27); // 0.54

        let report = m.detect_drift();
        assert!(report.sufficient_data);
        assert!(report.severity <= DriftSeverity::Low);
        assert!(!report.drift_detected);
    }

    #[test]
    fn baseline_is_frozen_until_reset() {
        let m = DriftMonitor::new(small_config());
        feed(&m, "base", 0, 40, 22);
        let frozen = m.baseline().unwrap().unwrap();
        assert_relative_eq!(frozen.metrics.accuracy, 0.55, epsilon = 1e-12);

        feed(&m, "recent", 1000, 50, 20);
        assert_eq!(m.baseline().unwrap().unwrap(), frozen);

        let reset = m.reset_baseline().unwrap().unwrap();
        // latest 40 are recent-10..recent-49, of which recent-10..recent-19 hit
        assert!(reset.sample_ids.iter().all(|id| id.starts_with("recent")));
        assert_eq!(reset.sample_ids.first().map(String::as_str), Some("recent-10"));
        assert_relative_eq!(reset.metrics.accuracy, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn metrics_are_idempotent() {
        let m = DriftMonitor::new(small_config());
        feed(&m, "x", 0, 10, 6);
        assert_eq!(m.get_metrics().unwrap(), m.get_metrics().unwrap());
        assert_relative_eq!(m.get_metrics().unwrap().accuracy, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn notifier_fires_on_serious_drift() {
        let notifier = Arc::new(CountingNotifier::default());
        let m = DriftMonitor::new(small_config()).with_notifier(notifier.clone());
        feed(&m, "base", 0, 40, 22);
        feed(&m, "recent", 1000, 50, 20);

        let report = m.detect_drift();
        assert!(report.alert_delivered);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_notifier_does_not_fail_detection() {
        let m = DriftMonitor::new(small_config()).with_notifier(Arc::new(FailingNotifier));
        feed(&m, "base", 0, 40, 22);
        feed(&m, "recent", 1000, 50, 20);

        let report = m.detect_drift();
        assert!(report.severity >= DriftSeverity::High);
        assert!(!report.alert_delivered);
    }

    #[test]
    fn export_round_trips_through_json() {
        let m = DriftMonitor::new(small_config());
        feed(&m, "base", 0, 40, 22);
        m.track_prediction(record("open", 5000).with_bet(Outcome::Home, 25.0)).unwrap();

        let export = m.export_data().unwrap();
        let json = serde_json::to_string(&export).unwrap();
        let back: ExportData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, export);

        let copy = DriftMonitor::new(small_config());
        copy.import_data(back).unwrap();
        assert_eq!(copy.export_data().unwrap(), export);
        assert_eq!(copy.get_metrics().unwrap(), m.get_metrics().unwrap());
    }

    #[test]
    fn writes_go_through_to_store_and_restore() {
        let store = Arc::new(MemoryStore::new());
        let m = DriftMonitor::new(small_config()).with_store(store.clone());
        feed(&m, "base", 0, 40, 22);
        m.track_prediction(record("open", 5000)).unwrap();
        assert_eq!(store.len(), 41);
        assert!(store.get("base-0").unwrap().unwrap().is_settled());

        let restored = DriftMonitor::restore(small_config(), store).unwrap();
        assert_eq!(restored.len(), 41);
        assert_eq!(restored.baseline().unwrap(), m.baseline().unwrap());
        assert_eq!(restored.get_metrics().unwrap(), m.get_metrics().unwrap());
    }

    #[test]
    fn baseline_survives_eviction_and_restart() {
        let config = DriftConfig {
            max_records: 60,
            ..small_config()
        };
        let store = Arc::new(MemoryStore::new());
        let m = DriftMonitor::new(config).with_store(store.clone());
        feed(&m, "base", 0, 40, 22);
        feed(&m, "recent", 1000, 50, 20);

        // evicted rows leave the store too
        assert_eq!(m.len(), 60);
        assert_eq!(store.len(), 60);
        assert!(store.get("base-0").unwrap().is_none());

        let before = m.baseline().unwrap().unwrap();
        assert_relative_eq!(before.metrics.accuracy, 0.55, epsilon = 1e-12);
        assert_eq!(before.sample_ids.first().map(String::as_str), Some("base-0"));

        let restored = DriftMonitor::restore(config, store).unwrap();
        assert_eq!(restored.baseline().unwrap(), Some(before));
        assert_eq!(restored.detect_drift(), m.detect_drift());
    }

    #[test]
    fn reset_baseline_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let m = DriftMonitor::new(small_config()).with_store(store.clone());
        feed(&m, "base", 0, 40, 22);
        feed(&m, "recent", 1000, 50, 20);
        let reset = m.reset_baseline().unwrap();
        assert_eq!(store.get_baseline().unwrap(), reset);

        let restored = DriftMonitor::restore(small_config(), store).unwrap();
        assert_eq!(restored.baseline().unwrap(), reset);
    }

    #[test]
    fn import_replaces_stored_history() {
        let store = Arc::new(MemoryStore::new());
        let m = DriftMonitor::new(small_config()).with_store(store.clone());
        m.track_prediction(record("old", 0)).unwrap();

        m.import_data(ExportData {
            predictions: vec![record("new", 10)],
            baseline: None,
        })
        .unwrap();

        let restored = DriftMonitor::restore(small_config(), store).unwrap();
        let ids: Vec<String> = restored.export_data().unwrap().predictions.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[test]
    fn invalid_import_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let m = DriftMonitor::new(small_config()).with_store(store.clone());
        m.track_prediction(record("kept", 0)).unwrap();

        let mut broken = record("broken", 20);
        broken.prediction = PredictionVector::new(0.9, 0.9, 0.9, 0.5);
        let result = m.import_data(ExportData {
            predictions: vec![record("fine", 10), broken],
            baseline: None,
        });
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));

        assert_eq!(m.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("kept").unwrap().is_some());
        assert!(store.get("fine").unwrap().is_none());
    }

    #[test]
    fn severity_combinations() {
        let t = DriftThresholds::default();
        let d = |a, b, r| DriftMetrics {
            accuracy_drift: a,
            brier_drift: b,
            roi_drift: r,
        };
        assert_eq!(t.classify(&d(0.0, 0.0, 0.0)), DriftSeverity::None);
        assert_eq!(t.classify(&d(0.04, 0.0, 0.0)), DriftSeverity::Low);
        assert_eq!(t.classify(&d(0.08, 0.0, 0.0)), DriftSeverity::Medium);
        assert_eq!(t.classify(&d(0.08, 0.02, 0.0)), DriftSeverity::High);
        assert_eq!(t.classify(&d(0.13, 0.0, 0.0)), DriftSeverity::High);
        assert_eq!(t.classify(&d(0.08, 0.04, 0.0)), DriftSeverity::Critical);
        // improvement never counts as drift
        assert_eq!(t.classify(&d(-0.2, -0.1, -0.5)), DriftSeverity::None);
    }

    #[test]
    fn config_validation() {
        assert!(DriftConfig::default().validate().is_ok());
        let bad = DriftConfig {
            min_samples: 60,
            recent_window: 50,
            ..DriftConfig::default()
        };
        assert!(bad.validate().is_err());

        let thin_baseline = DriftConfig {
            baseline_sample_size: 20,
            min_samples: 30,
            ..DriftConfig::default()
        };
        assert!(matches!(
            thin_baseline.validate(),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
