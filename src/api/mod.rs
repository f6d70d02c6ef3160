use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::db::models::{
    BetOutcome, MarketOdds, OddsQuote, Outcome, PredictionRecord, PredictionVector,
};
use crate::drift::{BaselineSnapshot, DriftMonitor, DriftReport, ExportData, RollingMetrics};
use crate::error::EngineError;
use crate::odds::{compute_clv, summarize_clv, AggregatedOdds, ClvMetrics, ClvSummary, OddsAggregator};
use crate::risk::{MonteCarloResult, RiskSimulator};
use crate::staking::poisson::DEFAULT_MAX_GOALS;
use crate::staking::{
    poisson_outcome_probabilities, RiskProfile, StakeOptimizer, StakeRecommendation,
};

pub struct AppState {
    pub optimizer: StakeOptimizer,
    pub simulator: RiskSimulator,
    pub aggregator: OddsAggregator,
    pub monitor: Arc<DriftMonitor>,
    /// Used when a stake request names no risk profile
    pub default_profile: RiskProfile,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Build the Axum router for the JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stake", post(stake_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/odds/aggregate", post(aggregate_handler))
        .route("/api/odds/clv", post(clv_handler))
        .route("/api/odds/clv/summary", post(clv_summary_handler))
        .route("/api/predictions", post(track_handler))
        .route("/api/predictions/:id/outcome", post(outcome_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/api/drift", get(drift_handler))
        .route("/api/export", get(export_handler))
        .route("/api/import", post(import_handler))
        .route("/api/baseline/reset", post(reset_baseline_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::NoOddsAvailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: EngineError) -> (StatusCode, String) {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}", err);
    }
    (status, err.to_string())
}

// ── Staking & risk ──

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExpectedGoals {
    pub home: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRequest {
    pub prediction: PredictionVector,
    pub odds: MarketOdds,
    pub bankroll: f64,
    #[serde(default)]
    pub profile: Option<RiskProfile>,
    #[serde(default)]
    pub secondary: Vec<PredictionVector>,
    /// Adds a Poisson goals estimate to the secondary set
    #[serde(default)]
    pub expected_goals: Option<ExpectedGoals>,
}

impl StakeRequest {
    pub fn evaluate(
        self,
        optimizer: &StakeOptimizer,
        default_profile: RiskProfile,
    ) -> crate::error::Result<StakeRecommendation> {
        let mut secondary = self.secondary;
        if let Some(xg) = self.expected_goals {
            secondary.push(poisson_outcome_probabilities(
                xg.home,
                xg.away,
                DEFAULT_MAX_GOALS,
                self.prediction.confidence,
            )?);
        }
        optimizer.compute_stake(
            &self.prediction,
            &self.odds,
            self.bankroll,
            self.profile.unwrap_or(default_profile),
            &secondary,
        )
    }
}

/// POST /api/stake
async fn stake_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<StakeRecommendation> {
    req.evaluate(&state.optimizer, state.default_profile)
        .map(Json)
        .map_err(reject)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub recommendation: StakeRecommendation,
    /// Defaults to the price carried on the recommendation
    #[serde(default)]
    pub odds: Option<f64>,
    pub bankroll: f64,
    #[serde(default)]
    pub iterations: Option<usize>,
    #[serde(default)]
    pub horizon: Option<usize>,
}

impl SimulateRequest {
    pub fn evaluate(self, simulator: &RiskSimulator) -> crate::error::Result<MonteCarloResult> {
        let odds = self.odds.or(self.recommendation.odds).ok_or_else(|| {
            EngineError::invalid("odds are required when the recommendation carries no price")
        })?;
        simulator.run_simulation(
            &self.recommendation,
            odds,
            self.bankroll,
            self.iterations.unwrap_or(simulator.config().iterations),
            self.horizon.unwrap_or(simulator.config().horizon),
        )
    }
}

/// POST /api/simulate
async fn simulate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SimulateRequest>,
) -> ApiResult<MonteCarloResult> {
    // Trials are CPU-bound; keep them off the async workers
    let worker = state.clone();
    tokio::task::spawn_blocking(move || req.evaluate(&worker.simulator))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .map_err(reject)
}

// ── Odds ──

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateRequest {
    pub quotes: Vec<OddsQuote>,
}

/// POST /api/odds/aggregate
async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AggregateRequest>,
) -> ApiResult<AggregatedOdds> {
    state.aggregator.aggregate(&req.quotes).map(Json).map_err(reject)
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClvRequest {
    pub opening: f64,
    pub closing: f64,
}

/// POST /api/odds/clv
async fn clv_handler(Json(req): Json<ClvRequest>) -> ApiResult<ClvMetrics> {
    compute_clv(req.opening, req.closing).map(Json).map_err(reject)
}

#[derive(Debug, Clone, Serialize)]
pub struct ClvSummaryResponse {
    pub bets: Vec<ClvMetrics>,
    pub summary: ClvSummary,
}

/// POST /api/odds/clv/summary
async fn clv_summary_handler(Json(req): Json<Vec<ClvRequest>>) -> ApiResult<ClvSummaryResponse> {
    let bets = req
        .iter()
        .map(|b| compute_clv(b.opening, b.closing))
        .collect::<Result<Vec<_>, _>>()
        .map_err(reject)?;
    let summary = summarize_clv(&bets);
    Ok(Json(ClvSummaryResponse { bets, summary }))
}

// ── Drift monitoring ──

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BetRequest {
    pub market: Outcome,
    pub stake: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub id: String,
    /// Defaults to now
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub prediction: PredictionVector,
    pub odds: MarketOdds,
    #[serde(default)]
    pub bet: Option<BetRequest>,
}

impl TrackRequest {
    fn into_record(self) -> PredictionRecord {
        let record = PredictionRecord::new(
            self.id,
            self.timestamp.unwrap_or_else(Utc::now),
            self.home_team,
            self.away_team,
            self.league,
            self.prediction,
            self.odds,
        );
        match self.bet {
            Some(bet) => record.with_bet(bet.market, bet.stake),
            None => record,
        }
    }
}

/// POST /api/predictions
async fn track_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrackRequest>,
) -> Result<(StatusCode, Json<PredictionRecord>), (StatusCode, String)> {
    let record = req.into_record();
    state
        .monitor
        .track_prediction(record.clone())
        .map_err(reject)?;
    info!("Tracked prediction {} ({})", record.id, record.matchup);
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRequest {
    pub actual: Outcome,
    #[serde(default)]
    pub bet_outcome: Option<BetOutcome>,
    #[serde(default)]
    pub bet_profit: Option<f64>,
}

/// POST /api/predictions/:id/outcome
async fn outcome_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<OutcomeRequest>,
) -> ApiResult<PredictionRecord> {
    state
        .monitor
        .update_outcome(&id, req.actual, req.bet_outcome, req.bet_profit)
        .map(Json)
        .map_err(reject)
}

/// GET /api/metrics
async fn metrics_handler(State(state): State<Arc<AppState>>) -> ApiResult<RollingMetrics> {
    state.monitor.get_metrics().map(Json).map_err(reject)
}

/// GET /api/drift
async fn drift_handler(State(state): State<Arc<AppState>>) -> Json<DriftReport> {
    Json(state.monitor.detect_drift())
}

/// GET /api/export
async fn export_handler(State(state): State<Arc<AppState>>) -> ApiResult<ExportData> {
    state.monitor.export_data().map(Json).map_err(reject)
}

/// POST /api/import
async fn import_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<ExportData>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.monitor.import_data(data).map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/baseline/reset
async fn reset_baseline_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Option<BaselineSnapshot>> {
    state.monitor.reset_baseline().map(Json).map_err(reject)
}
