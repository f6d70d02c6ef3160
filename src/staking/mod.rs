pub mod disagreement;
pub mod kelly;
pub mod optimizer;
pub mod poisson;

pub use disagreement::{DisagreementAnalysis, DisagreementSeverity, DisagreementThresholds};
pub use optimizer::{
    ConfidenceLevel, Recommendation, RiskLevel, RiskProfile, StakeConfig, StakeOptimizer,
    StakeRecommendation,
};
pub use poisson::poisson_outcome_probabilities;
