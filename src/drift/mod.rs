pub mod calibration;
pub mod metrics;
pub mod monitor;

pub use metrics::{OutcomeStats, RollingMetrics};
pub use monitor::{
    BaselineSnapshot, DriftConfig, DriftMetrics, DriftMonitor, DriftReport, DriftSeverity,
    DriftThresholds, ExportData, LevelThresholds,
};
