//! Mapping health monitoring
//!
//! **[DME-HLTH-010]** Bands the trailing audit window into ok / warning /
//! critical from the mapped-record success rate, with secondary alerts for a
//! swelling review queue and sagging confidence. An empty window reports
//! healthy rather than alarming on silence.

use crate::db::AuditLog;
use crate::error::EngineResult;
use crate::models::{HealthAlert, HealthLevel, HealthStatus};
use chrono::{Duration, Utc};

pub struct HealthMonitor {
    audit: AuditLog,
    window_hours: i64,
    warning_success_rate: f64,
    critical_success_rate: f64,
    warning_review_ratio: f64,
    warning_avg_confidence: f64,
}

impl HealthMonitor {
    pub fn new(audit: AuditLog) -> Self {
        Self {
            audit,
            window_hours: 24,
            warning_success_rate: 0.85,
            critical_success_rate: 0.70,
            warning_review_ratio: 0.25,
            warning_avg_confidence: 60.0,
        }
    }

    pub fn with_window_hours(mut self, hours: i64) -> Self {
        self.window_hours = hours;
        self
    }

    /// Health snapshot over the trailing window
    pub async fn status(&self) -> EngineResult<HealthStatus> {
        let since = Utc::now() - Duration::hours(self.window_hours);
        let stats = self.audit.window_stats(since).await?;

        if stats.total == 0 {
            return Ok(HealthStatus {
                overall: HealthLevel::Ok,
                success_rate: 1.0,
                avg_confidence: 0.0,
                needs_review_ratio: 0.0,
                window_total: 0,
                alerts: Vec::new(),
            });
        }

        let total = stats.total as f64;
        let success_rate = stats.mapped as f64 / total;
        let needs_review_ratio = stats.needs_review as f64 / total;
        let mut alerts = Vec::new();

        if success_rate < self.critical_success_rate {
            alerts.push(HealthAlert {
                level: HealthLevel::Critical,
                message: format!(
                    "Mapping success rate {:.1}% below critical threshold {:.0}%",
                    success_rate * 100.0,
                    self.critical_success_rate * 100.0
                ),
            });
        } else if success_rate < self.warning_success_rate {
            alerts.push(HealthAlert {
                level: HealthLevel::Warning,
                message: format!(
                    "Mapping success rate {:.1}% below warning threshold {:.0}%",
                    success_rate * 100.0,
                    self.warning_success_rate * 100.0
                ),
            });
        }

        if needs_review_ratio > self.warning_review_ratio {
            alerts.push(HealthAlert {
                level: HealthLevel::Warning,
                message: format!(
                    "{:.1}% of recent records flagged for review",
                    needs_review_ratio * 100.0
                ),
            });
        }

        if stats.mapped > 0 && stats.avg_confidence < self.warning_avg_confidence {
            alerts.push(HealthAlert {
                level: HealthLevel::Warning,
                message: format!(
                    "Average mapping confidence {:.1} below {:.0}",
                    stats.avg_confidence, self.warning_avg_confidence
                ),
            });
        }

        let overall = alerts
            .iter()
            .map(|a| a.level)
            .max_by_key(|level| match level {
                HealthLevel::Ok => 0,
                HealthLevel::Warning => 1,
                HealthLevel::Critical => 2,
            })
            .unwrap_or(HealthLevel::Ok);

        if overall != HealthLevel::Ok {
            tracing::warn!(
                success_rate = format!("{:.3}", success_rate),
                window_total = stats.total,
                alerts = alerts.len(),
                "Mapping health degraded"
            );
        }

        Ok(HealthStatus {
            overall,
            success_rate,
            avg_confidence: stats.avg_confidence,
            needs_review_ratio,
            window_total: stats.total as usize,
            alerts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{
        Brand, DeviceMetadata, DeviceSignature, MappingAlgorithm, MappingResult,
    };
    use std::collections::HashMap;
    use uuid::Uuid;

    fn metadata(model: &str) -> DeviceMetadata {
        DeviceMetadata {
            brand: Brand::Apple,
            family: Some("iphone".to_string()),
            raw_model: model.to_string(),
            normalized_model: Some(model.to_lowercase()),
            capacity_gb: Some(128),
            identification_code: None,
            screen_size_in: None,
            release_year: None,
            chip: None,
            compute_units: None,
            vendor_model_code: None,
            extraction_confidence: 80,
            extraction_issues: Vec::new(),
            extra_fields: HashMap::new(),
        }
    }

    fn result(confidence: u8, mapped: bool) -> MappingResult {
        MappingResult {
            capacity_id: mapped.then(Uuid::new_v4),
            confidence,
            algorithm: if mapped {
                MappingAlgorithm::Exact
            } else {
                MappingAlgorithm::Failed
            },
            decision_path: Vec::new(),
            candidates: Vec::new(),
            rejections: Vec::new(),
            needs_review: !mapped,
            ambiguous: false,
            extra_fields: HashMap::new(),
        }
    }

    async fn seed(audit: &AuditLog, mapped: usize, failed: usize, confidence: u8) {
        let run_id = Uuid::new_v4();
        for i in 0..mapped {
            audit
                .record(
                    run_id,
                    &DeviceSignature(format!("ok-{}", i)),
                    &metadata("Device"),
                    &result(confidence, true),
                    1,
                )
                .await
                .unwrap();
        }
        for i in 0..failed {
            audit
                .record(
                    run_id,
                    &DeviceSignature(format!("bad-{}", i)),
                    &metadata("Device"),
                    &result(0, false),
                    1,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_window_is_healthy() {
        let monitor = HealthMonitor::new(AuditLog::new(test_pool().await));
        let status = monitor.status().await.unwrap();
        assert_eq!(status.overall, HealthLevel::Ok);
        assert!((status.success_rate - 1.0).abs() < 1e-9);
        assert!(status.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_healthy_window() {
        let audit = AuditLog::new(test_pool().await);
        seed(&audit, 9, 1, 90).await;

        let status = HealthMonitor::new(audit).status().await.unwrap();
        assert_eq!(status.overall, HealthLevel::Ok);
        assert!((status.success_rate - 0.9).abs() < 1e-9);
        assert_eq!(status.window_total, 10);
    }

    #[tokio::test]
    async fn test_warning_band() {
        let audit = AuditLog::new(test_pool().await);
        seed(&audit, 8, 2, 90).await;

        let status = HealthMonitor::new(audit).status().await.unwrap();
        assert_eq!(status.overall, HealthLevel::Warning);
        assert!(status
            .alerts
            .iter()
            .any(|a| a.message.contains("success rate")));
    }

    #[tokio::test]
    async fn test_critical_band() {
        let audit = AuditLog::new(test_pool().await);
        seed(&audit, 6, 4, 90).await;

        let status = HealthMonitor::new(audit).status().await.unwrap();
        assert_eq!(status.overall, HealthLevel::Critical);
        assert!(status
            .alerts
            .iter()
            .any(|a| a.level == HealthLevel::Critical));
    }

    #[tokio::test]
    async fn test_low_confidence_warning() {
        let audit = AuditLog::new(test_pool().await);
        seed(&audit, 10, 0, 45).await;

        let status = HealthMonitor::new(audit).status().await.unwrap();
        assert_eq!(status.overall, HealthLevel::Warning);
        assert!(status
            .alerts
            .iter()
            .any(|a| a.message.contains("confidence")));
    }
}
