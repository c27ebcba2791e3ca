// ABOUTME: Outbound poll command - reconciles System B's snapshot into System A
// ABOUTME: Invoked by an external scheduler; prints the poll report as JSON

use anyhow::{Context, Result};

use crate::config::BridgeConfig;
use crate::model::EntityKind;
use crate::sync::{KindReport, PollReport, PollStatus};

/// Run one poll cycle, for every kind or only `kind`.
pub async fn poll(config: &BridgeConfig, kind: Option<EntityKind>) -> Result<PollReport> {
    let reconciler = config.build_reconciler()?;

    let report = match kind {
        None => reconciler.run_poll().await,
        Some(kind) => {
            let kind_report = reconciler
                .sync_kind(kind)
                .await
                .with_context(|| format!("Failed to poll {}", kind.collection()))?;
            single_kind_report(kind_report)
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.status == PollStatus::Partial {
        tracing::warn!("Poll finished with {} listing failures", report.errors.len());
    }
    Ok(report)
}

fn single_kind_report(kind_report: KindReport) -> PollReport {
    let mut report = PollReport {
        status: PollStatus::Completed,
        timestamp: chrono::Utc::now(),
        people: Default::default(),
        companies: Default::default(),
        errors: Vec::new(),
    };
    match kind_report.kind {
        EntityKind::Person => report.people = kind_report.stats,
        EntityKind::Company => report.companies = kind_report.stats,
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncStats;

    #[test]
    fn test_single_kind_report() {
        let mut kind_report = KindReport::new(EntityKind::Company);
        kind_report.stats = SyncStats {
            synced: 2,
            skipped: 1,
            errors: 0,
        };

        let report = single_kind_report(kind_report);
        assert_eq!(report.status, PollStatus::Completed);
        assert_eq!(report.companies.synced, 2);
        assert_eq!(report.people, SyncStats::default());
    }
}
