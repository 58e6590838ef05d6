//! Report status aggregation for the statistics view

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl FromStr for ReportStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ReportStatus::Draft),
            "submitted" => Ok(ReportStatus::Submitted),
            "approved" => Ok(ReportStatus::Approved),
            "rejected" => Ok(ReportStatus::Rejected),
            _ => Err(Error::UnknownReportStatus(s.to_string())),
        }
    }
}

/// Counts of reports per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    pub total: u64,
    pub by_status: BTreeMap<ReportStatus, u64>,
}

impl ReportStats {
    pub fn from_reports<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ReportStatus>,
    {
        let mut stats = Self::default();
        for status in statuses {
            stats.total += 1;
            *stats.by_status.entry(status).or_insert(0) += 1;
        }
        stats
    }

    pub fn count(&self, status: ReportStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Reports waiting for a reviewer
    pub fn pending_review(&self) -> u64 {
        self.count(ReportStatus::Submitted)
    }

    /// Approved share of reviewed reports, `None` when nothing was reviewed
    pub fn approval_rate(&self) -> Option<f64> {
        let approved = self.count(ReportStatus::Approved);
        let reviewed = approved + self.count(ReportStatus::Rejected);
        (reviewed > 0).then(|| approved as f64 / reviewed as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_status() {
        use ReportStatus::*;
        let stats = ReportStats::from_reports([Draft, Submitted, Submitted, Approved, Rejected, Approved]);

        assert_eq!(stats.total, 6);
        assert_eq!(stats.count(Submitted), 2);
        assert_eq!(stats.pending_review(), 2);
        assert_eq!(stats.count(Draft), 1);
        assert_eq!(stats.approval_rate(), Some(2.0 / 3.0));
    }

    #[test]
    fn test_empty_stats() {
        let stats = ReportStats::from_reports(std::iter::empty());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.count(ReportStatus::Approved), 0);
        assert_eq!(stats.approval_rate(), None);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("approved".parse::<ReportStatus>().unwrap(), ReportStatus::Approved);
        assert!("archived".parse::<ReportStatus>().is_err());
    }
}
