use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    InProgress,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    /// Only open incidents are worth alerting about.
    pub fn is_open(&self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReportPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ReportPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPriority::Low => "low",
            ReportPriority::Medium => "medium",
            ReportPriority::High => "high",
            ReportPriority::Urgent => "urgent",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, ReportPriority::High | ReportPriority::Urgent)
    }
}

/// A report row as the store hands it over. `location` is already decoded;
/// legacy rows without usable geodata carry `None`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub priority: ReportPriority,
    pub location: Option<Coordinate>,
    pub owner_id: String,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub address: Option<String>,
}

/// Scan-time snapshot of a report that is known to have coordinates.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub priority: ReportPriority,
    pub coordinate: Coordinate,
    pub owner_id: String,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub address: Option<String>,
}

impl Candidate {
    pub fn from_report(report: Report) -> Option<Self> {
        let coordinate = report.location?;
        Some(Self {
            id: report.id,
            name: report.name,
            description: report.description,
            status: report.status,
            priority: report.priority,
            coordinate,
            owner_id: report.owner_id,
            category_name: report.category_name,
            category_color: report.category_color,
            address: report.address,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}
