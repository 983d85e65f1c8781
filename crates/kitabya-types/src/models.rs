use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Denormalized `{id, name, email}` attached to listings and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Returned when a string does not name a variant of one of the enums below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Inappropriate,
    Spam,
    Fake,
    Offensive,
    Other,
}

impl ReportReason {
    pub const ALL: [ReportReason; 5] = [
        Self::Inappropriate,
        Self::Spam,
        Self::Fake,
        Self::Offensive,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inappropriate => "inappropriate",
            Self::Spam => "spam",
            Self::Fake => "fake",
            Self::Offensive => "offensive",
            Self::Other => "other",
        }
    }
}

impl FromStr for ReportReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "report reason",
                value: s.to_string(),
            })
    }
}

/// Review state of a report. Transitions are not restricted: an admin may
/// move a report to any state, including back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "reviewed" => Ok(Self::Reviewed),
            "resolved" => Ok(Self::Resolved),
            other => Err(UnknownVariant {
                kind: "report status",
                value: other.to_string(),
            }),
        }
    }
}

/// Age bracket a reader picks in the onboarding questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRange {
    #[serde(rename = "13-17")]
    Teen,
    #[serde(rename = "18-24")]
    YoungAdult,
    #[serde(rename = "25-34")]
    Adult,
    #[serde(rename = "35-44")]
    MidAdult,
    #[serde(rename = "45-54")]
    Mature,
    #[serde(rename = "55+")]
    Senior,
}

impl AgeRange {
    pub const ALL: [AgeRange; 6] = [
        Self::Teen,
        Self::YoungAdult,
        Self::Adult,
        Self::MidAdult,
        Self::Mature,
        Self::Senior,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teen => "13-17",
            Self::YoungAdult => "18-24",
            Self::Adult => "25-34",
            Self::MidAdult => "35-44",
            Self::Mature => "45-54",
            Self::Senior => "55+",
        }
    }
}

impl FromStr for AgeRange {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "age range",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Sent,
    Failed,
}

impl BroadcastStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for BroadcastStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant {
                kind: "broadcast status",
                value: other.to_string(),
            }),
        }
    }
}
