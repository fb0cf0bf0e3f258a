//! Per-row domain objects built from one CSV data row.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One data row keyed by normalized header.
#[derive(Debug, Clone)]
pub struct RowView<'a> {
    /// 1-based, first data row is 1.
    pub row: usize,
    values: HashMap<&'a str, &'a str>,
}

impl<'a> RowView<'a> {
    pub fn new(row: usize, keys: &'a [String], values: &'a [String]) -> Self {
        let values = keys
            .iter()
            .zip(values)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Self { row, values }
    }

    /// Trimmed value; empty cells and absent columns are both `None`.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.values
            .get(key)
            .copied()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_number)
    }

    fn date(&self, key: &str) -> Option<NaiveDate> {
        self.get(key).and_then(parse_date)
    }
}

pub(crate) fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Paused,
}

impl GoalStatus {
    pub const ALLOWED: &'static [&'static str] = &["planned", "active", "completed", "paused"];
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planned" => Ok(Self::Planned),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "paused" => Ok(Self::Paused),
            _ => Err(format!(
                "Invalid status '{s}'. Must be one of: {}",
                Self::ALLOWED.join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl KpiFrequency {
    pub const ALLOWED: &'static [&'static str] =
        &["daily", "weekly", "monthly", "quarterly", "yearly"];
}

impl FromStr for KpiFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!(
                "Invalid frequency '{s}'. Must be one of: {}",
                Self::ALLOWED.join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    pub name: String,
    pub description: Option<String>,
    pub status: GoalStatus,
    pub progress: u8,
    pub target_value: Option<f64>,
    pub current_value: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl GoalRecord {
    /// Optional numbers and dates that do not parse become `None`; the validator
    /// already surfaced those as warnings.
    pub fn from_row(row: &RowView<'_>) -> Result<Self, String> {
        let name = row.text("name").ok_or("Name is required")?;
        let status = match row.get("status") {
            Some(s) => s.parse()?,
            None => GoalStatus::default(),
        };
        let progress = match row.get("progress") {
            Some(p) => parse_progress(p)?,
            None => 0,
        };
        Ok(Self {
            name,
            description: row.text("description"),
            status,
            progress,
            target_value: row.number("target_value"),
            current_value: row.number("current_value"),
            start_date: row.date("start_date"),
            due_date: row.date("due_date"),
        })
    }
}

pub(crate) fn parse_progress(s: &str) -> Result<u8, String> {
    s.trim()
        .parse::<i64>()
        .ok()
        .filter(|p| (0..=100).contains(p))
        .map(|p| p as u8)
        .ok_or_else(|| format!("Progress must be an integer between 0 and 100, got '{s}'"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub frequency: KpiFrequency,
    pub target_value: Option<f64>,
    pub current_value: Option<f64>,
    pub goal_id: Option<String>,
}

impl KpiRecord {
    pub fn from_row(row: &RowView<'_>) -> Result<Self, String> {
        let name = row.text("name").ok_or("Name is required")?;
        let frequency = match row.get("frequency") {
            Some(f) => f.parse()?,
            None => KpiFrequency::default(),
        };
        Ok(Self {
            name,
            description: row.text("description"),
            unit: row.text("unit"),
            frequency,
            target_value: row.number("target_value"),
            current_value: row.number("current_value"),
            goal_id: row.text("goal_id"),
        })
    }
}

/// A transient, mapped row: consumed once by the persistence step.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportedRecord {
    Goal(GoalRecord),
    Kpi(KpiRecord),
}

impl ImportedRecord {
    pub fn name(&self) -> &str {
        match self {
            ImportedRecord::Goal(g) => &g.name,
            ImportedRecord::Kpi(k) => &k.name,
        }
    }

    /// Store payload tagged with the owning principal.
    pub fn into_payload(self, owner_id: &str) -> serde_json::Result<Value> {
        let mut value = match self {
            ImportedRecord::Goal(g) => serde_json::to_value(g)?,
            ImportedRecord::Kpi(k) => serde_json::to_value(k)?,
        };
        if let Value::Object(map) = &mut value {
            map.insert("owner_id".into(), Value::String(owner_id.to_string()));
        }
        Ok(value)
    }
}

impl fmt::Display for ImportedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportedRecord::Goal(g) => write!(f, "goal '{}'", g.name),
            ImportedRecord::Kpi(k) => write!(f, "kpi '{}'", k.name),
        }
    }
}
