// src/services/fault_filter.rs

//! Rule-based suppression of noisy fault rows.
//!
//! Two rule families, applied in order:
//!
//! - **Single rules** match one row. Every populated column in a rule must
//!   be a case-sensitive substring of the row's column; any matching rule
//!   drops the row.
//! - **Group rules** match co-occurring symptoms. Rows are bucketed by
//!   aircraft and trigger minute; a bucket whose descriptions contain every
//!   substring of a rule is dropped as a whole.
//!
//! Filtering only removes rows and keeps the survivors in input order, so
//! applying it twice gives the same result as applying it once.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::models::{FaultColumn, FaultRow};
use crate::utils::time::TriggerMinute;

/// A partial row of column → substring predicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SingleRule {
    #[serde(default, alias = "机号")]
    pub aircraft: Option<String>,

    #[serde(default, alias = "航班号")]
    pub flight_number: Option<String>,

    #[serde(default, alias = "描述")]
    pub description: Option<String>,

    #[serde(default, alias = "触发时间")]
    pub trigger_time: Option<String>,

    #[serde(default, alias = "故障类型")]
    pub fault_type: Option<String>,

    #[serde(default, alias = "飞行阶段")]
    pub phase: Option<String>,
}

impl SingleRule {
    fn conditions(&self) -> Vec<(FaultColumn, &str)> {
        [
            (FaultColumn::Aircraft, &self.aircraft),
            (FaultColumn::FlightNumber, &self.flight_number),
            (FaultColumn::Description, &self.description),
            (FaultColumn::TriggerTime, &self.trigger_time),
            (FaultColumn::FaultType, &self.fault_type),
            (FaultColumn::Phase, &self.phase),
        ]
        .into_iter()
        .filter_map(|(col, value)| {
            let value = value.as_deref()?.trim();
            (!value.is_empty()).then_some((col, value))
        })
        .collect()
    }

    /// A rule with no populated column matches nothing.
    pub fn matches(&self, row: &FaultRow) -> bool {
        let conditions = self.conditions();
        !conditions.is_empty()
            && conditions
                .iter()
                .all(|(col, needle)| row.column(*col).contains(needle))
    }
}

/// Descriptions that must co-occur within one aircraft+minute bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRule {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub descriptions: Vec<String>,
}

impl GroupRule {
    fn needles(&self) -> Vec<&str> {
        self.descriptions
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Fewer than two symptoms is not a correlation.
    pub fn is_effective(&self) -> bool {
        self.needles().len() >= 2
    }

    fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.needles().join(" + "))
    }

    /// Every needle appears in at least one description.
    fn covers<'a>(&self, descriptions: impl Iterator<Item = &'a str> + Clone) -> bool {
        self.needles()
            .iter()
            .all(|needle| descriptions.clone().any(|d| d.contains(needle)))
    }
}

/// On-disk shape of a rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleFile<T> {
    #[serde(default = "Vec::new")]
    rules: Vec<T>,
}

/// Rule counts for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterStats {
    pub single_rules: usize,
    pub group_rules: usize,
    /// Group rules with at least two descriptions
    pub effective_group_rules: usize,
}

/// Outcome of one `apply` call, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterReport {
    pub input: usize,
    pub dropped_single: usize,
    pub dropped_group: usize,
}

impl FilterReport {
    pub fn kept(&self) -> usize {
        self.input - self.dropped_single - self.dropped_group
    }
}

/// Two-family fault row filter.
#[derive(Debug, Clone, Default)]
pub struct FaultCorrelationFilter {
    single: Vec<SingleRule>,
    group: Vec<GroupRule>,
}

impl FaultCorrelationFilter {
    pub fn new(single: Vec<SingleRule>, group: Vec<GroupRule>) -> Self {
        let ignored = group.iter().filter(|g| !g.is_effective()).count();
        if ignored > 0 {
            log::warn!(
                "Ignoring {} group rule(s) with fewer than two descriptions",
                ignored
            );
        }
        Self { single, group }
    }

    /// Load both rule files. A missing file means no rules of that kind.
    pub fn load(single_path: impl AsRef<Path>, group_path: impl AsRef<Path>) -> Result<Self> {
        let single: Vec<SingleRule> = load_rules(single_path.as_ref(), "single")?;
        let group: Vec<GroupRule> = load_rules(group_path.as_ref(), "group")?;
        Ok(Self::new(single, group))
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            single_rules: self.single.len(),
            group_rules: self.group.len(),
            effective_group_rules: self.group.iter().filter(|g| g.is_effective()).count(),
        }
    }

    /// Drop matching rows; survivors keep their input order.
    pub fn apply(&self, rows: &[FaultRow]) -> Vec<FaultRow> {
        self.apply_with_report(rows).0
    }

    pub fn apply_with_report(&self, rows: &[FaultRow]) -> (Vec<FaultRow>, FilterReport) {
        let mut report = FilterReport {
            input: rows.len(),
            ..Default::default()
        };

        let after_single: Vec<&FaultRow> = rows
            .iter()
            .filter(|row| {
                let hit = self.single.iter().position(|rule| rule.matches(row));
                if let Some(idx) = hit {
                    log::debug!(
                        "Single rule {} drops {} {} '{}'",
                        idx,
                        row.aircraft,
                        row.flight_number,
                        row.description
                    );
                }
                hit.is_none()
            })
            .collect();
        report.dropped_single = rows.len() - after_single.len();

        let dropped = self.correlated_rows(&after_single);
        let survivors: Vec<FaultRow> = after_single
            .iter()
            .enumerate()
            .filter(|(idx, _)| !dropped.contains(idx))
            .map(|(_, row)| (*row).clone())
            .collect();
        report.dropped_group = dropped.len();

        if report.kept() < report.input {
            log::info!(
                "Fault filter: {} → {} rows ({} single, {} correlated)",
                report.input,
                report.kept(),
                report.dropped_single,
                report.dropped_group
            );
        }
        (survivors, report)
    }

    /// Indexes (into `rows`) of every row in a fully-matched bucket.
    fn correlated_rows(&self, rows: &[&FaultRow]) -> HashSet<usize> {
        let mut dropped = HashSet::new();
        let rules: Vec<&GroupRule> = self.group.iter().filter(|g| g.is_effective()).collect();
        if rules.is_empty() {
            return dropped;
        }

        let mut buckets: HashMap<(&str, TriggerMinute), Vec<usize>> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            match TriggerMinute::parse(&row.trigger_time) {
                Some(minute) => buckets
                    .entry((row.aircraft.as_str(), minute))
                    .or_default()
                    .push(idx),
                None => log::debug!(
                    "Unparseable trigger time '{}' for {}; not correlated",
                    row.trigger_time,
                    row.aircraft
                ),
            }
        }

        for ((aircraft, minute), members) in &buckets {
            let descriptions = members.iter().map(|&i| rows[i].description.as_str());
            if let Some(rule) = rules.iter().find(|r| r.covers(descriptions.clone())) {
                log::debug!(
                    "Group rule '{}' drops {} rows for {} at {:02}:{:02}",
                    rule.label(),
                    members.len(),
                    aircraft,
                    minute.hour,
                    minute.minute
                );
                dropped.extend(members.iter().copied());
            }
        }
        dropped
    }
}

fn load_rules<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<Vec<T>> {
    if !path.exists() {
        log::warn!("No {} filter rules at {}", kind, path.display());
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let file: RuleFile<T> = toml::from_str(&content)?;
    log::info!("Loaded {} {} filter rule(s)", file.rules.len(), kind);
    Ok(file.rules)
}
