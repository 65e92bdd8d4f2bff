// src/pipeline/fault_status.rs

//! Daily fault summary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::models::{DisplayConfig, FaultRow};
use crate::pipeline::notifier::StatusMonitor;
use crate::services::FilterReport;

/// Filtered fault rows for one day.
#[derive(Debug, Clone)]
pub struct FaultStatusData {
    pub date: NaiveDate,
    pub rows: Vec<FaultRow>,
    pub report: FilterReport,
}

pub struct FaultStatusMonitor {
    max_lines: usize,
}

impl FaultStatusMonitor {
    pub fn new(display: &DisplayConfig) -> Self {
        Self {
            max_lines: display.max_fault_lines,
        }
    }

    fn fault_line(row: &FaultRow) -> String {
        let phase = row.phase.trim();
        if phase.is_empty() {
            format!("    - {} ({})", row.description, row.trigger_time)
        } else {
            format!("    - {} ({}, {})", row.description, row.trigger_time, phase)
        }
    }

    /// Summary grouped by aircraft then flight, newest fault first.
    pub fn summary(&self, date: NaiveDate, rows: &[FaultRow]) -> Vec<String> {
        let mut lines = vec![format!("故障信息汇总 - {}", date), "=".repeat(40), String::new()];
        if rows.is_empty() {
            lines.push("今日无故障记录".to_string());
            return lines;
        }

        let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&FaultRow>>> = BTreeMap::new();
        for row in rows {
            grouped
                .entry(row.aircraft.as_str())
                .or_default()
                .entry(row.flight_number.as_str())
                .or_default()
                .push(row);
        }

        for (aircraft, flights) in grouped {
            lines.push(format!("{}:", aircraft));
            for (flight, mut faults) in flights {
                faults.sort_by(|a, b| b.trigger_time.cmp(&a.trigger_time));
                lines.push(format!("  {}:", flight));
                lines.extend(faults.iter().take(self.max_lines).map(|r| Self::fault_line(r)));
                if faults.len() > self.max_lines {
                    lines.push(format!("    ... (还有{}条)", faults.len() - self.max_lines));
                }
            }
            lines.push(String::new());
        }

        lines.push("-".repeat(40));
        lines.push(format!("共计: {}条故障记录", rows.len()));
        lines
    }
}

impl StatusMonitor for FaultStatusMonitor {
    type Data = FaultStatusData;

    fn kind(&self) -> &str {
        "fault"
    }

    fn subject(&self, data: &FaultStatusData) -> String {
        format!("故障信息汇总 - {}", data.date)
    }

    fn generate_content(&self, data: &FaultStatusData) -> Vec<String> {
        self.summary(data.date, &data.rows)
    }

    fn metadata(&self, data: &FaultStatusData, content: &[String]) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("target_date".into(), Value::from(data.date.to_string()));
        metadata.insert("fault_count".into(), Value::from(data.rows.len()));
        metadata.insert("filtered_count".into(), Value::from(data.report.input - data.report.kept()));
        metadata.insert("line_count".into(), Value::from(content.len()));
        metadata
    }
}
