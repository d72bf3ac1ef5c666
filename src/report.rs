use std::fmt::Display;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::aggregator::{
    age_group_conversion, campaign_fatigue, channel_conversion, funnel, top_job_roles, top_line,
    ConversionBucket, FunnelStage, TopLine,
};
use crate::dataset::{FilterSelection, Table};

const RATE_AXIS: &str = "Conversion Rate (%)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Funnel,
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: Option<f64>,
}

/// A derived table plus the axis bindings needed to draw it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: &'static str,
    pub kind: ChartKind,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub points: Vec<ChartPoint>,
}

impl ChartSpec {
    fn rates<K: Display>(
        title: &'static str,
        kind: ChartKind,
        x_label: &'static str,
        buckets: &[ConversionBucket<K>],
    ) -> Self {
        ChartSpec {
            title,
            kind,
            x_label,
            y_label: RATE_AXIS,
            points: buckets
                .iter()
                .map(|b| ChartPoint {
                    label: b.key.to_string(),
                    value: b.rate,
                })
                .collect(),
        }
    }

    fn funnel(stages: &[FunnelStage]) -> Self {
        ChartSpec {
            title: "Customer Conversion Funnel",
            kind: ChartKind::Funnel,
            x_label: "Users",
            y_label: "Stage",
            points: stages
                .iter()
                .map(|s| ChartPoint {
                    label: s.stage.to_string(),
                    value: Some(s.count as f64),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points as (x, y) pairs for plotting. Numeric labels are used as x,
    /// anything else falls back to the point's position. Undefined values
    /// are skipped.
    pub fn series(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let x = p.label.parse::<f64>().unwrap_or(i as f64);
                p.value.map(|y| (x, y))
            })
            .collect()
    }
}

/// Everything the dashboard shows for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub generated_at: DateTime<Local>,
    pub selection: FilterSelection,
    pub kpi: TopLine,
    pub funnel: ChartSpec,
    pub channels: ChartSpec,
    pub campaigns: ChartSpec,
    pub age_groups: ChartSpec,
    pub jobs: ChartSpec,
}

impl DashboardReport {
    pub fn build(table: &Table, selection: &FilterSelection) -> Self {
        let rows = table.filter(selection);
        DashboardReport {
            generated_at: Local::now(),
            selection: selection.clone(),
            kpi: top_line(&rows),
            funnel: ChartSpec::funnel(&funnel(&rows)),
            channels: ChartSpec::rates(
                "Conversion Rate by Channel",
                ChartKind::Bar,
                "contact",
                &channel_conversion(&rows),
            ),
            campaigns: ChartSpec::rates(
                "Conversion Rate vs Number of Contacts",
                ChartKind::Line,
                "campaign",
                &campaign_fatigue(&rows),
            ),
            age_groups: ChartSpec::rates(
                "Conversion Rate by Age Group",
                ChartKind::Bar,
                "age_group",
                &age_group_conversion(&rows),
            ),
            jobs: ChartSpec::rates(
                "Top 10 Job Roles by Conversion Rate",
                ChartKind::Bar,
                "job",
                &top_job_roles(&rows),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{:.2}", rate)
}
