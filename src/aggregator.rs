//! KPI and conversion aggregations over a filtered set of rows.
//!
//! Every function here is pure: it reads the rows it is given and returns a
//! freshly built table.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::csv_reader::Record;

pub const TOP_JOB_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TopLine {
    pub total: usize,
    pub conversions: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Contacted,
    Reached,
    Interested,
    Converted,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Contacted, Stage::Reached, Stage::Interested, Stage::Converted];

    fn includes(self, record: &Record) -> bool {
        match self {
            Stage::Contacted => true,
            Stage::Reached => record.contact != "unknown",
            Stage::Interested => record.campaign <= 2 || record.previous > 0,
            Stage::Converted => record.converted(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Contacted => write!(f, "Contacted"),
            Stage::Reached => write!(f, "Reached"),
            Stage::Interested => write!(f, "Interested"),
            Stage::Converted => write!(f, "Converted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunnelStage {
    pub stage: Stage,
    pub count: usize,
}

/// Conversion figures for one group. `rate` is `None` only when the group
/// has no rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionBucket<K> {
    pub key: K,
    pub rows: usize,
    pub conversions: usize,
    pub rate: Option<f64>,
}

impl<K> ConversionBucket<K> {
    fn empty(key: K) -> Self {
        ConversionBucket {
            key,
            rows: 0,
            conversions: 0,
            rate: None,
        }
    }

    fn add(&mut self, record: &Record) {
        self.rows += 1;
        if record.converted() {
            self.conversions += 1;
        }
        self.rate = Some(percentage(self.conversions, self.rows));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AgeGroup {
    #[serde(rename = "18-30")]
    UpTo30,
    #[serde(rename = "31-40")]
    Thirties,
    #[serde(rename = "41-50")]
    Forties,
    #[serde(rename = "51-60")]
    Fifties,
    #[serde(rename = "60+")]
    Over60,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::UpTo30,
        AgeGroup::Thirties,
        AgeGroup::Forties,
        AgeGroup::Fifties,
        AgeGroup::Over60,
    ];

    /// Bins are [18, 30], (30, 40], (40, 50], (50, 60], (60, 100].
    pub fn of(age: i64) -> Option<AgeGroup> {
        match age {
            18..=30 => Some(AgeGroup::UpTo30),
            31..=40 => Some(AgeGroup::Thirties),
            41..=50 => Some(AgeGroup::Forties),
            51..=60 => Some(AgeGroup::Fifties),
            61..=100 => Some(AgeGroup::Over60),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeGroup::UpTo30 => "18-30",
            AgeGroup::Thirties => "31-40",
            AgeGroup::Forties => "41-50",
            AgeGroup::Fifties => "51-60",
            AgeGroup::Over60 => "60+",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

pub fn top_line(rows: &[&Record]) -> TopLine {
    let total = rows.len();
    let conversions = rows.iter().filter(|r| r.converted()).count();
    TopLine {
        total,
        conversions,
        rate: percentage(conversions, total),
    }
}

pub fn funnel(rows: &[&Record]) -> Vec<FunnelStage> {
    Stage::ALL
        .iter()
        .map(|&stage| FunnelStage {
            stage,
            count: rows.iter().filter(|r| stage.includes(r)).count(),
        })
        .collect()
}

fn group_by<K, F>(rows: &[&Record], key: F) -> Vec<ConversionBucket<K>>
where
    K: Ord + Clone,
    F: Fn(&Record) -> K,
{
    let mut groups = BTreeMap::<K, ConversionBucket<K>>::new();
    for record in rows {
        let k = key(record);
        groups
            .entry(k.clone())
            .or_insert_with(|| ConversionBucket::empty(k))
            .add(record);
    }
    groups.into_values().collect()
}

/// Conversion per contact channel, ordered by channel name.
pub fn channel_conversion(rows: &[&Record]) -> Vec<ConversionBucket<String>> {
    group_by(rows, |r| r.contact.clone())
}

/// Conversion per number of contacts in the campaign, ascending.
pub fn campaign_fatigue(rows: &[&Record]) -> Vec<ConversionBucket<i64>> {
    group_by(rows, |r| r.campaign)
}

/// Conversion per age group. All five groups are always returned in order.
pub fn age_group_conversion(rows: &[&Record]) -> Vec<ConversionBucket<AgeGroup>> {
    let mut buckets = AgeGroup::ALL.map(ConversionBucket::empty);
    for record in rows {
        if let Some(group) = AgeGroup::of(record.age) {
            buckets[group as usize].add(record);
        }
    }
    buckets.into()
}

/// The best converting job roles. Jobs with equal rates keep their
/// alphabetical order.
pub fn top_job_roles(rows: &[&Record]) -> Vec<ConversionBucket<String>> {
    let mut jobs = group_by(rows, |r| r.job.clone());
    jobs.sort_by(|a, b| {
        let a = a.rate.unwrap_or(0.0);
        let b = b.rate.unwrap_or(0.0);
        b.total_cmp(&a)
    });
    jobs.truncate(TOP_JOB_LIMIT);
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::tests::record;

    fn refs(records: &[Record]) -> Vec<&Record> {
        records.iter().collect()
    }

    #[test]
    fn twenty_of_a_hundred_is_twenty_percent() {
        let records = (0..100)
            .map(|i| record(40, "admin.", "cellular", 1, 0, if i < 20 { "yes" } else { "no" }))
            .collect::<Vec<_>>();
        let kpi = top_line(&refs(&records));
        assert_eq!(kpi.total, 100);
        assert_eq!(kpi.conversions, 20);
        assert!((kpi.rate - 20.0).abs() < 1e-9);
        assert_eq!(format!("{:.2}", kpi.rate), "20.00");
    }

    #[test]
    fn empty_rows_give_zeroes() {
        let rows: Vec<&Record> = Vec::new();
        let kpi = top_line(&rows);
        assert_eq!(kpi, TopLine { total: 0, conversions: 0, rate: 0.0 });
        assert!(funnel(&rows).iter().all(|s| s.count == 0));
        assert!(channel_conversion(&rows).is_empty());
        assert!(campaign_fatigue(&rows).is_empty());
        assert!(top_job_roles(&rows).is_empty());
        let ages = age_group_conversion(&rows);
        assert_eq!(ages.len(), 5);
        assert!(ages.iter().all(|b| b.rows == 0 && b.rate.is_none()));
    }

    #[test]
    fn funnel_stages_are_counted_independently() {
        let records = vec![
            record(30, "admin.", "unknown", 1, 0, "no"),
            record(30, "admin.", "cellular", 5, 0, "no"),
            record(30, "admin.", "telephone", 4, 2, "yes"),
            record(30, "admin.", "unknown", 7, 0, "yes"),
        ];
        let stages = funnel(&refs(&records));
        let counts: Vec<_> = stages.iter().map(|s| (s.stage.to_string(), s.count)).collect();
        assert_eq!(
            counts,
            vec![
                ("Contacted".to_string(), 4),
                ("Reached".to_string(), 2),
                ("Interested".to_string(), 2),
                ("Converted".to_string(), 2),
            ]
        );
        assert!(stages.iter().all(|s| s.count <= records.len()));
    }

    #[test]
    fn interested_can_exceed_reached() {
        let records = vec![
            record(30, "admin.", "unknown", 1, 0, "no"),
            record(30, "admin.", "unknown", 2, 0, "no"),
        ];
        let stages = funnel(&refs(&records));
        assert_eq!(stages[1].count, 0);
        assert_eq!(stages[2].count, 2);
    }

    #[test]
    fn channel_groups_sorted_and_sum_to_total() {
        let records = vec![
            record(30, "admin.", "telephone", 1, 0, "yes"),
            record(30, "admin.", "cellular", 1, 0, "no"),
            record(30, "admin.", "cellular", 1, 0, "yes"),
            record(30, "admin.", "unknown", 1, 0, "no"),
        ];
        let channels = channel_conversion(&refs(&records));
        let keys: Vec<_> = channels.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["cellular", "telephone", "unknown"]);
        assert_eq!(channels.iter().map(|b| b.rows).sum::<usize>(), records.len());
        assert_eq!(channels[0].rate, Some(50.0));
        assert_eq!(channels[1].rate, Some(100.0));
        assert_eq!(channels[2].rate, Some(0.0));
    }

    #[test]
    fn campaign_groups_ascend_numerically() {
        let records = vec![
            record(30, "admin.", "cellular", 10, 0, "no"),
            record(30, "admin.", "cellular", 2, 0, "yes"),
            record(30, "admin.", "cellular", 1, 0, "no"),
            record(30, "admin.", "cellular", 2, 0, "no"),
        ];
        let campaigns = campaign_fatigue(&refs(&records));
        let keys: Vec<_> = campaigns.iter().map(|b| b.key).collect();
        assert_eq!(keys, vec![1, 2, 10]);
        assert_eq!(campaigns[1].rate, Some(50.0));
        for bucket in &campaigns {
            let rate = bucket.rate.unwrap();
            assert!((0.0..=100.0).contains(&rate));
        }
    }

    #[test]
    fn age_groups_always_have_five_labels() {
        let records = vec![
            record(25, "admin.", "cellular", 1, 0, "no"),
            record(35, "admin.", "cellular", 1, 0, "yes"),
            record(65, "admin.", "cellular", 1, 0, "yes"),
        ];
        let ages = age_group_conversion(&refs(&records));
        let labels: Vec<_> = ages.iter().map(|b| b.key.label()).collect();
        assert_eq!(labels, vec!["18-30", "31-40", "41-50", "51-60", "60+"]);
        assert_eq!(ages[0].rate, Some(0.0));
        assert_eq!(ages[1].rate, Some(100.0));
        assert_eq!(ages[2].rate, None);
        assert_eq!(ages[3].rate, None);
        assert_eq!(ages[4].rate, Some(100.0));
    }

    #[test]
    fn age_bucket_boundaries() {
        assert_eq!(AgeGroup::of(-1), None);
        assert_eq!(AgeGroup::of(17), None);
        assert_eq!(AgeGroup::of(18), Some(AgeGroup::UpTo30));
        assert_eq!(AgeGroup::of(30), Some(AgeGroup::UpTo30));
        assert_eq!(AgeGroup::of(31), Some(AgeGroup::Thirties));
        assert_eq!(AgeGroup::of(60), Some(AgeGroup::Fifties));
        assert_eq!(AgeGroup::of(61), Some(AgeGroup::Over60));
        assert_eq!(AgeGroup::of(100), Some(AgeGroup::Over60));
        assert_eq!(AgeGroup::of(101), None);

        let records = vec![
            record(16, "student", "cellular", 1, 0, "yes"),
            record(102, "retired", "cellular", 1, 0, "yes"),
        ];
        let ages = age_group_conversion(&refs(&records));
        assert!(ages.iter().all(|b| b.rows == 0));
    }

    #[test]
    fn top_jobs_sorted_descending_with_stable_ties() {
        let records = vec![
            record(30, "technician", "cellular", 1, 0, "yes"),
            record(30, "admin.", "cellular", 1, 0, "yes"),
            record(30, "admin.", "cellular", 1, 0, "no"),
            record(30, "services", "cellular", 1, 0, "no"),
            record(30, "retired", "cellular", 1, 0, "yes"),
            record(30, "blue-collar", "cellular", 1, 0, "no"),
            record(30, "blue-collar", "cellular", 1, 0, "yes"),
        ];
        let jobs = top_job_roles(&refs(&records));
        let keys: Vec<_> = jobs.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["retired", "technician", "admin.", "blue-collar", "services"]);
        assert!(jobs.windows(2).all(|w| w[0].rate >= w[1].rate));
    }

    #[test]
    fn top_jobs_capped_at_ten() {
        let records = (0..14)
            .map(|i| record(30, &format!("job{i:02}"), "cellular", 1, 0, "no"))
            .collect::<Vec<_>>();
        let jobs = top_job_roles(&refs(&records));
        assert_eq!(jobs.len(), TOP_JOB_LIMIT);
        assert_eq!(jobs[0].key, "job00");
        assert_eq!(jobs[9].key, "job09");
    }
}
