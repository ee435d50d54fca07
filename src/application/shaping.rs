// Shaping of raw query results into chart-ready tile data
use crate::domain::series::{
    AggregateGroup, ChartRow, DimensionValues, LatestValue, SeriesDefinition, SeriesResult,
    Summary, TileSeriesData, TimeRange,
};
use crate::domain::tile::{Grain, LabelMode};
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, HashMap};

const TOTAL_LABEL: &str = "Total";
const UNKNOWN_LABEL: &str = "Unknown";
const LABEL_SEPARATOR: &str = " / ";

/// Category label for a set of group-by values.
pub fn category_label(dimensions: &DimensionValues, group_by: &[String]) -> String {
    if group_by.is_empty() {
        return TOTAL_LABEL.to_string();
    }
    let parts: Vec<&str> = group_by
        .iter()
        .filter_map(|key| dimensions.get(key).and_then(|v| v.as_deref()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if parts.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        parts.join(LABEL_SEPARATOR)
    }
}

/// Stable column key for one (metric, group-by combination) series.
pub fn series_key(metric_key: &str, dimensions: &DimensionValues, group_by: &[String]) -> String {
    let mut key = metric_key.to_string();
    for dim in group_by {
        let value = dimensions.get(dim).and_then(|v| v.as_deref()).unwrap_or("");
        key.push_str(&format!("|{}={}", dim, value));
    }
    key
}

fn series_label(
    metric_key: &str,
    dimensions: &DimensionValues,
    group_by: &[String],
    multi_metric: bool,
) -> String {
    if group_by.is_empty() {
        return metric_key.to_string();
    }
    let category = category_label(dimensions, group_by);
    if multi_metric {
        format!("{} · {}", metric_key, category)
    } else {
        category
    }
}

fn include_year(mode: LabelMode, first: Option<DateTime<Utc>>, last: Option<DateTime<Utc>>) -> bool {
    match mode {
        LabelMode::Full => true,
        LabelMode::Short => false,
        LabelMode::Auto => match (first, last) {
            (Some(first), Some(last)) => first.year() != last.year(),
            _ => false,
        },
    }
}

/// X-axis label for a time bucket.
pub fn bucket_label(ts: DateTime<Utc>, grain: Grain, with_year: bool) -> String {
    if grain.is_intraday() {
        return if with_year {
            ts.format("%b %-d, %Y %H:%M").to_string()
        } else {
            ts.format("%b %-d %H:%M").to_string()
        };
    }
    match grain {
        Grain::Month => {
            if with_year {
                ts.format("%b %Y").to_string()
            } else {
                ts.format("%b").to_string()
            }
        }
        Grain::Quarter => {
            let quarter = (ts.month() - 1) / 3 + 1;
            if with_year {
                format!("Q{} {}", quarter, ts.year())
            } else {
                format!("Q{}", quarter)
            }
        }
        _ => {
            if with_year {
                ts.format("%b %-d, %Y").to_string()
            } else {
                ts.format("%b %-d").to_string()
            }
        }
    }
}

/// Merge series into one row per bucket, one column per series.
///
/// A lone series also gets a previous-bucket comparison column and a summary.
pub fn shape_timeseries(
    series: &[SeriesResult],
    metric_keys: &[String],
    group_by: &[String],
    grain: Grain,
    label_mode: LabelMode,
    range: Option<TimeRange>,
) -> TileSeriesData {
    let multi_metric = metric_keys.len() > 1;
    let definitions: Vec<SeriesDefinition> = series
        .iter()
        .map(|s| SeriesDefinition {
            key: series_key(&s.metric_key, &s.dimensions, group_by),
            metric_key: s.metric_key.clone(),
            label: series_label(&s.metric_key, &s.dimensions, group_by, multi_metric),
            dimensions: s.dimensions.clone(),
        })
        .collect();

    let mut buckets: BTreeMap<DateTime<Utc>, BTreeMap<String, Option<f64>>> = BTreeMap::new();
    for (s, def) in series.iter().zip(&definitions) {
        for point in &s.points {
            buckets
                .entry(point.time_start_ts)
                .or_default()
                .insert(def.key.clone(), point.value);
        }
    }

    // The visible window decides, falling back to the returned buckets.
    let (first, last) = match range {
        Some((start, end)) => (Some(start), Some(end)),
        None => (
            buckets.keys().next().copied(),
            buckets.keys().next_back().copied(),
        ),
    };
    let with_year = include_year(label_mode, first, last);

    let mut rows: Vec<ChartRow> = buckets
        .into_iter()
        .map(|(ts, values)| ChartRow {
            key: ts.to_rfc3339(),
            label: bucket_label(ts, grain, with_year),
            time_start_ts: Some(ts),
            values,
            comparison: None,
        })
        .collect();

    let mut summary = None;
    if let [only] = definitions.as_slice() {
        let mut previous: Option<f64> = None;
        for row in rows.iter_mut() {
            row.comparison = previous;
            previous = row.values.get(&only.key).copied().flatten();
        }

        let observed: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.values.get(&only.key).copied().flatten())
            .collect();
        summary = match observed.as_slice() {
            [] => None,
            [current] => Some(Summary::single(*current)),
            [.., previous, current] => Some(Summary::compared(*current, *previous)),
        };
    }

    TileSeriesData {
        metrics: metric_keys.to_vec(),
        primary_metric: metric_keys.first().cloned(),
        series: definitions,
        rows,
        groups: Vec::new(),
        summary,
    }
}

/// One row per category, one column per metric.
pub fn shape_aggregate(
    groups: &[AggregateGroup],
    metric_keys: &[String],
    group_by: &[String],
) -> TileSeriesData {
    let definitions: Vec<SeriesDefinition> = metric_keys
        .iter()
        .map(|key| SeriesDefinition {
            key: key.clone(),
            metric_key: key.clone(),
            label: key.clone(),
            dimensions: DimensionValues::new(),
        })
        .collect();

    let mut rows: Vec<ChartRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for group in groups {
        let label = category_label(&group.dimensions, group_by);
        let slot = *index.entry(label.clone()).or_insert_with(|| {
            rows.push(ChartRow {
                key: label.clone(),
                label: label.clone(),
                time_start_ts: None,
                values: BTreeMap::new(),
                comparison: None,
            });
            rows.len() - 1
        });
        let cell = rows[slot].values.entry(group.metric_key.clone()).or_insert(None);
        if let Some(value) = group.value {
            *cell = Some(cell.unwrap_or(0.0) + value);
        }
    }

    let summary = match metric_keys {
        [metric] => {
            let total: f64 = groups
                .iter()
                .filter(|g| &g.metric_key == metric)
                .filter_map(|g| g.value)
                .sum();
            Some(Summary::single(total))
        }
        _ => None,
    };

    TileSeriesData {
        metrics: metric_keys.to_vec(),
        primary_metric: metric_keys.first().cloned(),
        series: definitions,
        rows,
        groups: groups.to_vec(),
        summary,
    }
}

/// A single latest observation.
pub fn shape_latest(metric_key: &str, latest: &LatestValue, grain: Grain) -> TileSeriesData {
    let mut values = BTreeMap::new();
    values.insert(metric_key.to_string(), latest.value);
    let rows = latest
        .time_start_ts
        .map(|ts| ChartRow {
            key: ts.to_rfc3339(),
            label: bucket_label(ts, grain, true),
            time_start_ts: Some(ts),
            values,
            comparison: None,
        })
        .into_iter()
        .collect();

    TileSeriesData {
        metrics: vec![metric_key.to_string()],
        primary_metric: Some(metric_key.to_string()),
        series: vec![SeriesDefinition {
            key: metric_key.to_string(),
            metric_key: metric_key.to_string(),
            label: metric_key.to_string(),
            dimensions: DimensionValues::new(),
        }],
        rows,
        groups: Vec::new(),
        summary: latest.value.map(Summary::single),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::SeriesPoint;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn dims(pairs: &[(&str, Option<&str>)]) -> DimensionValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    fn series(metric: &str, d: DimensionValues, points: &[(DateTime<Utc>, f64)]) -> SeriesResult {
        SeriesResult {
            metric_key: metric.to_string(),
            dimensions: d,
            points: points
                .iter()
                .map(|(t, v)| SeriesPoint { time_start_ts: *t, value: Some(*v) })
                .collect(),
        }
    }

    #[test]
    fn test_single_series_summary_and_comparison() {
        let s = series("revenue", DimensionValues::new(), &[(ts(2024, 1, 1), 10.0), (ts(2024, 1, 2), 15.0)]);
        let data = shape_timeseries(&[s], &["revenue".into()], &[], Grain::Day, LabelMode::Auto, None);

        let summary = data.summary.unwrap();
        assert_eq!(summary.current, 15.0);
        assert_eq!(summary.change, 5.0);
        assert_eq!(summary.change_pct, 50.0);
        assert_eq!(data.rows[0].comparison, None);
        assert_eq!(data.rows[1].comparison, Some(10.0));
        assert_eq!(data.rows[1].label, "Jan 2");
    }

    #[test]
    fn test_series_merge_by_bucket() {
        let group_by = vec!["geo".to_string()];
        let us = series("revenue", dims(&[("geo", Some("US"))]), &[(ts(2024, 1, 1), 1.0), (ts(2024, 1, 2), 2.0)]);
        let eu = series("revenue", dims(&[("geo", Some("EU"))]), &[(ts(2024, 1, 2), 3.0)]);
        let data = shape_timeseries(&[us, eu], &["revenue".into()], &group_by, Grain::Day, LabelMode::Short, None);

        assert_eq!(data.series.len(), 2);
        assert_eq!(data.series[0].key, "revenue|geo=US");
        assert_eq!(data.series[1].label, "EU");
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].values.len(), 1);
        assert_eq!(data.rows[1].values["revenue|geo=EU"], Some(3.0));
        assert!(data.summary.is_none());
    }

    #[test]
    fn test_auto_labels_add_year_across_years() {
        let s = series("m", DimensionValues::new(), &[(ts(2023, 12, 31), 1.0), (ts(2024, 1, 1), 2.0)]);
        let data = shape_timeseries(&[s], &["m".into()], &[], Grain::Day, LabelMode::Auto, None);
        assert_eq!(data.rows[0].label, "Dec 31, 2023");

        let window = (ts(2023, 12, 1), ts(2024, 1, 31));
        let s = series("m", DimensionValues::new(), &[(ts(2024, 1, 1), 2.0)]);
        let data = shape_timeseries(&[s], &["m".into()], &[], Grain::Day, LabelMode::Auto, Some(window));
        assert_eq!(data.rows[0].label, "Jan 1, 2024");

        assert_eq!(bucket_label(ts(2024, 5, 1), Grain::Quarter, false), "Q2");
        assert_eq!(bucket_label(ts(2024, 5, 1), Grain::Hour, false), "May 1 00:00");
        assert_eq!(bucket_label(ts(2024, 5, 1), Grain::Month, true), "May 2024");
    }

    #[test]
    fn test_aggregate_categories_and_total() {
        let groups = vec![
            AggregateGroup { metric_key: "m".into(), dimensions: dims(&[("geo", Some("US"))]), value: Some(40.0) },
            AggregateGroup { metric_key: "m".into(), dimensions: dims(&[("geo", Some("EU"))]), value: Some(60.0) },
        ];
        let data = shape_aggregate(&groups, &["m".into()], &["geo".into()]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].label, "US");
        assert_eq!(data.summary.unwrap().current, 100.0);
        assert_eq!(data.groups.len(), 2);
    }

    #[test]
    fn test_category_label_fallbacks() {
        assert_eq!(category_label(&DimensionValues::new(), &[]), "Total");
        let blank = dims(&[("geo", Some(" ")), ("tier", None)]);
        assert_eq!(category_label(&blank, &["geo".into(), "tier".into()]), "Unknown");
        let both = dims(&[("geo", Some("US")), ("tier", Some("pro"))]);
        assert_eq!(category_label(&both, &["geo".into(), "tier".into()]), "US / pro");
    }

    #[test]
    fn test_multi_metric_aggregate_has_no_summary() {
        let groups = vec![
            AggregateGroup { metric_key: "a".into(), dimensions: DimensionValues::new(), value: Some(1.0) },
            AggregateGroup { metric_key: "b".into(), dimensions: DimensionValues::new(), value: Some(2.0) },
        ];
        let data = shape_aggregate(&groups, &["a".into(), "b".into()], &[]);
        assert_eq!(data.rows.len(), 1);
        assert_eq!(data.rows[0].label, "Total");
        assert_eq!(data.rows[0].values["b"], Some(2.0));
        assert!(data.summary.is_none());
    }

    #[test]
    fn test_latest_value() {
        let latest = LatestValue { value: Some(7.0), time_start_ts: Some(ts(2024, 3, 1)) };
        let data = shape_latest("m", &latest, Grain::Day);
        let summary = data.summary.unwrap();
        assert_eq!((summary.current, summary.change, summary.change_pct), (7.0, 0.0, 0.0));
        assert_eq!(data.rows.len(), 1);
    }
}
