use chrono::NaiveDate;
use serde::Serialize;

use crate::filters::Metric;
use crate::pipeline::{MapRow, TrendRow};

pub const DASHBOARD_TITLE: &str = "NADAC Heat Map Dashboard";
pub const DATA_UPDATED: &str = "October 2025";
pub const LINE_CHART_TITLE: &str = "Payment per unit and Weighted NADAC over time";

/// `markup_per_unit` -> `Markup Per Unit`.
pub fn friendly_label(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Currency,
    Percent,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatMapFigure {
    pub metric: Metric,
    pub label: String,
    pub colorbar_title: String,
    pub value_format: ValueFormat,
    /// State codes; states absent here render as "no data".
    pub locations: Vec<String>,
    pub values: Vec<Option<f64>>,
    pub rows: Vec<MapRow>,
}

pub fn heat_map(rows: Vec<MapRow>, metric: Metric) -> HeatMapFigure {
    let label = metric.label();
    let (colorbar_title, value_format) = if metric.is_percentile() {
        (label.clone(), ValueFormat::Percent)
    } else {
        (format!("{label} (USD)"), ValueFormat::Currency)
    };
    HeatMapFigure {
        metric,
        label,
        colorbar_title,
        value_format,
        locations: rows.iter().map(|r| r.state.clone()).collect(),
        values: rows.iter().map(|r| r.metric(metric)).collect(),
        rows,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub y: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineChartFigure {
    pub title: &'static str,
    pub x: Vec<NaiveDate>,
    pub series: Vec<LineSeries>,
    pub rows: Vec<TrendRow>,
}

pub fn line_chart(rows: Vec<TrendRow>) -> LineChartFigure {
    let series = vec![
        LineSeries {
            name: friendly_label("payment_per_unit"),
            y: rows.iter().map(|r| r.payment_per_unit).collect(),
        },
        LineSeries {
            name: friendly_label("weighted_nadac_per_unit"),
            y: rows.iter().map(|r| r.weighted_nadac_per_unit).collect(),
        },
    ];
    LineChartFigure {
        title: LINE_CHART_TITLE,
        x: rows.iter().map(|r| r.date).collect(),
        series,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Totals, aggregate_map};
    use crate::pipeline::fact;

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(friendly_label("payment_per_unit"), "Payment Per Unit");
        assert_eq!(friendly_label("weighted_nadac_per_unit"), "Weighted Nadac Per Unit");
    }

    #[test]
    fn heat_map_picks_metric_column() {
        let rows = aggregate_map(&[
            fact(2023, 1, "OH", 10.0, 30.0, Some(10.0)),
            fact(2023, 1, "CA", 10.0, 20.0, Some(10.0)),
        ]);
        let fig = heat_map(rows, Metric::MarkupPerUnit);
        assert_eq!(fig.locations, vec!["CA", "OH"]);
        assert_eq!(fig.values, vec![Some(1.0), Some(2.0)]);
        assert_eq!(fig.colorbar_title, "Markup Per Unit (USD)");
        assert_eq!(fig.value_format, ValueFormat::Currency);

        let fig = heat_map(fig.rows, Metric::MarkupPercentile);
        assert_eq!(fig.colorbar_title, "Markup Percentile");
        assert_eq!(fig.value_format, ValueFormat::Percent);
        assert_eq!(fig.values, vec![Some(0.01), Some(0.5)]);
    }

    #[test]
    fn line_chart_has_two_series() {
        let row = TrendRow {
            date: NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
            totals: Totals::default(),
            payment_per_unit: Some(2.0),
            weighted_nadac_per_unit: Some(1.5),
            markup_per_unit: Some(0.5),
        };
        let fig = line_chart(vec![row]);
        assert_eq!(fig.series.len(), 2);
        assert_eq!(fig.series[0].name, "Payment Per Unit");
        assert_eq!(fig.series[1].y, vec![Some(1.5)]);
        assert_eq!(fig.x.len(), 1);
    }
}
