use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use super::{Totals, TotalsAcc};
use crate::dataset::{BaseDataset, FactQuery, FactRow};
use crate::error::Result;
use crate::expressions::{markup_per_unit, payment_per_unit, percentiles, weighted_nadac_per_unit};
use crate::filters::{BrandGeneric, Metric, Period, UtilizationType, non_empty, parse_optional};
use crate::geo;

#[derive(Debug, Clone, PartialEq)]
pub struct MapFilters {
    pub period: Period,
    pub drug: Option<String>,
    pub brand_generic: Option<BrandGeneric>,
    pub utilization_type: Option<UtilizationType>,
}

impl MapFilters {
    /// Builds filters from raw control values. The period is mandatory and
    /// a malformed label is an error, never an empty result.
    pub fn parse(
        period: &str,
        drug: Option<&str>,
        brand_generic: Option<&str>,
        utilization_type: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            period: period.parse()?,
            drug: non_empty(drug).map(str::to_string),
            brand_generic: parse_optional(brand_generic)?,
            utilization_type: parse_optional(utilization_type)?,
        })
    }

    fn to_query(&self) -> FactQuery {
        FactQuery {
            period: Some(self.period),
            drug: self.drug.clone(),
            brand_generic: self.brand_generic,
            utilization_type: self.utilization_type,
            ..Default::default()
        }
    }
}

/// One state for the selected period and filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRow {
    pub state: String,
    pub state_name: String,
    #[serde(flatten)]
    pub totals: Totals,
    pub payment_per_unit: Option<f64>,
    pub markup_per_unit: Option<f64>,
    pub markup_percentile: Option<f64>,
    pub payment_per_unit_percentile: Option<f64>,
}

impl MapRow {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::PaymentPerUnit => self.payment_per_unit,
            Metric::MarkupPerUnit => self.markup_per_unit,
            Metric::MarkupPercentile => self.markup_percentile,
            Metric::PaymentPerUnitPercentile => self.payment_per_unit_percentile,
        }
    }
}

/// Groups already-filtered fact rows by state and derives the heat map
/// metrics. Percentiles are ranked across the returned rows only; states
/// without matching rows are absent.
pub fn aggregate_map(rows: &[FactRow]) -> Vec<MapRow> {
    let mut groups: BTreeMap<&str, TotalsAcc> = BTreeMap::new();
    for row in rows {
        groups.entry(row.state.as_str()).or_default().add(row);
    }

    let mut out: Vec<MapRow> = groups
        .into_iter()
        .map(|(state, acc)| {
            let totals = acc.finish();
            let payment = payment_per_unit(totals.total_amt, totals.units);
            let nadac = weighted_nadac_per_unit(totals.weighted_nadac_total, totals.units);
            MapRow {
                state: state.to_string(),
                state_name: geo::display_name(state),
                totals,
                payment_per_unit: payment,
                markup_per_unit: markup_per_unit(payment, nadac),
                markup_percentile: None,
                payment_per_unit_percentile: None,
            }
        })
        .collect();

    let markups: Vec<Option<f64>> = out.iter().map(|r| r.markup_per_unit).collect();
    let payments: Vec<Option<f64>> = out.iter().map(|r| r.payment_per_unit).collect();
    for ((row, markup_pct), payment_pct) in out
        .iter_mut()
        .zip(percentiles(&markups))
        .zip(percentiles(&payments))
    {
        row.markup_percentile = markup_pct;
        row.payment_per_unit_percentile = payment_pct;
    }
    out
}

/// Heat map aggregate: one row per state present after filtering, ordered
/// by state code.
pub fn compute_map(dataset: &BaseDataset, filters: &MapFilters) -> Result<Vec<MapRow>> {
    let t0 = Instant::now();
    let facts = dataset.scan(&filters.to_query())?;
    let rows = aggregate_map(&facts);
    tracing::info!(
        period = %filters.period,
        drug = filters.drug.as_deref().unwrap_or("all"),
        "Map aggregate: {} fact rows -> {} states in {:.3}s",
        facts.len(),
        rows.len(),
        t0.elapsed().as_secs_f64()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fact;

    #[test]
    fn sums_per_state() {
        let rows = aggregate_map(&[
            fact(2023, 2, "OH", 100.0, 250.0, None),
            fact(2023, 2, "OH", 50.0, 140.0, None),
        ]);
        assert_eq!(rows.len(), 1);
        let oh = &rows[0];
        assert_eq!(oh.state, "OH");
        assert_eq!(oh.state_name, "Ohio");
        assert_eq!(oh.totals.units, Some(150.0));
        assert_eq!(oh.totals.total_amt, Some(390.0));
        assert_eq!(oh.payment_per_unit, Some(2.6));
        assert_eq!(oh.markup_per_unit, None);
        assert_eq!(oh.payment_per_unit_percentile, Some(0.01));
    }

    #[test]
    fn single_state_percentiles_hit_the_floor() {
        let rows = aggregate_map(&[fact(2023, 1, "TX", 10.0, 60.0, Some(10.0))]);
        assert_eq!(rows[0].markup_per_unit, Some(5.0));
        assert_eq!(rows[0].markup_percentile, Some(0.01));
        assert_eq!(rows[0].payment_per_unit_percentile, Some(0.01));
    }

    #[test]
    fn percentiles_rank_across_states() {
        let rows = aggregate_map(&[
            fact(2023, 1, "CA", 10.0, 10.0, Some(10.0)),
            fact(2023, 1, "NY", 10.0, 20.0, Some(10.0)),
            fact(2023, 1, "OH", 10.0, 30.0, Some(10.0)),
            fact(2023, 1, "TX", 10.0, 40.0, Some(10.0)),
        ]);
        let pct: Vec<_> = rows.iter().map(|r| r.payment_per_unit_percentile).collect();
        assert_eq!(pct, vec![Some(0.01), Some(0.25), Some(0.5), Some(0.75)]);
        let markup: Vec<_> = rows.iter().map(|r| r.markup_percentile).collect();
        assert_eq!(markup, pct);
    }

    #[test]
    fn zero_volume_state_has_no_metrics() {
        let rows = aggregate_map(&[
            fact(2023, 1, "CA", 0.0, 10.0, Some(1.0)),
            fact(2023, 1, "NY", 5.0, 10.0, Some(1.0)),
        ]);
        assert_eq!(rows[0].payment_per_unit, None);
        assert_eq!(rows[0].payment_per_unit_percentile, None);
        assert_eq!(rows[0].metric(Metric::MarkupPerUnit), None);
        assert_eq!(rows[1].payment_per_unit, Some(2.0));
        assert_eq!(rows[1].payment_per_unit_percentile, Some(0.01));
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(aggregate_map(&[]).is_empty());
    }

    #[test]
    fn parse_treats_blank_as_absent() {
        let f = MapFilters::parse("2023 Q2", Some(""), None, Some("Managed Care")).unwrap();
        assert_eq!(f.period, Period::new(2023, 2).unwrap());
        assert_eq!(f.drug, None);
        assert_eq!(f.brand_generic, None);
        assert_eq!(f.utilization_type, Some(UtilizationType::ManagedCare));
        assert!(MapFilters::parse("2023", None, None, None).is_err());
    }
}
