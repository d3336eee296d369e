use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;

use super::{Totals, TotalsAcc};
use crate::dataset::{BaseDataset, FactQuery, FactRow};
use crate::error::{DashboardError, Result};
use crate::expressions::{make_date, markup_per_unit, payment_per_unit, weighted_nadac_per_unit};
use crate::filters::{BrandGeneric, UtilizationType, non_empty, parse_optional};
use crate::geo::normalize_state_code;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrendFilters {
    pub state: Option<String>,
    pub drug: Option<String>,
    pub brand_generic: Option<BrandGeneric>,
    pub utilization_type: Option<UtilizationType>,
}

impl TrendFilters {
    pub fn parse(
        state: Option<&str>,
        drug: Option<&str>,
        brand_generic: Option<&str>,
        utilization_type: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            state: non_empty(state).map(normalize_state_code),
            drug: non_empty(drug).map(str::to_string),
            brand_generic: parse_optional(brand_generic)?,
            utilization_type: parse_optional(utilization_type)?,
        })
    }

    fn to_query(&self) -> FactQuery {
        FactQuery {
            state: self.state.clone(),
            drug: self.drug.clone(),
            brand_generic: self.brand_generic,
            utilization_type: self.utilization_type,
            require_nadac: true,
            ..Default::default()
        }
    }
}

/// One reporting quarter, dated to its first day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: Totals,
    pub payment_per_unit: Option<f64>,
    pub weighted_nadac_per_unit: Option<f64>,
    pub markup_per_unit: Option<f64>,
}

/// Groups fact rows by quarter start date. Rows without a benchmark total
/// never contribute. Output is strictly increasing by date.
pub fn aggregate_trend(rows: &[FactRow]) -> Result<Vec<TrendRow>> {
    let mut groups: BTreeMap<NaiveDate, TotalsAcc> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.weighted_nadac_total.is_some()) {
        let date = make_date(row.year, row.quarter).ok_or_else(|| {
            DashboardError::Query(format!(
                "fact row has invalid period year={} quarter={}",
                row.year, row.quarter
            ))
        })?;
        groups.entry(date).or_default().add(row);
    }

    Ok(groups
        .into_iter()
        .map(|(date, acc)| {
            let totals = acc.finish();
            let payment = payment_per_unit(totals.total_amt, totals.units);
            let nadac = weighted_nadac_per_unit(totals.weighted_nadac_total, totals.units);
            TrendRow {
                date,
                totals,
                payment_per_unit: payment,
                weighted_nadac_per_unit: nadac,
                markup_per_unit: markup_per_unit(payment, nadac),
            }
        })
        .collect())
}

pub fn compute_trend(dataset: &BaseDataset, filters: &TrendFilters) -> Result<Vec<TrendRow>> {
    let t0 = Instant::now();
    let facts = dataset.scan(&filters.to_query())?;
    let rows = aggregate_trend(&facts)?;
    tracing::info!(
        state = filters.state.as_deref().unwrap_or("all"),
        drug = filters.drug.as_deref().unwrap_or("all"),
        "Trend aggregate: {} fact rows -> {} quarters in {:.3}s",
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

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn groups_by_quarter_start_and_sorts() {
        let rows = aggregate_trend(&[
            fact(2024, 1, "OH", 10.0, 30.0, Some(20.0)),
            fact(2023, 4, "OH", 10.0, 20.0, Some(10.0)),
            fact(2024, 1, "TX", 10.0, 10.0, Some(10.0)),
            fact(2023, 3, "OH", 4.0, 8.0, Some(4.0)),
        ])
        .unwrap();
        let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(2023, 7), date(2023, 10), date(2024, 1)]);

        let q1 = &rows[2];
        assert_eq!(q1.totals.units, Some(20.0));
        assert_eq!(q1.payment_per_unit, Some(2.0));
        assert_eq!(q1.weighted_nadac_per_unit, Some(1.5));
        assert_eq!(q1.markup_per_unit, Some(0.5));
    }

    #[test]
    fn rows_without_benchmark_are_excluded() {
        let rows = aggregate_trend(&[
            fact(2023, 1, "OH", 100.0, 1000.0, None),
            fact(2023, 1, "OH", 10.0, 20.0, Some(10.0)),
            fact(2023, 2, "OH", 10.0, 20.0, None),
        ])
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].totals.units, Some(10.0));
        assert_eq!(rows[0].payment_per_unit, Some(2.0));
    }

    #[test]
    fn invalid_quarter_is_an_error() {
        let err = aggregate_trend(&[fact(2023, 5, "OH", 1.0, 1.0, Some(1.0))]).unwrap_err();
        assert!(matches!(err, DashboardError::Query(_)));
    }

    #[test]
    fn parse_resolves_state_names() {
        let f = TrendFilters::parse(Some("Ohio"), None, Some("Generic"), Some("ffsu")).unwrap();
        assert_eq!(f.state.as_deref(), Some("OH"));
        assert_eq!(f.brand_generic, Some(BrandGeneric::Generic));
        assert_eq!(f.utilization_type, Some(UtilizationType::FeeForService));
        assert_eq!(TrendFilters::parse(None, None, None, None).unwrap(), TrendFilters::default());
    }
}
