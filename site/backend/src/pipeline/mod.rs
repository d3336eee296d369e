//! Scan-then-aggregate pipelines feeding the two dashboard charts.
//!
//! Both pipelines scan the fact table with filters pushed down, fold the
//! rows into a `BTreeMap` keyed by the group, round the summed columns and
//! then derive metrics with [`crate::expressions`].

pub mod map;
pub mod trend;

use serde::Serialize;

use crate::dataset::FactRow;
use crate::expressions::{AMOUNT_DECIMALS, round_to};

pub use map::{MapFilters, MapRow, aggregate_map, compute_map};
pub use trend::{TrendFilters, TrendRow, aggregate_trend, compute_trend};

/// Sum of one nullable column; stays `None` until a non-null value is added.
#[derive(Debug, Clone, Copy, Default)]
struct ColumnSum(Option<f64>);

impl ColumnSum {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.0 = Some(self.0.unwrap_or(0.0) + v);
        }
    }

    fn finish(self) -> Option<f64> {
        self.0.map(|v| round_to(v, AMOUNT_DECIMALS))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TotalsAcc {
    units: ColumnSum,
    rx_ct: ColumnSum,
    total_amt: ColumnSum,
    weighted_nadac_total: ColumnSum,
}

impl TotalsAcc {
    fn add(&mut self, row: &FactRow) {
        self.units.add(row.units);
        self.rx_ct.add(row.rx_ct);
        self.total_amt.add(row.total_amt);
        self.weighted_nadac_total.add(row.weighted_nadac_total);
    }

    fn finish(self) -> Totals {
        Totals {
            units: self.units.finish(),
            rx_ct: self.rx_ct.finish(),
            total_amt: self.total_amt.finish(),
            weighted_nadac_total: self.weighted_nadac_total.finish(),
        }
    }
}

/// Summed volume and amount columns of one group, rounded to 4 places.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Totals {
    pub units: Option<f64>,
    pub rx_ct: Option<f64>,
    pub total_amt: Option<f64>,
    pub weighted_nadac_total: Option<f64>,
}

#[cfg(test)]
pub(crate) fn fact(
    year: i32,
    quarter: u32,
    state: &str,
    units: f64,
    total_amt: f64,
    weighted_nadac_total: Option<f64>,
) -> FactRow {
    FactRow {
        year,
        quarter,
        state: state.to_string(),
        units: Some(units),
        rx_ct: Some(1.0),
        total_amt: Some(total_amt),
        weighted_nadac_total,
    }
}
