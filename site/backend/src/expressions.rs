//! Derived-metric formulas applied after grouping.
//!
//! Every function here is pure and works on already-summed values, so the
//! map and trend pipelines share one definition of each metric. Missing or
//! zero denominators yield `None` instead of an error.

use chrono::NaiveDate;

/// Decimal places kept for summed columns and per-unit metrics.
pub const AMOUNT_DECIMALS: i32 = 4;

/// Decimal places kept for percentiles.
pub const PERCENTILE_DECIMALS: i32 = 2;

/// Percentiles below this are raised to exactly this value so a zero-valued
/// state does not stretch the heat map color scale.
pub const PERCENTILE_FLOOR: f64 = 0.01;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn per_unit(amount: Option<f64>, units: Option<f64>) -> Option<f64> {
    let units = units.filter(|u| *u != 0.0)?;
    let value = amount? / units;
    value
        .is_finite()
        .then(|| round_to(value, AMOUNT_DECIMALS))
}

/// `round(total_amt / units, 4)`.
pub fn payment_per_unit(total_amt: Option<f64>, units: Option<f64>) -> Option<f64> {
    per_unit(total_amt, units)
}

/// `round(weighted_nadac_total / units, 4)`.
pub fn weighted_nadac_per_unit(
    weighted_nadac_total: Option<f64>,
    units: Option<f64>,
) -> Option<f64> {
    per_unit(weighted_nadac_total, units)
}

/// `round(payment_per_unit - weighted_nadac_per_unit, 4)`.
pub fn markup_per_unit(
    payment_per_unit: Option<f64>,
    weighted_nadac_per_unit: Option<f64>,
) -> Option<f64> {
    Some(round_to(
        payment_per_unit? - weighted_nadac_per_unit?,
        AMOUNT_DECIMALS,
    ))
}

/// Ascending 1-based ranks; ties share the average of the positions they
/// occupy. `None` values are left unranked.
pub fn average_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut ranked: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| v.map(|v| (idx, v)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut out = vec![None; values.len()];
    let mut start = 0;
    while start < ranked.len() {
        let mut end = start + 1;
        while end < ranked.len() && ranked[end].1 == ranked[start].1 {
            end += 1;
        }
        // positions start+1 ..= end share one rank
        let rank = (start + 1 + end) as f64 / 2.0;
        for &(idx, _) in &ranked[start..end] {
            out[idx] = Some(rank);
        }
        start = end;
    }
    out
}

/// `(rank - 1) / max_rank`, floored at [`PERCENTILE_FLOOR`], rounded to 2
/// places.
pub fn percentile_from_rank(rank: f64, max_rank: f64) -> f64 {
    let percentile = (rank - 1.0) / max_rank;
    let percentile = if percentile < PERCENTILE_FLOOR {
        PERCENTILE_FLOOR
    } else {
        percentile
    };
    round_to(percentile, PERCENTILE_DECIMALS)
}

/// Rank-based percentile of every value within the given row set.
pub fn percentiles(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let ranks = average_ranks(values);
    let max_rank = ranks.iter().flatten().copied().reduce(f64::max);
    ranks
        .into_iter()
        .map(|rank| Some(percentile_from_rank(rank?, max_rank?)))
        .collect()
}

/// Display label for a reporting period, e.g. `"2023 Q2"`.
pub fn year_quarter(year: i32, quarter: u32) -> String {
    format!("{year} Q{quarter}")
}

/// First calendar month of a quarter: 1, 4, 7 or 10.
pub fn quarter_start_month(quarter: u32) -> Option<u32> {
    (1..=4)
        .contains(&quarter)
        .then(|| (quarter - 1) * 3 + 1)
}

/// First day of the quarter's first month.
pub fn make_date(year: i32, quarter: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, quarter_start_month(quarter)?, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_per_unit_rounds_to_four_places() {
        assert_eq!(payment_per_unit(Some(390.0), Some(150.0)), Some(2.6));
        assert_eq!(payment_per_unit(Some(10.0), Some(3.0)), Some(3.3333));
    }

    #[test]
    fn per_unit_is_none_without_volume() {
        assert_eq!(payment_per_unit(Some(10.0), Some(0.0)), None);
        assert_eq!(payment_per_unit(Some(10.0), None), None);
        assert_eq!(weighted_nadac_per_unit(None, Some(5.0)), None);
    }

    #[test]
    fn markup_propagates_missing_inputs() {
        assert_eq!(markup_per_unit(Some(2.6), Some(1.1)), Some(1.5));
        assert_eq!(markup_per_unit(Some(2.6), None), None);
        assert_eq!(markup_per_unit(None, Some(1.0)), None);
    }

    #[test]
    fn ties_share_average_rank() {
        let ranks = average_ranks(&[Some(3.0), Some(1.0), Some(3.0), None, Some(2.0)]);
        assert_eq!(ranks, vec![Some(3.5), Some(1.0), Some(3.5), None, Some(2.0)]);
    }

    #[test]
    fn single_value_percentile_is_floored() {
        assert_eq!(percentiles(&[Some(5.0)]), vec![Some(0.01)]);
    }

    #[test]
    fn percentiles_stay_in_unit_range() {
        let values: Vec<Option<f64>> = (0..7).map(|v| Some(v as f64)).collect();
        let out = percentiles(&values);
        assert_eq!(out[0], Some(0.01));
        assert_eq!(out[6], Some(0.86));
        for p in out.into_iter().flatten() {
            assert!((PERCENTILE_FLOOR..=1.0).contains(&p));
        }
    }

    #[test]
    fn missing_values_have_no_percentile() {
        assert_eq!(percentiles(&[None, Some(1.0)]), vec![None, Some(0.01)]);
        assert!(percentiles(&[]).is_empty());
    }

    #[test]
    fn year_quarter_label() {
        assert_eq!(year_quarter(2023, 2), "2023 Q2");
    }

    #[test]
    fn make_date_uses_quarter_start() {
        let d = |m| NaiveDate::from_ymd_opt(2024, m, 1);
        assert_eq!(make_date(2024, 1), d(1));
        assert_eq!(make_date(2024, 2), d(4));
        assert_eq!(make_date(2024, 3), d(7));
        assert_eq!(make_date(2024, 4), d(10));
        assert_eq!(make_date(2024, 5), None);
        assert_eq!(make_date(2024, 0), None);
    }
}
