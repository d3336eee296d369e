use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{DashboardError, Result};
use crate::expressions::year_quarter;
use crate::figures::friendly_label;

/// Reporting period selected for the heat map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub quarter: u32,
}

impl Period {
    pub fn new(year: i32, quarter: u32) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(DashboardError::InvalidPeriod(year_quarter(year, quarter)));
        }
        Ok(Self { year, quarter })
    }
}

impl FromStr for Period {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DashboardError::InvalidPeriod(s.to_string());
        let mut parts = s.split_whitespace();
        let (Some(year), Some(quarter), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let quarter = quarter.strip_prefix('Q').ok_or_else(invalid)?;
        if quarter.len() != 1 {
            return Err(invalid());
        }
        let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
        Self::new(year, quarter).map_err(|_| invalid())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&year_quarter(self.year, self.quarter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandGeneric {
    Brand,
    Generic,
}

impl BrandGeneric {
    /// `WHERE` predicate over the `is_brand` column.
    pub fn predicate(self) -> &'static str {
        match self {
            Self::Brand => "is_brand",
            Self::Generic => "NOT is_brand",
        }
    }
}

impl FromStr for BrandGeneric {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brand" | "brands" => Ok(Self::Brand),
            "generic" | "generics" => Ok(Self::Generic),
            _ => Err(DashboardError::invalid_filter("brand_generic", s)),
        }
    }
}

/// Reimbursement channel. Display labels and lowercase codes both parse to
/// the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilizationType {
    FeeForService,
    ManagedCare,
}

impl UtilizationType {
    /// `WHERE` predicate over the `is_ffsu` column.
    pub fn predicate(self) -> &'static str {
        match self {
            Self::FeeForService => "is_ffsu",
            Self::ManagedCare => "NOT is_ffsu",
        }
    }
}

impl FromStr for UtilizationType {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fee-for-service" | "fee for service" | "ffsu" => Ok(Self::FeeForService),
            "managed care" | "managed-care" | "mcou" => Ok(Self::ManagedCare),
            _ => Err(DashboardError::invalid_filter("utilization_type", s)),
        }
    }
}

/// Which drugs the drug catalog lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrugScope {
    #[default]
    All,
    Brand,
    Generic,
}

impl DrugScope {
    pub fn brand_filter(self) -> Option<BrandGeneric> {
        match self {
            Self::All => None,
            Self::Brand => Some(BrandGeneric::Brand),
            Self::Generic => Some(BrandGeneric::Generic),
        }
    }
}

impl FromStr for DrugScope {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "brand" | "brands" => Ok(Self::Brand),
            "generic" | "generics" => Ok(Self::Generic),
            _ => Err(DashboardError::invalid_filter("how", s)),
        }
    }
}

/// Map row column that colors the heat map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    PaymentPerUnit,
    MarkupPerUnit,
    MarkupPercentile,
    PaymentPerUnitPercentile,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::PaymentPerUnit,
        Metric::MarkupPerUnit,
        Metric::MarkupPercentile,
        Metric::PaymentPerUnitPercentile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PaymentPerUnit => "payment_per_unit",
            Self::MarkupPerUnit => "markup_per_unit",
            Self::MarkupPercentile => "markup_percentile",
            Self::PaymentPerUnitPercentile => "payment_per_unit_percentile",
        }
    }

    pub fn label(self) -> String {
        friendly_label(self.name())
    }

    pub fn is_percentile(self) -> bool {
        matches!(self, Self::MarkupPercentile | Self::PaymentPerUnitPercentile)
    }
}

impl FromStr for Metric {
    type Err = DashboardError;

    /// Accepts `payment_per_unit` as well as the dropdown label
    /// `Payment Per Unit`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace(' ', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == normalized)
            .ok_or_else(|| DashboardError::invalid_filter("metric", s))
    }
}

/// Parses an optional control value; `None` and blank strings mean absent.
pub fn parse_optional<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = DashboardError>,
{
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

/// Blank strings are treated as absent.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
