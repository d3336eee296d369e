//! Read-only access to the fact table.
//!
//! The parquet file is attached once as a DuckDB view in an in-memory
//! database kept for the life of the process. Each catalog query and
//! pipeline scan runs on its own connection cloned from that database, so
//! a slow scan never holds up the next one. Filters are pushed into the
//! scan's `WHERE` clause; grouping and metric derivation happen in
//! [`crate::pipeline`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use duckdb::Connection;
use duckdb::types::Value;
use serde::Serialize;

use crate::error::{DashboardError, Result};
use crate::expressions::year_quarter;
use crate::filters::{BrandGeneric, DrugScope, Period, UtilizationType};
use crate::geo;
use crate::storage::{ensure_data_file, sql_quote_path};

const FACT_COLUMNS: &str = "year, quarter, state, description, is_brand, is_ffsu, \
                            units, rx_ct, total_amt, weighted_nadac_total";

/// One pre-aggregation fact row, restricted to the columns the pipelines
/// group and sum.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub year: i32,
    pub quarter: u32,
    pub state: String,
    pub units: Option<f64>,
    pub rx_ct: Option<f64>,
    pub total_amt: Option<f64>,
    pub weighted_nadac_total: Option<f64>,
}

/// Row filter pushed into a scan. `None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct FactQuery {
    pub period: Option<Period>,
    pub state: Option<String>,
    pub drug: Option<String>,
    pub brand_generic: Option<BrandGeneric>,
    pub utilization_type: Option<UtilizationType>,
    /// Keep only rows whose `weighted_nadac_total` is present.
    pub require_nadac: bool,
}

impl FactQuery {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut where_sql = String::from("WHERE 1=1");
        let mut params = Vec::new();

        if self.require_nadac {
            where_sql.push_str(" AND weighted_nadac_total IS NOT NULL");
        }
        if let Some(period) = self.period {
            where_sql.push_str(&format!(
                " AND year = {} AND quarter = {}",
                period.year, period.quarter
            ));
        }
        if let Some(state) = &self.state {
            where_sql.push_str(" AND state = ?");
            params.push(Value::Text(state.clone()));
        }
        if let Some(drug) = &self.drug {
            where_sql.push_str(" AND description = ?");
            params.push(Value::Text(drug.clone()));
        }
        if let Some(brand_generic) = self.brand_generic {
            where_sql.push_str(" AND ");
            where_sql.push_str(brand_generic.predicate());
        }
        if let Some(utilization_type) = self.utilization_type {
            where_sql.push_str(" AND ");
            where_sql.push_str(utilization_type.predicate());
        }
        (where_sql, params)
    }
}

/// All three filter-population lists.
#[derive(Debug, Clone, Serialize)]
pub struct Catalogs {
    pub periods: Vec<String>,
    pub states: Vec<String>,
    pub drugs: Vec<String>,
}

pub struct BaseDataset {
    path: PathBuf,
    root: Mutex<Connection>,
}

impl std::fmt::Debug for BaseDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseDataset")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl BaseDataset {
    /// Attaches the parquet fact file and checks that every expected column
    /// is present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        ensure_data_file(&path)?;
        let t0 = Instant::now();

        let unavailable = |e: duckdb::Error| DashboardError::DataUnavailable {
            path: path.clone(),
            message: e.to_string(),
        };

        let conn = Connection::open_in_memory().map_err(unavailable)?;
        let quoted = sql_quote_path(&path);
        conn.execute_batch(&format!(
            "CREATE OR REPLACE VIEW facts AS SELECT * FROM read_parquet('{quoted}')"
        ))
        .map_err(unavailable)?;
        conn.prepare(&format!("SELECT {FACT_COLUMNS} FROM facts LIMIT 0"))
            .map_err(unavailable)?;

        tracing::info!(
            "Fact table attached in {:.2}s: {}",
            t0.elapsed().as_secs_f64(),
            path.display()
        );

        Ok(Self {
            path,
            root: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh connection to the shared database; the lock is held only for
    /// the clone.
    fn conn(&self) -> Result<Connection> {
        let root = self
            .root
            .lock()
            .map_err(|_| DashboardError::Query("dataset connection lock poisoned".to_string()))?;
        root.try_clone().map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, err: duckdb::Error) -> DashboardError {
        DashboardError::DataUnavailable {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }

    /// Distinct reporting periods as `"<year> Q<quarter>"`, oldest first.
    pub fn period_catalog(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT DISTINCT CAST(year AS INTEGER) AS year, CAST(quarter AS UINTEGER) AS quarter
            FROM facts
            WHERE year IS NOT NULL AND quarter IS NOT NULL
            ORDER BY year ASC, quarter ASC
        "#;
        let db = self.conn()?;
        let mut stmt = db.prepare(sql).map_err(|e| self.unavailable(e))?;
        let rows = stmt
            .query_map([], |row| Ok(year_quarter(row.get(0)?, row.get(1)?)))
            .map_err(|e| self.unavailable(e))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| self.unavailable(e))?);
        }
        Ok(out)
    }

    /// Distinct states as display names, alphabetical.
    pub fn state_catalog(&self) -> Result<Vec<String>> {
        let codes =
            self.query_string_list("SELECT DISTINCT state FROM facts WHERE state IS NOT NULL")?;
        let mut names: Vec<String> = codes.iter().map(|c| geo::display_name(c)).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Distinct drug descriptions, alphabetical, optionally limited to brand
    /// or generic drugs.
    pub fn drug_catalog(&self, scope: DrugScope) -> Result<Vec<String>> {
        let mut sql =
            String::from("SELECT DISTINCT description FROM facts WHERE description IS NOT NULL");
        if let Some(brand_generic) = scope.brand_filter() {
            sql.push_str(" AND ");
            sql.push_str(brand_generic.predicate());
        }
        let mut drugs = self.query_string_list(&sql)?;
        drugs.sort();
        Ok(drugs)
    }

    pub fn catalogs(&self, drugs: DrugScope) -> Result<Catalogs> {
        Ok(Catalogs {
            periods: self.period_catalog()?,
            states: self.state_catalog()?,
            drugs: self.drug_catalog(drugs)?,
        })
    }

    fn query_string_list(&self, sql: &str) -> Result<Vec<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql).map_err(|e| self.unavailable(e))?;
        let rows = stmt
            .query_map([], |row| row.get::<usize, String>(0))
            .map_err(|e| self.unavailable(e))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| self.unavailable(e))?);
        }
        Ok(out)
    }

    /// Streams every fact row matching `query`.
    pub fn scan(&self, query: &FactQuery) -> Result<Vec<FactRow>> {
        let t0 = Instant::now();
        let (where_sql, params) = query.where_clause();
        let sql = format!(
            r#"
            SELECT
              CAST(year AS INTEGER),
              CAST(quarter AS UINTEGER),
              state,
              CAST(units AS DOUBLE),
              CAST(rx_ct AS DOUBLE),
              CAST(total_amt AS DOUBLE),
              CAST(weighted_nadac_total AS DOUBLE)
            FROM facts
            {where_sql}
            AND year IS NOT NULL AND quarter IS NOT NULL AND state IS NOT NULL
        "#
        );

        let db = self.conn()?;
        let mut stmt = db.prepare(&sql).map_err(|e| self.unavailable(e))?;
        let rows = stmt
            .query_map(duckdb::params_from_iter(params.iter()), |row| {
                Ok(FactRow {
                    year: row.get(0)?,
                    quarter: row.get(1)?,
                    state: row.get(2)?,
                    units: row.get(3)?,
                    rx_ct: row.get(4)?,
                    total_amt: row.get(5)?,
                    weighted_nadac_total: row.get(6)?,
                })
            })
            .map_err(|e| self.unavailable(e))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| self.unavailable(e))?);
        }

        tracing::debug!(
            "Scanned {} fact rows in {:.3}s ({})",
            out.len(),
            t0.elapsed().as_secs_f64(),
            where_sql
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_filters_nothing() {
        let (sql, params) = FactQuery::default().where_clause();
        assert_eq!(sql, "WHERE 1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn text_filters_are_bound_not_inlined() {
        let q = FactQuery {
            period: Some(Period::new(2023, 2).unwrap()),
            drug: Some("O'NEIL TABS".to_string()),
            brand_generic: Some(BrandGeneric::Generic),
            utilization_type: Some(UtilizationType::FeeForService),
            require_nadac: true,
            ..Default::default()
        };
        let (sql, params) = q.where_clause();
        assert_eq!(
            sql,
            "WHERE 1=1 AND weighted_nadac_total IS NOT NULL AND year = 2023 AND quarter = 2 \
             AND description = ? AND NOT is_brand AND is_ffsu"
        );
        assert_eq!(params, vec![Value::Text("O'NEIL TABS".to_string())]);
    }

    fn write_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("heat_map.parquet");
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "COPY (SELECT 2023 AS year, 1 AS quarter, 'OH' AS state, 'Drug A' AS description, \
             true AS is_brand, true AS is_ffsu, 10.0 AS units, 1.0 AS rx_ct, \
             25.0 AS total_amt, 20.0 AS weighted_nadac_total) TO '{}' (FORMAT PARQUET)",
            path.display()
        ))
        .unwrap();
        path
    }

    #[test]
    fn queries_run_while_another_connection_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let ds = BaseDataset::open(write_fixture(dir.path())).unwrap();

        let busy = ds.conn().unwrap();
        let mut stmt = busy.prepare("SELECT * FROM facts").unwrap();
        let mut rows = stmt.query([]).unwrap();
        assert!(rows.next().unwrap().is_some());

        assert_eq!(ds.period_catalog().unwrap(), vec!["2023 Q1"]);
        let scanned = ds.scan(&FactQuery::default()).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].weighted_nadac_total, Some(20.0));
    }

    #[test]
    fn open_missing_file_is_unavailable() {
        let err = BaseDataset::open("/nonexistent/heat_map.parquet").unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
    }
}
