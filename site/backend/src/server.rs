use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nadac_backend::dataset::{BaseDataset, Catalogs};
use nadac_backend::error::{DashboardError, Result};
use nadac_backend::figures::{self, DASHBOARD_TITLE, DATA_UPDATED, HeatMapFigure, LineChartFigure};
use nadac_backend::filters::{DrugScope, Metric, parse_optional};
use nadac_backend::pipeline::{MapFilters, TrendFilters, compute_map, compute_trend};
use nadac_backend::supersede::{Chart, Superseder, Ticket};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cli::{CatalogArgs, ServeArgs};

#[derive(Clone)]
struct AppState {
    dataset: Arc<BaseDataset>,
    superseder: Arc<Superseder>,
    query_timeout: Duration,
}

impl AppState {
    /// Runs a dataset query on the blocking pool under the query timeout.
    /// A timed-out scan finishes in the background on its own connection.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&BaseDataset) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let dataset = Arc::clone(&self.dataset);
        let task = tokio::task::spawn_blocking(move || f(&*dataset));
        match tokio::time::timeout(self.query_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(DashboardError::Query(join.to_string())),
            Err(_) => Err(DashboardError::Timeout(self.query_timeout.as_secs())),
        }
    }

    fn begin(
        &self,
        client: Option<&str>,
        seq: Option<u64>,
        chart: Chart,
    ) -> Result<Option<Ticket>> {
        match (client.map(str::trim).filter(|c| !c.is_empty()), seq) {
            (Some(client), Some(seq)) => self.superseder.begin(client, chart, seq).map(Some),
            _ => Ok(None),
        }
    }

    fn finish<T>(&self, ticket: Option<&Ticket>, value: T) -> Result<T> {
        match ticket {
            Some(ticket) => self.superseder.finish(ticket, value),
            None => Ok(value),
        }
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let dataset = BaseDataset::open(&opts.data_file).context("open fact table")?;
    tracing::info!("Serving fact table {}", dataset.path().display());

    let state = AppState {
        dataset: Arc::new(dataset),
        superseder: Arc::new(Superseder::new()),
        query_timeout: Duration::from_secs(opts.query_timeout_secs.max(1)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/meta", get(api_meta))
        .route("/api/catalog", get(api_catalogs))
        .route("/api/catalog/periods", get(api_periods))
        .route("/api/catalog/states", get(api_states))
        .route("/api/catalog/drugs", get(api_drugs))
        .route("/api/map", get(api_map))
        .route("/api/trend", get(api_trend))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn print_catalogs(opts: CatalogArgs) -> anyhow::Result<()> {
    let scope: DrugScope = opts.how.parse()?;
    let dataset = BaseDataset::open(&opts.data_file).context("open fact table")?;
    let catalogs = dataset.catalogs(scope)?;
    println!("{}", serde_json::to_string_pretty(&catalogs)?);
    Ok(())
}

fn status_for(err: &DashboardError) -> StatusCode {
    match err {
        _ if err.is_client_error() => StatusCode::BAD_REQUEST,
        DashboardError::DataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DashboardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DashboardError::Superseded => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: DashboardError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::warn!("{}", err);
    }
    (status, err.to_string()).into_response()
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(v) => Json(v).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
struct MetricOpt {
    name: &'static str,
    label: String,
}

#[derive(Debug, Serialize)]
struct MetaResponse {
    title: &'static str,
    data_updated: &'static str,
    metrics: Vec<MetricOpt>,
}

async fn api_meta() -> impl IntoResponse {
    let metrics = Metric::ALL
        .into_iter()
        .map(|m| MetricOpt {
            name: m.name(),
            label: m.label(),
        })
        .collect();
    Json(MetaResponse {
        title: DASHBOARD_TITLE,
        data_updated: DATA_UPDATED,
        metrics,
    })
}

#[derive(Debug, Deserialize)]
struct DrugsParams {
    how: Option<String>,
}

async fn api_catalogs(
    State(st): State<AppState>,
    Query(p): Query<DrugsParams>,
) -> impl IntoResponse {
    let result: Result<Catalogs> = async {
        let scope = parse_optional::<DrugScope>(p.how.as_deref())?.unwrap_or_default();
        st.run_blocking(move |ds| ds.catalogs(scope)).await
    }
    .await;
    respond(result)
}

async fn api_periods(State(st): State<AppState>) -> impl IntoResponse {
    respond(st.run_blocking(|ds| ds.period_catalog()).await)
}

async fn api_states(State(st): State<AppState>) -> impl IntoResponse {
    respond(st.run_blocking(|ds| ds.state_catalog()).await)
}

async fn api_drugs(
    State(st): State<AppState>,
    Query(p): Query<DrugsParams>,
) -> impl IntoResponse {
    let result: Result<Vec<String>> = async {
        let scope = parse_optional::<DrugScope>(p.how.as_deref())?.unwrap_or_default();
        st.run_blocking(move |ds| ds.drug_catalog(scope)).await
    }
    .await;
    respond(result)
}

#[derive(Debug, Deserialize)]
struct MapParams {
    period: Option<String>,
    drug: Option<String>,
    brand_generic: Option<String>,
    utilization_type: Option<String>,
    metric: Option<String>,
    client: Option<String>,
    seq: Option<u64>,
}

async fn api_map(State(st): State<AppState>, Query(p): Query<MapParams>) -> impl IntoResponse {
    respond(map_figure(&st, p).await)
}

async fn map_figure(st: &AppState, p: MapParams) -> Result<HeatMapFigure> {
    let filters = MapFilters::parse(
        p.period.as_deref().unwrap_or(""),
        p.drug.as_deref(),
        p.brand_generic.as_deref(),
        p.utilization_type.as_deref(),
    )?;
    let metric = parse_optional::<Metric>(p.metric.as_deref())?.unwrap_or_default();
    let ticket = st.begin(p.client.as_deref(), p.seq, Chart::Map)?;

    let rows = st
        .run_blocking(move |ds| compute_map(ds, &filters))
        .await?;
    let rows = st.finish(ticket.as_ref(), rows)?;
    Ok(figures::heat_map(rows, metric))
}

#[derive(Debug, Deserialize)]
struct TrendParams {
    state: Option<String>,
    drug: Option<String>,
    brand_generic: Option<String>,
    utilization_type: Option<String>,
    client: Option<String>,
    seq: Option<u64>,
}

async fn api_trend(
    State(st): State<AppState>,
    Query(p): Query<TrendParams>,
) -> impl IntoResponse {
    respond(trend_figure(&st, p).await)
}

async fn trend_figure(st: &AppState, p: TrendParams) -> Result<LineChartFigure> {
    let filters = TrendFilters::parse(
        p.state.as_deref(),
        p.drug.as_deref(),
        p.brand_generic.as_deref(),
        p.utilization_type.as_deref(),
    )?;
    let ticket = st.begin(p.client.as_deref(), p.seq, Chart::Trend)?;

    let rows = st
        .run_blocking(move |ds| compute_trend(ds, &filters))
        .await?;
    let rows = st.finish(ticket.as_ref(), rows)?;
    Ok(figures::line_chart(rows))
}
