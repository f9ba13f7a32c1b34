use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::core::{
    ProjectionError, ShockGenerator, SimulationConfig, SimulationResult, TimeStep, simulate,
};

/// Upper bound on `pathCount * (stepCount + 1)` accepted from callers.
pub const MAX_SIMULATION_CELLS: u64 = 25_000_000;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("failed to render projection: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliShockGenerator {
    Reference,
    CounterGaussian,
}

impl From<CliShockGenerator> for ShockGenerator {
    fn from(value: CliShockGenerator) -> Self {
        match value {
            CliShockGenerator::Reference => ShockGenerator::Reference,
            CliShockGenerator::CounterGaussian => ShockGenerator::CounterGaussian,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliTimeStep {
    TradingDay,
    SpreadOverHorizon,
}

impl From<CliTimeStep> for TimeStep {
    fn from(value: CliTimeStep) -> Self {
        match value {
            CliTimeStep::TradingDay => TimeStep::TradingDay,
            CliTimeStep::SpreadOverHorizon => TimeStep::SpreadOverHorizon,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiShockGenerator {
    #[serde(alias = "sine")]
    Reference,
    #[serde(alias = "counterGaussian", alias = "counter_gaussian", alias = "gaussian")]
    CounterGaussian,
}

impl From<ApiShockGenerator> for CliShockGenerator {
    fn from(value: ApiShockGenerator) -> Self {
        match value {
            ApiShockGenerator::Reference => CliShockGenerator::Reference,
            ApiShockGenerator::CounterGaussian => CliShockGenerator::CounterGaussian,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiTimeStep {
    #[serde(alias = "tradingDay", alias = "trading_day", alias = "daily")]
    TradingDay,
    #[serde(alias = "spreadOverHorizon", alias = "spread_over_horizon")]
    SpreadOverHorizon,
}

impl From<ApiTimeStep> for CliTimeStep {
    fn from(value: ApiTimeStep) -> Self {
        match value {
            ApiTimeStep::TradingDay => CliTimeStep::TradingDay,
            ApiTimeStep::SpreadOverHorizon => CliTimeStep::SpreadOverHorizon,
        }
    }
}

/// Request body for `/api/simulate`. Missing keys fall back to the dashboard defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_value: Option<f64>,
    path_count: Option<i64>,
    step_count: Option<i64>,
    annual_return: Option<f64>,
    annual_volatility: Option<f64>,
    seed: Option<u64>,
    sample_stride: Option<i64>,
    generator: Option<ApiShockGenerator>,
    time_step: Option<ApiTimeStep>,
}

#[derive(Parser, Debug)]
#[command(
    name = "projector",
    about = "Deterministic Monte Carlo projection of a portfolio value under geometric Brownian motion"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the projection over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one projection and print it as JSON
    Project(ProjectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value_t = 39_551.76, help = "Starting portfolio value")]
    pub initial_value: f64,
    #[arg(long, default_value_t = 500, allow_negative_numbers = true)]
    pub paths: i64,
    #[arg(
        long,
        default_value_t = 252,
        allow_negative_numbers = true,
        help = "Number of time steps in the horizon"
    )]
    pub steps: i64,
    #[arg(
        long,
        default_value_t = 0.08,
        allow_negative_numbers = true,
        help = "Annualized expected return as a fraction"
    )]
    pub annual_return: f64,
    #[arg(
        long,
        default_value_t = 0.20,
        allow_negative_numbers = true,
        help = "Annualized volatility as a fraction"
    )]
    pub annual_volatility: f64,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    #[arg(
        long,
        default_value_t = 5,
        allow_negative_numbers = true,
        help = "Emit one snapshot every N steps"
    )]
    pub stride: i64,
    #[arg(long, value_enum, default_value_t = CliShockGenerator::Reference)]
    pub generator: CliShockGenerator,
    #[arg(long, value_enum, default_value_t = CliTimeStep::TradingDay)]
    pub time_step: CliTimeStep,
}

impl Default for ProjectArgs {
    fn default() -> Self {
        Self {
            initial_value: 39_551.76,
            paths: 500,
            steps: 252,
            annual_return: 0.08,
            annual_volatility: 0.20,
            seed: 42,
            stride: 5,
            generator: CliShockGenerator::Reference,
            time_step: CliTimeStep::TradingDay,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    config: SimulationConfig,
    #[serde(flatten)]
    result: SimulationResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

fn count_field(field: &'static str, value: i64, min: i64) -> Result<u32, ProjectionError> {
    if value < min {
        return Err(ProjectionError::invalid(
            field,
            format!("must be >= {min}, got {value}"),
        ));
    }
    u32::try_from(value).map_err(|_| {
        ProjectionError::invalid(field, format!("must be <= {}, got {value}", u32::MAX))
    })
}

pub fn build_config(args: ProjectArgs) -> Result<SimulationConfig, ProjectionError> {
    let path_count = count_field("pathCount", args.paths, 1)?;
    let step_count = count_field("stepCount", args.steps, 0)?;
    let sample_stride = count_field("sampleStride", args.stride, 1)?;

    let rows = step_count as u64 + 1;
    let cells = path_count as u64 * rows;
    if cells > MAX_SIMULATION_CELLS {
        // Blame whichever count is the larger factor of the grid.
        let field = if rows > path_count as u64 {
            "stepCount"
        } else {
            "pathCount"
        };
        return Err(ProjectionError::invalid(
            field,
            format!("pathCount * (stepCount + 1) must be <= {MAX_SIMULATION_CELLS}, got {cells}"),
        ));
    }

    let config = SimulationConfig {
        initial_value: args.initial_value,
        path_count,
        step_count,
        annual_return: args.annual_return,
        annual_volatility: args.annual_volatility,
        seed: args.seed,
        sample_stride,
        generator: args.generator.into(),
        time_step: args.time_step.into(),
    };
    crate::core::validate_config(&config)?;
    Ok(config)
}

/// Runs one projection for the CLI and renders it as pretty JSON.
pub fn run_projection(args: ProjectArgs) -> Result<String, CliError> {
    let config = build_config(args)?;
    let result = simulate(&config)?;
    render_json(&SimulateResponse { config, result })
}

fn render_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("projection HTTP API listening on http://{addr}");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, router()).await
}

async fn health_handler() -> impl IntoResponse {
    with_cache_control("ok")
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", None)
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let config = match config_from_payload(payload) {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "rejected simulate request");
            return projection_error_response(&err);
        }
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let result = simulate(&config);
        (config, result)
    })
    .await;

    match outcome {
        Ok((config, Ok(result))) => {
            json_response(StatusCode::OK, SimulateResponse { config, result })
        }
        Ok((_, Err(err))) => {
            warn!(%err, "projection failed");
            projection_error_response(&err)
        }
        Err(join_err) => {
            error!(%join_err, "projection task did not complete");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "projection task did not complete",
                None,
            )
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str, field: Option<&'static str>) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            field,
        },
    )
}

fn projection_error_response(err: &ProjectionError) -> Response {
    let status = match err {
        ProjectionError::InvalidConfiguration { .. } => StatusCode::BAD_REQUEST,
        ProjectionError::NumericOverflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_response(status, &err.to_string(), err.field())
}

#[cfg(test)]
fn config_from_json(json: &str) -> Result<SimulationConfig, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    config_from_payload(payload).map_err(|e| e.to_string())
}

fn config_from_payload(payload: SimulatePayload) -> Result<SimulationConfig, ProjectionError> {
    let mut args = ProjectArgs::default();

    if let Some(v) = payload.initial_value {
        args.initial_value = v;
    }
    if let Some(v) = payload.path_count {
        args.paths = v;
    }
    if let Some(v) = payload.step_count {
        args.steps = v;
    }
    if let Some(v) = payload.annual_return {
        args.annual_return = v;
    }
    if let Some(v) = payload.annual_volatility {
        args.annual_volatility = v;
    }
    if let Some(v) = payload.seed {
        args.seed = v;
    }
    if let Some(v) = payload.sample_stride {
        args.stride = v;
    }
    if let Some(v) = payload.generator {
        args.generator = v.into();
    }
    if let Some(v) = payload.time_step {
        args.time_step = v.into();
    }

    build_config(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_args() -> ProjectArgs {
        ProjectArgs::default()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Option<HeaderValue>, Value) {
        let response = router().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let cache = response.headers().get(header::CACHE_CONTROL).cloned();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, cache, body)
    }

    #[test]
    fn build_config_defaults_match_dashboard_configuration() {
        let config = build_config(sample_args()).expect("valid defaults");
        let defaults = SimulationConfig::default();
        assert_approx(config.initial_value, defaults.initial_value);
        assert_eq!(config.path_count, 500);
        assert_eq!(config.step_count, 252);
        assert_approx(config.annual_return, 0.08);
        assert_approx(config.annual_volatility, 0.20);
        assert_eq!(config.seed, 42);
        assert_eq!(config.sample_stride, 5);
        assert_eq!(config.generator, ShockGenerator::Reference);
        assert_eq!(config.time_step, TimeStep::TradingDay);
    }

    #[test]
    fn build_config_rejects_negative_step_count() {
        let mut args = sample_args();
        args.steps = -1;
        let err = build_config(args).expect_err("must reject negative steps");
        assert_eq!(err.field(), Some("stepCount"));
    }

    #[test]
    fn build_config_rejects_zero_paths_and_initial_value() {
        let mut args = sample_args();
        args.paths = 0;
        let err = build_config(args).expect_err("must reject zero paths");
        assert_eq!(err.field(), Some("pathCount"));

        let mut args = sample_args();
        args.initial_value = 0.0;
        let err = build_config(args).expect_err("must reject zero initial value");
        assert_eq!(err.field(), Some("initialValue"));
    }

    #[test]
    fn build_config_rejects_oversized_grid() {
        let mut args = sample_args();
        args.paths = 1_000_000;
        args.steps = 252;
        let err = build_config(args).expect_err("must reject oversized grid");
        assert_eq!(err.field(), Some("pathCount"));
        assert!(err.to_string().contains("pathCount * (stepCount + 1)"));
    }

    #[test]
    fn build_config_blames_step_count_for_long_horizons() {
        let mut args = sample_args();
        args.paths = 1;
        args.steps = 30_000_000;
        let err = build_config(args).expect_err("must reject oversized grid");
        assert_eq!(err.field(), Some("stepCount"));

        let mut args = sample_args();
        args.paths = 100_000;
        args.steps = 300;
        let err = build_config(args).expect_err("must reject oversized grid");
        assert_eq!(err.field(), Some("pathCount"));
    }

    #[test]
    fn render_json_surfaces_serialization_errors() {
        struct Unrenderable;

        impl Serialize for Unrenderable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not representable"))
            }
        }

        let err = render_json(&Unrenderable).expect_err("must surface the error");
        assert!(matches!(err, CliError::Render(_)));
        assert!(err.to_string().contains("not representable"), "{err}");
    }

    #[test]
    fn run_projection_passes_through_validation_errors() {
        let mut args = sample_args();
        args.stride = 0;
        let err = run_projection(args).expect_err("must reject zero stride");
        assert!(
            matches!(err, CliError::Projection(ref e) if e.field() == Some("sampleStride")),
            "{err}"
        );
    }

    #[test]
    fn build_config_rejects_counts_beyond_u32() {
        let mut args = sample_args();
        args.steps = i64::from(u32::MAX) + 1;
        let err = build_config(args).expect_err("must reject huge step count");
        assert_eq!(err.field(), Some("stepCount"));
    }

    #[test]
    fn config_from_json_parses_web_keys() {
        let json = r#"{
          "initialValue": 120000,
          "pathCount": 250,
          "stepCount": 126,
          "annualReturn": 0.05,
          "annualVolatility": 0.3,
          "seed": 9,
          "sampleStride": 3,
          "generator": "counter-gaussian",
          "timeStep": "spreadOverHorizon"
        }"#;
        let config = config_from_json(json).expect("json should parse");

        assert_approx(config.initial_value, 120_000.0);
        assert_eq!(config.path_count, 250);
        assert_eq!(config.step_count, 126);
        assert_approx(config.annual_return, 0.05);
        assert_approx(config.annual_volatility, 0.3);
        assert_eq!(config.seed, 9);
        assert_eq!(config.sample_stride, 3);
        assert_eq!(config.generator, ShockGenerator::CounterGaussian);
        assert_eq!(config.time_step, TimeStep::SpreadOverHorizon);
    }

    #[test]
    fn config_from_json_rejects_negative_step_count() {
        let err = config_from_json(r#"{"stepCount": -1}"#).expect_err("must reject");
        assert!(err.contains("stepCount"), "unexpected error {err}");
    }

    #[test]
    fn run_projection_renders_expected_fields() {
        let mut args = sample_args();
        args.paths = 20;
        args.steps = 30;
        let json = run_projection(args).expect("valid projection");
        let value: Value = serde_json::from_str(&json).expect("valid json");

        for key in ["config", "summary", "snapshots", "risk"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["summary"].get("worstCase").is_some());
        assert!(value["risk"].get("valueAtRisk95").is_some());
        assert_eq!(value["config"]["generator"], "reference");
        assert_eq!(value["snapshots"].as_array().map(Vec::len), Some(7));
        assert_eq!(value["snapshots"][6]["step"], 30);
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_simulate_returns_summary_and_snapshots() {
        let request = Request::post("/api/simulate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"pathCount": 50, "stepCount": 40, "sampleStride": 10, "seed": 3}"#,
            ))
            .unwrap();

        let (status, cache, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache, Some(HeaderValue::from_static("no-store")));
        assert_eq!(body["snapshots"].as_array().map(Vec::len), Some(5));
        assert_eq!(body["snapshots"][4]["step"], 40);
        assert_eq!(body["config"]["pathCount"], 50);
        assert!(body["summary"]["median"].as_f64().is_some());
        assert!(body["risk"]["probabilityOfLoss"].as_f64().is_some());
    }

    #[tokio::test]
    async fn get_simulate_is_deterministic_for_fixed_seed() {
        let uri = "/api/simulate?pathCount=30&stepCount=20&seed=11";
        let (_, _, first) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
        let (_, _, second) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(first, second);
        assert_eq!(first["config"]["seed"], 11);
    }

    #[tokio::test]
    async fn get_simulate_rejects_negative_step_count() {
        let request = Request::get("/api/simulate?stepCount=-1")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "stepCount");
        assert!(body.get("snapshots").is_none());
    }

    #[tokio::test]
    async fn post_simulate_rejects_zero_initial_value() {
        let request = Request::post("/api/simulate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"initialValue": 0}"#))
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "initialValue");
    }

    #[tokio::test]
    async fn post_simulate_reports_numeric_overflow() {
        let request = Request::post("/api/simulate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"annualVolatility": 1000000, "pathCount": 5, "stepCount": 10}"#,
            ))
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("overflow")));
        assert!(body.get("field").is_none());
    }

    #[tokio::test]
    async fn unknown_route_returns_json_not_found() {
        let (status, _, body) =
            send(Request::get("/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }
}
