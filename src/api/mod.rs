use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CSV_FILENAME, DEFAULT_END_YEAR, DEFAULT_START_YEAR, Inputs, render_text, simulate,
    simulate_report, to_csv,
};

const MIN_SCORE: i32 = 0;
const MAX_SCORE: i32 = 1000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliOutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    #[serde(alias = "csiScore")]
    score: Option<i32>,
    #[serde(alias = "sampleSize")]
    initial_customers: Option<f64>,
    service_profit: Option<f64>,
    #[serde(alias = "ownershipDuration")]
    ownership_years: Option<u32>,
    #[serde(alias = "warrantyDuration")]
    warranty_years: Option<u32>,
    #[serde(alias = "vehicleProfit")]
    sale_profit: Option<f64>,
    start_year: Option<i32>,
    end_year: Option<i32>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "csi-profit",
    about = "Projects dealership service and repeat-sale profit from a customer satisfaction score",
    after_help = "Run `csi-profit serve [port]` to start the HTTP API instead."
)]
pub struct Cli {
    #[arg(long, default_value_t = 870, help = "CSI score out of 1,000")]
    score: i32,
    #[arg(
        long,
        default_value_t = 100.0,
        help = "Size of the initial sales cohort"
    )]
    initial_customers: f64,
    #[arg(
        long,
        default_value_t = 350.0,
        help = "Service profit per customer per year"
    )]
    service_profit: f64,
    #[arg(
        long,
        default_value_t = 2,
        help = "Years of ownership before a customer buys again"
    )]
    ownership_years: u32,
    #[arg(
        long,
        default_value_t = 3,
        help = "Years of warranty during which customers return for service"
    )]
    warranty_years: u32,
    #[arg(long, default_value_t = 1225.0, help = "Profit per vehicle sale")]
    sale_profit: f64,
    #[arg(long, default_value_t = DEFAULT_START_YEAR)]
    start_year: i32,
    #[arg(long, default_value_t = DEFAULT_END_YEAR)]
    end_year: i32,
    #[arg(long, value_enum, default_value_t = CliOutputFormat::Table)]
    format: CliOutputFormat,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: &Cli) -> Result<Inputs, String> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&cli.score) {
        return Err(format!(
            "score must be between {MIN_SCORE} and {MAX_SCORE}, got {}",
            cli.score
        ));
    }

    if !cli.initial_customers.is_finite() || cli.initial_customers < 1.0 {
        return Err(format!(
            "initial customers must be at least 1, got {}",
            cli.initial_customers
        ));
    }

    let inputs = Inputs {
        satisfaction_score: cli.score,
        initial_customers: cli.initial_customers,
        service_profit_per_year: cli.service_profit,
        ownership_years: cli.ownership_years,
        warranty_years: cli.warranty_years,
        vehicle_sale_profit: cli.sale_profit,
        start_year: cli.start_year,
        end_year: cli.end_year,
    };
    inputs.validate().map_err(|e| e.to_string())?;
    Ok(inputs)
}

/// Runs one simulation for the command line and renders it in the chosen format.
pub fn run_cli(cli: &Cli) -> Result<String, String> {
    let inputs = build_inputs(cli)?;
    match cli.format {
        CliOutputFormat::Table => simulate(&inputs)
            .map(|table| render_text(&table))
            .map_err(|e| e.to_string()),
        CliOutputFormat::Csv => simulate(&inputs)
            .and_then(|table| to_csv(&table))
            .map_err(|e| e.to_string()),
        CliOutputFormat::Json => {
            let report = simulate_report(&inputs).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&report)
                .map(|json| format!("{json}\n"))
                .map_err(|e| format!("Failed to serialize report: {e}"))
        }
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/simulate.csv",
            get(simulate_csv_get_handler).post(simulate_csv_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "CSI profitability API listening");
    info!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, router()).await
}

async fn health_handler() -> impl IntoResponse {
    with_cache_control("ok")
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_json_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_json_impl(payload)
}

async fn simulate_csv_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_csv_impl(payload)
}

async fn simulate_csv_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_csv_impl(payload)
}

fn simulate_json_impl(payload: SimulatePayload) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return rejected(&msg),
    };
    match simulate_report(&inputs) {
        Ok(report) => json_response(StatusCode::OK, report),
        Err(e) => rejected(&e.to_string()),
    }
}

fn simulate_csv_impl(payload: SimulatePayload) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return rejected(&msg),
    };
    let csv = match simulate(&inputs).and_then(|table| to_csv(&table)) {
        Ok(csv) => csv,
        Err(e) => return rejected(&e.to_string()),
    };
    with_cache_control((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{CSV_FILENAME}\""),
            ),
        ],
        csv,
    ))
}

fn rejected(msg: &str) -> Response {
    warn!(error = msg, "simulation request rejected");
    error_response(StatusCode::BAD_REQUEST, msg)
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn inputs_from_payload(payload: SimulatePayload) -> Result<Inputs, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.score {
        cli.score = v;
    }
    if let Some(v) = payload.initial_customers {
        cli.initial_customers = v;
    }
    if let Some(v) = payload.service_profit {
        cli.service_profit = v;
    }
    if let Some(v) = payload.ownership_years {
        cli.ownership_years = v;
    }
    if let Some(v) = payload.warranty_years {
        cli.warranty_years = v;
    }
    if let Some(v) = payload.sale_profit {
        cli.sale_profit = v;
    }
    if let Some(v) = payload.start_year {
        cli.start_year = v;
    }
    if let Some(v) = payload.end_year {
        cli.end_year = v;
    }

    build_inputs(&cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        score: 870,
        initial_customers: 100.0,
        service_profit: 350.0,
        ownership_years: 2,
        warranty_years: 3,
        sale_profit: 1225.0,
        start_year: DEFAULT_START_YEAR,
        end_year: DEFAULT_END_YEAR,
        format: CliOutputFormat::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    fn inputs_from_json(json: &str) -> Result<Inputs, String> {
        let payload = serde_json::from_str::<SimulatePayload>(json)
            .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
        inputs_from_payload(payload)
    }

    async fn send(request: Request<Body>) -> (StatusCode, Response) {
        let response = router().oneshot(request).await.expect("router is infallible");
        (response.status(), response)
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let cli = Cli::parse_from(["csi-profit"]);
        let from_cli = build_inputs(&cli).expect("valid inputs");
        let from_api = build_inputs(&sample_cli()).expect("valid inputs");
        assert_eq!(from_cli, from_api);
        assert_eq!(cli.format, CliOutputFormat::Table);
    }

    #[test]
    fn build_inputs_rejects_score_outside_slider_range() {
        let mut cli = sample_cli();
        cli.score = 1001;
        let err = build_inputs(&cli).expect_err("must reject score above 1000");
        assert!(err.starts_with("score must be between 0 and 1000"));

        cli.score = -1;
        assert!(build_inputs(&cli).is_err());
    }

    #[test]
    fn build_inputs_rejects_inverted_year_range() {
        let mut cli = sample_cli();
        cli.start_year = 2030;
        cli.end_year = 2029;
        let err = build_inputs(&cli).expect_err("must reject inverted range");
        assert_eq!(err, "start year 2030 is after end year 2029");
    }

    #[test]
    fn build_inputs_rejects_zero_durations() {
        let mut cli = sample_cli();
        cli.ownership_years = 0;
        let err = build_inputs(&cli).expect_err("must reject zero ownership");
        assert!(err.starts_with("ownership duration"));

        let mut cli = sample_cli();
        cli.warranty_years = 0;
        let err = build_inputs(&cli).expect_err("must reject zero warranty");
        assert!(err.starts_with("warranty duration"));
    }

    #[test]
    fn build_inputs_rejects_negative_profit_and_empty_cohort() {
        let mut cli = sample_cli();
        cli.sale_profit = -1.0;
        assert!(build_inputs(&cli).expect_err("negative").starts_with("vehicle sale profit"));

        let mut cli = sample_cli();
        cli.initial_customers = 0.0;
        assert!(
            build_inputs(&cli)
                .expect_err("empty cohort")
                .starts_with("initial customers must be at least 1")
        );
    }

    #[test]
    fn inputs_from_json_parses_web_keys_and_aliases() {
        let json = r#"{
          "csiScore": 950,
          "sampleSize": 250,
          "serviceProfit": 400,
          "ownershipDuration": 4,
          "warrantyYears": 5,
          "vehicleProfit": 1500,
          "startYear": 2027,
          "endYear": 2035
        }"#;
        let inputs = inputs_from_json(json).expect("json should parse");
        assert_eq!(inputs.satisfaction_score, 950);
        assert_approx(inputs.initial_customers, 250.0);
        assert_approx(inputs.service_profit_per_year, 400.0);
        assert_eq!(inputs.ownership_years, 4);
        assert_eq!(inputs.warranty_years, 5);
        assert_approx(inputs.vehicle_sale_profit, 1500.0);
        assert_eq!(inputs.start_year, 2027);
        assert_eq!(inputs.end_year, 2035);
    }

    #[test]
    fn inputs_from_empty_json_uses_defaults() {
        let inputs = inputs_from_json("{}").expect("json should parse");
        assert_eq!(inputs.satisfaction_score, 870);
        assert_eq!(inputs.start_year, 2026);
        assert_eq!(inputs.end_year, 2040);
    }

    #[test]
    fn run_cli_renders_every_format() {
        let mut cli = sample_cli();
        cli.format = CliOutputFormat::Csv;
        let csv = run_cli(&cli).expect("csv output");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Year,Service customers,Repeat purchases,Total profit")
        );
        assert_eq!(lines.next(), Some("Total,201,31,108325"));

        cli.format = CliOutputFormat::Table;
        let text = run_cli(&cli).expect("table output");
        assert!(text.contains("108,325"));

        cli.format = CliOutputFormat::Json;
        let json = run_cli(&cli).expect("json output");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["band"], "good");
        assert_eq!(value["table"]["rows"][0]["year"], "Total");
        assert_eq!(value["table"]["rows"][1]["year"], 2026);
    }

    #[tokio::test]
    async fn simulate_endpoint_returns_report() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/simulate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"score": 870, "endYear": 2027}"#))
            .expect("request");
        let (status, response) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let value: serde_json::Value =
            serde_json::from_str(&body_string(response).await).expect("valid json");
        assert_eq!(value["satisfactionScore"], 870);
        assert_eq!(value["rates"]["repeatPurchase"], 0.24);
        let rows = value["table"]["rows"].as_array().expect("rows");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["serviceCustomers"], 102);
        assert_eq!(rows[0]["repeatPurchases"], 24);
        assert_eq!(rows[0]["totalProfit"], 65_100);
    }

    #[tokio::test]
    async fn simulate_csv_endpoint_sets_download_headers() {
        let request = Request::builder()
            .uri("/api/simulate.csv?score=870")
            .body(Body::empty())
            .expect("request");
        let (status, response) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(disposition.contains(CSV_FILENAME));
        let body = body_string(response).await;
        assert!(body.starts_with("Year,Service customers,Repeat purchases,Total profit\n"));
        assert_eq!(body.lines().count(), 17);
    }

    #[tokio::test]
    async fn simulate_endpoint_rejects_invalid_query() {
        let request = Request::builder()
            .uri("/api/simulate?startYear=2040&endYear=2030")
            .body(Body::empty())
            .expect("request");
        let (status, response) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("start year 2040 is after end year 2030"));
        assert!(!body.contains("--"));
    }

    #[tokio::test]
    async fn simulate_endpoint_rejects_cohort_too_large_to_report() {
        let request = Request::builder()
            .uri("/api/simulate?initialCustomers=1e17")
            .body(Body::empty())
            .expect("request");
        let (status, response) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("too large to report exactly"));
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let (status, response) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let request = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .expect("request");
        let (status, response) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, r#"{"error":"Not found"}"#);
    }
}
