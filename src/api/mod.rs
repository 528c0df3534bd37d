use std::ffi::OsString;
use std::net::SocketAddr;

use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CompoundingOption, Plan, RateMethod, SolveError, SolverConfig, Unknown, VestingMethod,
    effective_rate, solve, sub_periods,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliCompounding {
    Monthly,
    Quarterly,
    Annually,
}

impl From<CliCompounding> for CompoundingOption {
    fn from(value: CliCompounding) -> Self {
        match value {
            CliCompounding::Monthly => CompoundingOption::Monthly,
            CliCompounding::Quarterly => CompoundingOption::Quarterly,
            CliCompounding::Annually => CompoundingOption::Annually,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliUnknown {
    TargetAmount,
    PeriodicAmount,
    InitialAmount,
    VestingPeriod,
    RatePercentage,
}

impl From<CliUnknown> for Unknown {
    fn from(value: CliUnknown) -> Self {
        match value {
            CliUnknown::TargetAmount => Unknown::TargetAmount,
            CliUnknown::PeriodicAmount => Unknown::PeriodicAmount,
            CliUnknown::InitialAmount => Unknown::InitialAmount,
            CliUnknown::VestingPeriod => Unknown::VestingPeriod,
            CliUnknown::RatePercentage => Unknown::RatePercentage,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRateMethod {
    Bisection,
    LinearStep,
}

impl From<CliRateMethod> for RateMethod {
    fn from(value: CliRateMethod) -> Self {
        match value {
            CliRateMethod::Bisection => RateMethod::Bisection,
            CliRateMethod::LinearStep => RateMethod::LinearStep,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliVestingMethod {
    ClosedForm,
    Iterative,
}

impl From<CliVestingMethod> for VestingMethod {
    fn from(value: CliVestingMethod) -> Self {
        match value {
            CliVestingMethod::ClosedForm => VestingMethod::ClosedForm,
            CliVestingMethod::Iterative => VestingMethod::Iterative,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiCompounding {
    #[serde(alias = "Monthly", alias = "month")]
    Monthly,
    #[serde(alias = "Quarterly", alias = "quarter")]
    Quarterly,
    #[serde(alias = "Annually", alias = "annual", alias = "yearly")]
    Annually,
}

impl From<ApiCompounding> for CliCompounding {
    fn from(value: ApiCompounding) -> Self {
        match value {
            ApiCompounding::Monthly => CliCompounding::Monthly,
            ApiCompounding::Quarterly => CliCompounding::Quarterly,
            ApiCompounding::Annually => CliCompounding::Annually,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiUnknown {
    #[serde(alias = "targetAmount", alias = "target_amount", alias = "target")]
    TargetAmount,
    #[serde(alias = "periodicAmount", alias = "periodic_amount", alias = "periodic")]
    PeriodicAmount,
    #[serde(alias = "initialAmount", alias = "initial_amount", alias = "initial")]
    InitialAmount,
    #[serde(alias = "vestingPeriod", alias = "vesting_period", alias = "period")]
    VestingPeriod,
    #[serde(alias = "ratePercentage", alias = "rate_percentage", alias = "rate")]
    RatePercentage,
}

impl From<ApiUnknown> for CliUnknown {
    fn from(value: ApiUnknown) -> Self {
        match value {
            ApiUnknown::TargetAmount => CliUnknown::TargetAmount,
            ApiUnknown::PeriodicAmount => CliUnknown::PeriodicAmount,
            ApiUnknown::InitialAmount => CliUnknown::InitialAmount,
            ApiUnknown::VestingPeriod => CliUnknown::VestingPeriod,
            ApiUnknown::RatePercentage => CliUnknown::RatePercentage,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRateMethod {
    Bisection,
    #[serde(alias = "linearStep", alias = "linear_step", alias = "step")]
    LinearStep,
}

impl From<ApiRateMethod> for CliRateMethod {
    fn from(value: ApiRateMethod) -> Self {
        match value {
            ApiRateMethod::Bisection => CliRateMethod::Bisection,
            ApiRateMethod::LinearStep => CliRateMethod::LinearStep,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiVestingMethod {
    #[serde(alias = "closedForm", alias = "closed_form")]
    ClosedForm,
    Iterative,
}

impl From<ApiVestingMethod> for CliVestingMethod {
    fn from(value: ApiVestingMethod) -> Self {
        match value {
            ApiVestingMethod::ClosedForm => CliVestingMethod::ClosedForm,
            ApiVestingMethod::Iterative => CliVestingMethod::Iterative,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    solve_for: Option<ApiUnknown>,
    compounding: Option<ApiCompounding>,

    initial_amount: Option<f64>,
    periodic_amount: Option<f64>,
    target_amount: Option<f64>,
    rate_percentage: Option<f64>,
    inflation_percentage: Option<f64>,
    tax_rate_percentage: Option<f64>,
    vesting_period: Option<u32>,

    rate_method: Option<ApiRateMethod>,
    vesting_method: Option<ApiVestingMethod>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    rate_step: Option<f64>,
    max_iterations: Option<u32>,
    max_periods: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "plancalc",
    about = "Periodic investment plan solver: give four of the five quantities, get the fifth",
    allow_negative_numbers = true
)]
struct Cli {
    #[arg(long, value_enum, help = "Quantity to solve for")]
    solve_for: CliUnknown,
    #[arg(long, value_enum, default_value_t = CliCompounding::Monthly)]
    compounding: CliCompounding,
    #[arg(long, default_value_t = 0.0, help = "Lump sum invested at the start")]
    initial_amount: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Installments per year, spread evenly over the compounding periods"
    )]
    periodic_amount: f64,
    #[arg(long, default_value_t = 0.0)]
    target_amount: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Nominal annual interest rate in percent, e.g. 7"
    )]
    rate_percentage: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual inflation in percent")]
    inflation_percentage: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Percent of nominal interest lost to tax"
    )]
    tax_rate_percentage: f64,
    #[arg(long, default_value_t = 0, help = "Years the plan runs")]
    vesting_period: u32,
    #[arg(long, value_enum, default_value_t = CliRateMethod::Bisection)]
    rate_method: CliRateMethod,
    #[arg(long, value_enum, default_value_t = CliVestingMethod::ClosedForm)]
    vesting_method: CliVestingMethod,
    #[arg(
        long,
        default_value_t = -100.0,
        help = "Lowest rate in percent tried by the bisection search"
    )]
    search_min: f64,
    #[arg(
        long,
        default_value_t = 1000.0,
        help = "Highest rate in percent tried by the bisection search"
    )]
    search_max: f64,
    #[arg(
        long,
        default_value_t = 1e-10,
        help = "Bracket width in percent at which bisection stops"
    )]
    tolerance: f64,
    #[arg(
        long,
        default_value_t = 0.1,
        help = "Rate increment in percent for the linear-step search"
    )]
    rate_step: f64,
    #[arg(long, default_value_t = 10_000)]
    max_iterations: u32,
    #[arg(
        long,
        default_value_t = 120_000,
        help = "Sub-period limit for the iterative vesting search"
    )]
    max_periods: u32,
}

#[derive(Debug)]
struct ApiRequest {
    plan: Plan,
    option: CompoundingOption,
    unknown: Unknown,
    config: SolverConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    solve_for: Unknown,
    compounding: CompoundingOption,
    value: f64,
    effective_rate: f64,
    sub_periods: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    let config = SolverConfig {
        rate_method: cli.rate_method.into(),
        vesting_method: cli.vesting_method.into(),
        search_min: cli.search_min,
        search_max: cli.search_max,
        tolerance: cli.tolerance,
        rate_step: cli.rate_step,
        max_iterations: cli.max_iterations,
        max_periods: cli.max_periods,
    };
    config.validate()?;

    let plan = Plan::new(
        cli.initial_amount,
        cli.periodic_amount,
        cli.target_amount,
        cli.rate_percentage,
        cli.vesting_period,
    )
    .with_inflation_percentage(cli.inflation_percentage)
    .with_tax_rate_percentage(cli.tax_rate_percentage);

    Ok(ApiRequest {
        plan,
        option: cli.compounding.into(),
        unknown: cli.solve_for.into(),
        config,
    })
}

fn solve_request(request: &ApiRequest) -> Result<SolveResponse, SolveError> {
    let value = solve(
        &request.plan,
        request.unknown,
        request.option,
        &request.config,
    )?;
    Ok(SolveResponse {
        solve_for: request.unknown,
        compounding: request.option,
        value,
        effective_rate: effective_rate(&request.plan, request.option),
        sub_periods: sub_periods(&request.plan, request.option),
    })
}

/// Parses command-line arguments, solves, and prints the result.
pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let request = build_request(Cli::parse_from(args))?;
    let response = solve_request(&request).map_err(|e| e.to_string())?;
    println!("{}: {}", response.solve_for, response.value);
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "plan solver HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn solve_get_handler(Query(payload): Query<SolvePayload>) -> Response {
    solve_handler_impl(payload)
}

async fn solve_post_handler(Json(payload): Json<SolvePayload>) -> Response {
    solve_handler_impl(payload)
}

fn solve_handler_impl(payload: SolvePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected solve request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    info!(
        solve_for = %request.unknown,
        compounding = ?request.option,
        "solving plan"
    );
    match solve_request(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!(error = %err, kind = err.kind(), "solve failed");
            solve_error_response(&err)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            kind: None,
        },
    )
}

fn solve_error_response(err: &SolveError) -> Response {
    json_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        ErrorResponse {
            error: err.to_string(),
            kind: Some(err.kind()),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SolvePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.solve_for {
        cli.solve_for = v.into();
    }
    if let Some(v) = payload.compounding {
        cli.compounding = v.into();
    }

    if let Some(v) = payload.initial_amount {
        cli.initial_amount = v;
    }
    if let Some(v) = payload.periodic_amount {
        cli.periodic_amount = v;
    }
    if let Some(v) = payload.target_amount {
        cli.target_amount = v;
    }
    if let Some(v) = payload.rate_percentage {
        cli.rate_percentage = v;
    }
    if let Some(v) = payload.inflation_percentage {
        cli.inflation_percentage = v;
    }
    if let Some(v) = payload.tax_rate_percentage {
        cli.tax_rate_percentage = v;
    }
    if let Some(v) = payload.vesting_period {
        cli.vesting_period = v;
    }

    if let Some(v) = payload.rate_method {
        cli.rate_method = v.into();
    }
    if let Some(v) = payload.vesting_method {
        cli.vesting_method = v.into();
    }
    if let Some(v) = payload.search_min {
        cli.search_min = v;
    }
    if let Some(v) = payload.search_max {
        cli.search_max = v;
    }
    if let Some(v) = payload.tolerance {
        cli.tolerance = v;
    }
    if let Some(v) = payload.rate_step {
        cli.rate_step = v;
    }
    if let Some(v) = payload.max_iterations {
        cli.max_iterations = v;
    }
    if let Some(v) = payload.max_periods {
        cli.max_periods = v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    let config = SolverConfig::default();
    Cli {
        solve_for: CliUnknown::TargetAmount,
        compounding: CliCompounding::Monthly,
        initial_amount: 0.0,
        periodic_amount: 0.0,
        target_amount: 0.0,
        rate_percentage: 0.0,
        inflation_percentage: 0.0,
        tax_rate_percentage: 0.0,
        vesting_period: 0,
        rate_method: CliRateMethod::Bisection,
        vesting_method: CliVestingMethod::ClosedForm,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        rate_step: config.rate_step,
        max_iterations: config.max_iterations,
        max_periods: config.max_periods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let cli = Cli::try_parse_from(["plancalc", "--solve-for", "target-amount"])
            .expect("valid args");
        let from_cli = build_request(cli).expect("valid request");
        let from_api = api_request_from_json("{}").expect("valid request");

        assert_eq!(from_cli.plan, from_api.plan);
        assert_eq!(from_cli.option, from_api.option);
        assert_eq!(from_cli.unknown, from_api.unknown);
        assert_eq!(from_cli.config.rate_method, from_api.config.rate_method);
        assert_approx(from_cli.config.search_min, from_api.config.search_min);
        assert_eq!(from_cli.config.max_periods, from_api.config.max_periods);
    }

    #[test]
    fn cli_parses_plan_and_solver_flags() {
        let cli = Cli::try_parse_from([
            "plancalc",
            "--solve-for",
            "rate-percentage",
            "--compounding",
            "quarterly",
            "--initial-amount",
            "1000",
            "--periodic-amount",
            "400",
            "--target-amount",
            "9000",
            "--inflation-percentage",
            "2",
            "--tax-rate-percentage",
            "15",
            "--vesting-period",
            "10",
            "--rate-method",
            "linear-step",
            "--rate-step",
            "0.05",
            "--search-min",
            "-50",
        ])
        .expect("valid args");
        let request = build_request(cli).expect("valid request");

        assert_eq!(request.unknown, Unknown::RatePercentage);
        assert_eq!(request.option, CompoundingOption::Quarterly);
        assert_approx(request.plan.initial_amount(), 1_000.0);
        assert_approx(request.plan.periodic_amount(), 400.0);
        assert_approx(request.plan.target_amount(), 9_000.0);
        assert_approx(request.plan.inflation_percentage(), 2.0);
        assert_approx(request.plan.tax_rate_percentage(), 15.0);
        assert_eq!(request.plan.vesting_period(), 10);
        assert_eq!(request.config.rate_method, RateMethod::LinearStep);
        assert_approx(request.config.rate_step, 0.05);
        assert_approx(request.config.search_min, -50.0);
    }

    #[test]
    fn cli_requires_solve_for() {
        assert!(Cli::try_parse_from(["plancalc", "--initial-amount", "10"]).is_err());
    }

    #[test]
    fn api_request_from_json_parses_camel_case_keys() {
        let request = api_request_from_json(
            r#"{
                "solveFor": "vesting-period",
                "compounding": "annually",
                "initialAmount": 1000,
                "periodicAmount": 100,
                "targetAmount": 5000,
                "ratePercentage": 6,
                "inflationPercentage": 1.5,
                "taxRatePercentage": 10,
                "vestingPeriod": 3,
                "vestingMethod": "iterative",
                "maxPeriods": 500
            }"#,
        )
        .expect("valid payload");

        assert_eq!(request.unknown, Unknown::VestingPeriod);
        assert_eq!(request.option, CompoundingOption::Annually);
        assert_approx(request.plan.rate_percentage(), 6.0);
        assert_approx(request.plan.inflation_percentage(), 1.5);
        assert_approx(request.plan.tax_rate_percentage(), 10.0);
        assert_eq!(request.plan.vesting_period(), 3);
        assert_eq!(request.config.vesting_method, VestingMethod::Iterative);
        assert_eq!(request.config.max_periods, 500);
    }

    #[test]
    fn api_request_accepts_unknown_aliases() {
        let request = api_request_from_json(r#"{"solveFor":"ratePercentage","rateMethod":"step"}"#)
            .expect("valid payload");
        assert_eq!(request.unknown, Unknown::RatePercentage);
        assert_eq!(request.config.rate_method, RateMethod::LinearStep);

        let request = api_request_from_json(r#"{"solveFor":"initial","compounding":"yearly"}"#)
            .expect("valid payload");
        assert_eq!(request.unknown, Unknown::InitialAmount);
        assert_eq!(request.option, CompoundingOption::Annually);
    }

    #[test]
    fn api_request_rejects_bad_json_and_bad_config() {
        let err = api_request_from_json(r#"{"solveFor":"everything"}"#)
            .expect_err("unknown variant");
        assert!(err.contains("Invalid API JSON payload"));

        let err = api_request_from_json(r#"{"searchMin":5,"searchMax":1}"#)
            .expect_err("inverted bounds");
        assert!(err.contains("search_max"));
    }

    #[test]
    fn solve_request_reports_target_amount() {
        let request = api_request_from_json(
            r#"{"initialAmount":1000,"periodicAmount":1200,"ratePercentage":12,"vestingPeriod":1}"#,
        )
        .expect("valid payload");
        let response = solve_request(&request).expect("solvable");

        assert_eq!(response.solve_for, Unknown::TargetAmount);
        assert!((response.value - 2_395.08).abs() <= 0.01);
        assert_approx(response.effective_rate, 1.01);
        assert_eq!(response.sub_periods, 12);
    }

    #[test]
    fn solve_request_surfaces_unreachable_target() {
        let request = api_request_from_json(
            r#"{"solveFor":"vesting-period","targetAmount":100,"vestingPeriod":10}"#,
        )
        .expect("valid payload");
        let err = solve_request(&request).expect_err("unreachable");
        assert_eq!(err.kind(), "unreachable");

        let response = solve_error_response(&err);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok()),
            Some("no-store")
        );
    }

    #[test]
    fn solve_response_serialization_contains_expected_fields() {
        let request = api_request_from_json(
            r#"{"solveFor":"periodic-amount","compounding":"quarterly","initialAmount":500,"targetAmount":10000,"ratePercentage":4,"vestingPeriod":8}"#,
        )
        .expect("valid payload");
        let response = solve_request(&request).expect("solvable");
        let json = serde_json::to_string(&response).expect("response should serialize");

        assert!(json.contains("\"solveFor\":\"periodic-amount\""));
        assert!(json.contains("\"compounding\":\"quarterly\""));
        assert!(json.contains("\"value\""));
        assert!(json.contains("\"effectiveRate\""));
        assert!(json.contains("\"subPeriods\":32"));
    }

    #[test]
    fn error_body_carries_kind_only_for_solve_failures() {
        let body = ErrorResponse {
            error: "Not found".to_string(),
            kind: None,
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert_eq!(json, r#"{"error":"Not found"}"#);

        let err = SolveError::SearchExhausted {
            unknown: Unknown::RatePercentage,
            iterations: 4,
        };
        let body = ErrorResponse {
            error: err.to_string(),
            kind: Some(err.kind()),
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert!(json.contains(r#""kind":"search-exhausted""#));
    }
}
