use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AccountBalances, ComparisonOutcome, FilingStatus, HEALTHCARE_INFLATION, Inputs,
    RetirementProfile, TaxSchedule, compare_strategies,
};

const MAX_HORIZON_YEARS: u32 = 120;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    MarriedFilingJointly,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::MarriedFilingJointly => FilingStatus::MarriedFilingJointly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFilingStatus {
    Single,
    #[serde(
        alias = "marriedFilingJointly",
        alias = "married_filing_jointly",
        alias = "mfj"
    )]
    MarriedFilingJointly,
}

impl From<ApiFilingStatus> for CliFilingStatus {
    fn from(value: ApiFilingStatus) -> Self {
        match value {
            ApiFilingStatus::Single => CliFilingStatus::Single,
            ApiFilingStatus::MarriedFilingJointly => CliFilingStatus::MarriedFilingJointly,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComparePayload {
    current_age: Option<u32>,
    life_expectancy: Option<u32>,

    taxable: Option<f64>,
    traditional: Option<f64>,
    roth: Option<f64>,
    hsa: Option<f64>,

    annual_spending: Option<f64>,
    social_security: Option<f64>,
    pension: Option<f64>,
    healthcare_cost: Option<f64>,

    filing_status: Option<ApiFilingStatus>,
    expected_return: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "drawdown",
    about = "Compare retirement withdrawal orders by lifetime federal tax (taxable, traditional, Roth, HSA)"
)]
struct Cli {
    #[arg(long)]
    current_age: u32,
    #[arg(long, default_value_t = 90, help = "Age to simulate through (exclusive)")]
    life_expectancy: u32,
    #[arg(long, default_value_t = 0.0, help = "Taxable brokerage balance")]
    taxable: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Tax-deferred balance (traditional IRA/401k)"
    )]
    traditional: f64,
    #[arg(long, default_value_t = 0.0)]
    roth: f64,
    #[arg(long, default_value_t = 0.0)]
    hsa: f64,
    #[arg(long, help = "Annual spending need in today's dollars")]
    annual_spending: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual Social Security benefit")]
    social_security: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual pension income")]
    pension: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "First-year healthcare cost, paid from the HSA first"
    )]
    healthcare_cost: f64,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Expected annual return on all accounts in percent, e.g. 5"
    )]
    expected_return: f64,
    #[arg(
        long,
        help = "JSON tax schedule to use instead of the built-in 2024 federal tables"
    )]
    tax_table: Option<PathBuf>,
    #[arg(long, help = "Print the full comparison as JSON")]
    json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse<'a> {
    filing_status: FilingStatus,
    current_age: u32,
    life_expectancy: u32,
    #[serde(flatten)]
    outcome: &'a ComparisonOutcome,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: &Cli) -> Result<Inputs, String> {
    if cli.life_expectancy <= cli.current_age {
        return Err("--life-expectancy must be > --current-age".to_string());
    }

    if cli.life_expectancy - cli.current_age > MAX_HORIZON_YEARS {
        return Err(format!(
            "--life-expectancy must be within {MAX_HORIZON_YEARS} years of --current-age"
        ));
    }

    for (name, value) in [
        ("--taxable", cli.taxable),
        ("--traditional", cli.traditional),
        ("--roth", cli.roth),
        ("--hsa", cli.hsa),
        ("--annual-spending", cli.annual_spending),
        ("--social-security", cli.social_security),
        ("--pension", cli.pension),
        ("--healthcare-cost", cli.healthcare_cost),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if !cli.expected_return.is_finite() || cli.expected_return <= -100.0 {
        return Err("--expected-return must be > -100".to_string());
    }

    Ok(Inputs {
        profile: RetirementProfile {
            current_age: cli.current_age,
            life_expectancy: cli.life_expectancy,
            annual_spending_need: cli.annual_spending,
            social_security: cli.social_security,
            pension: cli.pension,
            healthcare_cost_base: cli.healthcare_cost,
            filing_status: cli.filing_status.into(),
            expected_return: cli.expected_return / 100.0,
            healthcare_inflation: HEALTHCARE_INFLATION,
        },
        starting_balances: AccountBalances {
            taxable: cli.taxable,
            traditional: cli.traditional,
            roth: cli.roth,
            hsa: cli.hsa,
        },
    })
}

fn load_schedule(path: Option<&Path>) -> Result<TaxSchedule, String> {
    match path {
        Some(path) => TaxSchedule::load(path).map_err(|e| format!("{}: {e}", path.display())),
        None => Ok(TaxSchedule::federal_2024()),
    }
}

pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let Some(cli) = parse_cli(args)? else {
        return Ok(());
    };
    let inputs = build_inputs(&cli)?;
    let schedule = load_schedule(cli.tax_table.as_deref())?;
    let outcome = compare_strategies(&inputs, &schedule);

    if cli.json {
        let response = build_compare_response(&inputs, &outcome);
        let json = serde_json::to_string_pretty(&response)
            .map_err(|e| format!("Failed to serialize comparison: {e}"))?;
        println!("{json}");
    } else {
        print!("{}", render_summary(&outcome));
    }

    info!(
        best = outcome.best_policy.name(),
        years = inputs.profile.life_expectancy - inputs.profile.current_age,
        "comparison finished"
    );
    Ok(())
}

/// `Ok(None)` means help or version text was printed and there is nothing to run.
fn parse_cli<I, T>(args: I) -> Result<Option<Cli>, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            Ok(None)
        }
        Err(e) => {
            let message = e.to_string();
            Err(message.trim_start_matches("error: ").trim_end().to_string())
        }
    }
}

fn render_summary(outcome: &ComparisonOutcome) -> String {
    let mut out = format!(
        "{:<20} {:>16} {:>16} {:>16}\n",
        "policy", "lifetime tax", "withdrawn", "ending balance"
    );
    for (index, result) in outcome.results.iter().enumerate() {
        let marker = if index == outcome.best_index { " *" } else { "" };
        out.push_str(&format!(
            "{:<20} {:>16.2} {:>16.2} {:>16.2}{marker}\n",
            result.policy.name(),
            result.total_taxes_paid,
            result.total_withdrawn,
            result.ending_balance,
        ));
    }
    out.push_str(&format!(
        "\nrecommended: {} (saves {:.2} vs roth-first)\n",
        outcome.best_policy.name(),
        outcome.tax_savings_vs_baseline
    ));
    out
}

pub async fn run_http_server(port: u16, schedule: TaxSchedule) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route(
            "/api/compare",
            get(compare_get_handler).post(compare_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(Arc::new(schedule));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "drawdown HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/api/compare");

    axum::serve(listener, app).await
}

const DEFAULT_PORT: u16 = 8080;

/// Arguments after `serve`: `[port] [tax-table.json]`.
pub fn serve_config(args: &[String]) -> Result<(u16, TaxSchedule), String> {
    const USAGE: &str = "usage: drawdown serve [port] [tax-table.json]";

    let port = match args.first() {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| format!("invalid port '{raw}'; {USAGE}"))?,
        None => DEFAULT_PORT,
    };
    if args.len() > 2 {
        return Err(format!("unexpected argument '{}'; {USAGE}", args[2]));
    }
    let schedule = load_schedule(args.get(1).map(Path::new))?;
    Ok((port, schedule))
}

async fn health_handler() -> impl IntoResponse {
    with_cache_control("ok")
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn compare_get_handler(
    State(schedule): State<Arc<TaxSchedule>>,
    Query(payload): Query<ComparePayload>,
) -> Response {
    compare_handler_impl(payload, &schedule).await
}

async fn compare_post_handler(
    State(schedule): State<Arc<TaxSchedule>>,
    Json(payload): Json<ComparePayload>,
) -> Response {
    compare_handler_impl(payload, &schedule).await
}

async fn compare_handler_impl(payload: ComparePayload, schedule: &TaxSchedule) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let outcome = compare_strategies(&inputs, schedule);
    json_response(StatusCode::OK, build_compare_response(&inputs, &outcome))
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

#[cfg(test)]
fn inputs_from_json(json: &str) -> Result<Inputs, String> {
    let payload = serde_json::from_str::<ComparePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    inputs_from_payload(payload)
}

fn inputs_from_payload(payload: ComparePayload) -> Result<Inputs, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }

    if let Some(v) = payload.taxable {
        cli.taxable = v;
    }
    if let Some(v) = payload.traditional {
        cli.traditional = v;
    }
    if let Some(v) = payload.roth {
        cli.roth = v;
    }
    if let Some(v) = payload.hsa {
        cli.hsa = v;
    }

    if let Some(v) = payload.annual_spending {
        cli.annual_spending = v;
    }
    if let Some(v) = payload.social_security {
        cli.social_security = v;
    }
    if let Some(v) = payload.pension {
        cli.pension = v;
    }
    if let Some(v) = payload.healthcare_cost {
        cli.healthcare_cost = v;
    }

    if let Some(v) = payload.filing_status {
        cli.filing_status = v.into();
    }
    if let Some(v) = payload.expected_return {
        cli.expected_return = v;
    }

    build_inputs(&cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 65,
        life_expectancy: 90,
        taxable: 250_000.0,
        traditional: 800_000.0,
        roth: 200_000.0,
        hsa: 40_000.0,
        annual_spending: 84_000.0,
        social_security: 24_000.0,
        pension: 0.0,
        healthcare_cost: 6_000.0,
        filing_status: CliFilingStatus::MarriedFilingJointly,
        expected_return: 5.0,
        tax_table: None,
        json: false,
    }
}

fn build_compare_response<'a>(
    inputs: &Inputs,
    outcome: &'a ComparisonOutcome,
) -> CompareResponse<'a> {
    CompareResponse {
        filing_status: inputs.profile.filing_status,
        current_age: inputs.profile.current_age,
        life_expectancy: inputs.profile.life_expectancy,
        outcome,
    }
}
