//! Campaign Forecaster: budget allocation and funnel forecasts for digital
//! advertising campaigns.
//!
//! Reads a campaign request as JSON, runs the forecasting engine, and prints
//! the report as JSON or as a table.

use anyhow::Context;
use campaign_core::config::AppConfig;
use campaign_core::format::{format_count, format_currency, format_percentage};
use campaign_core::{CampaignInput, Locale, Metric, SanityPolicy};
use campaign_forecast::{CampaignReport, ForecastEngine};
use campaign_registry::Registries;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "campaign-forecaster")]
#[command(about = "Budget allocation and KPI forecasts for advertising campaigns")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "CAMPAIGN_FORECAST__CONFIG")]
    config: Option<String>,

    /// Registry JSON replacing the built-in tables (overrides config)
    #[arg(long, global = true, env = "CAMPAIGN_FORECAST__REGISTRY__PATH")]
    registry: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Forecast a campaign request
    Forecast {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long)]
        input: String,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,

        /// Run the sanity, explanation and recommendation stages in parallel
        #[arg(long, default_value_t = false)]
        concurrent: bool,

        /// Explanation language (overrides config)
        #[arg(long, value_enum)]
        locale: Option<LocaleArg>,

        /// Minimum accepted budget (overrides config)
        #[arg(long, env = "CAMPAIGN_FORECAST__FORECAST__MIN_BUDGET")]
        min_budget: Option<f64>,

        /// What to do with out-of-range estimates (overrides config)
        #[arg(long, value_enum)]
        sanity_policy: Option<PolicyArg>,
    },

    /// Validate a campaign request without forecasting
    Validate {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long)]
        input: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LocaleArg {
    En,
    Ar,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Warn,
    Clamp,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campaign_forecaster=info,campaign_forecast=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn read_input(source: &str) -> anyhow::Result<CampaignInput> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading request {source}"))?
    };
    serde_json::from_str(&raw).context("parsing campaign request")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(path) = cli.registry {
        config.registry.path = Some(path);
    }

    let registries = match &config.registry.path {
        Some(path) => Registries::from_path(path)?,
        None => Registries::builtin()?,
    };

    match cli.command {
        Commands::Forecast {
            input,
            output,
            concurrent,
            locale,
            min_budget,
            sanity_policy,
        } => {
            // Apply CLI overrides
            if let Some(locale) = locale {
                config.forecast.locale = match locale {
                    LocaleArg::En => Locale::En,
                    LocaleArg::Ar => Locale::Ar,
                };
            }
            if let Some(min_budget) = min_budget {
                config.forecast.min_budget = min_budget;
            }
            if let Some(policy) = sanity_policy {
                config.forecast.sanity.policy = match policy {
                    PolicyArg::Warn => SanityPolicy::Warn,
                    PolicyArg::Clamp => SanityPolicy::Clamp,
                };
            }

            let engine = Arc::new(ForecastEngine::new(Arc::new(registries), config.forecast)?);
            let request = read_input(&input)?;
            info!(industry = %request.industry, budget = request.budget, concurrent, "Forecasting");

            let report = if concurrent {
                engine.forecast_concurrent(request).await?
            } else {
                engine.forecast(&request)?
            };

            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Table => {
                    let forecast = engine.config();
                    print_table(&report, forecast.currency_decimals, &forecast.currency_code);
                }
            }
        }
        Commands::Validate { input } => {
            let engine = ForecastEngine::new(Arc::new(registries), config.forecast)?;
            let request = read_input(&input)?;
            let report = engine.validate(&request);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid {
                anyhow::bail!("campaign request is invalid ({} error(s))", report.errors.len());
            }
        }
    }

    Ok(())
}

fn print_table(report: &CampaignReport, decimals: u32, currency: &str) {
    let money = |v: f64| format_currency(v, decimals, currency);
    let optional = |v: Option<f64>| v.map(money).unwrap_or_else(|| "n/a".to_string());

    println!("=== Campaign Forecast: {} ===", report.industry);
    println!();
    println!("  Budget:       {}", money(report.budget));
    println!("  Budget tier:  {}", report.budget_tier);
    println!("  Funnel focus: {:?}", report.funnel_focus);
    println!();
    println!(
        "  {:<16} {:>18} {:>8} {:>12} {:>10} {:>8} {:>10} {:>8}",
        "Platform", "Budget", "Share", "Impressions", "Clicks", "CTR", "Conv.", "ROAS"
    );
    for (slice, kpi) in report.allocation.platforms.iter().zip(&report.kpis.platforms) {
        println!(
            "  {:<16} {:>18} {:>8} {:>12} {:>10} {:>8} {:>10} {:>7.2}x",
            slice.platform,
            money(slice.amount),
            format_percentage(slice.share * 100.0, 1),
            format_count(kpi.impressions),
            format_count(kpi.clicks),
            format_percentage(kpi.ctr, 2),
            format_count(kpi.conversions),
            kpi.roas
        );
    }

    let t = &report.kpis.totals;
    println!();
    println!("  Totals");
    println!("    Impressions:  {}", format_count(t.impressions));
    println!("    Clicks:       {}", format_count(t.clicks));
    println!("    CTR:          {}", format_percentage(t.ctr, 2));
    println!("    Conversions:  {}", format_count(t.conversions));
    println!("    CVR:          {}", format_percentage(t.cvr, 2));
    println!("    CPM:          {}", money(t.cpm));
    println!("    CPC:          {}", optional(t.cpc));
    println!("    CAC:          {}", optional(t.cac));
    println!("    ROAS:         {:.2}x", t.roas);

    println!();
    println!("  Confidence");
    for metric in Metric::ALL {
        if let Some(score) = report.confidence.total(metric) {
            println!("    {:<12} {:.2}", metric.as_str(), score);
        }
    }

    if !report.warnings.is_empty() {
        println!();
        println!("  Warnings ({}):", report.warnings.len());
        for w in &report.warnings {
            println!("    - {}", w.message);
        }
    }

    println!();
    println!("  Explanations");
    for (field, text) in &report.explanations {
        println!("    {:<12} {}", field, text);
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("  Recommendations");
        for r in &report.recommendations {
            println!("    - {r}");
        }
    }
    println!();
}
