//! editgrid command line
//!
//! `demo` runs the end-to-end reconcile scenarios against an in-memory store;
//! `check-config` loads and validates a TOML grid configuration.

mod demo;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use editgrid_core::GridConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("editgrid")
        .version(editgrid_core::VERSION)
        .about("Tamper-evident reconciliation of edited grids")
        .subcommand_required(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("demo")
                .about("Run end-to-end scenarios against the in-memory store")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .default_value("all")
                        .value_parser(["a", "b", "c", "d", "all"])
                        .help("Scenario to run"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Grid config overriding the demo defaults"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load and validate a TOML grid config")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Config file"),
                ),
        )
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn check_config(path: &Path) -> anyhow::Result<serde_json::Value> {
    let config = GridConfig::from_path(path)
        .with_context(|| format!("invalid grid config {}", path.display()))?;
    let schema = config.schema()?;
    Ok(serde_json::json!({
        "form_name": config.form_name(),
        "table": config.table,
        "columns": schema.len(),
        "keys": schema.key_names(),
        "max_rows": config.max_rows,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("json"));

    match matches.subcommand() {
        Some(("demo", args)) => {
            let scenario = args
                .get_one::<String>("scenario")
                .map_or("all", String::as_str);
            let config = args
                .get_one::<PathBuf>("config")
                .map(GridConfig::from_path)
                .transpose()?;
            let config = demo::demo_config(config)?;

            for scenario in demo::Scenario::parse(scenario)? {
                let outcome = demo::run(scenario, &config).await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        }
        Some(("check-config", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("missing --path")?;
            let summary = check_config(path)?;
            tracing::info!("Config {} is valid", path.display());
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}
