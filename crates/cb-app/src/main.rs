//! Command-line chart builder
//!
//! Loads a CSV file and a saved dashboard, runs every chart through its view
//! controller and prints the resulting render models as JSON.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cb_core::{validate, ColumnCatalog, DashboardDocument};
use cb_data::{CsvConfig, CsvSource, QueryCompiler};
use cb_views::{DashboardSession, RenderModel, ViewState};

#[derive(Parser)]
#[command(name = "chartbuilder")]
#[command(about = "Compile, execute and adapt declarative chart specs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect column types of a CSV file
    Profile {
        csv: PathBuf,

        #[command(flatten)]
        format: CsvArgs,

        /// Print the first N rows as a table
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Show the aggregation request each chart compiles to
    Compile {
        #[arg(long)]
        dashboard: PathBuf,

        /// Validate columns against this dataset
        #[arg(long)]
        csv: Option<PathBuf>,

        #[command(flatten)]
        format: CsvArgs,
    },

    /// Execute every chart of a dashboard against a CSV file
    Render {
        csv: PathBuf,

        #[arg(long)]
        dashboard: PathBuf,

        /// Select a point before rendering, as CHART_INDEX=VALUE
        #[arg(long)]
        select: Option<String>,

        #[command(flatten)]
        format: CsvArgs,
    },
}

#[derive(clap::Args)]
struct CsvArgs {
    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// The first line is data, not a header
    #[arg(long)]
    no_header: bool,

    /// Rows sampled for type detection
    #[arg(long, default_value_t = 1000)]
    sample_size: usize,
}

impl CsvArgs {
    fn config(&self) -> Result<CsvConfig> {
        if !self.delimiter.is_ascii() {
            bail!("delimiter must be a single ASCII character");
        }
        Ok(CsvConfig::default()
            .with_delimiter(self.delimiter as u8)
            .with_header(!self.no_header)
            .with_sample_size(self.sample_size))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = match &cli.command {
        Commands::Profile { csv, format, preview } => profile(csv, format, *preview).await?,
        Commands::Compile { dashboard, csv, format } => compile(dashboard, csv.as_deref(), format).await?,
        Commands::Render {
            csv,
            dashboard,
            select,
            format,
        } => render(csv, dashboard, select.as_deref(), format).await?,
    };

    let text = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);
    Ok(())
}

async fn load_source(path: &Path, format: &CsvArgs) -> Result<CsvSource> {
    CsvSource::load(path, format.config()?)
        .await
        .with_context(|| format!("failed to load {}", path.display()))
}

fn load_dashboard(path: &Path) -> Result<DashboardDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    DashboardDocument::from_json(&text).with_context(|| format!("invalid dashboard {}", path.display()))
}

async fn profile(path: &Path, format: &CsvArgs, preview: Option<usize>) -> Result<Value> {
    let source = load_source(path, format).await?;

    if let Some(rows) = preview {
        let batch = source.batch().slice(0, rows.min(source.row_count()));
        eprintln!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
    }

    let columns: Vec<Value> = source
        .catalog()
        .iter()
        .map(|column| {
            let stats = source.column_stats().get(&column.name);
            json!({
                "name": column.name,
                "dtype": column.dtype,
                "null_count": stats.map(|s| s.null_count),
                "distinct_count": stats.map(|s| s.distinct_count),
            })
        })
        .collect();

    Ok(json!({
        "source": source.source_name(),
        "rows": source.row_count(),
        "columns": columns,
    }))
}

async fn compile(dashboard: &Path, csv: Option<&Path>, format: &CsvArgs) -> Result<Value> {
    let document = load_dashboard(dashboard)?;
    let catalog = match csv {
        Some(path) => load_source(path, format).await?.catalog().clone(),
        None => ColumnCatalog::default(),
    };
    let compiler = QueryCompiler::default();

    let charts = document
        .charts
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            match validate(spec, &catalog).and_then(|()| compiler.compile(spec, &document.filters)) {
                Ok(request) => json!({"chart": index, "request": request}),
                Err(error) => json!({"chart": index, "error": error.to_string(), "field": error.field().as_str()}),
            }
        })
        .collect::<Vec<_>>();

    Ok(json!({ "dashboard": document.name, "charts": charts }))
}

async fn render(csv: &Path, dashboard: &Path, select: Option<&str>, format: &CsvArgs) -> Result<Value> {
    let source = load_source(csv, format).await?;
    let document = load_dashboard(dashboard)?;
    info!("Rendering '{}' ({} charts)", document.name, document.charts.len());

    let mut session = DashboardSession::from_document(document, source.catalog().clone())?;
    let ids = session.chart_ids();

    if let Some(selection) = select {
        let (index, value) = selection
            .split_once('=')
            .context("--select expects CHART_INDEX=VALUE")?;
        let index: usize = index.trim().parse().context("chart index must be a number")?;
        let id = ids
            .get(index)
            .with_context(|| format!("dashboard has no chart {}", index))?;
        match session.select_point(id, value.trim())? {
            Some(delta) => info!("Cross-filter {} = {}", delta.column, delta.value),
            None => info!("Chart {} does not support point selection", index),
        }
    }

    let executor = source.executor();
    session.refresh_all(&executor).await?;

    let charts = ids
        .iter()
        .enumerate()
        .filter_map(|(index, id)| session.chart(id).map(|chart| (index, chart)))
        .map(|(index, chart)| {
            let mut entry = json!({
                "chart": index,
                "chart_kind": chart.spec().chart_kind,
                "state": state_name(chart.state()),
            });
            if let Some(model) = chart.render_model() {
                if let RenderModel::Empty(empty) = model {
                    entry["placeholder"] = json!(empty.placeholder());
                }
                entry["render"] = json!(model);
            }
            if let Some(error) = chart.last_error() {
                entry["error"] = json!({
                    "message": error.message,
                    "field": error.field.map(|f| f.as_str()),
                    "retryable": error.retryable,
                });
            }
            entry
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "dashboard": session.name(),
        "filters": session.filters(),
        "charts": charts,
    }))
}

fn state_name(state: ViewState) -> &'static str {
    match state {
        ViewState::Uninitialized => "uninitialized",
        ViewState::Hydrating => "hydrating",
        ViewState::Ready => "ready",
        ViewState::Stale => "stale",
        ViewState::Compiling { .. } => "compiling",
        ViewState::RenderReady { .. } => "render_ready",
        ViewState::Error => "error",
        ViewState::TornDown => "torn_down",
    }
}
