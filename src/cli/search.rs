//! `search` and `search-all` commands

use chrono::NaiveDate;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{Cli, CliError, OutputFormat};
use crate::client::CepikClient;
use crate::downloader::progress::{PageProgress, ProgressSnapshot};
use crate::downloader::{PartitionState, SearchParams};
use crate::output::csv::{write_table, CsvTableWriter};
use crate::output::table::columns;
use crate::output::OutputWriter;
use crate::region::RegionCode;
use crate::Record;

/// Parse a date given as YYYY-MM-DD or YYYYMMDD
pub fn parse_date(input: &str) -> Result<NaiveDate, String> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%Y%m%d"))
        .map_err(|_| format!("invalid date '{input}', expected YYYY-MM-DD"))
}

/// Parse a `key=value` filter
pub fn parse_filter(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid filter '{input}', expected key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid filter '{input}', key is empty"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Query options shared by both search commands
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// First registration date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: NaiveDate,

    /// Last registration date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub to: NaiveDate,

    /// Brand filter
    #[arg(long)]
    pub brand: Option<String>,

    /// Model filter
    #[arg(long)]
    pub model: Option<String>,

    /// Lowest production year kept
    #[arg(long)]
    pub year_from: Option<i32>,

    /// Highest production year kept
    #[arg(long)]
    pub year_to: Option<i32>,

    /// Additional API filter as key=value (repeatable)
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Write the table to this CSV file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl QueryArgs {
    /// Search parameters for these options
    pub fn to_params(&self, retry: bool) -> SearchParams {
        let mut params = SearchParams::new()
            .with_date_range(self.from, self.to)
            .with_years(self.year_from, self.year_to)
            .with_retry(retry);
        if let Some(brand) = &self.brand {
            params = params.with_brand(brand.as_str());
        }
        if let Some(model) = &self.model {
            params = params.with_model(model.as_str());
        }
        for (key, value) in &self.filters {
            params = params.with_filter(key.as_str(), value.as_str());
        }
        params
    }
}

/// `search` arguments
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Region code (e.g. 14 for MAZOWIECKIE)
    #[arg(long)]
    pub region: String,

    /// Query options
    #[command(flatten)]
    pub query: QueryArgs,
}

impl SearchArgs {
    /// Run a single-region search
    pub async fn execute(&self, cli: &Cli, client: &CepikClient) -> Result<(), CliError> {
        let params = self
            .query
            .to_params(!cli.no_retry)
            .with_region(self.region.as_str());

        let spinner = ProgressBar::new_spinner();
        let progress = PageProgress({
            let spinner = spinner.clone();
            move |page: u32, total: Option<u64>, fetched: usize| {
                let total = total.map_or_else(|| "?".to_string(), |t| t.to_string());
                spinner.set_message(format!("page {page}: {fetched}/{total} records"));
                spinner.tick();
            }
        });

        let result = client.search(&params, &progress).await;
        spinner.finish_and_clear();
        let result = result?;

        info!(
            region = %self.region,
            records = result.records.len(),
            pages = result.meta.pages_fetched,
            "Search complete"
        );

        match cli.output_format {
            OutputFormat::Json => {
                let body = json!({
                    "batch": result.batch,
                    "total_count": result.meta.total_count,
                    "pages_fetched": result.meta.pages_fetched,
                    "records": result.records,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
                if let Some(path) = &self.query.output {
                    write_csv(client, &result.records, path)?;
                }
            }
            OutputFormat::Human => {
                render_human(client, &result.records, self.query.output.as_deref())?
            }
        }
        Ok(())
    }
}

/// `search-all` arguments
#[derive(Args, Debug, Clone)]
pub struct SearchAllArgs {
    /// Restrict to these region codes (comma separated); all 16 when omitted
    #[arg(long, value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Query options
    #[command(flatten)]
    pub query: QueryArgs,
}

impl SearchAllArgs {
    /// Selected regions, all when none were given
    pub fn selected_regions(&self) -> Result<Vec<RegionCode>, CliError> {
        if self.regions.is_empty() {
            return Ok(RegionCode::all());
        }
        self.regions
            .iter()
            .map(|code| {
                RegionCode::parse(code).map_err(|e| CliError::InvalidArgument(e.to_string()))
            })
            .collect()
    }

    /// Run a parallel search
    pub async fn execute(&self, cli: &Cli, client: &CepikClient) -> Result<(), CliError> {
        let regions = self.selected_regions()?;
        let params = self.query.to_params(!cli.no_retry);

        let bar = create_progress_bar(regions.len() as u64);
        let sink = {
            let bar = bar.clone();
            move |snapshot: ProgressSnapshot| {
                bar.set_position(snapshot.completed() as u64);
                bar.set_message(describe(&snapshot));
            }
        };

        let outcome = client
            .search_regions_parallel(&params, &regions, &sink)
            .await;
        bar.finish_and_clear();
        let outcome = outcome?;

        for error in &outcome.errors {
            warn!("{error}");
        }

        match cli.output_format {
            OutputFormat::Json => {
                let body = json!({
                    "batch": outcome.batch,
                    "records": outcome.records,
                    "errors": outcome.errors,
                    "partitions": outcome.statuses,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
                if let Some(path) = &self.query.output {
                    write_csv(client, &outcome.records, path)?;
                }
            }
            OutputFormat::Human => {
                render_human(client, &outcome.records, self.query.output.as_deref())?;
                if outcome.is_partial_failure() {
                    eprintln!(
                        "{} of {} regions failed:",
                        outcome.errors.len(),
                        regions.len()
                    );
                    for error in &outcome.errors {
                        eprintln!("  {error}");
                    }
                }
            }
        }
        Ok(())
    }
}

/// One-line summary of a snapshot for the progress bar
pub fn describe(snapshot: &ProgressSnapshot) -> String {
    let count = |wanted: fn(&PartitionState) -> bool| {
        snapshot
            .partitions
            .iter()
            .filter(|p| wanted(&p.state))
            .count()
    };
    let active = count(|s| {
        matches!(
            s,
            PartitionState::Fetching | PartitionState::Page(_) | PartitionState::Resuming
        )
    });
    let held = count(|s| matches!(s, PartitionState::Paused | PartitionState::RateLimited));
    let failed = count(|s| *s == PartitionState::Failed);

    let mut parts = vec![format!("{active} active")];
    if held > 0 {
        parts.push(format!("{held} rate limited"));
    }
    if failed > 0 {
        parts.push(format!("{failed} failed"));
    }
    parts.push(format!("{} records", snapshot.unique_records));
    parts.join(", ")
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} regions {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn write_csv(client: &CepikClient, records: &[Record], path: &Path) -> Result<u64, CliError> {
    let rows = client.to_table(records);
    Ok(write_table(path, &rows)?)
}

fn render_human(
    client: &CepikClient,
    records: &[Record],
    output: Option<&Path>,
) -> Result<(), CliError> {
    if let Some(path) = output {
        let written = write_csv(client, records, path)?;
        println!("Wrote {written} records to {}", path.display());
        return Ok(());
    }

    let rows = client.to_table(records);
    let stdout = std::io::stdout();
    let mut writer = CsvTableWriter::from_writer(stdout.lock(), columns(&rows))?;
    for row in &rows {
        writer.write_row(row)?;
    }
    writer.close()?;
    Ok(())
}
