mod category;
mod db;
mod error;
mod input;
mod normalize;
mod profiles;
mod raw;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::category::CanonicalCategory;
use crate::normalize::NormalizedRecord;
use crate::profiles::{Registry, SourceProfile};
use crate::raw::RawRecord;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "lot_pipeline", about = "Auction lot classifier and normalizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a capture file and write the result as JSON
    Normalize {
        /// Raw lots (JSON array, search-API response or JSON lines); "-" reads stdin
        #[arg(short, long)]
        input: PathBuf,
        /// Source profile (default: from settings, else each lot's own `source`)
        #[arg(short, long)]
        source: Option<String>,
        /// Output file (default: <output_dir>/<source>_<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Max lots to normalize
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Normalize a capture file and upsert the lots into the store
    Run {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show the canonical category for a site label
    Classify {
        label: String,
        #[arg(short, long)]
        source: Option<String>,
    },
    /// List known source profiles
    Profiles,
    /// Show store statistics
    Stats,
    /// Lots overview table
    Overview {
        /// Filter by category (label or key, e.g. "imoveis")
        #[arg(short, long)]
        category: Option<String>,
        /// Filter by state (UF, e.g. "SP")
        #[arg(short, long)]
        state: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load();
    let registry = profiles::install(profiles::load_registry(settings.profiles_path.as_deref())?)
        .map_err(|_| anyhow::anyhow!("source profiles already initialised"))?;

    let result = match cli.command {
        Commands::Normalize { input, source, output, limit } => {
            let profile = pick_profile(registry, source, &settings);
            let label = profile_label(profile);
            let raws = load_limited(&input, limit)?;
            if raws.is_empty() {
                println!("No lots in {}.", input.display());
                return Ok(());
            }
            println!("Normalizing {} lots with profile '{}'...", raws.len(), label);
            let records = normalize_all(&raws, profile, settings.batch_size, |_| Ok(()))?;

            let path = output.unwrap_or_else(|| default_output(&settings.output_dir, label));
            write_json(&path, &records)?;
            println!("Wrote {} lots to {}", records.len(), path.display());
            print_counts(&records);
            Ok(())
        }
        Commands::Run { input, source, limit } => {
            let profile = pick_profile(registry, source, &settings);
            let label = profile_label(profile);
            let raws = load_limited(&input, limit)?;
            if raws.is_empty() {
                println!("No lots in {}.", input.display());
                return Ok(());
            }

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;

            let started_at = chrono::Utc::now().to_rfc3339();
            let t_run = Instant::now();
            println!("Pipeline: {} lots with profile '{}'...", raws.len(), label);

            let mut stats = db::UpsertStats::default();
            let records = normalize_all(&raws, profile, settings.batch_size, |batch| {
                stats.add(db::upsert_lots(&conn, batch)?);
                Ok(())
            })?;

            db::record_run(
                &conn,
                &db::RunRow {
                    source: label.to_string(),
                    input: input.display().to_string(),
                    total: records.len(),
                    upserted: stats.upserted,
                    skipped: stats.skipped,
                    duration_ms: t_run.elapsed().as_millis() as i64,
                    started_at,
                },
            )?;
            println!(
                "Stored {} lots ({} skipped without id) in {}",
                stats.upserted,
                stats.skipped,
                settings.db_path.display()
            );
            print_counts(&records);
            Ok(())
        }
        Commands::Classify { label, source } => {
            let (category, used) = match pick_profile(registry, source, &settings) {
                Some(p) => (p.classifier.classify(Some(&label)), p.id.as_str()),
                None => (category::classify(Some(&label)), profiles::GENERIC),
            };
            println!("{} -> {} ({})", label, category, used);
            Ok(())
        }
        Commands::Profiles => {
            println!(
                "{:<12} | {:<24} | {:>7} | {:>5} | {:<20} | {}",
                "Id", "Name", "Labels", "Rules", "Default", "Link"
            );
            println!("{}", "-".repeat(96));
            for p in registry.iter() {
                println!(
                    "{:<12} | {:<24} | {:>7} | {:>5} | {:<20} | {}",
                    truncate(&p.id, 12),
                    truncate(&p.name, 24),
                    p.classifier.table_len(),
                    p.classifier.rules().len(),
                    p.classifier.default_category(),
                    p.link_template.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
        Commands::Overview { category, state, limit } => {
            let category = category
                .map(|c| c.parse::<CanonicalCategory>())
                .transpose()?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_overview(
                &conn,
                category.map(CanonicalCategory::label),
                state.as_deref(),
                limit,
            )?;
            if rows.is_empty() {
                println!("No lots found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<10} | {:<12} | {:<22} | {:<36} | {:<16} | {:<2} | {:>12} | {:<19}",
                "#", "Source", "Id", "Category", "Title", "City", "UF", "Value", "Auction"
            );
            println!("{}", "-".repeat(156));

            for (i, r) in rows.iter().enumerate() {
                let value = r.value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:<10} | {:<12} | {:<22} | {:<36} | {:<16} | {:<2} | {:>12} | {:<19}",
                    i + 1,
                    truncate(&r.source, 10),
                    truncate(&r.external_id, 12),
                    r.category,
                    truncate(&r.title, 36),
                    truncate(&r.city, 16),
                    r.state,
                    value,
                    truncate(&r.auction_date, 19),
                );
            }

            println!("\n{} lots", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Lots:        {}", s.total);
            println!("Sources:     {}", s.sources);
            println!("With value:  {}", s.with_value);
            println!("With desc:   {}", s.with_description);
            println!("With UF:     {}", s.with_state);
            println!("Runs:        {}", s.runs);

            let counts = db::category_counts(&conn, None)?;
            if !counts.is_empty() {
                println!("\n--- Categories ---");
                for (category, n) in counts {
                    println!("  {:<24} {}", category, n);
                }
            }

            let runs = db::fetch_runs(&conn, 5)?;
            if !runs.is_empty() {
                println!("\n--- Last runs ---");
                for r in runs {
                    println!(
                        "  {} {:<10} {:>6} lots ({} stored, {} skipped) in {}ms  {}",
                        truncate(&r.started_at, 19),
                        r.source,
                        r.total,
                        r.upserted,
                        r.skipped,
                        r.duration_ms,
                        r.input
                    );
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// `--source`, else the configured default. `None` lets each lot pick by its own `source`.
fn pick_profile<'a>(
    registry: &'a Registry,
    source: Option<String>,
    settings: &Settings,
) -> Option<&'a SourceProfile> {
    source
        .or_else(|| settings.default_source.clone())
        .map(|s| registry.resolve(&s))
}

fn profile_label(profile: Option<&SourceProfile>) -> &str {
    profile.map(|p| p.id.as_str()).unwrap_or("auto")
}

fn load_limited(path: &Path, limit: Option<usize>) -> anyhow::Result<Vec<RawRecord>> {
    let mut raws = if path == Path::new("-") {
        let text = std::io::read_to_string(std::io::stdin()).context("reading stdin")?;
        input::parse_records(&text)?
    } else {
        input::load_records(path)?
    };
    if let Some(n) = limit {
        raws.truncate(n);
    }
    Ok(raws)
}

/// Normalize in parallel, one chunk at a time, handing each finished chunk to `on_batch`.
fn normalize_all<F>(
    raws: &[RawRecord],
    profile: Option<&SourceProfile>,
    batch_size: usize,
    mut on_batch: F,
) -> anyhow::Result<Vec<NormalizedRecord>>
where
    F: FnMut(&[NormalizedRecord]) -> anyhow::Result<()>,
{
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(raws.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut records = Vec::with_capacity(raws.len());
    for chunk in raws.chunks(batch_size.max(1)) {
        let batch = match profile {
            Some(p) => normalize::normalize_batch(chunk, p),
            None => chunk.par_iter().map(normalize::normalize).collect(),
        };
        on_batch(&batch)?;
        records.extend(batch);
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(lots = records.len(), profile = profile_label(profile), "normalized");
    Ok(records)
}

fn default_output(dir: &Path, source: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}.json", source, stamp))
}

fn write_json(path: &Path, records: &[NormalizedRecord]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_counts(records: &[NormalizedRecord]) {
    println!("\n--- Categories ---");
    for (category, n) in normalize::count_by_category(records) {
        println!("  {:<24} {}", category, n);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
