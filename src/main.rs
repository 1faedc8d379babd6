mod db;
mod docx;
mod export;
mod parser;
mod submission;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use parser::sections::KNOWN_SECTIONS;
use parser::FormData;

#[derive(Parser)]
#[command(name = "transport_intake", about = "Transport request intake, bids and awards")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "INTAKE_DB_PATH", default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and parse one request form (.docx, or .txt with an optional .html rendering)
    Scan {
        document: PathBuf,
        /// HTML rendering holding the schedule table (text input only)
        #[arg(long)]
        html: Option<PathBuf>,
        /// Write the reviewable JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Insert the parsed form without review
        #[arg(long)]
        submit: bool,
    },
    /// Scan every .docx/.txt form in a directory
    Batch {
        dir: PathBuf,
        /// Directory for one JSON file per form
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Insert every parsed form
        #[arg(long)]
        submit: bool,
    },
    /// Submit a reviewed form JSON
    Submit {
        form: PathBuf,
        /// Override a field before submitting (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        overrides: Vec<(String, String)>,
    },
    /// List recent submissions
    Submissions {
        /// Case-insensitive filter on client name, service type or status
        #[arg(short, long)]
        search: Option<String>,
        /// Max rows to fetch
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Export the listed rows as CSV ("-" for stdout)
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Create or update a vendor bid from JSON ("-" reads stdin)
    Bid { input: String },
    /// List bids
    Bids {
        #[arg(short, long)]
        vendor: Option<String>,
    },
    /// Award a request to one vendor's bid
    Award {
        #[arg(long)]
        request_id: String,
        #[arg(long)]
        vendor: String,
    },
    /// Show request and bid statistics
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan { document, html, out, submit } => {
            let form = scan_file(&document, html.as_deref())?;
            info!(
                "{}: {} fields, schedule {}",
                document.display(),
                form.fields.len(),
                if form.get(parser::schedule::ARRIVAL_KEY).is_some() { "found" } else { "missing" }
            );
            match &out {
                Some(path) => {
                    write_form(path, &form)?;
                    print_form(&form);
                    println!("\nWrote {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&form)?),
            }
            if submit {
                let conn = open_db(&cli.db)?;
                let id = submit_form(&conn, &form)?;
                println!("Submitted request {}", id);
            }
            Ok(())
        }
        Commands::Batch { dir, out_dir, submit } => {
            let files = list_documents(&dir)?;
            if files.is_empty() {
                println!("No .docx or .txt files in {}", dir.display());
                return Ok(());
            }
            if let Some(out) = &out_dir {
                std::fs::create_dir_all(out)
                    .with_context(|| format!("Failed to create {}", out.display()))?;
            }
            let conn = if submit { Some(open_db(&cli.db)?) } else { None };
            println!("Scanning {} documents...", files.len());
            let counts = scan_batch(&files, out_dir.as_deref(), conn.as_ref())?;
            counts.print();
            Ok(())
        }
        Commands::Submit { form, overrides } => {
            let raw = std::fs::read_to_string(&form)
                .with_context(|| format!("Failed to read {}", form.display()))?;
            let mut data: FormData = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a form JSON document", form.display()))?;
            for (key, value) in &overrides {
                if !data.update_field(key, value) {
                    bail!("No field with key {:?}", key);
                }
            }
            let conn = open_db(&cli.db)?;
            let id = submit_form(&conn, &data)?;
            println!("Submitted request {}", id);
            Ok(())
        }
        Commands::Submissions { search, limit, csv } => {
            let conn = open_db(&cli.db)?;
            let rows = export::filter_submissions(
                db::fetch_submissions(&conn, limit)?,
                search.as_deref(),
            );
            if let Some(path) = &csv {
                let mut wtr = export::create_writer(Some(path))?;
                export::write_csv(&mut wtr, &rows)?;
                if path != Path::new("-") {
                    println!("Exported {} rows to {}", rows.len(), path.display());
                }
                return Ok(());
            }
            if rows.is_empty() {
                println!("No submissions found.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<24} | {:<16} | {:<10} | {:<10} | {:<10}",
                "ID", "Client", "Service", "Start", "End", "Status"
            );
            println!("{}", "-".repeat(90));
            for r in &rows {
                let client = format!("{} {}", r.client_first_name, r.client_last_name);
                println!(
                    "{:>5} | {:<24} | {:<16} | {:<10} | {:<10} | {:<10}",
                    r.id,
                    truncate(&client, 24),
                    truncate(&r.service_type, 16),
                    r.start_date,
                    r.end_date,
                    r.form_status
                );
            }
            println!("\n{} submissions", rows.len());
            Ok(())
        }
        Commands::Bid { input } => {
            let raw = if input == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&input).with_context(|| format!("Failed to read {}", input))?
            };
            let bid: db::BidInput = serde_json::from_str(&raw).context("Invalid bid JSON")?;
            let conn = open_db(&cli.db)?;
            match db::upsert_bid(&conn, &bid)? {
                db::BidOutcome::Inserted(id) => println!("Bid submitted (id {})", id),
                db::BidOutcome::Updated => println!("Bid updated"),
            }
            Ok(())
        }
        Commands::Bids { vendor } => {
            let conn = open_db(&cli.db)?;
            let bids = db::fetch_bids(&conn, vendor.as_deref())?;
            if bids.is_empty() {
                println!("No bids found.");
                return Ok(());
            }
            println!(
                "{:<8} | {:<10} | {:<10} | {:>9} | {:>9} | {:>9} | {:<7}",
                "Request", "Vendor", "Sent", "One-way", "Round", "Shared", "Awarded"
            );
            println!("{}", "-".repeat(80));
            for b in &bids {
                let shared = b
                    .shared_ride_cost
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<8} | {:<10} | {:<10} | {:>9.2} | {:>9.2} | {:>9} | {:<7}",
                    truncate(&b.request_id, 8),
                    truncate(&b.vendor_code, 10),
                    b.send_date,
                    b.one_way_cost,
                    b.round_trip_cost,
                    shared,
                    if b.awarded { "yes" } else { "" }
                );
            }
            println!("\n{} bids", bids.len());
            Ok(())
        }
        Commands::Award { request_id, vendor } => {
            let conn = open_db(&cli.db)?;
            db::award_bid(&conn, &request_id, &vendor)?;
            println!("Request {} awarded to {}", request_id, vendor);
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&cli.db)?;
            let s = db::get_stats(&conn)?;
            println!("Requests:  {}", s.requests);
            for (status, n) in &s.by_status {
                println!("  {:<12} {}", status, n);
            }
            println!("Bids:      {}", s.bids);
            println!("Awarded:   {}", s.awarded);
            println!("Vendors:   {}", s.vendors);
            if let (Some(one_way), Some(round)) = (s.avg_one_way, s.avg_round_trip) {
                println!("Avg cost:  {:.2} one-way, {:.2} round trip", one_way, round);
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

fn open_db(path: &Path) -> Result<rusqlite::Connection> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn scan_file(document: &Path, html: Option<&Path>) -> Result<FormData> {
    let extracted = docx::load_document(document, html)?;
    Ok(parser::scan_document(&extracted.text, extracted.html.as_deref()))
}

fn submit_form(conn: &rusqlite::Connection, form: &FormData) -> Result<i64> {
    let row = submission::map_form(form)?;
    db::insert_submission(conn, &row)
}

fn write_form(path: &Path, form: &FormData) -> Result<()> {
    let json = serde_json::to_string_pretty(form)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Fields grouped by section. Purely numeric labels come from flattened
/// schedule cells and are hidden.
fn print_form(form: &FormData) {
    for section in &KNOWN_SECTIONS {
        let label = section.label();
        let fields: Vec<_> = form
            .fields_in(&label)
            .filter(|f| !f.label.chars().all(|c| c.is_ascii_digit()))
            .collect();
        if fields.is_empty() {
            continue;
        }
        println!("{}", label);
        for f in fields {
            println!("  {:<32} {}", truncate(&f.label, 32), f.value);
        }
    }
}

fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("docx") | Some("txt")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `<form>.html` next to a text form is picked up as its rendering.
fn companion_html(path: &Path) -> Option<PathBuf> {
    let is_txt = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
    let html = path.with_extension("html");
    (is_txt && html.exists()).then_some(html)
}

struct BatchCounts {
    scanned: usize,
    failed: usize,
    fields: usize,
    written: usize,
    submitted: usize,
}

impl BatchCounts {
    fn print(&self) {
        println!(
            "Scanned {} documents ({} failed), {} fields, {} JSON files, {} submitted.",
            self.scanned, self.failed, self.fields, self.written, self.submitted,
        );
    }
}

fn scan_batch(
    files: &[PathBuf],
    out_dir: Option<&Path>,
    conn: Option<&rusqlite::Connection>,
) -> Result<BatchCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = BatchCounts {
        scanned: 0,
        failed: 0,
        fields: 0,
        written: 0,
        submitted: 0,
    };

    for chunk in files.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|path| (path, scan_file(path, companion_html(path).as_deref())))
            .collect();

        for (path, result) in results {
            let form = match result {
                Ok(form) => form,
                Err(e) => {
                    warn!("{}: {:#}", path.display(), e);
                    counts.failed += 1;
                    continue;
                }
            };
            counts.scanned += 1;
            counts.fields += form.fields.len();

            if let Some(out) = out_dir {
                let stem = path.file_stem().unwrap_or_default();
                write_form(&out.join(stem).with_extension("json"), &form)?;
                counts.written += 1;
            }
            if let Some(conn) = conn {
                match submit_form(conn, &form) {
                    Ok(_) => counts.submitted += 1,
                    Err(e) => warn!("{}: not submitted: {:#}", path.display(), e),
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    Ok((key.trim().to_string(), value.to_string()))
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
