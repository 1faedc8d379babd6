use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;

use crate::db::SubmissionSummary;

const CSV_HEADERS: [&str; 6] = [
    "Client Name",
    "Service Type",
    "Start Date",
    "End Date",
    "Status",
    "Last Updated",
];

/// Case-insensitive substring match on client name, service type and status.
pub fn matches_search(row: &SubmissionSummary, term: &str) -> bool {
    let term = term.to_lowercase();
    [
        &row.client_first_name,
        &row.client_last_name,
        &row.service_type,
        &row.form_status,
    ]
    .iter()
    .any(|v| v.to_lowercase().contains(&term))
}

pub fn filter_submissions(
    rows: Vec<SubmissionSummary>,
    search: Option<&str>,
) -> Vec<SubmissionSummary> {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => rows.into_iter().filter(|r| matches_search(r, term)).collect(),
        None => rows,
    }
}

/// `None` or `-` writes to stdout.
pub fn create_writer(output: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match output {
        Some(path) if path != Path::new("-") => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ),
        _ => Box::new(io::stdout()),
    };
    Ok(WriterBuilder::new().from_writer(writer))
}

pub fn write_csv<W: Write>(wtr: &mut csv::Writer<W>, rows: &[SubmissionSummary]) -> Result<()> {
    wtr.write_record(CSV_HEADERS)?;
    for r in rows {
        let name = format!("{} {}", r.client_first_name, r.client_last_name);
        // "2024-03-01 12:00:00" → "2024-03-01"
        let updated = r.last_modified_at.split(' ').next().unwrap_or_default();
        wtr.write_record([
            name.trim(),
            r.service_type.as_str(),
            r.start_date.as_str(),
            r.end_date.as_str(),
            r.form_status.as_str(),
            updated,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
