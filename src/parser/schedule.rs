use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{FormData, FormField};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td, th").unwrap());
static DATA_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// (code, full name), Sunday first.
pub const DAYS: [(&str, &str); 7] = [
    ("SUN", "Sunday"),
    ("MON", "Monday"),
    ("TUE", "Tuesday"),
    ("WED", "Wednesday"),
    ("THU", "Thursday"),
    ("FRI", "Friday"),
    ("SAT", "Saturday"),
];

const ARRIVAL_LABEL: &str = "PROGRAM ARRIVAL TIME";
const DEPARTURE_LABEL: &str = "PROGRAM DEPARTURE TIME";
const SCHEDULE_SECTION: &str = "(E) Consumers Schedule";

pub const ARRIVAL_KEY: &str = "program_arrival_dates";
pub const DEPARTURE_KEY: &str = "program_departure_dates";
pub const ARRIVAL_FIELD_LABEL: &str = "Program Arrival Dates";
pub const DEPARTURE_FIELD_LABEL: &str = "Program Departure Dates";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("no tables found in the provided HTML")]
    NoTables,
    #[error("schedule format not recognized")]
    NotRecognized,
    #[error("no valid day columns found")]
    NoDayColumns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub day: String,
    pub arrival_time: String,
    pub departure_time: String,
}

pub fn day_index(code: &str) -> Option<usize> {
    DAYS.iter().position(|(c, _)| *c == code)
}

fn cell_texts(row: ElementRef, selector: &Selector) -> Vec<String> {
    row.select(selector)
        .map(|c| c.text().collect::<String>().trim().to_string())
        .collect()
}

fn row_text(row: ElementRef) -> String {
    row.text().collect::<String>().to_uppercase()
}

/// Find the weekday header row whose next two rows are the arrival and
/// departure rows, then read times by column position.
pub fn extract_schedule_from_html(html: &str) -> Result<Vec<DaySchedule>, ScheduleError> {
    let document = Html::parse_document(html);
    let tables: Vec<ElementRef> = document.select(&TABLE).collect();
    if tables.is_empty() {
        return Err(ScheduleError::NoTables);
    }

    let mut found = None;
    'tables: for table in &tables {
        let rows: Vec<ElementRef> = table.select(&ROW).collect();
        for (i, row) in rows.iter().enumerate() {
            let headers: Vec<String> = cell_texts(*row, &HEADER_CELL)
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect();
            if !headers.iter().any(|h| day_index(h).is_some()) {
                continue;
            }
            let (Some(arrival), Some(departure)) = (rows.get(i + 1), rows.get(i + 2)) else {
                continue;
            };
            if row_text(*arrival).contains(ARRIVAL_LABEL)
                && row_text(*departure).contains(DEPARTURE_LABEL)
            {
                found = Some((headers, *arrival, *departure));
                break 'tables;
            }
        }
    }

    let (headers, arrival_row, departure_row) = found.ok_or(ScheduleError::NotRecognized)?;
    let arrivals = cell_texts(arrival_row, &DATA_CELL);
    let departures = cell_texts(departure_row, &DATA_CELL);

    // Positional: the header's column index is reused for the data rows.
    let time_at = |cells: &[String], idx: usize| -> String {
        cells
            .get(idx)
            .filter(|t| !t.is_empty())
            .cloned()
            .unwrap_or_else(|| "N/A".to_string())
    };

    let schedule: Vec<DaySchedule> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| day_index(h).is_some())
        .map(|(idx, h)| DaySchedule {
            day: h.clone(),
            arrival_time: time_at(&arrivals, idx),
            departure_time: time_at(&departures, idx),
        })
        .collect();

    if schedule.is_empty() {
        return Err(ScheduleError::NoDayColumns);
    }
    Ok(schedule)
}

fn serialize_times<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let pairs: Vec<String> = entries
        .filter(|(_, time)| !time.is_empty() && !time.eq_ignore_ascii_case("N/A"))
        .map(|(day, time)| {
            let full = day_index(day).map(|i| DAYS[i].1).unwrap_or(day);
            format!("{},{}", full, time)
        })
        .collect();
    if pairs.is_empty() {
        "N/A".to_string()
    } else {
        pairs.join(";")
    }
}

/// Fold a schedule into the arrival/departure fields of section E.
pub fn schedule_fields(schedule: &[DaySchedule]) -> [FormField; 2] {
    let arrival = serialize_times(
        schedule.iter().map(|s| (s.day.as_str(), s.arrival_time.as_str())),
    );
    let departure = serialize_times(
        schedule.iter().map(|s| (s.day.as_str(), s.departure_time.as_str())),
    );
    [
        FormField {
            key: ARRIVAL_KEY.to_string(),
            label: ARRIVAL_FIELD_LABEL.to_string(),
            value: arrival,
            section: SCHEDULE_SECTION.to_string(),
        },
        FormField {
            key: DEPARTURE_KEY.to_string(),
            label: DEPARTURE_FIELD_LABEL.to_string(),
            value: departure,
            section: SCHEDULE_SECTION.to_string(),
        },
    ]
}

/// Inverse of the field serialization: "Monday,8:00 AM;Friday,9:00 AM" → per-day
/// slots in `DAYS` order. A segment that does not open with a day name and a
/// comma belongs to the previous day's time ("Monday,8:00 AM; 9:00 AM").
/// Anything else is skipped.
pub fn parse_day_times(value: &str) -> [Option<String>; 7] {
    let mut times: [Option<String>; 7] = Default::default();
    let value = value.trim();
    if value.is_empty() || value == "N/A" {
        return times;
    }
    let mut current: Option<usize> = None;
    for segment in value.split(';') {
        let opened = segment.split_once(',').and_then(|(day, time)| {
            let day = day.trim();
            DAYS.iter()
                .position(|(_, full)| *full == day)
                .map(|idx| (idx, time))
        });
        match (opened, current) {
            (Some((idx, time)), _) => {
                current = (!time.trim().is_empty()).then_some(idx);
                if current.is_some() {
                    times[idx] = Some(time.to_string());
                }
            }
            (None, Some(idx)) => {
                if let Some(time) = times[idx].as_mut() {
                    time.push(';');
                    time.push_str(segment);
                }
            }
            (None, None) => debug!("skipping malformed schedule pair {:?}", segment),
        }
    }
    for time in times.iter_mut().flatten() {
        *time = time.trim().to_string();
    }
    times
}

/// Schedule failures are not fatal: the fields are simply left out.
pub fn attach_schedule(html: &str, form: &mut FormData) {
    match extract_schedule_from_html(html) {
        Ok(schedule) => {
            debug!("schedule has {} day columns", schedule.len());
            form.fields.extend(schedule_fields(&schedule));
        }
        Err(e) => warn!("Schedule not extracted: {}", e),
    }
}
