use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::submission::{self, SubmissionRow};

pub const DEFAULT_DB_PATH: &str = "data/intake.sqlite";
pub const AWARDED: &str = "AWARDED";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS transport_requests (
            id                      INTEGER PRIMARY KEY,
            service_type            TEXT,
            start_date              TEXT,
            end_date                TEXT,
            client_first_name       TEXT,
            client_last_name        TEXT,
            client_gender           TEXT,
            client_language         TEXT,
            client_phone            TEXT,
            client_dob              TEXT,
            emergency_contact       TEXT,
            emergency_phone         TEXT,
            emergency_phone_ext     TEXT,
            pickup_address          TEXT,
            pickup_city             TEXT,
            pickup_state            TEXT,
            pickup_zip              TEXT,
            vehicle_type            TEXT,
            wheelchair_type_size    TEXT,
            monitor                 BOOLEAN,
            dropoff_facility        TEXT,
            dropoff_address         TEXT,
            dropoff_city            TEXT,
            dropoff_state           TEXT,
            dropoff_zip             TEXT,
            dropoff_contact         TEXT,
            dropoff_phone           TEXT,
            dropoff_phone_ext       TEXT,
            alt_facility            TEXT,
            alt_city                TEXT,
            alt_state               TEXT,
            alt_zip                 TEXT,
            alt_contact             TEXT,
            alt_phone               TEXT,
            alt_phone_ext           TEXT,
            sun_arrival_time        TEXT,
            sun_departure_time      TEXT,
            mon_arrival_time        TEXT,
            mon_departure_time      TEXT,
            tue_arrival_time        TEXT,
            tue_departure_time      TEXT,
            wed_arrival_time        TEXT,
            wed_departure_time      TEXT,
            thu_arrival_time        TEXT,
            thu_departure_time      TEXT,
            fri_arrival_time        TEXT,
            fri_departure_time      TEXT,
            sat_arrival_time        TEXT,
            sat_departure_time      TEXT,
            instructions            TEXT,
            requester_name          TEXT,
            requester_phone         TEXT,
            requester_phone_ext     TEXT,
            request_district        TEXT,
            date_submitted          TEXT,
            approver                TEXT,
            approver_phone          TEXT,
            approver_phone_ext      TEXT,
            -- back office, filled in after intake
            hst_date_received       TEXT,
            hst_date_to_broker      TEXT,
            hst_staff               TEXT DEFAULT 'Pending',
            mart_date_received      TEXT,
            date_email_sent_to_vendors TEXT,
            vendor_contact_info     TEXT DEFAULT 'Pending',
            vendor_code             TEXT DEFAULT 'Pending',
            one_way_trip_cost       REAL DEFAULT 0.00,
            round_trip_cost         REAL DEFAULT 0.00,
            shared_ride_cost        REAL DEFAULT 0.00,
            shared_ride_with        TEXT DEFAULT 'Pending',
            comments                TEXT DEFAULT 'Pending',
            form_status             TEXT NOT NULL DEFAULT 'PENDING',
            created_at              TEXT NOT NULL DEFAULT (datetime('now')),
            last_modified_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_requests_status ON transport_requests(form_status);

        CREATE TABLE IF NOT EXISTS bid_results (
            id                INTEGER PRIMARY KEY,
            request_id        TEXT NOT NULL,
            vendor_code       TEXT NOT NULL,
            bid_send_date     TEXT NOT NULL,
            bid_received_date TEXT NOT NULL,
            one_way_cost      REAL NOT NULL,
            round_trip_cost   REAL NOT NULL,
            shared_ride_cost  REAL,
            shared_ride_with  TEXT,
            awarded           BOOLEAN NOT NULL DEFAULT 0,
            comments          TEXT,
            UNIQUE(request_id, vendor_code)
        );
        CREATE INDEX IF NOT EXISTS idx_bids_vendor ON bid_results(vendor_code);
        ",
    )?;
    Ok(())
}

// ── Requests ──

const REQUEST_COLUMNS: &[&str] = &[
    "service_type", "start_date", "end_date",
    "client_first_name", "client_last_name", "client_gender", "client_language",
    "client_phone", "client_dob", "emergency_contact", "emergency_phone", "emergency_phone_ext",
    "pickup_address", "pickup_city", "pickup_state", "pickup_zip",
    "vehicle_type", "wheelchair_type_size", "monitor",
    "dropoff_facility", "dropoff_address", "dropoff_city", "dropoff_state", "dropoff_zip",
    "dropoff_contact", "dropoff_phone", "dropoff_phone_ext",
    "alt_facility", "alt_city", "alt_state", "alt_zip", "alt_contact", "alt_phone", "alt_phone_ext",
    "sun_arrival_time", "sun_departure_time", "mon_arrival_time", "mon_departure_time",
    "tue_arrival_time", "tue_departure_time", "wed_arrival_time", "wed_departure_time",
    "thu_arrival_time", "thu_departure_time", "fri_arrival_time", "fri_departure_time",
    "sat_arrival_time", "sat_departure_time",
    "instructions",
    "requester_name", "requester_phone", "requester_phone_ext", "request_district",
    "date_submitted", "approver", "approver_phone", "approver_phone_ext",
    "form_status",
];

/// Insert-only; back-office columns keep their defaults. Returns the new id.
pub fn insert_submission(conn: &Connection, r: &SubmissionRow) -> Result<i64> {
    let mut values: Vec<&dyn ToSql> = vec![
        &r.service_type, &r.start_date, &r.end_date,
        &r.client_first_name, &r.client_last_name, &r.client_gender, &r.client_language,
        &r.client_phone, &r.client_dob, &r.emergency_contact, &r.emergency_phone, &r.emergency_phone_ext,
        &r.pickup_address, &r.pickup_city, &r.pickup_state, &r.pickup_zip,
        &r.vehicle_type, &r.wheelchair_type_size, &r.monitor,
        &r.dropoff_facility, &r.dropoff_address, &r.dropoff_city, &r.dropoff_state, &r.dropoff_zip,
        &r.dropoff_contact, &r.dropoff_phone, &r.dropoff_phone_ext,
        &r.alt_facility, &r.alt_city, &r.alt_state, &r.alt_zip, &r.alt_contact, &r.alt_phone,
        &r.alt_phone_ext,
    ];
    for day in 0..7 {
        values.push(&r.arrival_times[day]);
        values.push(&r.departure_times[day]);
    }
    values.extend_from_slice(&[
        &r.instructions as &dyn ToSql,
        &r.requester_name, &r.requester_phone, &r.requester_phone_ext, &r.request_district,
        &r.date_submitted, &r.approver, &r.approver_phone, &r.approver_phone_ext,
        &r.form_status,
    ]);
    debug_assert_eq!(values.len(), REQUEST_COLUMNS.len());

    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO transport_requests ({}) VALUES ({})",
        REQUEST_COLUMNS.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, values.as_slice())?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSummary {
    pub id: i64,
    pub client_first_name: String,
    pub client_last_name: String,
    pub service_type: String,
    pub start_date: String,
    pub end_date: String,
    pub form_status: String,
    pub last_modified_at: String,
}

/// Newest first.
pub fn fetch_submissions(conn: &Connection, limit: usize) -> Result<Vec<SubmissionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, COALESCE(client_first_name,''), COALESCE(client_last_name,''),
                COALESCE(service_type,''), COALESCE(start_date,''), COALESCE(end_date,''),
                form_status, last_modified_at
         FROM transport_requests
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(SubmissionSummary {
                id: row.get(0)?,
                client_first_name: row.get(1)?,
                client_last_name: row.get(2)?,
                service_type: row.get(3)?,
                start_date: row.get(4)?,
                end_date: row.get(5)?,
                form_status: row.get(6)?,
                last_modified_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Bids ──

/// Bid as posted by a vendor. Field names follow the intake form's bid sheet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BidInput {
    #[serde(rename = "MRCTransFormID", default, deserialize_with = "de_id")]
    pub request_id: Option<String>,
    #[serde(rename = "VendorCode", default)]
    pub vendor_code: Option<String>,
    #[serde(rename = "BidSendDate", default)]
    pub send_date: Option<String>,
    #[serde(rename = "BidReceivedDate", default)]
    pub received_date: Option<String>,
    #[serde(rename = "OneWayTripCost", default, deserialize_with = "de_cost")]
    pub one_way_cost: Option<f64>,
    #[serde(rename = "RoundTripCost", default, deserialize_with = "de_cost")]
    pub round_trip_cost: Option<f64>,
    #[serde(rename = "SharedRideCost", default, deserialize_with = "de_cost")]
    pub shared_ride_cost: Option<f64>,
    #[serde(rename = "SharedRideWith", default)]
    pub shared_ride_with: Option<String>,
    #[serde(rename = "Awarded", default, deserialize_with = "de_flag")]
    pub awarded: bool,
    #[serde(rename = "BidComments", default)]
    pub comments: Option<String>,
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("invalid request id: {}", other))),
    }
}

/// Costs arrive as numbers or numeric strings.
fn de_cost<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('$')
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid cost: {:?}", s))),
        Some(other) => Err(serde::de::Error::custom(format!("invalid cost: {}", other))),
    }
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidRow {
    pub request_id: String,
    pub vendor_code: String,
    pub send_date: NaiveDate,
    pub received_date: NaiveDate,
    pub one_way_cost: f64,
    pub round_trip_cost: f64,
    pub shared_ride_cost: Option<f64>,
    pub shared_ride_with: Option<String>,
    pub awarded: bool,
    pub comments: Option<String>,
}

impl BidInput {
    /// All missing required fields are reported together.
    pub fn validate(&self, today: NaiveDate) -> Result<BidRow> {
        let mut missing = Vec::new();
        if self.request_id.is_none() {
            missing.push("MRCTransFormID");
        }
        if self.vendor_code.is_none() {
            missing.push("VendorCode");
        }
        if self.one_way_cost.is_none() {
            missing.push("OneWayTripCost");
        }
        if self.round_trip_cost.is_none() {
            missing.push("RoundTripCost");
        }
        let (Some(request_id), Some(vendor_code), Some(one_way_cost), Some(round_trip_cost)) = (
            self.request_id.as_deref(),
            self.vendor_code.as_deref(),
            self.one_way_cost,
            self.round_trip_cost,
        ) else {
            bail!("Missing required fields: {}", missing.join(", "));
        };

        let request_id = request_id.trim();
        if request_id.is_empty() {
            bail!("Invalid MRCTransFormID: Must be a non-empty string");
        }

        let date_or_today = |d: &Option<String>| match d.as_deref() {
            Some(s) if !s.trim().is_empty() => submission::format_date(s, today),
            _ => today,
        };

        Ok(BidRow {
            request_id: request_id.to_string(),
            vendor_code: vendor_code.to_string(),
            send_date: date_or_today(&self.send_date),
            received_date: date_or_today(&self.received_date),
            one_way_cost,
            round_trip_cost,
            shared_ride_cost: self.shared_ride_cost.filter(|c| *c != 0.0),
            shared_ride_with: self.shared_ride_with.clone().filter(|s| !s.is_empty()),
            awarded: self.awarded,
            comments: self.comments.clone().filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    Inserted(i64),
    Updated,
}

/// One bid per (request, vendor): a repeat submission replaces the terms.
pub fn upsert_bid(conn: &Connection, input: &BidInput) -> Result<BidOutcome> {
    let bid = input.validate(Local::now().date_naive())?;
    let tx = conn.unchecked_transaction()?;
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM bid_results WHERE request_id = ?1 AND vendor_code = ?2",
            rusqlite::params![bid.request_id, bid.vendor_code],
            |r| r.get(0),
        )
        .optional()?;

    let outcome = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE bid_results
                 SET bid_send_date = ?2, bid_received_date = ?3, one_way_cost = ?4,
                     round_trip_cost = ?5, shared_ride_cost = ?6, shared_ride_with = ?7,
                     awarded = ?8, comments = ?9
                 WHERE id = ?1",
                rusqlite::params![
                    id, bid.send_date, bid.received_date, bid.one_way_cost, bid.round_trip_cost,
                    bid.shared_ride_cost, bid.shared_ride_with, bid.awarded, bid.comments,
                ],
            )?;
            BidOutcome::Updated
        }
        None => {
            tx.execute(
                "INSERT INTO bid_results
                 (request_id, vendor_code, bid_send_date, bid_received_date, one_way_cost,
                  round_trip_cost, shared_ride_cost, shared_ride_with, awarded, comments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    bid.request_id, bid.vendor_code, bid.send_date, bid.received_date,
                    bid.one_way_cost, bid.round_trip_cost, bid.shared_ride_cost,
                    bid.shared_ride_with, bid.awarded, bid.comments,
                ],
            )?;
            BidOutcome::Inserted(tx.last_insert_rowid())
        }
    };
    tx.commit()?;
    Ok(outcome)
}

pub fn fetch_bids(conn: &Connection, vendor: Option<&str>) -> Result<Vec<BidRow>> {
    let mut stmt = conn.prepare(
        "SELECT request_id, vendor_code, bid_send_date, bid_received_date, one_way_cost,
                round_trip_cost, shared_ride_cost, shared_ride_with, awarded, comments
         FROM bid_results
         WHERE ?1 IS NULL OR vendor_code = ?1
         ORDER BY bid_send_date DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([vendor], |row| {
            Ok(BidRow {
                request_id: row.get(0)?,
                vendor_code: row.get(1)?,
                send_date: row.get(2)?,
                received_date: row.get(3)?,
                one_way_cost: row.get(4)?,
                round_trip_cost: row.get(5)?,
                shared_ride_cost: row.get(6)?,
                shared_ride_with: row.get(7)?,
                awarded: row.get(8)?,
                comments: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Exactly one bid per request ends up awarded. Nothing changes unless both
/// the request and the vendor's bid on it exist.
pub fn award_bid(conn: &Connection, request_id: &str, vendor: &str) -> Result<()> {
    let request_id = request_id.trim();
    let tx = conn.unchecked_transaction()?;
    let found: usize = tx.query_row(
        "SELECT COUNT(*) FROM bid_results WHERE request_id = ?1 AND vendor_code = ?2",
        rusqlite::params![request_id, vendor],
        |r| r.get(0),
    )?;
    if found == 0 {
        bail!("No bid from vendor {} on request {}", vendor, request_id);
    }
    tx.execute(
        "UPDATE bid_results SET awarded = (vendor_code = ?2) WHERE request_id = ?1",
        rusqlite::params![request_id, vendor],
    )?;
    let updated = tx.execute(
        "UPDATE transport_requests
         SET form_status = ?2, last_modified_at = datetime('now')
         WHERE id = ?1",
        rusqlite::params![request_id, AWARDED],
    )?;
    if updated == 0 {
        // dropping tx rolls back the bid flags
        bail!("Request {} not found", request_id);
    }
    tx.commit()?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub requests: usize,
    pub by_status: Vec<(String, usize)>,
    pub bids: usize,
    pub awarded: usize,
    pub vendors: usize,
    pub avg_one_way: Option<f64>,
    pub avg_round_trip: Option<f64>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let requests: usize =
        conn.query_row("SELECT COUNT(*) FROM transport_requests", [], |r| r.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT form_status, COUNT(*) FROM transport_requests
         GROUP BY form_status ORDER BY COUNT(*) DESC, form_status",
    )?;
    let by_status = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let (bids, awarded, vendors, avg_one_way, avg_round_trip) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(awarded), 0), COUNT(DISTINCT vendor_code),
                AVG(one_way_cost), AVG(round_trip_cost)
         FROM bid_results",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
    )?;
    Ok(Stats {
        requests,
        by_status,
        bids,
        awarded,
        vendors,
        avg_one_way,
        avg_round_trip,
    })
}
