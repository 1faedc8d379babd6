use std::sync::LazyLock;

use anyhow::{bail, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::parser::schedule::{self, ARRIVAL_FIELD_LABEL, DEPARTURE_FIELD_LABEL};
use crate::parser::{FormData, FormField};

static US_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap());
static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})\s*(AM|PM)?$").unwrap());
static HOUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s*(AM|PM)?$").unwrap());
// Alternatives are unanchored, so "untrue" also reads as yes.
static YES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^yes|true|1$").unwrap());

const NA: &str = "N/A";
const PENDING: &str = "Pending";
pub const SUBMITTED: &str = "Submitted";

/// One transport request, flattened the way the request table stores it.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRow {
    pub service_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    pub client_first_name: String,
    pub client_last_name: String,
    pub client_gender: String,
    pub client_language: String,
    pub client_phone: String,
    pub client_dob: NaiveDate,
    pub emergency_contact: String,
    pub emergency_phone: String,
    pub emergency_phone_ext: String,

    pub pickup_address: String,
    pub pickup_city: String,
    pub pickup_state: String,
    pub pickup_zip: String,
    pub vehicle_type: String,
    pub wheelchair_type_size: String,
    pub monitor: Option<bool>,

    pub dropoff_facility: String,
    pub dropoff_address: String,
    pub dropoff_city: String,
    pub dropoff_state: String,
    pub dropoff_zip: String,
    pub dropoff_contact: String,
    pub dropoff_phone: String,
    pub dropoff_phone_ext: String,

    pub alt_facility: String,
    pub alt_city: String,
    pub alt_state: String,
    pub alt_zip: String,
    pub alt_contact: String,
    pub alt_phone: String,
    pub alt_phone_ext: String,

    /// Indexed Sunday..Saturday.
    pub arrival_times: [Option<NaiveTime>; 7],
    pub departure_times: [Option<NaiveTime>; 7],

    pub instructions: String,

    pub requester_name: String,
    pub requester_phone: String,
    pub requester_phone_ext: String,
    pub request_district: String,
    pub date_submitted: NaiveDate,
    pub approver: String,
    pub approver_phone: String,
    pub approver_phone_ext: String,

    pub form_status: String,
}

/// Label lookups over the reviewed field list. Forms repeat labels such as
/// "Phone" and "City", so most lookups are relative to an anchor position.
struct Lookup<'a> {
    fields: &'a [FormField],
}

impl<'a> Lookup<'a> {
    fn position(&self, label: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.label == label)
    }

    /// First `label` strictly after `anchor`; anywhere when the anchor is missing.
    fn position_after(&self, label: &str, anchor: Option<usize>) -> Option<usize> {
        self.fields
            .iter()
            .enumerate()
            .find(|(i, f)| f.label == label && anchor.map_or(true, |a| *i > a))
            .map(|(i, _)| i)
    }

    fn value_at(&self, idx: Option<usize>) -> Option<&'a str> {
        idx.map(|i| self.fields[i].value.as_str())
            .filter(|v| !v.is_empty())
    }

    fn text(&self, label: &str) -> String {
        self.value_at(self.position(label)).unwrap_or(NA).to_string()
    }

    fn text_after(&self, label: &str, anchor: Option<usize>, default: &str) -> String {
        self.value_at(self.position_after(label, anchor))
            .unwrap_or(default)
            .to_string()
    }
}

pub fn map_form(form: &FormData) -> Result<SubmissionRow> {
    map_form_on(form, Local::now().date_naive())
}

pub fn map_form_on(form: &FormData, today: NaiveDate) -> Result<SubmissionRow> {
    if form.fields.is_empty() {
        bail!("Form fields are required");
    }
    let l = Lookup { fields: &form.fields };

    let monitor = l.position("Monitor");
    let facility = l.position("Facility Name");
    let contact = l.position("Contact Person");
    let dropoff_ext = l.position_after("Ext", contact);
    let alt_contact = l.position_after("Contact Person", dropoff_ext);
    let requester = form
        .fields
        .iter()
        .position(|f| f.label == "Requester Name" || f.label.contains("ROXBURY Requester Name"));
    let approver = l.position("Name of Authorized MRC Approver");

    let arrival = schedule::parse_day_times(&l.text(ARRIVAL_FIELD_LABEL));
    let departure = schedule::parse_day_times(&l.text(DEPARTURE_FIELD_LABEL));

    let district = l
        .value_at(l.position("DISTRICT"))
        .or_else(|| l.value_at(l.position("Area Office")))
        .unwrap_or(NA)
        .to_string();

    let row = SubmissionRow {
        service_type: l.text("Type of Service"),
        start_date: format_date(&l.text("Start Service"), today),
        end_date: format_date(&l.text("End Service"), today),

        client_first_name: l.text("First Name"),
        client_last_name: l.text("Last Name"),
        client_gender: l.text("Gender"),
        client_language: l.text("Language"),
        client_phone: l.text("Phone"),
        client_dob: format_date(&l.text("DOB"), today),
        emergency_contact: l.text("Emergency Contact"),
        emergency_phone: l.text("Emergency Phone"),
        emergency_phone_ext: l.text("Ext"),

        pickup_address: l.text("Address"),
        pickup_city: l.text("City"),
        pickup_state: l.text("State"),
        pickup_zip: l.text("Zip Code"),
        vehicle_type: l.text("Type of Vehicle"),
        wheelchair_type_size: l.text("Wheelchair Type & Size"),
        monitor: convert_to_bit(&l.text("Monitor")),

        dropoff_facility: l.text_after("Facility Name", monitor, NA),
        dropoff_address: l.text_after("Address", facility, NA),
        dropoff_city: l.text_after("City", facility, NA),
        dropoff_state: l.text_after("State", facility, NA),
        dropoff_zip: l.text_after("Zip Code", facility, NA),
        dropoff_contact: l.text_after("Contact Person", facility, NA),
        dropoff_phone: l.text_after("Phone", contact, NA),
        dropoff_phone_ext: l.text_after("Ext", contact, NA),

        alt_facility: NA.to_string(),
        alt_city: l.text_after("City", dropoff_ext, NA),
        alt_state: l.text_after("State", dropoff_ext, NA),
        alt_zip: l.text_after("Zip Code", dropoff_ext, NA),
        alt_contact: l.text_after("Contact Person", dropoff_ext, NA),
        alt_phone: l.text_after("Phone", alt_contact, NA),
        alt_phone_ext: l.text_after("Ext", alt_contact, NA),

        arrival_times: arrival.map(|t| t.as_deref().and_then(format_time)),
        departure_times: departure.map(|t| t.as_deref().and_then(format_time)),

        instructions: l.text("Instructions"),

        requester_name: l.value_at(requester).unwrap_or(NA).to_string(),
        requester_phone: l.text_after("Phone", requester, NA),
        requester_phone_ext: l.text_after("Ext", requester, NA),
        request_district: district,
        date_submitted: today,
        approver: l.value_at(approver).unwrap_or(PENDING).to_string(),
        approver_phone: l.text_after("Phone", approver, PENDING),
        approver_phone_ext: l.text_after("Ext", approver, PENDING),

        form_status: SUBMITTED.to_string(),
    };
    debug!(
        "mapped {} fields for {} {}",
        form.fields.len(),
        row.client_first_name,
        row.client_last_name
    );
    Ok(row)
}

/// Missing or unreadable dates fall back to `today`.
pub fn format_date(value: &str, today: NaiveDate) -> NaiveDate {
    let value = value.trim();
    if value.is_empty() || value == NA || value == PENDING {
        return today;
    }
    if let Some(caps) = US_DATE_RE.captures(value) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return date;
        }
    }
    ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .unwrap_or_else(|| {
            debug!("unreadable date {:?}, using today", value);
            today
        })
}

/// "8:30 AM", "10:00PM", "9 am", "14:15" and "7" are accepted. A period
/// only shifts the hour, so "13:00 PM" is 13:00; anything past 23:59 is `None`.
pub fn format_time(value: &str) -> Option<NaiveTime> {
    let clean = value.trim().to_uppercase();
    if clean.is_empty() || clean == NA {
        return None;
    }
    let (hour, minute, period) = if let Some(caps) = CLOCK_RE.captures(&clean) {
        (caps[1].parse::<u32>().ok()?, caps[2].parse::<u32>().ok()?, caps.get(3))
    } else if let Some(caps) = HOUR_RE.captures(&clean) {
        (caps[1].parse::<u32>().ok()?, 0, caps.get(2))
    } else {
        return None;
    };

    let hour = match period.map(|m| m.as_str()) {
        Some("PM") if hour < 12 => hour + 12,
        Some("AM") if hour == 12 => 0,
        _ => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn convert_to_bit(value: &str) -> Option<bool> {
    if value.is_empty() || value == NA {
        return None;
    }
    Some(YES_RE.is_match(value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::scan_document;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn field(label: &str, value: &str) -> FormField {
        FormField {
            key: label.to_lowercase(),
            label: label.to_string(),
            value: value.to_string(),
            section: "(A) Consumer Information".to_string(),
        }
    }

    fn form(fields: Vec<FormField>) -> FormData {
        FormData { fields, raw_text: None }
    }

    fn hm(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn fixture_maps_onto_row() {
        let text = std::fs::read_to_string("tests/fixtures/request_form.txt").unwrap();
        let html = std::fs::read_to_string("tests/fixtures/request_form.html").unwrap();
        let row = map_form_on(&scan_document(&text, Some(&html)), today()).unwrap();

        assert_eq!(row.service_type, "DAY PROGRAM");
        assert_eq!(row.client_first_name, "JANE");
        assert_eq!(row.client_phone, "555-1234");
        assert_eq!(row.client_dob, NaiveDate::from_ymd_opt(1980, 5, 15).unwrap());
        assert_eq!(row.emergency_phone_ext, "N/A");
        assert_eq!(row.pickup_address, "123 MAIN ST APT 2");
        assert_eq!(row.monitor, Some(true));

        assert_eq!(row.dropoff_facility, "SPRINGFIELD DAY CENTER");
        assert_eq!(row.dropoff_address, "456 ELM ST");
        assert_eq!(row.dropoff_zip, "01105");
        assert_eq!(row.dropoff_contact, "DR. SMITH");
        assert_eq!(row.dropoff_phone, "555-6789");
        assert_eq!(row.dropoff_phone_ext, "12");

        assert_eq!(row.alt_facility, "N/A");
        assert_eq!(row.alt_city, "N/A");
        assert_eq!(row.alt_contact, "N/A");
        assert_eq!(row.alt_phone, "N/A");

        assert_eq!(row.start_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(row.end_date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(row.arrival_times[0], None);
        assert_eq!(row.arrival_times[1], hm(8, 30));
        assert_eq!(row.arrival_times[5], hm(9, 0));
        assert_eq!(row.departure_times[5], hm(13, 30));

        assert!(row.instructions.starts_with("Client uses a walker"));
        assert_eq!(row.requester_name, "PAT LEE");
        assert_eq!(row.requester_phone, "555-2222");
        assert_eq!(row.requester_phone_ext, "301");
        assert_eq!(row.request_district, "SPRINGFIELD");
        assert_eq!(row.approver, "CHRIS KIM");
        assert_eq!(row.approver_phone, "555-3333");
        assert_eq!(row.approver_phone_ext, "302");
        assert_eq!(row.date_submitted, today());
        assert_eq!(row.form_status, "Submitted");
    }

    #[test]
    fn empty_form_is_rejected() {
        let err = map_form_on(&FormData::default(), today()).unwrap_err();
        assert_eq!(err.to_string(), "Form fields are required");
    }

    #[test]
    fn missing_labels_default() {
        let row = map_form_on(&form(vec![field("First Name", "JANE")]), today()).unwrap();
        assert_eq!(row.client_last_name, "N/A");
        assert_eq!(row.dropoff_phone, "N/A");
        assert_eq!(row.approver, "Pending");
        assert_eq!(row.approver_phone, "Pending");
        assert_eq!(row.request_district, "N/A");
        assert_eq!(row.monitor, None);
        assert_eq!(row.start_date, today());
        assert!(row.arrival_times.iter().all(Option::is_none));
    }

    #[test]
    fn missing_anchor_searches_from_start() {
        let row = map_form_on(
            &form(vec![field("Phone", "111"), field("Ext", "9")]),
            today(),
        )
        .unwrap();
        // No "Contact Person" anywhere, so drop-off picks the first Phone.
        assert_eq!(row.dropoff_phone, "111");
        assert_eq!(row.dropoff_phone_ext, "9");
    }

    #[test]
    fn district_prefers_district_label() {
        let row = map_form_on(
            &form(vec![field("Area Office", "NORTH"), field("DISTRICT", "ROXBURY")]),
            today(),
        )
        .unwrap();
        assert_eq!(row.request_district, "ROXBURY");
    }

    #[test]
    fn roxbury_requester_label() {
        let row = map_form_on(
            &form(vec![
                field("Phone", "000"),
                field("ROXBURY Requester Name", "AL"),
                field("Phone", "777"),
            ]),
            today(),
        )
        .unwrap();
        assert_eq!(row.requester_name, "AL");
        assert_eq!(row.requester_phone, "777");
    }

    #[test]
    fn dates() {
        let t = today();
        assert_eq!(format_date("N/A", t), t);
        assert_eq!(format_date("Pending", t), t);
        assert_eq!(format_date("", t), t);
        assert_eq!(format_date("3/1/2024", t), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(format_date("2024-07-04", t), NaiveDate::from_ymd_opt(2024, 7, 4).unwrap());
        assert_eq!(format_date("March 5, 2024", t), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(format_date("2/30/2024", t), t);
        assert_eq!(format_date("next week", t), t);
    }

    #[test]
    fn times() {
        assert_eq!(format_time("8:30 AM"), hm(8, 30));
        assert_eq!(format_time("10:00PM"), hm(22, 0));
        assert_eq!(format_time("12:15 am"), hm(0, 15));
        assert_eq!(format_time("12 PM"), hm(12, 0));
        assert_eq!(format_time("9am"), hm(9, 0));
        assert_eq!(format_time("14:45"), hm(14, 45));
        assert_eq!(format_time("7"), hm(7, 0));
        assert_eq!(format_time("N/A"), None);
        assert_eq!(format_time(""), None);
        assert_eq!(format_time("25:00"), None);
        assert_eq!(format_time("8:75 AM"), None);
        assert_eq!(format_time("noon"), None);
    }

    #[test]
    fn period_with_out_of_range_hour() {
        assert_eq!(format_time("13:00 PM"), hm(13, 0));
        assert_eq!(format_time("0:30 AM"), hm(0, 30));
        assert_eq!(format_time("23 PM"), hm(23, 0));
        assert_eq!(format_time("24:00 AM"), None);
    }

    #[test]
    fn monitor_bit() {
        assert_eq!(convert_to_bit("Yes"), Some(true));
        assert_eq!(convert_to_bit("TRUE"), Some(true));
        assert_eq!(convert_to_bit("1"), Some(true));
        assert_eq!(convert_to_bit("No"), Some(false));
        assert_eq!(convert_to_bit("N/A"), None);
        assert_eq!(convert_to_bit(""), None);
    }
}
