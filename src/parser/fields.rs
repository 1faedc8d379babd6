use tracing::debug;

use super::sections::{self, Section, KNOWN_SECTIONS};
use super::{FormData, FormField};

pub const INSTRUCTIONS_KEY: &str = "instructions";

const INSTRUCTIONS_PROMPT: &str = "Please list/describe any health or behavioral issues that may impact transportation.  This section can be also used to record other instructions related to unique transportation needs or trip details.";

/// Lines past any of these belong to the back-office part of the form.
const STOP_KEYWORDS: &[&str] = &["broker", "hst date", "mart date"];
const SKIPPED_LABELS: &[&str] = &["broker", "hst", "mart"];
const SCHEDULE_CUES: &[&str] = &["schedule", "arrival time", "departure time"];

struct Cursor {
    section: &'static Section,
    section_label: String,
    current_field: Option<usize>,
    in_instructions: bool,
}

impl Cursor {
    fn new() -> Self {
        let section = &KNOWN_SECTIONS[0];
        Cursor {
            section,
            section_label: section.label(),
            current_field: None,
            in_instructions: false,
        }
    }

    fn switch(&mut self, section: &'static Section) {
        debug!("section {} -> {}", self.section.letter, section.letter);
        self.section = section;
        self.section_label = section.label();
        self.current_field = None;
        self.in_instructions = section.letter == 'F';
    }

    fn switch_to(&mut self, letter: char) {
        if let Some(section) = sections::by_letter(letter) {
            self.switch(section);
        }
    }
}

/// Walk `text` line by line and append every `label: value` field found.
/// Unrecognized lines are dropped or folded into the previous value.
pub fn parse_standard_fields(text: &str, form: &mut FormData) {
    let mut cursor = Cursor::new();
    let mut skip_next_line = false;
    let mut collecting_instructions = false;
    let mut instructions = String::new();

    for line in text.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();

        if cursor.in_instructions {
            if trimmed.contains(INSTRUCTIONS_PROMPT) {
                collecting_instructions = true;
                continue;
            }
            if collecting_instructions {
                if is_stop_line(&lower) || sections::is_lettered_heading(trimmed) {
                    collecting_instructions = false;
                } else {
                    if !instructions.is_empty() {
                        instructions.push(' ');
                    }
                    instructions.push_str(trimmed);
                }
            }
        }

        if skip_next_line {
            skip_next_line = false;
            continue;
        }

        if is_stop_line(&lower) {
            debug!("stop keyword reached: {}", trimmed);
            break;
        }

        if lower.contains("additional destination") {
            cursor.switch_to('D');
            skip_next_line = true;
            continue;
        }

        if cursor.section.letter == 'D' && SCHEDULE_CUES.iter().any(|c| lower.contains(c)) {
            cursor.switch_to('E');
            continue;
        }

        if let Some(section) = sections::match_heading(trimmed) {
            cursor.switch(section);
            continue;
        }

        if let Some((raw_label, raw_value)) = trimmed.split_once(':') {
            let label = raw_label.trim();
            let label_lower = label.to_lowercase();
            if SKIPPED_LABELS.iter().any(|k| label_lower.contains(k)) {
                continue;
            }

            let value = or_na(clean_value(raw_value.trim()));
            let field = if cursor.in_instructions && label_lower.contains("additional instructions") {
                FormField {
                    key: INSTRUCTIONS_KEY.to_string(),
                    label: "Instructions".to_string(),
                    value,
                    section: cursor.section_label.clone(),
                }
            } else {
                FormField {
                    key: field_key(label, form.fields.len()),
                    label: label.to_string(),
                    value,
                    section: cursor.section_label.clone(),
                }
            };
            cursor.current_field = Some(form.fields.len());
            form.fields.push(field);
        } else if let Some(idx) = cursor.current_field {
            let field = &mut form.fields[idx];
            if !cursor.in_instructions || field.key == INSTRUCTIONS_KEY {
                let joined = format!("{} {}", field.value, trimmed);
                field.value = clean_value(&joined);
            }
        }
    }

    if !instructions.is_empty() {
        form.fields.push(FormField {
            key: INSTRUCTIONS_KEY.to_string(),
            label: "Instructions".to_string(),
            value: instructions,
            section: KNOWN_SECTIONS[5].label(),
        });
    }
}

fn is_stop_line(lower: &str) -> bool {
    STOP_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Anything starting with "N/A" collapses to exactly "N/A".
pub fn clean_value(value: &str) -> String {
    if value.to_uppercase().starts_with("N/A") {
        "N/A".to_string()
    } else {
        value.trim().to_string()
    }
}

fn or_na(value: String) -> String {
    if value.is_empty() {
        "N/A".to_string()
    } else {
        value
    }
}

/// "Zip Code" + 4 → "zip_code_4"
fn field_key(label: &str, count: usize) -> String {
    let slug: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();
    format!("{}_{}", slug, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<FormField> {
        let mut form = FormData::default();
        parse_standard_fields(text, &mut form);
        form.fields
    }

    fn value_of<'a>(fields: &'a [FormField], label: &str) -> Option<&'a str> {
        fields.iter().find(|f| f.label == label).map(|f| f.value.as_str())
    }

    #[test]
    fn fields_follow_section_markers() {
        let text = "\
(A) Consumer Information
First Name: Jane
(B) Pickup and Dropoff Location
City: Springfield
(C) Destination
Facility Name: Day Program
(D) Additional Destination/Alternate Address
Facility Name and Address (if different)
City: Quincy
(E) Consumers Schedule
Start Service: 03/01/2024
(F) Instructions
Additional Instructions: none
(G) MRC Staff
Requester Name: Pat";
        let fields = parse(text);
        let sections: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.label.as_str(), f.section.as_str()))
            .collect();
        assert_eq!(
            sections,
            vec![
                ("First Name", "(A) Consumer Information"),
                ("City", "(B) Pickup and Dropoff Location"),
                ("Facility Name", "(C) Destination"),
                ("City", "(D) Additional Destination/Alternate Address"),
                ("Start Service", "(E) Consumers Schedule"),
                ("Instructions", "(F) Instructions"),
                ("Requester Name", "(G) MRC Staff"),
            ]
        );
    }

    #[test]
    fn broker_line_is_a_hard_stop() {
        let text = "\
First Name: Jane
Date sent to Broker
(G) MRC Staff
Requester Name: Pat";
        let fields = parse(text);
        assert_eq!(fields.len(), 1);
        assert!(value_of(&fields, "Requester Name").is_none());
    }

    #[test]
    fn hst_and_mart_dates_stop_too() {
        assert_eq!(parse("A: 1\nHST Date Received: 1/1/2024\nB: 2").len(), 1);
        assert_eq!(parse("A: 1\nmart date: x\nB: 2").len(), 1);
    }

    #[test]
    fn hst_label_skipped_without_stopping() {
        let fields = parse("HST Staff: Lee\nSmart Card: yes\nLast Name: Doe");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].label, "Last Name");
        assert_eq!(fields[0].key, "last_name_0");
    }

    #[test]
    fn na_normalization() {
        let fields = parse("A: n/a\nB: N/A - pending\nC: N/A\nD:\nE:   keep me  ");
        let values: Vec<&str> = fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["N/A", "N/A", "N/A", "N/A", "keep me"]);
    }

    #[test]
    fn continuation_lines_append() {
        let fields = parse("Address: 12 Main St\nApt 4\nCity: Boston");
        assert_eq!(value_of(&fields, "Address"), Some("12 Main St Apt 4"));
        assert_eq!(value_of(&fields, "City"), Some("Boston"));
    }

    #[test]
    fn continuation_of_na_stays_na() {
        let fields = parse("Ext: N/A\nsee notes");
        assert_eq!(value_of(&fields, "Ext"), Some("N/A"));
    }

    #[test]
    fn orphan_continuation_is_dropped() {
        let fields = parse("just some text\nPhone: 555");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, "555");
    }

    #[test]
    fn value_keeps_later_colons() {
        let fields = parse("Pickup Time: 8:30 AM");
        assert_eq!(fields[0].value, "8:30 AM");
        assert_eq!(fields[0].key, "pickup_time_0");
    }

    #[test]
    fn keys_are_unique_within_a_run() {
        let fields = parse("Phone: 1\nPhone: 2\nWheelchair Type & Size: N/A");
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["phone_0", "phone_1", "wheelchair_type___size_2"]);
    }

    #[test]
    fn additional_destination_skips_next_line() {
        let text = "\
City: Boston
Additional Destination (if any)
Skipped: yes
Contact Person: Sam";
        let fields = parse(text);
        assert!(value_of(&fields, "Skipped").is_none());
        let contact = fields.iter().find(|f| f.label == "Contact Person").unwrap();
        assert_eq!(contact.section, "(D) Additional Destination/Alternate Address");
    }

    #[test]
    fn schedule_cue_moves_d_to_e() {
        let text = "\
(D) Additional Destination/Alternate Address
ignored
City: Quincy
Consumer's weekly schedule
Start Service: 03/01/2024";
        let fields = parse(text);
        assert_eq!(fields[0].section, "(D) Additional Destination/Alternate Address");
        assert_eq!(fields[1].label, "Start Service");
        assert_eq!(fields[1].section, "(E) Consumers Schedule");
    }

    #[test]
    fn schedule_cue_ignored_outside_d() {
        let fields = parse("Arrival Time: 9 AM");
        assert_eq!(fields[0].section, "(A) Consumer Information");
    }

    #[test]
    fn instructions_collected_after_prompt() {
        let text = format!(
            "(F) Instructions\n{}\nClient uses a walker.\nNeeds help with the door.\n(G) MRC Staff\nRequester Name: Pat",
            INSTRUCTIONS_PROMPT
        );
        let fields = parse(&text);
        let instructions = fields.iter().find(|f| f.key == INSTRUCTIONS_KEY).unwrap();
        assert_eq!(instructions.value, "Client uses a walker. Needs help with the door.");
        assert_eq!(instructions.section, "(F) Instructions");
        // appended after the loop, so it comes last
        assert_eq!(fields.last().unwrap().key, INSTRUCTIONS_KEY);
    }

    #[test]
    fn instructions_need_the_prompt() {
        let fields = parse("(F) Instructions\nClient uses a walker.\n(G) MRC Staff");
        assert!(fields.iter().all(|f| f.key != INSTRUCTIONS_KEY));
    }

    #[test]
    fn instruction_collection_stops_at_broker() {
        let text = format!("(F) Instructions\n{}\nBring oxygen.\nBroker: MART\nmore", INSTRUCTIONS_PROMPT);
        let fields = parse(&text);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, "Bring oxygen.");
    }

    #[test]
    fn continuation_inside_instructions_only_extends_instructions() {
        let text = "(F) Instructions\nNotes: first\nsecond\nAdditional Instructions: call\nahead";
        let fields = parse(text);
        assert_eq!(value_of(&fields, "Notes"), Some("first"));
        assert_eq!(value_of(&fields, "Instructions"), Some("call ahead"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n   \n").is_empty());
    }

    #[test]
    fn section_switch_resets_current_field() {
        let fields = parse("City: Boston\n(C) Destination\nstray line");
        assert_eq!(value_of(&fields, "City"), Some("Boston"));
    }
}
