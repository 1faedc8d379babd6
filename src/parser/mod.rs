pub mod fields;
pub mod schedule;
pub mod sections;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    pub label: String,
    pub value: String,
    pub section: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub fields: Vec<FormField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl FormData {
    pub fn fields_in<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a FormField> {
        self.fields.iter().filter(move |f| f.section == section)
    }

    pub fn get(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Reviewer edit. Values are upper-cased except free-text instructions.
    /// Returns false when no field has that key.
    pub fn update_field(&mut self, key: &str, value: &str) -> bool {
        let Some(field) = self.fields.iter_mut().find(|f| f.key == key) else {
            return false;
        };
        field.value = if key == fields::INSTRUCTIONS_KEY {
            value.to_string()
        } else {
            value.to_uppercase()
        };
        true
    }
}

/// Two-extractor pipeline: plain text → sectioned fields, HTML → schedule fields.
pub fn scan_document(text: &str, html: Option<&str>) -> FormData {
    let mut form = FormData {
        fields: Vec::new(),
        raw_text: Some(text.to_string()),
    };
    fields::parse_standard_fields(text, &mut form);
    if let Some(html) = html {
        schedule::attach_schedule(html, &mut form);
    }
    form
}
