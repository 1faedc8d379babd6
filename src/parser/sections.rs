use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub letter: char,
    pub title: &'static str,
}

impl Section {
    /// Label stored on every field of this section, e.g. "(A) Consumer Information".
    pub fn label(&self) -> String {
        format!("({}) {}", self.letter, self.title)
    }
}

pub const KNOWN_SECTIONS: [Section; 7] = [
    Section { letter: 'A', title: "Consumer Information" },
    Section { letter: 'B', title: "Pickup and Dropoff Location" },
    Section { letter: 'C', title: "Destination" },
    Section { letter: 'D', title: "Additional Destination/Alternate Address" },
    Section { letter: 'E', title: "Consumers Schedule" },
    Section { letter: 'F', title: "Instructions" },
    Section { letter: 'G', title: "MRC Staff" },
];

static HEADING_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    KNOWN_SECTIONS
        .iter()
        .map(|s| {
            Regex::new(&format!(r"(?i)^\({}\)\s*{}", s.letter, regex::escape(s.title))).unwrap()
        })
        .collect()
});

pub fn by_letter(letter: char) -> Option<&'static Section> {
    KNOWN_SECTIONS.iter().find(|s| s.letter == letter)
}

/// A heading is either "(X) Title..." or the bare title on its own line.
pub fn match_heading(line: &str) -> Option<&'static Section> {
    if let Some(idx) = HEADING_RES.iter().position(|re| re.is_match(line)) {
        return Some(&KNOWN_SECTIONS[idx]);
    }
    KNOWN_SECTIONS
        .iter()
        .find(|s| line.to_lowercase() == s.title.to_lowercase())
}

/// Lettered heading only; bare titles do not end instruction collection.
pub fn is_lettered_heading(line: &str) -> bool {
    HEADING_RES.iter().any(|re| re.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lettered_heading() {
        let s = match_heading("(B) Pickup and Dropoff Location").unwrap();
        assert_eq!(s.letter, 'B');
    }

    #[test]
    fn lettered_heading_case_and_spacing() {
        let s = match_heading("(c)destination - facility").unwrap();
        assert_eq!(s.letter, 'C');
    }

    #[test]
    fn bare_title() {
        let s = match_heading("mrc staff").unwrap();
        assert_eq!(s.letter, 'G');
        assert!(!is_lettered_heading("mrc staff"));
    }

    #[test]
    fn title_with_slash_is_literal() {
        let s = match_heading("(D) Additional Destination/Alternate Address").unwrap();
        assert_eq!(s.letter, 'D');
    }

    #[test]
    fn not_a_heading() {
        assert!(match_heading("Destination: Boston").is_none());
        assert!(match_heading("(A) Something Else").is_none());
    }

    #[test]
    fn labels() {
        assert_eq!(by_letter('E').unwrap().label(), "(E) Consumers Schedule");
        assert!(by_letter('Z').is_none());
    }
}
