//! Direct-extraction shortcut: pull all three birth details out of one
//! free-text message.
//!
//! Labelled lines (`Date of Birth: …`) are preferred; bare `YYYY-MM-DD`,
//! `HH:MM` and `born in City, Region` forms are used as fallbacks. Whatever is
//! found goes through [`BirthDetails::parse`], the same validators the wizard
//! uses.

use std::sync::LazyLock;

use regex::Regex;

use super::model::BirthDetails;

static LABELLED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:date\s+of\s+birth|birth\s*date|dob)\s*[:\-]\s*(.+?)\s*$")
        .expect("static labelled date pattern")
});
static LABELLED_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:time\s+of\s+birth|birth\s*time|tob)\s*[:\-]\s*(.+?)\s*$")
        .expect("static labelled time pattern")
});
static LABELLED_PLACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:place\s+of\s+birth|birth\s*place|pob)\s*[:\-]\s*(.+?)\s*$")
        .expect("static labelled place pattern")
});

static BARE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("static bare date pattern"));
static BARE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2}:\d{2})\b").expect("static bare time pattern"));
static BORN_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bborn\s+in\s+([^,\n]+,\s*[\p{L}][\p{L}' \-]*?)(?:\s+(?:on|at)\b|\s*[,.!?;\n]|\s*$)")
        .expect("static born-in pattern")
});

fn capture<'a>(labelled: &Regex, fallback: &Regex, text: &'a str) -> Option<&'a str> {
    labelled
        .captures(text)
        .or_else(|| fallback.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Extract and validate all three birth details, or nothing.
pub fn extract_birth_details(text: &str) -> Option<BirthDetails> {
    let date = capture(&LABELLED_DATE, &BARE_DATE, text)?;
    let time = capture(&LABELLED_TIME, &BARE_TIME, text)?;
    let place = capture(&LABELLED_PLACE, &BORN_IN, text)?;
    BirthDetails::parse(date, time, place)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_block() {
        let text = "Date of Birth: 1990-01-15\nTime of Birth: 10:30\nPlace of Birth: Sydney,Australia";
        let d = extract_birth_details(text).unwrap();
        assert_eq!(d.date_of_birth, "1990-01-15");
        assert_eq!(d.time_of_birth, "10:30");
        assert_eq!(d.place_of_birth, "Sydney, Australia");
    }

    #[test]
    fn loose_sentence() {
        let text = "hey! I was born in Hisar, Haryana on 1970-11-22 at 00:25";
        let d = extract_birth_details(text).unwrap();
        assert_eq!(d.date_of_birth, "1970-11-22");
        assert_eq!(d.time_of_birth, "00:25");
        assert_eq!(d.place_of_birth, "Hisar, Haryana");
    }

    #[test]
    fn partial_or_invalid_yields_nothing() {
        assert!(extract_birth_details("How is today for me?").is_none());
        assert!(extract_birth_details("Date of Birth: 1990-01-15\nTime of Birth: 10:30").is_none());
        assert!(extract_birth_details(
            "Date of Birth: 1990-13-40\nTime of Birth: 10:30\nPlace of Birth: Pune, India"
        )
        .is_none());
        assert!(extract_birth_details(
            "Date of Birth: 1990-01-15\nTime of Birth: 10:30\nPlace of Birth: Pune"
        )
        .is_none());
    }

    #[test]
    fn matches_wizard_normalization() {
        let extracted = extract_birth_details(
            "dob: 1990-01-15\ntob: 10:30\npob:  Sydney ,  Australia ",
        )
        .unwrap();
        let wizard = BirthDetails::parse("1990-01-15", "10:30", "Sydney, Australia").unwrap();
        assert_eq!(extracted, wizard);
    }
}
