use once_cell::sync::Lazy;
use regex::Regex;

// ── Rule tables ──────────────────────────────────────────────────────────────

/// A named pattern whose matches are deleted from the input.
pub struct RemovalRule {
    pub name: &'static str,
    pub pattern: Regex,
}

impl RemovalRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }
}

pub static TITLE_RULES: Lazy<Vec<RemovalRule>> = Lazy::new(|| {
    vec![
        // "OngoingMANHWA" glued to the front of the card text.
        RemovalRule::new(
            "status_and_type",
            r"(?i)^\s*(?:(?:ongoing|completed|hiatus)(?:manhwa|manga|manhua))+",
        ),
        RemovalRule::new("chapter_number", r"(?i)chapter\s*\d+(?:\.\d+)?"),
        // Rating shown at the end of the card, e.g. "9.4".
        RemovalRule::new("trailing_rating", r"(?:\s*\d+\.\d+)+\s*$"),
    ]
});

const MONTHS: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";
const MONTHS_SHORT: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec";

pub static CHAPTER_RULES: Lazy<Vec<RemovalRule>> = Lazy::new(|| {
    vec![
        RemovalRule::new(
            "long_month_date",
            &format!(r"(?i)(?:{MONTHS})\s+\d{{1,2}}(?:st|nd|rd|th)?\s*,?\s*\d{{4}}"),
        ),
        RemovalRule::new(
            "short_month_date",
            &format!(r"(?i)(?:{MONTHS_SHORT})\s+\d{{1,2}}\s+\d{{4}}"),
        ),
        RemovalRule::new("iso_date", r"\d{4}[-/]\d{1,2}[-/]\d{1,2}"),
        RemovalRule::new("day_first_date", r"\d{1,2}[-/]\d{1,2}[-/]\d{4}"),
    ]
});

// ── Public API ───────────────────────────────────────────────────────────────

/// Strip status/type prefix, "ChapterN" fragments and a trailing rating.
pub fn clean_title(raw: &str) -> String {
    apply_until_stable(&TITLE_RULES, raw)
}

/// Strip calendar dates from a chapter label.
pub fn clean_chapter_name(raw: &str) -> String {
    apply_until_stable(&CHAPTER_RULES, raw)
}

/// Runs every rule, then trims, and repeats while the text keeps shrinking.
/// Deleting one match can splice two fragments into a new match; repeating
/// until nothing changes keeps the cleaners idempotent.
fn apply_until_stable(rules: &[RemovalRule], raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = rules
            .iter()
            .fold(current.clone(), |text, rule| rule.apply(&text))
            .trim()
            .to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}
