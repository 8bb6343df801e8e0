use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;

use crate::models::ExtractedFields;
use crate::patterns::PatternLibrary;

/// Parsed dates outside [now - 7d, now + 365d] are treated as false
/// positives (stale threads, copyright years, absurd far-future parses).
const PAST_WINDOW_DAYS: i64 = 7;
const FUTURE_WINDOW_DAYS: i64 = 365;

const DEADLINE_KEYWORDS: &[&str] = &[
    "deadline",
    "respond by",
    "complete by",
    "due",
    "before",
    "by",
];

/// Text extraction helpers independent of classification. All methods are
/// pure over their text input (plus the `now` anchor for date windows).
pub struct Extractor {
    dates: Vec<Regex>,
    salary: Vec<Regex>,
    remote: Regex,
}

impl Extractor {
    pub fn new(library: &PatternLibrary) -> anyhow::Result<Self> {
        let dates = library
            .dates
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let salary = vec![
            Regex::new(r"[$£€]\s?\d[\d,]*(?:\.\d+)?\s*[kK]?(?:\s*[-–]\s*[$£€]?\s?\d[\d,]*(?:\.\d+)?\s*[kK]?)?")?,
            Regex::new(r"(?i)(?:salary|compensation)(?:\s+\w+){0,3}\s+(?:of\s+|is\s+)?[$£€]?\d[\d,]*(?:\.\d+)?\s*[kK]?")?,
        ];

        let remote = Regex::new(
            r"(?i)\b(?:fully remote|remote[- ]first|100% remote|work from home|wfh|remote (?:position|role|work|friendly))\b",
        )?;

        Ok(Self { dates, salary, remote })
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new(&PatternLibrary::default())
    }

    /// Every date-looking substring that parses and falls inside the sanity
    /// window, paired with its byte offset in the text.
    fn extract_dates_with_offsets(&self, text: &str, now: DateTime<Utc>) -> Vec<(usize, DateTime<Utc>)> {
        let min = now - Duration::days(PAST_WINDOW_DAYS);
        let max = now + Duration::days(FUTURE_WINDOW_DAYS);

        let mut found = Vec::new();
        for re in &self.dates {
            for m in re.find_iter(text) {
                if let Some(date) = parse_date_text(m.as_str(), now) {
                    if date >= min && date <= max {
                        found.push((m.start(), date));
                    }
                }
            }
        }
        found.sort_by_key(|(offset, _)| *offset);
        found
    }

    pub fn extract_dates(&self, text: &str, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.extract_dates_with_offsets(text, now)
            .into_iter()
            .map(|(_, d)| d)
            .collect()
    }

    /// Earliest future-dated match, or None.
    pub fn extract_interview_date(&self, text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.extract_dates(text, now)
            .into_iter()
            .filter(|d| *d > now)
            .min()
    }

    /// The date nearest (by byte offset) to any deadline keyword. Requires
    /// at least one keyword occurrence; proximity is a heuristic, not an
    /// attempt at grammatical attachment.
    pub fn extract_deadline(&self, text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lower = text.to_lowercase();
        let keyword_offsets: Vec<usize> = DEADLINE_KEYWORDS
            .iter()
            .flat_map(|kw| {
                let mut offsets = Vec::new();
                let mut from = 0;
                while let Some(pos) = lower[from..].find(kw) {
                    offsets.push(from + pos);
                    from += pos + kw.len();
                }
                offsets
            })
            .collect();

        if keyword_offsets.is_empty() {
            return None;
        }

        self.extract_dates_with_offsets(text, now)
            .into_iter()
            .min_by_key(|(offset, _)| {
                keyword_offsets
                    .iter()
                    .map(|kw| offset.abs_diff(*kw))
                    .min()
                    .unwrap_or(usize::MAX)
            })
            .map(|(_, d)| d)
    }

    /// Raw matched substring of the first currency-amount mention. Patterns
    /// are tried in order: an explicit currency symbol beats the looser
    /// salary-keyword form.
    pub fn extract_salary(&self, text: &str) -> Option<String> {
        self.salary
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str().trim().to_string())
    }

    pub fn is_remote(&self, text: &str) -> bool {
        self.remote.is_match(text)
    }

    pub fn extract_fields(&self, text: &str, now: DateTime<Utc>) -> ExtractedFields {
        ExtractedFields {
            interview_date: self.extract_interview_date(text, now),
            deadline: self.extract_deadline(text, now),
            salary: self.extract_salary(text),
            is_remote: self.is_remote(text),
        }
    }
}

/// Best-effort parse of one matched date string. Returns midnight UTC for
/// absolute forms; relative forms are anchored to `now`.
fn parse_date_text(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cleaned = raw.trim().to_lowercase();

    match cleaned.as_str() {
        "today" => return Some(now),
        "tomorrow" => return Some(now + Duration::days(1)),
        "next week" => return Some(now + Duration::days(7)),
        _ => {}
    }

    // "15th" -> "15", "Sept" -> "Sep", drop commas and dots
    let normalized = cleaned
        .replace("sept ", "sep ")
        .replace(['.', ','], " ")
        .split_whitespace()
        .map(strip_ordinal)
        .collect::<Vec<_>>()
        .join(" ");

    let with_year = format!("{} {}", normalized, now.year());

    let formats = ["%B %d %Y", "%b %d %Y", "%d %B %Y", "%m/%d/%Y", "%m-%d-%Y", "%Y-%m-%d"];
    for fmt in &formats {
        if let Ok(d) = NaiveDate::parse_from_str(&normalized, fmt) {
            return to_utc(d);
        }
    }

    // Month-day forms without a year; assume the current year.
    for fmt in ["%B %d %Y", "%b %d %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&with_year, fmt) {
            return to_utc(d);
        }
    }

    None
}

fn strip_ordinal(word: &str) -> String {
    let lower = word.to_lowercase();
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(stem) = lower.strip_suffix(suffix) {
            if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
                return stem.to_string();
            }
        }
    }
    word.to_string()
}

fn to_utc(d: NaiveDate) -> Option<DateTime<Utc>> {
    Utc.from_local_datetime(&d.and_hms_opt(0, 0, 0)?).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::with_defaults().unwrap()
    }

    fn anchor() -> DateTime<Utc> {
        // Fixed anchor keeps window assertions deterministic.
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_extract_dates_inside_window() {
        let e = extractor();
        let now = anchor();
        let dates = e.extract_dates("Your interview is on March 15, 2026 at our office.", now);
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0], Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_extract_dates_rejects_stale_and_far_future() {
        let e = extractor();
        let now = anchor();
        // Over a year ahead and well in the past both fall outside the window.
        let dates = e.extract_dates("Sent January 10, 2020. See you on August 1, 2028.", now);
        assert!(dates.is_empty());
    }

    #[test]
    fn test_extract_dates_numeric_and_iso_forms() {
        let e = extractor();
        let now = anchor();
        let dates = e.extract_dates("Options: 3/15/2026 or 2026-04-02.", now);
        assert_eq!(dates.len(), 2);
    }

    #[test]
    fn test_interview_date_is_earliest_future() {
        let e = extractor();
        let now = anchor();
        let text = "We can do April 10, 2026 or March 20, 2026, whichever works.";
        let date = e.extract_interview_date(text, now).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_interview_date_ignores_recent_past() {
        let e = extractor();
        let now = anchor();
        // Within the window but not in the future.
        let text = "You applied on February 25, 2026.";
        assert!(e.extract_interview_date(text, now).is_none());
    }

    #[test]
    fn test_deadline_picks_keyword_adjacent_date() {
        let e = extractor();
        let now = anchor();
        let text = "Your interview is on April 10, 2026. \
                    Please complete the assessment by March 8, 2026.";
        let deadline = e.extract_deadline(text, now).unwrap();
        assert_eq!(deadline, Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_deadline_requires_keyword() {
        let e = extractor();
        let now = anchor();
        assert!(e.extract_deadline("See you on March 8, 2026.", now).is_none());
    }

    #[test]
    fn test_extract_salary_currency() {
        let e = extractor();
        assert_eq!(
            e.extract_salary("The range is $120,000 - $150,000 per year."),
            Some("$120,000 - $150,000".to_string())
        );
        assert_eq!(e.extract_salary("Compensation is £85,000."), Some("£85,000".to_string()));
    }

    #[test]
    fn test_extract_salary_keyword_form() {
        let e = extractor();
        let got = e.extract_salary("The base salary is 140,000 plus equity.");
        assert!(got.is_some());
        assert!(got.unwrap().contains("140,000"));
    }

    #[test]
    fn test_extract_salary_none() {
        let e = extractor();
        assert!(e.extract_salary("No numbers here, sorry.").is_none());
    }

    #[test]
    fn test_is_remote() {
        let e = extractor();
        assert!(e.is_remote("This is a fully remote position."));
        assert!(e.is_remote("We are remote-first."));
        assert!(!e.is_remote("Onsite in Austin, TX."));
    }

    #[test]
    fn test_relative_dates() {
        let e = extractor();
        let now = anchor();
        let dates = e.extract_dates("Your interview is tomorrow!", now);
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0], now + Duration::days(1));
    }

    #[test]
    fn test_strip_ordinal() {
        assert_eq!(strip_ordinal("15th"), "15");
        assert_eq!(strip_ordinal("3rd"), "3");
        assert_eq!(strip_ordinal("march"), "march");
        // Not an ordinal, just a word ending in "th".
        assert_eq!(strip_ordinal("month"), "month");
    }
}
