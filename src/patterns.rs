use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::EventType;

/// One weighted classification rule. Each regex hit contributes
/// weight x field-factor to the rule's score (subject 0.6, body 0.4, from 0.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub event_type: EventType,
    pub weight: f64,
    #[serde(default)]
    pub subject: Vec<String>,
    #[serde(default)]
    pub body: Vec<String>,
    #[serde(default)]
    pub from: Vec<String>,
}

/// The whole heuristic table: classification rules plus the extraction
/// regexes the classifier and extractor share. Pure data; tuning behavior
/// means editing this table, never the scoring code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternLibrary {
    pub rules: Vec<PatternRule>,
    /// Newsletter/digest signals; any hit short-circuits classification.
    pub exclude: Vec<String>,
    /// Capture group 1 is a company name near a contextual phrase.
    pub company: Vec<String>,
    /// Capture group 1 is a job title near a contextual phrase.
    pub job_title: Vec<String>,
    /// Textual date forms, matched globally over the text.
    pub dates: Vec<String>,
}

impl PatternLibrary {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pattern file: {}", path.display()))?;
        let library: PatternLibrary = serde_json::from_str(&content)
            .with_context(|| format!("Invalid pattern file: {}", path.display()))?;
        Ok(library)
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        let s = |v: &[&str]| v.iter().map(|p| p.to_string()).collect::<Vec<_>>();

        PatternLibrary {
            rules: vec![
                PatternRule {
                    event_type: EventType::ApplicationReceived,
                    weight: 0.9,
                    subject: s(&[
                        r"(?i)application\b.*\breceived",
                        r"(?i)thank you for (?:your )?(?:application|applying)",
                        r"(?i)we(?:'ve| have) received your application",
                        r"(?i)application (?:submitted|confirmation)",
                        r"(?i)successfully applied",
                    ]),
                    body: s(&[
                        r"(?i)thank you for applying",
                        r"(?i)(?:we (?:have|'ve) )?received your application",
                        r"(?i)your application (?:has been|was) (?:received|submitted)",
                        r"(?i)we will review your application",
                    ]),
                    from: s(&[r"(?i)(?:no-?reply|careers|jobs|apply|recruiting|talent)@"]),
                },
                PatternRule {
                    event_type: EventType::AssessmentInvitation,
                    weight: 0.85,
                    subject: s(&[
                        r"(?i)(?:online|coding|technical|skills?) (?:assessment|challenge|test)",
                        r"(?i)take[- ]home (?:assignment|exercise|test)",
                        r"(?i)\b(?:hackerrank|codility|codesignal)\b",
                        r"(?i)assessment invitation",
                    ]),
                    body: s(&[
                        r"(?i)complete (?:the|this|an?) (?:online )?assessment",
                        r"(?i)coding (?:challenge|exercise|test)",
                        r"(?i)invited? (?:you )?to (?:take|complete) (?:a|the|an)",
                        r"(?i)assessment (?:link|must be completed)",
                    ]),
                    from: s(&[r"(?i)(?:hackerrank|codility|codesignal|testgorilla)\.com"]),
                },
                PatternRule {
                    event_type: EventType::InterviewScheduled,
                    weight: 0.9,
                    subject: s(&[
                        r"(?i)interview (?:invitation|scheduled|confirmation|confirmed|request)",
                        r"(?i)schedule (?:your|an|the) interview",
                        r"(?i)invitation to interview",
                        r"(?i)interview with\b",
                    ]),
                    body: s(&[
                        r"(?i)(?:we would|we'd) like to (?:schedule|invite you to) (?:an? )?interview",
                        r"(?i)your interview (?:is|has been) (?:scheduled|confirmed)",
                        r"(?i)(?:pick|choose|select) a time",
                        r"(?i)next (?:step|stage) (?:is|will be) (?:an? )?(?:phone |video )?interview",
                    ]),
                    from: s(&[r"(?i)(?:calendly|goodtime|greenhouse|lever)\.(?:com|co)"]),
                },
                PatternRule {
                    event_type: EventType::InterviewReminder,
                    weight: 0.7,
                    subject: s(&[
                        r"(?i)interview reminder",
                        r"(?i)reminder:.*interview",
                        r"(?i)upcoming interview",
                    ]),
                    body: s(&[
                        r"(?i)your interview is (?:tomorrow|today|coming up)",
                        r"(?i)reminder (?:about|for|of) your (?:upcoming )?interview",
                        r"(?i)don'?t forget your interview",
                    ]),
                    from: vec![],
                },
                PatternRule {
                    event_type: EventType::OfferExtended,
                    weight: 0.95,
                    subject: s(&[
                        r"(?i)(?:job |employment |your )offer",
                        r"(?i)offer (?:letter|of employment|details)",
                        r"(?i)congratulations.*(?:offer|position)",
                    ]),
                    body: s(&[
                        r"(?i)(?:pleased|delighted|excited|happy) to (?:offer|extend)",
                        r"(?i)offer of employment",
                        r"(?i)(?:compensation|salary) package",
                        r"(?i)extend (?:you )?an offer",
                    ]),
                    from: vec![],
                },
                PatternRule {
                    event_type: EventType::Rejection,
                    weight: 0.9,
                    subject: s(&[
                        r"(?i)update on your application",
                        r"(?i)regarding your application",
                        r"(?i)your application status",
                    ]),
                    body: s(&[
                        r"(?i)unfortunately",
                        r"(?i)(?:decided to )?mov(?:e|ing) forward with other candidates",
                        r"(?i)not (?:to )?(?:move forward|proceed) with your (?:application|candidacy)",
                        r"(?i)(?:decided to )?pursu(?:e|ing) other (?:candidates|applicants)",
                        r"(?i)wish you (?:the best|success|well) in your (?:job )?search",
                        r"(?i)will not be moving forward",
                    ]),
                    from: vec![],
                },
                PatternRule {
                    event_type: EventType::General,
                    weight: 0.5,
                    subject: s(&[
                        r"(?i)your candidacy",
                        r"(?i)application update",
                    ]),
                    body: s(&[
                        r"(?i)keep your (?:resume|profile|application) on file",
                        r"(?i)we(?:'ll| will) (?:keep you posted|be in touch)",
                        r"(?i)your application is (?:still )?(?:under review|being reviewed)",
                    ]),
                    from: vec![],
                },
            ],
            exclude: s(&[
                r"(?i)unsubscribe",
                r"(?i)newsletter",
                r"(?i)job alert",
                r"(?i)(?:weekly|daily) digest",
                r"(?i)recommended (?:for you|jobs)",
                r"(?i)jobs? you (?:may|might) (?:like|be interested in)",
                r"(?i)top jobs for you",
            ]),
            company: s(&[
                r"(?i)application (?:to|at|with) ([A-Z][A-Za-z0-9&.'\- ]{1,48}?)(?: was| has| is| have|[.,!\n]|$)",
                r"(?i)(?:applying|applied) (?:to|at|with) ([A-Z][A-Za-z0-9&.'\- ]{1,48}?)(?: was| has| is|[.,!\n]|$)",
                r"(?i)interview (?:with|at) ([A-Z][A-Za-z0-9&.'\- ]{1,48}?)(?: on| for| is| has|[.,!\n]|$)",
                r"(?i)offer from ([A-Z][A-Za-z0-9&.'\- ]{1,48}?)(?: for| is|[.,!\n]|$)",
                r"(?i)position (?:at|with) ([A-Z][A-Za-z0-9&.'\- ]{1,48}?)(?: for| as| is| has|[.,!\n]|$)",
                r"(?i)(?:the )?([A-Z][A-Za-z0-9&.'\- ]{1,48}?) (?:talent|recruiting|hiring) team",
            ]),
            job_title: s(&[
                r"(?i)for the (.{3,100}?) (?:position|role|opening|opportunity)",
                r"(?i)(?:position|role) of (?:an? )?([^.,\n]{3,100}?)(?: at| with|[.,\n]|$)",
                r"(?i)your application for (?:the )?(.{3,100}?)(?: position| role| at |[.,\n]|$)",
                r"(?i)applied (?:for|to) (?:the )?(.{3,100}?)(?: position| role| opening|[.,\n]|$)",
            ]),
            dates: s(&[
                // March 15, 2026 / Mar 15 2026 / March 15th, 2026
                r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.? \d{1,2}(?:st|nd|rd|th)?(?:,? \d{4})?\b",
                // 15 March 2026
                r"(?i)\b\d{1,2} (?:january|february|march|april|may|june|july|august|september|october|november|december) \d{4}\b",
                // 3/15/2026, 03-15-2026
                r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b",
                // 2026-03-15
                r"\b\d{4}-\d{2}-\d{2}\b",
                // relative forms
                r"(?i)\b(?:today|tomorrow|next week)\b",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_default_library_compiles() {
        let lib = PatternLibrary::default();
        for rule in &lib.rules {
            for p in rule.subject.iter().chain(&rule.body).chain(&rule.from) {
                assert!(Regex::new(p).is_ok(), "bad pattern: {}", p);
            }
        }
        for p in lib
            .exclude
            .iter()
            .chain(&lib.company)
            .chain(&lib.job_title)
            .chain(&lib.dates)
        {
            assert!(Regex::new(p).is_ok(), "bad pattern: {}", p);
        }
    }

    #[test]
    fn test_every_actionable_event_has_a_rule() {
        let lib = PatternLibrary::default();
        for event in [
            EventType::ApplicationReceived,
            EventType::AssessmentInvitation,
            EventType::InterviewScheduled,
            EventType::InterviewReminder,
            EventType::OfferExtended,
            EventType::Rejection,
            EventType::General,
        ] {
            assert!(
                lib.rules.iter().any(|r| r.event_type == event),
                "no rule for {}",
                event.as_str()
            );
        }
        // unknown is a verdict, not a rule
        assert!(!lib.rules.iter().any(|r| r.event_type == EventType::Unknown));
    }

    #[test]
    fn test_weights_in_range() {
        let lib = PatternLibrary::default();
        for rule in &lib.rules {
            assert!(rule.weight > 0.0 && rule.weight <= 1.0);
        }
    }

    #[test]
    fn test_library_round_trips_through_json() {
        let lib = PatternLibrary::default();
        let json = serde_json::to_string(&lib).unwrap();
        let back: PatternLibrary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rules.len(), lib.rules.len());
        assert_eq!(back.exclude, lib.exclude);
    }
}
