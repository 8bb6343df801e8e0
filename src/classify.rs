use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::{ClassifiedEmail, EventType};
use crate::patterns::PatternLibrary;

/// Per-field score factors. Subject-line signals dominate because most job
/// emails are well-described by their subject; body and sender corroborate.
const SUBJECT_FACTOR: f64 = 0.6;
const BODY_FACTOR: f64 = 0.4;
const FROM_FACTOR: f64 = 0.3;

/// Minimum winning score; anything weaker resolves to `unknown`. A wrong
/// classification can trigger a real status mutation, so silence beats a
/// bad guess.
const MIN_CONFIDENCE: f64 = 0.3;

/// Classified email bodies are truncated to bound what gets stored downstream.
const MAX_BODY_CHARS: usize = 1000;

/// Job-title captures outside this range are noise or mis-captured prose.
const MIN_TITLE_CHARS: usize = 5;
const MAX_TITLE_CHARS: usize = 100;

struct CompiledRule {
    event_type: EventType,
    weight: f64,
    subject: Vec<Regex>,
    body: Vec<Regex>,
    from: Vec<Regex>,
}

/// Scores raw email text against the pattern library. Holds compiled
/// regexes; build once, reuse across a batch.
pub struct Classifier {
    rules: Vec<CompiledRule>,
    exclude: Vec<Regex>,
    company: Vec<Regex>,
    job_title: Vec<Regex>,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub event_type: EventType,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("Invalid pattern: {}", p)))
        .collect()
}

impl Classifier {
    pub fn new(library: &PatternLibrary) -> Result<Self> {
        let rules = library
            .rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    event_type: rule.event_type,
                    weight: rule.weight,
                    subject: compile_all(&rule.subject)?,
                    body: compile_all(&rule.body)?,
                    from: compile_all(&rule.from)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            exclude: compile_all(&library.exclude)?,
            company: compile_all(&library.company)?,
            job_title: compile_all(&library.job_title)?,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(&PatternLibrary::default())
    }

    /// Score `subject`/`body`/`from` against every rule and return the top
    /// event type, or `unknown` when the email is excluded or too weak.
    pub fn classify(&self, subject: &str, body: &str, from: &str) -> Classification {
        let combined = format!("{}\n{}", subject, body);

        // Exclusion gate runs before any scoring; newsletters and digests
        // must never reach the rule table even when they mention interviews.
        if self.exclude.iter().any(|re| re.is_match(&combined)) {
            return Classification {
                event_type: EventType::Unknown,
                confidence: 0.0,
                evidence: Vec::new(),
            };
        }

        let mut best: Option<(f64, &CompiledRule, Vec<String>)> = None;

        for rule in &self.rules {
            let mut score = 0.0;
            let mut evidence = Vec::new();

            for re in &rule.subject {
                if re.is_match(subject) {
                    score += rule.weight * SUBJECT_FACTOR;
                    evidence.push(format!("subject: {}", re.as_str()));
                }
            }
            for re in &rule.body {
                if re.is_match(body) {
                    score += rule.weight * BODY_FACTOR;
                    evidence.push(format!("body: {}", re.as_str()));
                }
            }
            for re in &rule.from {
                if re.is_match(from) {
                    score += rule.weight * FROM_FACTOR;
                    evidence.push(format!("from: {}", re.as_str()));
                }
            }

            if score > 0.0 {
                let better = match &best {
                    Some((best_score, _, _)) => score > *best_score,
                    None => true,
                };
                if better {
                    best = Some((score, rule, evidence));
                }
            }
        }

        match best {
            Some((score, rule, evidence)) if score >= MIN_CONFIDENCE => Classification {
                event_type: rule.event_type,
                confidence: score.min(1.0),
                evidence,
            },
            _ => Classification {
                event_type: EventType::Unknown,
                confidence: 0.0,
                evidence: Vec::new(),
            },
        }
    }

    /// First company-pattern capture over subject+body, else the sender's
    /// domain segment capitalized. The domain fallback is last-resort and
    /// coarse ("jobs@acme.com" -> "Acme").
    pub fn extract_company(&self, subject: &str, body: &str, from: &str) -> Option<String> {
        let combined = format!("{}\n{}", subject, body);

        for re in &self.company {
            if let Some(caps) = re.captures(&combined) {
                if let Some(m) = caps.get(1) {
                    let name = m.as_str().trim().trim_end_matches(['.', ',', '!']);
                    if !name.is_empty() {
                        return Some(name.to_string());
                    }
                }
            }
        }

        domain_segment(from).map(capitalize)
    }

    /// First job-title capture with a plausible length.
    pub fn extract_job_title(&self, subject: &str, body: &str) -> Option<String> {
        let combined = format!("{}\n{}", subject, body);

        for re in &self.job_title {
            if let Some(caps) = re.captures(&combined) {
                if let Some(m) = caps.get(1) {
                    let title = m.as_str().trim();
                    if title.len() > MIN_TITLE_CHARS && title.len() < MAX_TITLE_CHARS {
                        return Some(title.to_string());
                    }
                }
            }
        }

        None
    }

    /// Full per-email parse: classification plus company/title extraction,
    /// body truncated before anything downstream can store it.
    pub fn parse(
        &self,
        message_id: &str,
        from: &str,
        subject: &str,
        body: &str,
        date: DateTime<Utc>,
    ) -> ClassifiedEmail {
        let classification = self.classify(subject, body, from);
        let company_name = self.extract_company(subject, body, from);
        let job_title = self.extract_job_title(subject, body);

        ClassifiedEmail {
            message_id: message_id.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            body: truncate_chars(body, MAX_BODY_CHARS),
            date,
            event_type: classification.event_type,
            confidence: classification.confidence,
            evidence: classification.evidence,
            company_name,
            job_title,
        }
    }
}

/// "jobs@acme.com" -> "acme". Ignores the TLD and any subdomain tail.
fn domain_segment(address: &str) -> Option<String> {
    let after_at = address.rsplit('@').next()?;
    let after_at = after_at.trim().trim_end_matches('>');
    let segment = after_at.split('.').next()?.trim();
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_string())
}

fn capitalize(s: String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => s,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::with_defaults().unwrap()
    }

    #[test]
    fn test_application_received_end_to_end() {
        let c = classifier();
        let result = c.classify(
            "Your application to Acme Corp was received",
            "Thank you for your application. We will review your application shortly.",
            "jobs@acme.com",
        );
        assert_eq!(result.event_type, EventType::ApplicationReceived);
        assert!(result.confidence >= 0.3);
        assert!(!result.evidence.is_empty());
    }

    #[test]
    fn test_rejection_classification() {
        let c = classifier();
        let result = c.classify(
            "Update on your application",
            "After careful review we have unfortunately decided to move forward with other candidates.",
            "recruiting@bigco.com",
        );
        assert_eq!(result.event_type, EventType::Rejection);
        assert!(result.confidence >= 0.3);
    }

    #[test]
    fn test_weak_signal_resolves_to_unknown() {
        let c = classifier();
        let result = c.classify("Lunch on Friday?", "Want to grab a bite?", "friend@gmail.com");
        assert_eq!(result.event_type, EventType::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn test_exclusion_beats_strong_job_signal() {
        let c = classifier();
        // Strong interview wording, but it is a newsletter.
        let result = c.classify(
            "Weekly Newsletter: interview tips",
            "Ten ways to ace your interview. Click unsubscribe to stop receiving these.",
            "digest@jobsite.com",
        );
        assert_eq!(result.event_type, EventType::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_confidence_never_exceeds_one() {
        let c = classifier();
        // Hits subject, several body patterns, and the sender pattern at once.
        let result = c.classify(
            "Application received - thank you for applying",
            "Thank you for applying. We have received your application. \
             Your application has been received and we will review your application.",
            "no-reply@careers.example.com",
        );
        assert!(result.confidence <= 1.0);
        assert!(result.confidence >= 0.3);
    }

    #[test]
    fn test_interview_scheduled() {
        let c = classifier();
        let result = c.classify(
            "Interview invitation - Backend Engineer",
            "We would like to schedule an interview with you next week. Please pick a time.",
            "recruiter@startup.io",
        );
        assert_eq!(result.event_type, EventType::InterviewScheduled);
    }

    #[test]
    fn test_offer_extended() {
        let c = classifier();
        let result = c.classify(
            "Your offer from Initech",
            "We are pleased to offer you the position. The compensation package is attached.",
            "hr@initech.com",
        );
        assert_eq!(result.event_type, EventType::OfferExtended);
    }

    #[test]
    fn test_extract_company_from_pattern() {
        let c = classifier();
        let company = c.extract_company(
            "Your application to Acme Corp was received",
            "Thank you for your application...",
            "jobs@acme.com",
        );
        assert_eq!(company, Some("Acme Corp".to_string()));
    }

    #[test]
    fn test_extract_company_domain_fallback() {
        let c = classifier();
        let company = c.extract_company(
            "Hello",
            "Nothing useful in here.",
            "recruiting@globex.com",
        );
        assert_eq!(company, Some("Globex".to_string()));
    }

    #[test]
    fn test_extract_company_angle_bracket_sender() {
        let c = classifier();
        let company = c.extract_company(
            "Hi",
            "No patterns here.",
            "Talent Team <talent@hooli.io>",
        );
        assert_eq!(company, Some("Hooli".to_string()));
    }

    #[test]
    fn test_extract_job_title() {
        let c = classifier();
        let title = c.extract_job_title(
            "Thanks for applying",
            "Thank you for your interest in joining us for the Senior Rust Engineer position.",
        );
        assert_eq!(title, Some("Senior Rust Engineer".to_string()));
    }

    #[test]
    fn test_extract_job_title_rejects_short_capture() {
        let c = classifier();
        // "QA" is below the minimum plausible length.
        let title = c.extract_job_title("Re: next steps", "Interviews for the QA position begin soon.");
        assert_eq!(title, None);
    }

    #[test]
    fn test_parse_truncates_body() {
        let c = classifier();
        let long_body = "x".repeat(5000);
        let parsed = c.parse("msg-1", "jobs@acme.com", "Hello", &long_body, Utc::now());
        assert_eq!(parsed.body.chars().count(), 1000);
    }

    #[test]
    fn test_parse_composes_fields() {
        let c = classifier();
        let parsed = c.parse(
            "msg-2",
            "jobs@acme.com",
            "Your application to Acme Corp was received",
            "Thank you for applying for the Staff Software Engineer position.",
            Utc::now(),
        );
        assert_eq!(parsed.event_type, EventType::ApplicationReceived);
        assert_eq!(parsed.company_name, Some("Acme Corp".to_string()));
        assert_eq!(parsed.job_title, Some("Staff Software Engineer".to_string()));
        assert_eq!(parsed.message_id, "msg-2");
    }

    #[test]
    fn test_domain_segment() {
        assert_eq!(domain_segment("jobs@acme.com"), Some("acme".to_string()));
        assert_eq!(domain_segment("a@b.co.uk"), Some("b".to_string()));
        assert_eq!(domain_segment("no-at-sign"), Some("no-at-sign".to_string()));
    }
}
