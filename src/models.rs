use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage of a tracked application. Stored as snake_case TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Saved,
    Applied,
    Assessment,
    Interview,
    Offer,
    Accepted,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Saved => "saved",
            Status::Applied => "applied",
            Status::Assessment => "assessment",
            Status::Interview => "interview",
            Status::Offer => "offer",
            Status::Accepted => "accepted",
            Status::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "saved" => Ok(Status::Saved),
            "applied" => Ok(Status::Applied),
            "assessment" => Ok(Status::Assessment),
            "interview" => Ok(Status::Interview),
            "offer" => Ok(Status::Offer),
            "accepted" => Ok(Status::Accepted),
            "rejected" => Ok(Status::Rejected),
            _ => Err(anyhow!(
                "Unknown status '{}'. Expected one of: saved, applied, assessment, \
                 interview, offer, accepted, rejected",
                s
            )),
        }
    }
}

/// Job-lifecycle category detected from an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ApplicationReceived,
    AssessmentInvitation,
    InterviewScheduled,
    InterviewReminder,
    OfferExtended,
    Rejection,
    General,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ApplicationReceived => "application_received",
            EventType::AssessmentInvitation => "assessment_invitation",
            EventType::InterviewScheduled => "interview_scheduled",
            EventType::InterviewReminder => "interview_reminder",
            EventType::OfferExtended => "offer_extended",
            EventType::Rejection => "rejection",
            EventType::General => "general",
            EventType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "application_received" => Ok(EventType::ApplicationReceived),
            "assessment_invitation" => Ok(EventType::AssessmentInvitation),
            "interview_scheduled" => Ok(EventType::InterviewScheduled),
            "interview_reminder" => Ok(EventType::InterviewReminder),
            "offer_extended" => Ok(EventType::OfferExtended),
            "rejection" => Ok(EventType::Rejection),
            "general" => Ok(EventType::General),
            "unknown" => Ok(EventType::Unknown),
            _ => Err(anyhow!("Unknown event type '{}'", s)),
        }
    }
}

/// What caused a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Email,
    Reminder,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Email => "email",
            Trigger::Reminder => "reminder",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Trigger::Manual),
            "email" => Ok(Trigger::Email),
            "reminder" => Ok(Trigger::Reminder),
            _ => Err(anyhow!("Unknown trigger '{}'", s)),
        }
    }
}

/// An email as fetched from the mail provider. Immutable input to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEmail {
    pub message_id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

/// Classifier output for one email. Ephemeral; rebuilt on every run.
#[derive(Debug, Clone)]
pub struct ClassifiedEmail {
    pub message_id: String,
    pub from: String,
    pub subject: String,
    /// Truncated to 1000 chars at parse time.
    pub body: String,
    pub date: DateTime<Utc>,
    pub event_type: EventType,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
}

/// Fields pulled from email text independently of classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub interview_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub salary: Option<String>,
    pub is_remote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub user_id: String,
    pub job_title: String,
    pub company_name: String,
    pub current_status: Status,
    pub source: Option<String>,
    pub apply_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the append-only transition ledger. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub id: i64,
    pub application_id: i64,
    /// None only for the application's creation entry.
    pub from_status: Option<Status>,
    pub to_status: Status,
    pub trigger: Trigger,
    pub email_reference: Option<String>,
    pub timestamp: String,
}

/// Append-only record of a processed email. Only `user_confirmed` ever changes,
/// and only once: NULL -> true/false by explicit user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: i64,
    pub application_id: i64,
    pub user_id: String,
    pub email_subject: String,
    pub email_from: String,
    pub email_date: String,
    pub detected_action: EventType,
    pub confidence_score: i64,
    pub raw_snippet: String,
    pub user_confirmed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub application_id: i64,
    pub confidence: f64,
    pub match_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMatchType {
    ExactUrl,
    ExactTitleCompany,
    FuzzyMatch,
}

impl DuplicateMatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateMatchType::ExactUrl => "exact_url",
            DuplicateMatchType::ExactTitleCompany => "exact_title_company",
            DuplicateMatchType::FuzzyMatch => "fuzzy_match",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub application_id: i64,
    pub job_title: String,
    pub company_name: String,
    pub match_type: DuplicateMatchType,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCheck {
    pub has_duplicates: bool,
    pub duplicates: Vec<DuplicateMatch>,
    pub count: usize,
}

/// Outcome of running one email through the full pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailProcessingResult {
    pub message_id: String,
    pub subject: String,
    pub matched: bool,
    pub status_updated: bool,
    pub application_id: Option<i64>,
    pub new_status: Option<Status>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingSummary {
    pub total: usize,
    pub matched: usize,
    pub status_updated: usize,
    pub errors: usize,
}
