use anyhow::Result;
use log::warn;

use crate::classify::Classifier;
use crate::db::Database;
use crate::matching::ApplicationMatcher;
use crate::models::{
    ClassifiedEmail, EmailProcessingResult, EventType, ProcessingSummary, RawEmail, Status,
    Trigger,
};

/// Snippet stored on the audit row; the full body never persists.
const SNIPPET_CHARS: usize = 500;

/// Which application status a detected event drives toward. None means the
/// email is informational and must not move the pipeline.
pub fn target_status(event: EventType) -> Option<Status> {
    match event {
        EventType::ApplicationReceived => Some(Status::Applied),
        EventType::AssessmentInvitation => Some(Status::Assessment),
        EventType::InterviewScheduled => Some(Status::Interview),
        EventType::InterviewReminder => None,
        EventType::OfferExtended => Some(Status::Offer),
        EventType::Rejection => Some(Status::Rejected),
        EventType::General => None,
        EventType::Unknown => None,
    }
}

/// Runs classified emails through match -> audit -> status transition.
pub struct EmailProcessor<'a> {
    db: &'a Database,
    classifier: &'a Classifier,
}

impl<'a> EmailProcessor<'a> {
    pub fn new(db: &'a Database, classifier: &'a Classifier) -> Self {
        Self { db, classifier }
    }

    /// One email, full pipeline. An unmatched email leaves no persistent
    /// trace; a matched one always gets an EmailEvent row, and at most one
    /// status mutation plus history entry.
    pub fn process_email(
        &self,
        user_id: &str,
        email: &ClassifiedEmail,
    ) -> Result<EmailProcessingResult> {
        let mut result = EmailProcessingResult {
            message_id: email.message_id.clone(),
            subject: email.subject.clone(),
            ..Default::default()
        };

        let matcher = ApplicationMatcher::new(self.db);
        let best = matcher.get_best_match(
            user_id,
            email.company_name.as_deref(),
            email.job_title.as_deref(),
        )?;

        let Some(matched) = best else {
            return Ok(result);
        };
        result.matched = true;
        result.application_id = Some(matched.application_id);

        // Audit row first, even when no status change follows. A failed
        // audit write must not block the status mutation below; the two are
        // independent side effects in this design.
        let snippet: String = email.body.chars().take(SNIPPET_CHARS).collect();
        if let Err(e) = self.db.insert_email_event(
            matched.application_id,
            user_id,
            &email.subject,
            &email.from,
            &email.date.to_rfc3339(),
            email.event_type,
            (email.confidence * 100.0).round() as i64,
            &snippet,
        ) {
            warn!(
                "Failed to record email event for {}: {}",
                email.message_id, e
            );
        }

        let Some(new_status) = target_status(email.event_type) else {
            return Ok(result);
        };

        let application = self
            .db
            .get_application(matched.application_id)?
            .ok_or_else(|| anyhow::anyhow!("Application #{} vanished", matched.application_id))?;

        // Idempotence: reprocessing an email whose target equals the current
        // status must not fork history.
        if application.current_status == new_status {
            return Ok(result);
        }

        self.db
            .update_application_status(application.id, new_status)?;
        self.db.insert_stage_history(
            application.id,
            Some(application.current_status),
            new_status,
            Trigger::Email,
            Some(&email.message_id),
        )?;

        result.status_updated = true;
        result.new_status = Some(new_status);
        Ok(result)
    }

    /// Sequential batch. One bad email is recorded as an error in its own
    /// result and never poisons its siblings. Order matters: history rows
    /// must reflect email arrival order.
    pub fn process_emails(&self, user_id: &str, emails: &[RawEmail]) -> Vec<EmailProcessingResult> {
        emails
            .iter()
            .map(|raw| {
                let classified = self.classifier.parse(
                    &raw.message_id,
                    &raw.from,
                    &raw.subject,
                    &raw.body,
                    raw.date,
                );
                match self.process_email(user_id, &classified) {
                    Ok(result) => result,
                    Err(e) => EmailProcessingResult {
                        message_id: raw.message_id.clone(),
                        subject: raw.subject.clone(),
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                }
            })
            .collect()
    }

    pub fn summarize(results: &[EmailProcessingResult]) -> ProcessingSummary {
        ProcessingSummary {
            total: results.len(),
            matched: results.iter().filter(|r| r.matched).count(),
            status_updated: results.iter().filter(|r| r.status_updated).count(),
            errors: results.iter().filter(|r| r.error.is_some()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup() -> (Database, Classifier) {
        let db = Database::open_in_memory().unwrap();
        let classifier = Classifier::with_defaults().unwrap();
        (db, classifier)
    }

    fn raw(message_id: &str, from: &str, subject: &str, body: &str) -> RawEmail {
        RawEmail {
            message_id: message_id.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            date: Utc::now(),
        }
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(target_status(EventType::ApplicationReceived), Some(Status::Applied));
        assert_eq!(target_status(EventType::AssessmentInvitation), Some(Status::Assessment));
        assert_eq!(target_status(EventType::InterviewScheduled), Some(Status::Interview));
        assert_eq!(target_status(EventType::OfferExtended), Some(Status::Offer));
        assert_eq!(target_status(EventType::Rejection), Some(Status::Rejected));
        assert_eq!(target_status(EventType::InterviewReminder), None);
        assert_eq!(target_status(EventType::General), None);
        assert_eq!(target_status(EventType::Unknown), None);
    }

    #[test]
    fn test_end_to_end_saved_to_applied() {
        let (db, classifier) = setup();
        let app_id = db
            .insert_application("u1", "Backend Engineer", "Acme Corp", Status::Saved, None, None)
            .unwrap();

        let processor = EmailProcessor::new(&db, &classifier);
        let email = raw(
            "msg-1",
            "jobs@acme.com",
            "Your application to Acme Corp was received",
            "Thank you for your application. We will review your application shortly.",
        );
        let results = processor.process_emails("u1", &[email]);

        assert_eq!(results.len(), 1);
        assert!(results[0].matched);
        assert!(results[0].status_updated);
        assert_eq!(results[0].new_status, Some(Status::Applied));

        let app = db.get_application(app_id).unwrap().unwrap();
        assert_eq!(app.current_status, Status::Applied);

        let history = db.list_stage_history(app_id).unwrap();
        // Creation entry plus the email-driven transition.
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from_status, Some(Status::Saved));
        assert_eq!(history[1].to_status, Status::Applied);
        assert_eq!(history[1].trigger, Trigger::Email);
        assert_eq!(history[1].email_reference.as_deref(), Some("msg-1"));

        let events = db.list_email_events("u1", false).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detected_action, EventType::ApplicationReceived);
        assert!(events[0].confidence_score >= 30);
        assert_eq!(events[0].user_confirmed, None);
    }

    #[test]
    fn test_reprocessing_is_idempotent() {
        let (db, classifier) = setup();
        let app_id = db
            .insert_application("u1", "Backend Engineer", "Acme Corp", Status::Saved, None, None)
            .unwrap();

        let processor = EmailProcessor::new(&db, &classifier);
        let email = raw(
            "msg-1",
            "jobs@acme.com",
            "Your application to Acme Corp was received",
            "Thank you for your application.",
        );

        let first = processor.process_emails("u1", std::slice::from_ref(&email));
        assert!(first[0].status_updated);

        let second = processor.process_emails("u1", &[email]);
        assert!(second[0].matched);
        assert!(!second[0].status_updated);

        // History did not fork; each matched run still gets an audit row.
        assert_eq!(db.list_stage_history(app_id).unwrap().len(), 2);
        assert_eq!(db.list_email_events("u1", false).unwrap().len(), 2);
    }

    #[test]
    fn test_rejection_moves_interview_to_rejected() {
        let (db, classifier) = setup();
        let app_id = db
            .insert_application("u1", "Backend Engineer", "Acme Corp", Status::Interview, None, None)
            .unwrap();

        let processor = EmailProcessor::new(&db, &classifier);
        let email = raw(
            "msg-2",
            "recruiting@acme.com",
            "Update on your application to Acme Corp",
            "Unfortunately we have decided to move forward with other candidates.",
        );
        let results = processor.process_emails("u1", &[email]);

        assert!(results[0].status_updated);
        assert_eq!(results[0].new_status, Some(Status::Rejected));
        let app = db.get_application(app_id).unwrap().unwrap();
        assert_eq!(app.current_status, Status::Rejected);
    }

    #[test]
    fn test_reminder_matches_but_never_mutates() {
        let (db, classifier) = setup();
        let app_id = db
            .insert_application("u1", "Backend Engineer", "Acme Corp", Status::Interview, None, None)
            .unwrap();

        let processor = EmailProcessor::new(&db, &classifier);
        let email = raw(
            "msg-3",
            "recruiting@acme.com",
            "Interview reminder: interview with Acme Corp",
            "Reminder about your upcoming interview. Your interview is tomorrow.",
        );
        let results = processor.process_emails("u1", &[email]);

        assert!(results[0].matched);
        assert!(!results[0].status_updated);
        assert_eq!(db.get_application(app_id).unwrap().unwrap().current_status, Status::Interview);
        // Informational, but still audited.
        assert_eq!(db.list_email_events("u1", false).unwrap().len(), 1);
        assert_eq!(db.list_stage_history(app_id).unwrap().len(), 1);
    }

    #[test]
    fn test_no_match_leaves_no_trace() {
        let (db, classifier) = setup();
        db.insert_application("u1", "Backend Engineer", "Acme Corp", Status::Saved, None, None)
            .unwrap();

        let processor = EmailProcessor::new(&db, &classifier);
        let email = raw(
            "msg-4",
            "jobs@unknownstartup.com",
            "Your application to Unknown Startup Co was received",
            "Thank you for your application.",
        );
        let results = processor.process_emails("u1", &[email]);

        assert!(!results[0].matched);
        assert!(!results[0].status_updated);
        assert!(db.list_email_events("u1", false).unwrap().is_empty());
    }

    #[test]
    fn test_batch_survives_one_failing_item() {
        let (db, classifier) = setup();
        db.insert_application("u1", "Backend Engineer", "Acme Corp", Status::Saved, None, None)
            .unwrap();

        // Breaking the history table makes any status-updating email fail
        // mid-pipeline while leaving matching and lookups intact.
        db.execute_raw("DROP TABLE stage_history").unwrap();

        let processor = EmailProcessor::new(&db, &classifier);
        let emails = vec![
            raw("msg-a", "x@gmail.com", "Lunch?", "Nothing job related."),
            raw(
                "msg-b",
                "jobs@acme.com",
                "Your application to Acme Corp was received",
                "Thank you for your application.",
            ),
            raw("msg-c", "y@gmail.com", "Re: weekend", "Also nothing."),
        ];
        let results = processor.process_emails("u1", &emails);

        assert_eq!(results.len(), 3);
        assert!(results[0].error.is_none());
        assert!(results[1].error.is_some());
        assert!(results[2].error.is_none());

        let summary = EmailProcessor::summarize(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.status_updated, 0);
    }

    #[test]
    fn test_summarize_counts() {
        let results = vec![
            EmailProcessingResult {
                matched: true,
                status_updated: true,
                ..Default::default()
            },
            EmailProcessingResult {
                matched: true,
                ..Default::default()
            },
            EmailProcessingResult {
                error: Some("boom".to_string()),
                ..Default::default()
            },
        ];
        let summary = EmailProcessor::summarize(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.status_updated, 1);
        assert_eq!(summary.errors, 1);
    }
}
