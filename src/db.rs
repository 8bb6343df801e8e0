use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

use crate::models::{
    Application, EmailEvent, EventType, StageHistoryEntry, Status, Trigger,
};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "applytrack") {
            Ok(proj_dirs.data_dir().join("applytrack.db"))
        } else {
            Ok(PathBuf::from("applytrack.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                job_title TEXT NOT NULL,
                company_name TEXT NOT NULL,
                current_status TEXT NOT NULL DEFAULT 'saved'
                    CHECK (current_status IN ('saved', 'applied', 'assessment', 'interview', 'offer', 'accepted', 'rejected')),
                source TEXT,
                apply_url TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS stage_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                from_status TEXT,
                to_status TEXT NOT NULL,
                "trigger" TEXT NOT NULL CHECK ("trigger" IN ('manual', 'email', 'reminder')),
                email_reference TEXT,
                timestamp TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS email_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                user_id TEXT NOT NULL,
                email_subject TEXT NOT NULL,
                email_from TEXT NOT NULL,
                email_date TEXT NOT NULL,
                detected_action TEXT NOT NULL,
                confidence_score INTEGER NOT NULL,
                raw_snippet TEXT NOT NULL,
                user_confirmed INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);
            CREATE INDEX IF NOT EXISTS idx_history_application ON stage_history(application_id);
            CREATE INDEX IF NOT EXISTS idx_events_user ON email_events(user_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'applytrack init' first."
            ));
        }
        Ok(())
    }

    // --- Application operations ---

    /// Inserts the application and its creation history row (from_status
    /// NULL, trigger manual) so the ledger covers the full lifetime.
    pub fn insert_application(
        &self,
        user_id: &str,
        job_title: &str,
        company_name: &str,
        status: Status,
        source: Option<&str>,
        apply_url: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO applications (user_id, job_title, company_name, current_status, source, apply_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, job_title, company_name, status.as_str(), source, apply_url],
        )?;
        let id = self.conn.last_insert_rowid();

        self.conn.execute(
            "INSERT INTO stage_history (application_id, from_status, to_status, \"trigger\")
             VALUES (?1, NULL, ?2, 'manual')",
            params![id, status.as_str()],
        )?;

        Ok(id)
    }

    pub fn get_application(&self, id: i64) -> Result<Option<Application>> {
        self.conn
            .query_row(
                "SELECT id, user_id, job_title, company_name, current_status, source, apply_url,
                        created_at, updated_at
                 FROM applications WHERE id = ?1",
                [id],
                Self::row_to_application,
            )
            .optional()
            .context("Failed to load application")
    }

    pub fn list_applications(&self, user_id: &str) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, job_title, company_name, current_status, source, apply_url,
                    created_at, updated_at
             FROM applications WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([user_id], Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    pub fn update_application_status(&self, id: i64, status: Status) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE applications SET current_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Application #{} not found", id));
        }
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        let status_str: String = row.get(4)?;
        let current_status = Status::parse(&status_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(Application {
            id: row.get(0)?,
            user_id: row.get(1)?,
            job_title: row.get(2)?,
            company_name: row.get(3)?,
            current_status,
            source: row.get(5)?,
            apply_url: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    // --- Stage history (append-only) ---

    pub fn insert_stage_history(
        &self,
        application_id: i64,
        from_status: Option<Status>,
        to_status: Status,
        trigger: Trigger,
        email_reference: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO stage_history (application_id, from_status, to_status, \"trigger\", email_reference)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                application_id,
                from_status.map(|s| s.as_str()),
                to_status.as_str(),
                trigger.as_str(),
                email_reference
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_stage_history(&self, application_id: i64) -> Result<Vec<StageHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, from_status, to_status, \"trigger\", email_reference, timestamp
             FROM stage_history WHERE application_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([application_id], Self::row_to_history)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list stage history")
    }

    fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<StageHistoryEntry> {
        let from_str: Option<String> = row.get(2)?;
        let to_str: String = row.get(3)?;
        let trigger_str: String = row.get(4)?;
        let conv = |col, e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, e.into())
        };
        let from_status = match from_str {
            Some(s) => Some(Status::parse(&s).map_err(|e| conv(2, e))?),
            None => None,
        };
        Ok(StageHistoryEntry {
            id: row.get(0)?,
            application_id: row.get(1)?,
            from_status,
            to_status: Status::parse(&to_str).map_err(|e| conv(3, e))?,
            trigger: Trigger::parse(&trigger_str).map_err(|e| conv(4, e))?,
            email_reference: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }

    // --- Email events (append-only except user_confirmed) ---

    #[allow(clippy::too_many_arguments)]
    pub fn insert_email_event(
        &self,
        application_id: i64,
        user_id: &str,
        email_subject: &str,
        email_from: &str,
        email_date: &str,
        detected_action: EventType,
        confidence_score: i64,
        raw_snippet: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO email_events
             (application_id, user_id, email_subject, email_from, email_date,
              detected_action, confidence_score, raw_snippet, user_confirmed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
            params![
                application_id,
                user_id,
                email_subject,
                email_from,
                email_date,
                detected_action.as_str(),
                confidence_score,
                raw_snippet
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_email_events(&self, user_id: &str, pending_only: bool) -> Result<Vec<EmailEvent>> {
        let mut sql = String::from(
            "SELECT id, application_id, user_id, email_subject, email_from, email_date,
                    detected_action, confidence_score, raw_snippet, user_confirmed
             FROM email_events WHERE user_id = ?1",
        );
        if pending_only {
            sql.push_str(" AND user_confirmed IS NULL");
        }
        sql.push_str(" ORDER BY id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], Self::row_to_event)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list email events")
    }

    /// Flips user_confirmed from NULL exactly once. A second call, or a call
    /// against an already-confirmed event, is an error rather than a silent
    /// overwrite.
    pub fn set_event_confirmation(&self, event_id: i64, confirmed: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE email_events SET user_confirmed = ?1 WHERE id = ?2 AND user_confirmed IS NULL",
            params![confirmed, event_id],
        )?;
        if changed == 0 {
            return Err(anyhow!(
                "Email event #{} not found or already confirmed",
                event_id
            ));
        }
        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<EmailEvent> {
        let action_str: String = row.get(6)?;
        let detected_action = EventType::parse(&action_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(EmailEvent {
            id: row.get(0)?,
            application_id: row.get(1)?,
            user_id: row.get(2)?,
            email_subject: row.get(3)?,
            email_from: row.get(4)?,
            email_date: row.get(5)?,
            detected_action,
            confidence_score: row.get(7)?,
            raw_snippet: row.get(8)?,
            user_confirmed: row.get(9)?,
        })
    }

    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}
