use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{parse_mail, MailHeaderMap};
use scraper::Html;
use std::fs;
use std::path::Path;

use crate::models::RawEmail;

pub struct EmailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl EmailConfig {
    pub fn gmail(username: &str, app_password: &str) -> Self {
        Self {
            server: "imap.gmail.com".to_string(),
            port: 993,
            username: username.to_string(),
            password: app_password.trim().to_string(),
        }
    }

    pub fn from_gmail_password_file(username: &str, password_file: &Path) -> Result<Self> {
        let password = fs::read_to_string(password_file)
            .with_context(|| format!("Failed to read password file: {:?}", password_file))?;
        Ok(Self::gmail(username, &password))
    }
}

/// Fetches recent inbox messages and flattens them into `RawEmail` records
/// for the pipeline. Malformed messages degrade to empty fields instead of
/// failing the whole fetch.
pub struct EmailFetcher {
    config: EmailConfig,
}

impl EmailFetcher {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn fetch_since(&self, days: u32, max_results: usize) -> Result<Vec<RawEmail>> {
        let tls = native_tls::TlsConnector::builder().build()?;

        let addr = (self.config.server.as_str(), self.config.port);
        let tcp = std::net::TcpStream::connect(addr)
            .context("Failed to connect to IMAP server")?;
        tcp.set_read_timeout(Some(std::time::Duration::from_secs(30)))?;
        tcp.set_write_timeout(Some(std::time::Duration::from_secs(30)))?;
        let tls_stream = tls.connect(&self.config.server, tcp)?;

        let client = imap::Client::new(tls_stream);
        let mut session = client
            .login(&self.config.username, &self.config.password)
            .map_err(|e| anyhow!("Login failed: {}", e.0))?;

        session.select("INBOX")?;

        let since_date = Utc::now() - chrono::Duration::days(days as i64);
        let query = format!("SINCE {}", since_date.format("%d-%b-%Y"));

        let mut message_ids: Vec<u32> = session
            .search(&query)
            .context("IMAP search failed")?
            .into_iter()
            .collect();
        // Newest first; the cap bounds load on the provider.
        message_ids.sort_unstable_by(|a, b| b.cmp(a));
        message_ids.truncate(max_results);

        let mut emails = Vec::new();
        for id in message_ids {
            let messages = session.fetch(id.to_string(), "RFC822")?;
            for message in messages.iter() {
                if let Some(body) = message.body() {
                    match parse_raw_message(body, id) {
                        Ok(email) => emails.push(email),
                        Err(e) => {
                            log::warn!("Skipping unparseable message {}: {}", id, e);
                        }
                    }
                }
            }
        }

        session.logout()?;
        Ok(emails)
    }
}

/// RFC822 bytes -> RawEmail. `uid` backs the message id when the
/// Message-ID header is missing.
pub fn parse_raw_message(raw: &[u8], uid: u32) -> Result<RawEmail> {
    let parsed = parse_mail(raw)?;

    let message_id = parsed
        .headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().trim_matches(['<', '>']).to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| format!("uid-{}", uid));

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();

    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let body = match get_email_body(&parsed) {
        Ok(text) => text,
        Err(_) => String::new(),
    };

    Ok(RawEmail {
        message_id,
        from,
        subject,
        body,
        date,
    })
}

fn get_email_body(parsed: &mailparse::ParsedMail) -> Result<String> {
    // Single part email
    if parsed.subparts.is_empty() {
        return Ok(flatten_body(parsed)?);
    }

    // Multipart - prefer HTML, then plain text
    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/html") {
            return flatten_body(part);
        }
    }

    for part in &parsed.subparts {
        let content_type = part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default();
        if content_type.contains("text/plain") {
            return Ok(part.get_body()?);
        }
    }

    // Last resort - first part
    if let Some(part) = parsed.subparts.first() {
        return flatten_body(part);
    }

    Err(anyhow!("No email body found"))
}

fn flatten_body(part: &mailparse::ParsedMail) -> Result<String> {
    let body = part.get_body()?;
    let content_type = part
        .headers
        .get_first_value("Content-Type")
        .unwrap_or_default();
    if content_type.contains("text/html") || looks_like_html(&body) {
        Ok(html_to_text(&body))
    } else {
        Ok(body)
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.chars().take(512).collect();
    head.contains("<html") || head.contains("<body") || head.contains("<div")
}

/// Flatten HTML to readable text; the classifier works on plain text only.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    // Collapse the whitespace soup HTML leaves behind.
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One email's date for display/storage contexts.
pub fn format_email_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}
