mod classify;
mod db;
mod email;
mod extract;
mod matching;
mod models;
mod patterns;
mod processor;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use classify::Classifier;
use db::Database;
use email::{EmailConfig, EmailFetcher};
use matching::DuplicateDetector;
use models::Status;
use patterns::PatternLibrary;
use processor::EmailProcessor;

#[derive(Parser)]
#[command(name = "applytrack")]
#[command(about = "Track job applications and auto-detect status changes from email")]
struct Cli {
    /// Profile the data belongs to
    #[arg(long, global = true, default_value = "default")]
    user: String,

    /// Path to a JSON pattern library overriding the built-in heuristics
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add an application (runs the duplicate check first)
    Add {
        /// Job title
        title: String,

        /// Company name
        company: String,

        /// Posting URL
        #[arg(short, long)]
        url: Option<String>,

        /// Where the posting came from (linkedin, indeed, manual, ...)
        #[arg(short, long)]
        source: Option<String>,

        /// Save even if duplicates are found
        #[arg(long)]
        force: bool,
    },

    /// List applications
    List {
        /// Filter by status (saved, applied, assessment, interview, offer, accepted, rejected)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show an application with its stage history
    Show {
        /// Application ID
        id: i64,
    },

    /// Manually set an application's status
    SetStatus {
        /// Application ID
        id: i64,

        /// New status
        status: String,
    },

    /// Check a prospective application for duplicates without saving
    CheckDup {
        title: String,
        company: String,

        #[arg(short, long)]
        url: Option<String>,
    },

    /// List detected email events
    Events {
        /// Only events awaiting confirmation
        #[arg(long)]
        pending: bool,
    },

    /// Confirm (or reject) a detected email event
    Confirm {
        /// Event ID
        event_id: i64,

        /// Mark the detection as wrong instead
        #[arg(long)]
        reject: bool,
    },

    /// Fetch recent email and run the classification pipeline
    ProcessEmails {
        /// Gmail address
        #[arg(short = 'U', long)]
        username: String,

        /// Path to app password file
        #[arg(short, long, default_value = "~/.gmail.app_password.txt")]
        password_file: String,

        /// Number of days to look back
        #[arg(short, long, default_value = "7")]
        days: u32,

        /// Maximum number of emails to fetch
        #[arg(short, long, default_value = "100")]
        max: usize,

        /// Classify and report without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn load_classifier(path: Option<&PathBuf>) -> Result<Classifier> {
    let library = match path {
        Some(p) => PatternLibrary::from_file(p)?,
        None => PatternLibrary::default(),
    };
    Classifier::new(&library)
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let db = Database::open()?;
    let user = cli.user.clone();

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add {
            title,
            company,
            url,
            source,
            force,
        } => {
            db.ensure_initialized()?;

            let detector = DuplicateDetector::new(&db);
            let check = detector.check(&user, &title, &company, url.as_deref())?;
            if check.has_duplicates && !force {
                println!("Found {} possible duplicate(s):", check.count);
                for dup in &check.duplicates {
                    println!(
                        "  #{} {} at {} ({}, {:.0}%)",
                        dup.application_id,
                        dup.job_title,
                        dup.company_name,
                        dup.match_type.as_str(),
                        dup.similarity * 100.0
                    );
                }
                println!("Not saved. Re-run with --force to save anyway.");
                return Ok(());
            }

            let id = db.insert_application(
                &user,
                &title,
                &company,
                Status::Saved,
                source.as_deref(),
                url.as_deref(),
            )?;
            println!("Added application #{}: {} at {}", id, title, company);
        }

        Commands::List { status } => {
            db.ensure_initialized()?;
            let filter = status.as_deref().map(Status::parse).transpose()?;
            let apps = db.list_applications(&user)?;
            let apps: Vec<_> = apps
                .into_iter()
                .filter(|a| filter.is_none_or(|s| a.current_status == s))
                .collect();

            if apps.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<6} {:<12} {:<30} {:<22} {:<10}",
                    "ID", "STATUS", "TITLE", "COMPANY", "CREATED"
                );
                println!("{}", "-".repeat(84));
                for app in apps {
                    println!(
                        "{:<6} {:<12} {:<30} {:<22} {:<10}",
                        app.id,
                        app.current_status.as_str(),
                        truncate(&app.job_title, 28),
                        truncate(&app.company_name, 20),
                        truncate(&app.created_at, 10)
                    );
                }
            }
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            match db.get_application(id)? {
                Some(app) => {
                    println!("Application #{}", app.id);
                    println!("Title: {}", app.job_title);
                    println!("Company: {}", app.company_name);
                    println!("Status: {}", app.current_status.as_str());
                    if let Some(url) = &app.apply_url {
                        println!("URL: {}", url);
                    }
                    if let Some(source) = &app.source {
                        println!("Source: {}", source);
                    }
                    println!("Created: {}", app.created_at);

                    let history = db.list_stage_history(id)?;
                    println!("\nStage history:");
                    for entry in history {
                        let from = entry
                            .from_status
                            .map(|s| s.as_str())
                            .unwrap_or("(created)");
                        let via = match entry.email_reference {
                            Some(msg) => format!(" via email {}", msg),
                            None => String::new(),
                        };
                        println!(
                            "  {} -> {} [{}]{} at {}",
                            from,
                            entry.to_status.as_str(),
                            entry.trigger.as_str(),
                            via,
                            entry.timestamp
                        );
                    }
                }
                None => println!("Application #{} not found.", id),
            }
        }

        Commands::SetStatus { id, status } => {
            db.ensure_initialized()?;
            let new_status = Status::parse(&status)?;
            let app = db
                .get_application(id)?
                .with_context(|| format!("Application #{} not found", id))?;

            if app.current_status == new_status {
                println!("Application #{} is already {}.", id, new_status.as_str());
            } else {
                db.update_application_status(id, new_status)?;
                db.insert_stage_history(
                    id,
                    Some(app.current_status),
                    new_status,
                    models::Trigger::Manual,
                    None,
                )?;
                println!(
                    "Application #{}: {} -> {}",
                    id,
                    app.current_status.as_str(),
                    new_status.as_str()
                );
            }
        }

        Commands::CheckDup { title, company, url } => {
            db.ensure_initialized()?;
            let detector = DuplicateDetector::new(&db);
            let check = detector.check(&user, &title, &company, url.as_deref())?;
            if !check.has_duplicates {
                println!("No duplicates found.");
            } else {
                println!("{} duplicate(s):", check.count);
                for dup in check.duplicates {
                    println!(
                        "  #{} {} at {} ({}, {:.0}%)",
                        dup.application_id,
                        dup.job_title,
                        dup.company_name,
                        dup.match_type.as_str(),
                        dup.similarity * 100.0
                    );
                }
            }
        }

        Commands::Events { pending } => {
            db.ensure_initialized()?;
            let events = db.list_email_events(&user, pending)?;
            if events.is_empty() {
                println!("No email events found.");
            } else {
                println!(
                    "{:<6} {:<6} {:<22} {:<6} {:<10} {:<30}",
                    "ID", "APP", "ACTION", "CONF", "CONFIRMED", "SUBJECT"
                );
                println!("{}", "-".repeat(84));
                for event in events {
                    let confirmed = match event.user_confirmed {
                        Some(true) => "yes",
                        Some(false) => "no",
                        None => "pending",
                    };
                    println!(
                        "{:<6} {:<6} {:<22} {:<6} {:<10} {:<30}",
                        event.id,
                        event.application_id,
                        event.detected_action.as_str(),
                        event.confidence_score,
                        confirmed,
                        truncate(&event.email_subject, 28)
                    );
                }
            }
        }

        Commands::Confirm { event_id, reject } => {
            db.ensure_initialized()?;
            db.set_event_confirmation(event_id, !reject)?;
            if reject {
                println!("Event #{} marked as wrong.", event_id);
            } else {
                println!("Event #{} confirmed.", event_id);
            }
        }

        Commands::ProcessEmails {
            username,
            password_file,
            days,
            max,
            dry_run,
        } => {
            db.ensure_initialized()?;
            let classifier = load_classifier(cli.patterns.as_ref())?;

            // Expand ~ in path
            let password_path = if password_file.starts_with("~/") {
                let home = std::env::var("HOME").unwrap_or_default();
                PathBuf::from(format!("{}/{}", home, &password_file[2..]))
            } else {
                PathBuf::from(&password_file)
            };

            println!("Connecting to Gmail as {}...", username);
            let config = EmailConfig::from_gmail_password_file(&username, &password_path)?;
            let fetcher = EmailFetcher::new(config);

            println!("Fetching email from the last {} days...", days);
            let emails = fetcher.fetch_since(days, max)?;
            println!("Fetched {} email(s).", emails.len());

            if dry_run {
                let extractor = extract::Extractor::with_defaults()?;
                let now = chrono::Utc::now();
                for raw in &emails {
                    let parsed = classifier.parse(
                        &raw.message_id,
                        &raw.from,
                        &raw.subject,
                        &raw.body,
                        raw.date,
                    );
                    let fields = extractor.extract_fields(&raw.body, now);
                    println!(
                        "[DRY RUN] {} -> {} ({:.0}%) company={} title={}",
                        truncate(&parsed.subject, 50),
                        parsed.event_type.as_str(),
                        parsed.confidence * 100.0,
                        parsed.company_name.as_deref().unwrap_or("-"),
                        parsed.job_title.as_deref().unwrap_or("-"),
                    );
                    if let Some(when) = fields.interview_date {
                        println!("          interview date: {}", email::format_email_date(&when));
                    }
                    if let Some(deadline) = fields.deadline {
                        println!("          deadline: {}", email::format_email_date(&deadline));
                    }
                    if let Some(salary) = &fields.salary {
                        println!("          salary: {}", salary);
                    }
                    if fields.is_remote {
                        println!("          remote position");
                    }
                }
                println!("\n(Dry run - nothing was written)");
                return Ok(());
            }

            let processor = EmailProcessor::new(&db, &classifier);
            let results = processor.process_emails(&user, &emails);

            for result in &results {
                if let Some(err) = &result.error {
                    eprintln!("  Error processing {}: {}", result.message_id, err);
                } else if result.status_updated {
                    println!(
                        "  #{} -> {} ({})",
                        result.application_id.unwrap_or_default(),
                        result.new_status.map(|s| s.as_str()).unwrap_or("?"),
                        truncate(&result.subject, 50)
                    );
                }
            }

            let summary = EmailProcessor::summarize(&results);
            println!("\nResults:");
            println!("  Emails processed: {}", summary.total);
            println!("  Matched:          {}", summary.matched);
            println!("  Status updates:   {}", summary.status_updated);
            if summary.errors > 0 {
                println!("  Errors:           {}", summary.errors);
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
