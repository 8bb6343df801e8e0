use anyhow::Result;
use std::collections::HashSet;

use crate::db::Database;
use crate::models::{DuplicateCheck, DuplicateMatch, DuplicateMatchType, MatchResult};

/// Company identity is the primary matching key; the title only corroborates,
/// since one company can have several concurrently-tracked postings.
const COMPANY_WEIGHT: f64 = 0.8;
const TITLE_WEIGHT: f64 = 0.2;

/// Matches below this score are noise, not candidates.
const MATCH_FLOOR: f64 = 0.5;

/// Duplicate-detector weighting favors the title: at save time the user is
/// usually re-adding the same posting, not a sibling role.
const DUP_TITLE_WEIGHT: f64 = 0.6;
const DUP_COMPANY_WEIGHT: f64 = 0.4;
const DUP_THRESHOLD: f64 = 0.75;

/// Above this length Levenshtein is both expensive and a poor proxy for
/// paraphrased text; switch to word-set overlap.
const LEVENSHTEIN_MAX_LEN: usize = 50;

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Similarity in [0,1] over normalized strings: exact equality, then
/// containment scaled by length ratio, then Levenshtein distance ratio.
pub fn fuzzy_match(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if longer.contains(shorter.as_str()) {
        return shorter.len() as f64 / longer.len() as f64;
    }

    let distance = strsim::levenshtein(&a, &b);
    let max_len = a.len().max(b.len());
    1.0 - distance as f64 / max_len as f64
}

/// Jaccard overlap of normalized word sets.
pub fn jaccard_words(a: &str, b: &str) -> f64 {
    let a_words: HashSet<&str> = a.split_whitespace().collect();
    let b_words: HashSet<&str> = b.split_whitespace().collect();
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }
    let intersection = a_words.intersection(&b_words).count();
    let union = a_words.union(&b_words).count();
    intersection as f64 / union as f64
}

/// Length-aware text similarity used by the duplicate detector: edit
/// distance for short strings, word overlap for long ones.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na.len() < LEVENSHTEIN_MAX_LEN && nb.len() < LEVENSHTEIN_MAX_LEN {
        let distance = strsim::levenshtein(&na, &nb);
        let max_len = na.len().max(nb.len());
        1.0 - distance as f64 / max_len as f64
    } else {
        jaccard_words(&na, &nb)
    }
}

fn match_reason(score: f64) -> &'static str {
    if score >= 0.95 {
        "exact"
    } else if score >= 0.8 {
        "very close"
    } else if score >= 0.6 {
        "similar"
    } else {
        "possible"
    }
}

/// Fuzzy-matches an email's extracted company/title against a user's
/// existing applications.
pub struct ApplicationMatcher<'a> {
    db: &'a Database,
}

impl<'a> ApplicationMatcher<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Ranked candidates above the match floor. Full scan over the user's
    /// applications; per-user counts are small enough that indexing would
    /// be overkill.
    pub fn find_matches(
        &self,
        user_id: &str,
        company_name: Option<&str>,
        job_title: Option<&str>,
    ) -> Result<Vec<MatchResult>> {
        let Some(company) = company_name else {
            // No signal to match on.
            return Ok(Vec::new());
        };

        let applications = self.db.list_applications(user_id)?;

        let mut results: Vec<MatchResult> = applications
            .iter()
            .filter_map(|app| {
                let company_sim = fuzzy_match(company, &app.company_name);
                let score = match job_title {
                    Some(title) => {
                        COMPANY_WEIGHT * company_sim
                            + TITLE_WEIGHT * fuzzy_match(title, &app.job_title)
                    }
                    None => company_sim,
                };
                if score > MATCH_FLOOR {
                    Some(MatchResult {
                        application_id: app.id,
                        confidence: score,
                        match_reason: match_reason(score).to_string(),
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    pub fn get_best_match(
        &self,
        user_id: &str,
        company_name: Option<&str>,
        job_title: Option<&str>,
    ) -> Result<Option<MatchResult>> {
        Ok(self
            .find_matches(user_id, company_name, job_title)?
            .into_iter()
            .next())
    }
}

/// Save-time duplicate guard. Each existing application lands in at most one
/// tier; the first matching tier wins.
pub struct DuplicateDetector<'a> {
    db: &'a Database,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn check(
        &self,
        user_id: &str,
        job_title: &str,
        company_name: &str,
        apply_url: Option<&str>,
    ) -> Result<DuplicateCheck> {
        let applications = self.db.list_applications(user_id)?;
        let mut duplicates = Vec::new();

        for app in &applications {
            let tier = if let (Some(url), Some(existing_url)) = (apply_url, app.apply_url.as_deref())
            {
                if url == existing_url {
                    Some((DuplicateMatchType::ExactUrl, 1.0))
                } else {
                    self.non_url_tier(job_title, company_name, app)
                }
            } else {
                self.non_url_tier(job_title, company_name, app)
            };

            if let Some((match_type, similarity)) = tier {
                duplicates.push(DuplicateMatch {
                    application_id: app.id,
                    job_title: app.job_title.clone(),
                    company_name: app.company_name.clone(),
                    match_type,
                    similarity,
                });
            }
        }

        duplicates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(DuplicateCheck {
            has_duplicates: !duplicates.is_empty(),
            count: duplicates.len(),
            duplicates,
        })
    }

    fn non_url_tier(
        &self,
        job_title: &str,
        company_name: &str,
        app: &crate::models::Application,
    ) -> Option<(DuplicateMatchType, f64)> {
        if normalize(job_title) == normalize(&app.job_title)
            && normalize(company_name) == normalize(&app.company_name)
        {
            return Some((DuplicateMatchType::ExactTitleCompany, 1.0));
        }

        let score = DUP_TITLE_WEIGHT * text_similarity(job_title, &app.job_title)
            + DUP_COMPANY_WEIGHT * fuzzy_match(company_name, &app.company_name);
        if score >= DUP_THRESHOLD {
            return Some((DuplicateMatchType::FuzzyMatch, score));
        }

        None
    }
}
