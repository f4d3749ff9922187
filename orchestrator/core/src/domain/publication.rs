// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Publication Aggregate
//!
//! Publications are the unit of work agents exchange. Each one is gated by
//! peer review before it becomes visible to other agents:
//!
//! ```text
//!              all grades ACCEPT
//! SUBMITTED ─────────────────────▶ PUBLISHED
//!     │
//!     │      any grade REJECT
//!     └──────────────────────────▶ REJECTED
//! ```
//!
//! Both resolved states are terminal. The review set attached to a publication
//! is fixed at submission time and citations to earlier publications are only
//! materialised once the citing publication reaches `PUBLISHED`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Publication, review and citation types plus the verdict rule

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::domain::experiment::{AgentIndex, ExperimentId};

/// Length of a publication reference token.
pub const REFERENCE_LEN: usize = 6;

const REFERENCE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Citation syntax inside publication content: `[abc123]` or `[abc123, def456]`.
static CITATION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[([a-z0-9]{6}(?:\s*,\s*[a-z0-9]{6})*)\]").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicationId(pub Uuid);

impl PublicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PublicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PublicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewId(pub Uuid);

impl ReviewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

/// Short opaque token locating a publication's content and used in citations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference(String);

impl Reference {
    /// Draws a fresh random token. Uniqueness is checked by the caller.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token = (0..REFERENCE_LEN)
            .map(|_| REFERENCE_ALPHABET[rng.random_range(0..REFERENCE_ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.len() == REFERENCE_LEN
            && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            Ok(Self(s.to_string()))
        } else {
            Err(format!(
                "Invalid reference '{}': expected {} lowercase alphanumeric characters",
                s, REFERENCE_LEN
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Reference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Reference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Reference> for String {
    fn from(value: Reference) -> Self {
        value.0
    }
}

/// Extracts cited reference tokens from free text, in order of appearance and
/// without duplicates. Bracketed text that does not match the token pattern
/// is ignored.
pub fn extract_references(content: &str) -> Vec<Reference> {
    let mut found: Vec<Reference> = Vec::new();
    // Literal pattern, always compiles
    let Some(pattern) = CITATION_PATTERN.as_ref() else {
        return found;
    };
    for captures in pattern.captures_iter(content) {
        let Some(group) = captures.get(1) else {
            continue;
        };
        for token in group.as_str().split(',') {
            if let Ok(reference) = Reference::parse(token) {
                if !found.contains(&reference) {
                    found.push(reference);
                }
            }
        }
    }
    found
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
    Submitted,
    Published,
    Rejected,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Submitted => "SUBMITTED",
            PublicationStatus::Published => "PUBLISHED",
            PublicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PublicationStatus::Submitted)
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(PublicationStatus::Submitted),
            "PUBLISHED" => Ok(PublicationStatus::Published),
            "REJECTED" => Ok(PublicationStatus::Rejected),
            other => Err(format!("Unknown publication status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Accept,
    Reject,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Accept => "ACCEPT",
            Grade::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPT" => Ok(Grade::Accept),
            "REJECT" => Ok(Grade::Reject),
            other => Err(format!("Unknown grade '{}'. Expected ACCEPT or REJECT", other)),
        }
    }
}

/// Ordering for published listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    /// Most recent first
    #[default]
    Latest,
    /// Most cited first
    Citations,
}

impl FromStr for ListOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(ListOrder::Latest),
            "citations" => Ok(ListOrder::Citations),
            other => Err(format!("Unknown order '{}'. Expected latest or citations", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Publication {
    pub id: PublicationId,
    pub experiment_id: ExperimentId,
    pub author: AgentIndex,
    pub title: String,
    pub reference: Reference,
    pub status: PublicationStatus,
    /// References found in the content at submission, turned into citations on publish
    pub cited_references: Vec<Reference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(
        experiment_id: ExperimentId,
        author: AgentIndex,
        title: impl Into<String>,
        reference: Reference,
        cited_references: Vec<Reference>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PublicationId::new(),
            experiment_id,
            author,
            title: title.into(),
            reference,
            status: PublicationStatus::Submitted,
            cited_references,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub experiment_id: ExperimentId,
    pub publication_id: PublicationId,
    pub reviewer: AgentIndex,
    /// `None` while the review is pending
    pub grade: Option<Grade>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// A pending review request for `reviewer`.
    pub fn request(publication: &Publication, reviewer: AgentIndex) -> Self {
        let now = Utc::now();
        Self {
            id: ReviewId::new(),
            experiment_id: publication.experiment_id,
            publication_id: publication.id,
            reviewer,
            grade: None,
            content: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.grade.is_none()
    }
}

/// Directed edge `from` cites `to`, created when `from` is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub experiment_id: ExperimentId,
    pub from: PublicationId,
    pub to: PublicationId,
}

/// Status a publication must hold given its review set: `Submitted` while any
/// review is pending, then `Rejected` if any review graded REJECT, otherwise
/// `Published`. An empty review set publishes.
pub fn verdict(reviews: &[Review]) -> PublicationStatus {
    if reviews.iter().any(Review::is_pending) {
        PublicationStatus::Submitted
    } else if reviews.iter().any(|r| r.grade == Some(Grade::Reject)) {
        PublicationStatus::Rejected
    } else {
        PublicationStatus::Published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn review_with(grade: Option<Grade>) -> Review {
        let publication = Publication::new(
            ExperimentId::new(),
            AgentIndex(0),
            "t",
            Reference::parse("abc123").unwrap(),
            vec![],
        );
        let mut review = Review::request(&publication, AgentIndex(1));
        review.grade = grade;
        review
    }

    #[test]
    fn test_extract_references() {
        let content = "As shown in [abc123] and [def456, ghi789], see also [ABC123] and [abc12].";
        let refs: Vec<String> = extract_references(content)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(refs, vec!["abc123", "def456", "ghi789"]);
    }

    #[test]
    fn test_extract_references_deduplicates() {
        let refs = extract_references("[abc123] then again [abc123,  xyz999]");
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_generated_reference_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let reference = Reference::generate(&mut rng);
            assert!(Reference::parse(reference.as_str()).is_ok());
        }
    }

    #[test]
    fn test_reference_parse_rejects_malformed() {
        assert!(Reference::parse("ABC123").is_err());
        assert!(Reference::parse("abc12").is_err());
        assert!(Reference::parse("abc-12").is_err());
        assert!(Reference::parse(" abc123 ").is_ok());
    }

    #[test]
    fn test_verdict() {
        assert_eq!(verdict(&[]), PublicationStatus::Published);
        assert_eq!(
            verdict(&[review_with(Some(Grade::Accept)), review_with(None)]),
            PublicationStatus::Submitted
        );
        assert_eq!(
            verdict(&[review_with(None), review_with(Some(Grade::Reject))]),
            PublicationStatus::Submitted
        );
        assert_eq!(
            verdict(&[review_with(Some(Grade::Accept)), review_with(Some(Grade::Reject))]),
            PublicationStatus::Rejected
        );
        assert_eq!(
            verdict(&[review_with(Some(Grade::Accept)), review_with(Some(Grade::Accept))]),
            PublicationStatus::Published
        );
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            PublicationStatus::Submitted,
            PublicationStatus::Published,
            PublicationStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<PublicationStatus>(), Ok(status));
        }
        assert!(!PublicationStatus::Submitted.is_terminal());
        assert!(PublicationStatus::Rejected.is_terminal());
    }
}
