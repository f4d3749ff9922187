// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Publication Ledger
//!
//! Submission, peer review and publish/reject state machine for
//! publications, plus the citation graph built at publish time.
//!
//! ## Flow
//!
//! 1. `submit` checks the author has no pending reviews, resolves every cited
//!    reference, samples reviewers, stores the content and attachments under a
//!    fresh reference token, creates the publication and its review set, and
//!    notifies each reviewer. A failure before the review set exists removes
//!    whatever was stored, so no `SUBMITTED` publication is left without
//!    reviews. With no reviewers it finalizes immediately.
//! 2. `submit_review` grades a pending review, notifies the author and calls
//!    `maybe_publish_or_reject`.
//! 3. `maybe_publish_or_reject` is a no-op while any review is pending.
//!    Otherwise it finalizes through `PublicationRepository::finalize`, which
//!    transitions the status and inserts citations only if the publication is
//!    still `SUBMITTED`; the single winning caller notifies the author.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Publication lifecycle orchestration over the record and
//!   content stores

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::advisory::AdvisoryMailbox;
use crate::application::reviewer_assignment::assign_reviewers;
use crate::domain::advisory::AdvisoryMessage;
use crate::domain::content::{ContentError, ContentStore};
use crate::domain::error::LedgerError;
use crate::domain::experiment::{AgentIndex, Experiment, ExperimentId};
use crate::domain::publication::{
    extract_references, verdict, Citation, Grade, ListOrder, Publication, PublicationId,
    PublicationStatus, Reference, Review,
};
use crate::domain::repository::{PublicationRepository, RepositoryError, ReviewRepository};

/// A new publication as submitted by an agent.
#[derive(Debug, Clone)]
pub struct Submission {
    pub title: String,
    pub content: String,
    pub cited_references: Vec<Reference>,
    /// Host files stored as attachments before reviewers are requested
    pub attachments: Vec<PathBuf>,
}

impl Submission {
    /// Builds a submission whose citations are the references found in `content`.
    pub fn from_content(title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let cited_references = extract_references(&content);
        Self {
            title: title.into(),
            content,
            cited_references,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(self, attachments: Vec<PathBuf>) -> Self {
        Self {
            attachments,
            ..self
        }
    }
}

pub struct PublicationLedger {
    publications: Arc<dyn PublicationRepository>,
    reviews: Arc<dyn ReviewRepository>,
    content: Arc<dyn ContentStore>,
    mailbox: Arc<AdvisoryMailbox>,
    reviewers: usize,
    rng: Mutex<StdRng>,
}

impl PublicationLedger {
    pub fn new(
        publications: Arc<dyn PublicationRepository>,
        reviews: Arc<dyn ReviewRepository>,
        content: Arc<dyn ContentStore>,
        mailbox: Arc<AdvisoryMailbox>,
        reviewers: usize,
    ) -> Self {
        Self {
            publications,
            reviews,
            content,
            mailbox,
            reviewers,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the random source used for reviewer sampling and reference
    /// tokens.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn reviewers(&self) -> usize {
        self.reviewers
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub async fn submit(
        &self,
        experiment: &Experiment,
        author: AgentIndex,
        submission: Submission,
    ) -> Result<Publication, LedgerError> {
        if !experiment.has_agent(author) {
            return Err(LedgerError::InvalidParameters(format!(
                "Invalid agent index: {}. Must be between 0 and {}",
                author,
                experiment.agent_count.saturating_sub(1)
            )));
        }
        if submission.title.trim().is_empty() {
            return Err(LedgerError::InvalidParameters(
                "Publication title cannot be empty".to_string(),
            ));
        }

        let pending = self
            .reviews
            .find_pending_by_reviewer(experiment.id, author)
            .await
            .map_err(|e| LedgerError::update("Failed to load pending reviews", e))?;
        if !pending.is_empty() {
            return Err(LedgerError::Validation(
                "You have pending reviews. Please complete them before submitting a new publication."
                    .to_string(),
            ));
        }

        let cited = self
            .publications
            .find_by_references(experiment.id, &submission.cited_references)
            .await
            .map_err(|e| LedgerError::update("Failed to resolve references", e))?;
        let missing: Vec<&str> = submission
            .cited_references
            .iter()
            .filter(|r| !cited.iter().any(|p| &p.reference == *r))
            .map(Reference::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(LedgerError::Validation(format!(
                "Reference not found in publication submission content: {}",
                missing.join(",")
            )));
        }

        let (reviewers, reference) = {
            let mut rng = self.rng.lock();
            let reviewers = assign_reviewers(
                &experiment.agent_indices(),
                author,
                self.reviewers,
                &mut *rng,
            )
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
            (reviewers, Reference::generate(&mut *rng))
        };

        let taken = self
            .publications
            .find_by_reference(experiment.id, &reference)
            .await
            .map_err(|e| LedgerError::update("Failed to check reference", e))?;
        if taken.is_some() {
            return Err(reference_collision(&reference));
        }

        self.content
            .write(experiment.id, &reference, &submission.content)
            .await
            .map_err(|e| match e {
                ContentError::AlreadyExists(_) => reference_collision(&reference),
                other => LedgerError::ResourceCreation(format!(
                    "Failed to store publication content: {}",
                    other
                )),
            })?;

        if let Err(e) = self
            .content
            .attach(experiment.id, &reference, &submission.attachments)
            .await
        {
            self.discard_content(experiment.id, &reference).await;
            return Err(match e {
                ContentError::InvalidName(_) => LedgerError::InvalidParameters(e.to_string()),
                other => LedgerError::ResourceCreation(format!(
                    "Failed to store attachments: {}",
                    other
                )),
            });
        }

        let publication = Publication::new(
            experiment.id,
            author,
            submission.title.trim(),
            reference.clone(),
            submission.cited_references,
        );
        if let Err(e) = self.publications.insert(&publication).await {
            self.discard_content(experiment.id, &reference).await;
            return Err(match e {
                RepositoryError::Conflict(_) => reference_collision(&reference),
                other => LedgerError::creation("Failed to create publication", other),
            });
        }

        let requests: Vec<Review> = reviewers
            .iter()
            .map(|r| Review::request(&publication, *r))
            .collect();
        if let Err(e) = self.reviews.create_requests(publication.id, &requests).await {
            self.discard(&publication).await;
            return Err(match e {
                RepositoryError::Conflict(msg) => LedgerError::Validation(format!(
                    "Reviews already exist for this publication: {}",
                    msg
                )),
                other => LedgerError::creation("Failed to request reviews", other),
            });
        }

        for reviewer in &reviewers {
            self.mailbox.push(
                *reviewer,
                AdvisoryMessage::ReviewRequested {
                    reference: publication.reference.clone(),
                    title: publication.title.clone(),
                },
            );
        }

        info!(
            experiment = %experiment.name,
            author = author.0,
            reference = %publication.reference,
            reviewers = reviewers.len(),
            "Publication submitted"
        );

        if reviewers.is_empty() {
            self.maybe_publish_or_reject(publication.id).await?;
        }

        self.get(publication.id).await
    }

    pub async fn submit_review(
        &self,
        experiment: ExperimentId,
        reference: &Reference,
        reviewer: AgentIndex,
        grade: Grade,
        content: &str,
    ) -> Result<Review, LedgerError> {
        let publication = self.find_by_reference(experiment, reference).await?;

        let review = self
            .reviews
            .submit(publication.id, reviewer, grade, content)
            .await
            .map_err(|e| LedgerError::update("Failed to submit review", e))?
            .ok_or_else(|| {
                LedgerError::NotFound(
                    "Review submitted does not match any review request.".to_string(),
                )
            })?;

        self.mailbox.push(
            publication.author,
            AdvisoryMessage::ReviewReceived {
                reference: publication.reference.clone(),
                title: publication.title.clone(),
                reviewer,
                grade,
            },
        );

        debug!(
            reference = %publication.reference,
            reviewer = reviewer.0,
            grade = %grade,
            "Review submitted"
        );

        self.maybe_publish_or_reject(publication.id).await?;
        Ok(review)
    }

    /// Resolve a publication once every review is graded. Idempotent: returns
    /// the current status when reviews are pending or the publication is
    /// already resolved.
    pub async fn maybe_publish_or_reject(&self, id: PublicationId) -> Result<PublicationStatus, LedgerError> {
        let publication = self.get(id).await?;
        if publication.status.is_terminal() {
            return Ok(publication.status);
        }

        let reviews = self
            .reviews
            .find_by_publication(id)
            .await
            .map_err(|e| LedgerError::update("Failed to load reviews", e))?;
        let status = verdict(&reviews);
        if status == PublicationStatus::Submitted {
            return Ok(status);
        }

        let citations: Vec<Citation> = if status == PublicationStatus::Published {
            self.publications
                .find_by_references(publication.experiment_id, &publication.cited_references)
                .await
                .map_err(|e| LedgerError::update("Failed to resolve citations", e))?
                .into_iter()
                .map(|target| Citation {
                    experiment_id: publication.experiment_id,
                    from: publication.id,
                    to: target.id,
                })
                .collect()
        } else {
            Vec::new()
        };

        let applied = self
            .publications
            .finalize(id, status, &citations)
            .await
            .map_err(|e| LedgerError::update("Failed to finalize publication", e))?;

        if !applied {
            debug!(reference = %publication.reference, "Publication already finalized");
            return Ok(self.get(id).await?.status);
        }

        metrics::counter!("agora_publications_finalized_total", "status" => status.as_str())
            .increment(1);
        info!(
            reference = %publication.reference,
            status = %status,
            citations = citations.len(),
            "Publication finalized"
        );

        self.mailbox.push(
            publication.author,
            AdvisoryMessage::PublicationStatusUpdated {
                reference: publication.reference.clone(),
                title: publication.title.clone(),
                status,
            },
        );

        Ok(status)
    }

    pub async fn list_published(
        &self,
        experiment: ExperimentId,
        order: ListOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Publication>, LedgerError> {
        self.publications
            .list_by_status(experiment, PublicationStatus::Published, order, limit, offset)
            .await
            .map_err(|e| LedgerError::update("Failed to list publications", e))
    }

    /// Publications `agent` still has to review, most recent first
    pub async fn list_pending_reviews_for(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Vec<Publication>, LedgerError> {
        let pending = self
            .reviews
            .find_pending_by_reviewer(experiment, agent)
            .await
            .map_err(|e| LedgerError::update("Failed to load pending reviews", e))?;
        let ids: Vec<PublicationId> = pending.iter().map(|r| r.publication_id).collect();
        let mut publications = self
            .publications
            .find_by_ids(&ids)
            .await
            .map_err(|e| LedgerError::update("Failed to load publications", e))?;
        publications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(publications)
    }

    pub async fn list_by_author(
        &self,
        experiment: ExperimentId,
        author: AgentIndex,
    ) -> Result<Vec<Publication>, LedgerError> {
        self.publications
            .list_by_author(experiment, author)
            .await
            .map_err(|e| LedgerError::update("Failed to list publications", e))
    }

    pub async fn get(&self, id: PublicationId) -> Result<Publication, LedgerError> {
        self.publications
            .find_by_id(id)
            .await
            .map_err(|e| LedgerError::update("Failed to load publication", e))?
            .ok_or_else(|| LedgerError::NotFound("Publication not found".to_string()))
    }

    pub async fn find_by_reference(
        &self,
        experiment: ExperimentId,
        reference: &Reference,
    ) -> Result<Publication, LedgerError> {
        self.publications
            .find_by_reference(experiment, reference)
            .await
            .map_err(|e| LedgerError::update("Failed to load publication", e))?
            .ok_or_else(|| LedgerError::NotFound("Publication not found".to_string()))
    }

    pub async fn reviews_of(&self, id: PublicationId) -> Result<Vec<Review>, LedgerError> {
        self.reviews
            .find_by_publication(id)
            .await
            .map_err(|e| LedgerError::update("Failed to load reviews", e))
    }

    pub async fn citation_count(&self, id: PublicationId) -> Result<u64, LedgerError> {
        self.publications
            .citation_count(id)
            .await
            .map_err(|e| LedgerError::update("Failed to count citations", e))
    }

    pub async fn citations_from(&self, id: PublicationId) -> Result<Vec<Citation>, LedgerError> {
        self.publications
            .citations_from(id)
            .await
            .map_err(|e| LedgerError::update("Failed to load citations", e))
    }

    pub async fn content_of(&self, publication: &Publication) -> Result<String, LedgerError> {
        self.content
            .read(publication.experiment_id, &publication.reference)
            .await
            .map_err(|e| match e {
                ContentError::NotFound(_) => {
                    LedgerError::NotFound("Publication content not found".to_string())
                }
                other => LedgerError::ResourceUpdate(format!(
                    "Failed to read publication content: {}",
                    other
                )),
            })
    }

    pub async fn attachments_of(&self, publication: &Publication) -> Vec<String> {
        match self
            .content
            .list_attachments(publication.experiment_id, &publication.reference)
            .await
        {
            Ok(names) => names,
            Err(e) => {
                warn!(reference = %publication.reference, "Failed to list attachments: {}", e);
                Vec::new()
            }
        }
    }
}

impl PublicationLedger {
    /// Undo a submission whose review set could not be created
    async fn discard(&self, publication: &Publication) {
        if let Err(e) = self.publications.delete(publication.id).await {
            warn!(reference = %publication.reference, "Failed to remove unreviewed publication: {}", e);
        }
        self.discard_content(publication.experiment_id, &publication.reference)
            .await;
    }

    async fn discard_content(&self, experiment: ExperimentId, reference: &Reference) {
        if let Err(e) = self.content.delete(experiment, reference).await {
            warn!(reference = %reference, "Failed to remove publication content: {}", e);
        }
    }
}

fn reference_collision(reference: &Reference) -> LedgerError {
    warn!(reference = %reference, "Reference token collision");
    LedgerError::Validation(format!(
        "Reference collision on {}; please resubmit",
        reference
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use crate::domain::experiment::Profile;
    use crate::infrastructure::content_store::FsContentStore;
    use crate::infrastructure::repositories::{InMemoryPublicationRepository, InMemoryReviewRepository};

    struct Fixture {
        ledger: PublicationLedger,
        mailbox: Arc<AdvisoryMailbox>,
        experiment: Experiment,
        _dir: tempfile::TempDir,
    }

    fn fixture(agent_count: u32, reviewers: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let experiment = Experiment::new("exp", "problem", "default", agent_count, Profile::Research);
        let mailbox = Arc::new(AdvisoryMailbox::for_agents(&experiment.agent_indices()));
        let ledger = PublicationLedger::new(
            Arc::new(InMemoryPublicationRepository::new()),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(FsContentStore::new(dir.path())),
            mailbox.clone(),
            reviewers,
        )
        .with_seed(3);
        Fixture {
            ledger,
            mailbox,
            experiment,
            _dir: dir,
        }
    }

    async fn reviewer_of(f: &Fixture, publication: &Publication) -> AgentIndex {
        f.ledger.reviews_of(publication.id).await.unwrap()[0].reviewer
    }

    #[tokio::test]
    async fn test_accept_publishes_and_notifies() {
        let f = fixture(3, 1);
        let p = f
            .ledger
            .submit(&f.experiment, AgentIndex(0), Submission::from_content("P", "body"))
            .await
            .unwrap();
        assert_eq!(p.status, PublicationStatus::Submitted);

        let reviewer = reviewer_of(&f, &p).await;
        assert_ne!(reviewer, AgentIndex(0));
        assert_eq!(f.mailbox.drain(reviewer).len(), 1);

        f.ledger
            .submit_review(f.experiment.id, &p.reference, reviewer, Grade::Accept, "good")
            .await
            .unwrap();
        assert_eq!(f.ledger.get(p.id).await.unwrap().status, PublicationStatus::Published);

        let author_msgs = f.mailbox.drain(AgentIndex(0));
        assert_eq!(author_msgs.len(), 2);
        assert!(matches!(author_msgs[0], AdvisoryMessage::ReviewReceived { .. }));
        assert!(matches!(
            author_msgs[1],
            AdvisoryMessage::PublicationStatusUpdated { status: PublicationStatus::Published, .. }
        ));
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let f = fixture(3, 1);
        let p = f
            .ledger
            .submit(&f.experiment, AgentIndex(0), Submission::from_content("P", "body"))
            .await
            .unwrap();
        let reviewer = reviewer_of(&f, &p).await;
        f.ledger
            .submit_review(f.experiment.id, &p.reference, reviewer, Grade::Reject, "no")
            .await
            .unwrap();
        f.mailbox.drain(AgentIndex(0));

        let again = f.ledger.maybe_publish_or_reject(p.id).await.unwrap();
        assert_eq!(again, PublicationStatus::Rejected);
        assert!(f.mailbox.drain(AgentIndex(0)).is_empty());
    }

    #[tokio::test]
    async fn test_second_review_from_same_reviewer_fails() {
        let f = fixture(3, 1);
        let p = f
            .ledger
            .submit(&f.experiment, AgentIndex(0), Submission::from_content("P", "body"))
            .await
            .unwrap();
        let reviewer = reviewer_of(&f, &p).await;
        f.ledger
            .submit_review(f.experiment.id, &p.reference, reviewer, Grade::Accept, "ok")
            .await
            .unwrap();
        let err = f
            .ledger
            .submit_review(f.experiment.id, &p.reference, reviewer, Grade::Reject, "changed")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.ledger.get(p.id).await.unwrap().status, PublicationStatus::Published);
    }

    #[tokio::test]
    async fn test_zero_reviewers_publishes_immediately() {
        let f = fixture(1, 0);
        let p = f
            .ledger
            .submit(&f.experiment, AgentIndex(0), Submission::from_content("Solo", "body"))
            .await
            .unwrap();
        assert_eq!(p.status, PublicationStatus::Published);
    }

    #[tokio::test]
    async fn test_insufficient_reviewer_pool() {
        let f = fixture(2, 2);
        let err = f
            .ledger
            .submit(&f.experiment, AgentIndex(0), Submission::from_content("P", "body"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.ledger.list_by_author(f.experiment.id, AgentIndex(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_author() {
        let f = fixture(2, 1);
        let err = f
            .ledger
            .submit(&f.experiment, AgentIndex(5), Submission::from_content("P", "body"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }
}
