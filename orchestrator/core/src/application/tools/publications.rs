// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Publications tool server: submit, review and read publications.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{parse_args, ToolError, ToolServer};
use crate::application::computer::AgentComputer;
use crate::application::publication_ledger::{PublicationLedger, Submission};
use crate::domain::experiment::{AgentIndex, Experiment};
use crate::domain::llm::ToolDefinition;
use crate::domain::publication::{Grade, ListOrder, Publication, PublicationStatus, Reference, Review};
use crate::domain::sandbox::SANDBOX_HOME;

pub const SERVER_NAME: &str = "publications";

const DEFAULT_LIMIT: usize = 10;

pub struct PublicationsServer {
    experiment: Experiment,
    agent: AgentIndex,
    ledger: Arc<PublicationLedger>,
    computer: Option<Arc<AgentComputer>>,
}

#[derive(Deserialize)]
struct ListPublicationsArgs {
    order: Option<ListOrder>,
    status: Option<PublicationStatus>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
struct ReferenceArgs {
    reference: String,
}

#[derive(Deserialize)]
struct SubmitPublicationArgs {
    title: String,
    content: String,
    #[serde(default)]
    attachments: Vec<String>,
}

#[derive(Deserialize)]
struct SubmitReviewArgs {
    publication: String,
    grade: Grade,
    content: String,
}

impl PublicationsServer {
    pub fn new(
        experiment: Experiment,
        agent: AgentIndex,
        ledger: Arc<PublicationLedger>,
        computer: Option<Arc<AgentComputer>>,
    ) -> Self {
        Self {
            experiment,
            agent,
            ledger,
            computer,
        }
    }

    async fn list_publications(&self, args: ListPublicationsArgs) -> Result<String, ToolError> {
        let order = args.order.unwrap_or_default();
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
        let offset = args.offset.unwrap_or(0);

        let publications = match args.status.unwrap_or(PublicationStatus::Published) {
            PublicationStatus::Published => {
                self.ledger
                    .list_published(self.experiment.id, order, limit, offset)
                    .await?
            }
            status => {
                let mut own: Vec<Publication> = self
                    .ledger
                    .list_by_author(self.experiment.id, self.agent)
                    .await?
                    .into_iter()
                    .filter(|p| p.status == status)
                    .collect();
                if order == ListOrder::Citations {
                    let mut counted = Vec::with_capacity(own.len());
                    for publication in own {
                        let count = self.ledger.citation_count(publication.id).await?;
                        counted.push((count, publication));
                    }
                    // Stable, so equal counts stay newest first
                    counted.sort_by_key(|(count, _)| std::cmp::Reverse(*count));
                    own = counted.into_iter().map(|(_, p)| p).collect();
                }
                own.into_iter().skip(offset).take(limit).collect()
            }
        };
        self.render_list(&publications).await
    }

    async fn get_publication(&self, args: ReferenceArgs) -> Result<String, ToolError> {
        let publication = self.lookup(&args.reference).await?;
        let content = self.ledger.content_of(&publication).await?;
        let reviews = self.ledger.reviews_of(publication.id).await?;

        let reviews_section = if publication.status.is_terminal() {
            reviews
                .iter()
                .map(|r| format!("{}\n{}", review_header(r), r.content.as_deref().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join("\n\n")
        } else {
            "(reviews are hidden until publication/rejection)".to_string()
        };

        Ok(format!(
            "{}\n\n{}\n\n{}",
            self.header(&publication, &reviews).await?,
            content,
            reviews_section
        ))
    }

    async fn submit_publication(&self, args: SubmitPublicationArgs) -> Result<String, ToolError> {
        let fetched = if args.attachments.is_empty() {
            None
        } else {
            let computer = self.computer.as_ref().ok_or_else(|| {
                ToolError::invalid_parameters("Attachments require the computer tool")
            })?;
            let mut names = Vec::with_capacity(args.attachments.len());
            for path in &args.attachments {
                let name = attachment_file_name(path)?;
                if names.contains(&name) {
                    return Err(ToolError::invalid_parameters(format!(
                        "Duplicate attachment name: {}",
                        name
                    )));
                }
                names.push(name);
            }
            Some(computer.fetch(&args.attachments).await?)
        };

        let submission = Submission::from_content(args.title, args.content).with_attachments(
            fetched
                .as_ref()
                .map(|f| f.paths().to_vec())
                .unwrap_or_default(),
        );
        let result = self.ledger.submit(&self.experiment, self.agent, submission).await;
        if let Some(fetched) = fetched {
            fetched.discard().await;
        }
        result?;

        Ok("Publication submitted.".to_string())
    }

    async fn download_attachments(&self, args: ReferenceArgs) -> Result<String, ToolError> {
        let computer = self
            .computer
            .as_ref()
            .ok_or_else(|| ToolError::invalid_parameters("The computer tool is not enabled"))?;
        let publication = self.lookup(&args.reference).await?;
        let attachments = self.ledger.attachments_of(&publication).await;
        if attachments.is_empty() {
            return Err(ToolError::not_found("Attachment files not found"));
        }

        let dir = self
            .ledger
            .content_store()
            .attachments_dir(self.experiment.id, &publication.reference);
        let remote = format!("{}/publications/{}", SANDBOX_HOME, publication.reference);
        for name in &attachments {
            computer.copy_in(&dir.join(name), &remote).await?;
        }
        Ok(format!("Attachment downloaded to {}.", remote))
    }

    async fn submit_review(&self, args: SubmitReviewArgs) -> Result<String, ToolError> {
        let reference = parse_reference(&args.publication)?;
        self.ledger
            .submit_review(self.experiment.id, &reference, self.agent, args.grade, &args.content)
            .await?;
        Ok(format!("Review submitted for publication [{}].", reference))
    }

    async fn lookup(&self, reference: &str) -> Result<Publication, ToolError> {
        let reference = parse_reference(reference)?;
        Ok(self.ledger.find_by_reference(self.experiment.id, &reference).await?)
    }

    async fn header(&self, publication: &Publication, reviews: &[Review]) -> Result<String, ToolError> {
        let grades: Vec<&str> = reviews
            .iter()
            .map(|r| r.grade.map_or("PENDING", |g| g.as_str()))
            .collect();
        let citations = self.ledger.citation_count(publication.id).await?;
        let attachments = self.ledger.attachments_of(publication).await;

        Ok(format!(
            "reference=[{}]\ntitle={}\nauthor=Agent {}\nreviews:{}\nstatus={}\ncitations_count={}\nattachments=[{}]",
            publication.reference,
            publication.title,
            publication.author,
            grades.join(", "),
            publication.status,
            citations,
            attachments.join(",")
        ))
    }

    async fn render_list(&self, publications: &[Publication]) -> Result<String, ToolError> {
        if publications.is_empty() {
            return Ok("(0 found)".to_string());
        }
        let mut rendered = Vec::with_capacity(publications.len());
        for publication in publications {
            let reviews = self.ledger.reviews_of(publication.id).await?;
            rendered.push(self.header(publication, &reviews).await?);
        }
        Ok(rendered.join("\n\n"))
    }
}

#[async_trait]
impl ToolServer for PublicationsServer {
    fn name(&self) -> &'static str {
        SERVER_NAME
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let mut submit_properties = json!({
            "title": {"type": "string", "description": "Title of the publication."},
            "content": {
                "type": "string",
                "description": "Full content of the publication. Use [{ref}] or [{ref},{ref}] inlined in content for citations."
            }
        });
        if self.computer.is_some() {
            submit_properties["attachments"] = json!({
                "type": "array",
                "items": {"type": "string"},
                "description": "Optional paths to files in your computer to attach to the publication."
            });
        }

        let mut tools = vec![
            tool(
                "list_publications",
                "List publications available in the system.",
                json!({
                    "type": "object",
                    "properties": {
                        "order": {
                            "type": "string",
                            "enum": ["latest", "citations"],
                            "description": "Ordering to use:\n`latest` lists the most recent publications.\n`citations` lists the most cited publications.\nDefaults to `latest`."
                        },
                        "status": {
                            "type": "string",
                            "enum": ["PUBLISHED", "SUBMITTED", "REJECTED"],
                            "description": "The status of the publications to list. Defaults to `PUBLISHED`. Other statuses only list your own submissions."
                        },
                        "limit": {"type": "number", "description": "Maximum number of publications to return. Defaults to 10."},
                        "offset": {"type": "number", "description": "Offset for pagination. Defaults to 0."}
                    }
                }),
            ),
            tool(
                "get_publication",
                "Retrieve a specific publication.",
                reference_schema("Reference of the publication."),
            ),
            tool(
                "submit_publication",
                "Submit a new publication for review and publication.",
                json!({
                    "type": "object",
                    "properties": submit_properties,
                    "required": ["title", "content"]
                }),
            ),
        ];

        if self.computer.is_some() {
            tools.push(tool(
                "download_publication_attachments",
                "Download the attachments of a publication to your computer. The attachments will be saved under the folder /home/agent/publications/<reference> in your computer.",
                reference_schema("Reference of the publication."),
            ));
        }

        tools.extend([
            tool(
                "list_review_requests",
                "List pending review requests received by the caller.",
                json!({"type": "object", "properties": {}}),
            ),
            tool(
                "list_submitted_publications",
                "List publications submitted by the caller.",
                json!({"type": "object", "properties": {}}),
            ),
            tool(
                "submit_review",
                "Submit a review for a publication.",
                json!({
                    "type": "object",
                    "properties": {
                        "publication": {"type": "string", "description": "The reference of the publication to review."},
                        "grade": {"type": "string", "enum": ["ACCEPT", "REJECT"], "description": "Grade for the publication."},
                        "content": {"type": "string", "description": "Content of the review."}
                    },
                    "required": ["publication", "grade", "content"]
                }),
            ),
        ]);
        tools
    }

    async fn call(&self, tool: &str, input: &Value) -> Result<String, ToolError> {
        match tool {
            "list_publications" => self.list_publications(parse_args(input)?).await,
            "get_publication" => self.get_publication(parse_args(input)?).await,
            "submit_publication" => self.submit_publication(parse_args(input)?).await,
            "download_publication_attachments" => self.download_attachments(parse_args(input)?).await,
            "list_review_requests" => {
                let publications = self
                    .ledger
                    .list_pending_reviews_for(self.experiment.id, self.agent)
                    .await?;
                self.render_list(&publications).await
            }
            "list_submitted_publications" => {
                let publications = self.ledger.list_by_author(self.experiment.id, self.agent).await?;
                self.render_list(&publications).await
            }
            "submit_review" => self.submit_review(parse_args(input)?).await,
            other => Err(ToolError::invalid_parameters(format!("Unknown tool: {}", other))),
        }
    }
}

pub(crate) fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn reference_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {"reference": {"type": "string", "description": description}},
        "required": ["reference"]
    })
}

fn review_header(review: &Review) -> String {
    format!(
        "reviewer=Agent {}\ngrade={}",
        review.reviewer,
        review.grade.map_or("PENDING", |g| g.as_str())
    )
}

/// Name an attachment is stored under: the last path segment, which must
/// name a file
fn attachment_file_name(path: &str) -> Result<&str, ToolError> {
    match path.rsplit('/').next() {
        Some(name) if !matches!(name, "" | "." | "..") => Ok(name),
        _ => Err(ToolError::invalid_parameters(format!(
            "Invalid attachment path: {}",
            path
        ))),
    }
}

pub(crate) fn parse_reference(s: &str) -> Result<Reference, ToolError> {
    let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
    Reference::parse(trimmed).map_err(ToolError::invalid_parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::advisory::AdvisoryMailbox;
    use crate::domain::error::ErrorKind;
    use crate::domain::sandbox::{ExecOutput, ExecRequest, Sandbox, SandboxError, SandboxId};
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;
    use crate::domain::experiment::Profile;
    use crate::infrastructure::content_store::FsContentStore;
    use crate::infrastructure::repositories::{InMemoryPublicationRepository, InMemoryReviewRepository};

    fn servers(dir: &std::path::Path) -> (PublicationsServer, PublicationsServer) {
        let experiment = Experiment::new("exp", "problem", "default", 2, Profile::Research);
        let mailbox = Arc::new(AdvisoryMailbox::for_agents(&experiment.agent_indices()));
        let ledger = Arc::new(PublicationLedger::new(
            Arc::new(InMemoryPublicationRepository::new()),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(FsContentStore::new(dir)),
            mailbox,
            1,
        ));
        (
            PublicationsServer::new(experiment.clone(), AgentIndex(0), ledger.clone(), None),
            PublicationsServer::new(experiment, AgentIndex(1), ledger, None),
        )
    }

    #[tokio::test]
    async fn test_review_flow_through_tools() {
        let dir = tempfile::tempdir().unwrap();
        let (author, reviewer) = servers(dir.path());

        let out = author
            .call("submit_publication", &json!({"title": "T", "content": "Body"}))
            .await
            .unwrap();
        assert_eq!(out, "Publication submitted.");

        assert_eq!(author.call("list_publications", &json!({})).await.unwrap(), "(0 found)");

        let requests = reviewer.call("list_review_requests", &json!({})).await.unwrap();
        assert!(requests.contains("title=T"));
        assert!(requests.contains("reviews:PENDING"));
        let reference = requests
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("reference=["))
            .and_then(|l| l.strip_suffix(']'))
            .unwrap()
            .to_string();

        let hidden = reviewer
            .call("get_publication", &json!({"reference": reference}))
            .await
            .unwrap();
        assert!(hidden.contains("Body"));
        assert!(hidden.ends_with("(reviews are hidden until publication/rejection)"));

        let out = reviewer
            .call(
                "submit_review",
                &json!({"publication": reference, "grade": "ACCEPT", "content": "Solid"}),
            )
            .await
            .unwrap();
        assert_eq!(out, format!("Review submitted for publication [{}].", reference));

        let listed = author.call("list_publications", &json!({"order": "citations"})).await.unwrap();
        assert!(listed.contains("status=PUBLISHED"));
        assert!(listed.contains("citations_count=0"));

        let shown = author
            .call("get_publication", &json!({"reference": reference}))
            .await
            .unwrap();
        assert!(shown.ends_with("reviewer=Agent 1\ngrade=ACCEPT\nSolid"));
    }

    #[tokio::test]
    async fn test_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let (author, _) = servers(dir.path());

        let err = author
            .call("get_publication", &json!({"reference": "zzzzzz"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error [not_found]: Publication not found");

        let err = author
            .call("get_publication", &json!({"reference": "NOPE"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);

        let err = author
            .call("submit_publication", &json!({"title": "T", "content": "see [abcdef]"}))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error [validation]: Reference not found in publication submission content: abcdef"
        );
    }

    #[test]
    fn test_attachment_tools_need_computer() {
        let dir = tempfile::tempdir().unwrap();
        let (author, _) = servers(dir.path());
        let names: Vec<String> = author.tools().into_iter().map(|t| t.name).collect();
        assert!(!names.contains(&"download_publication_attachments".to_string()));
        assert_eq!(names.len(), 6);
    }

    /// Sandbox serving a fixed set of files
    struct FileSandbox {
        files: HashMap<String, String>,
    }

    #[async_trait]
    impl Sandbox for FileSandbox {
        async fn build_image(&self, profile: Profile) -> Result<String, SandboxError> {
            Ok(profile.image_name())
        }

        async fn create(&self, id: &str, _image: &str) -> Result<SandboxId, SandboxError> {
            Ok(SandboxId::new(id))
        }

        async fn execute(&self, _: &SandboxId, _: ExecRequest) -> Result<ExecOutput, SandboxError> {
            Ok(ExecOutput::default())
        }

        async fn copy_in(&self, _: &SandboxId, _: &Path, _: &str) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn copy_out(&self, _: &SandboxId, remote: &str, local: &Path) -> Result<(), SandboxError> {
            let content = self
                .files
                .get(remote)
                .ok_or_else(|| SandboxError::NotFound(remote.to_string()))?;
            tokio::fs::write(local, content)
                .await
                .map_err(|e| SandboxError::TransferFailed(e.to_string()))
        }

        async fn stop(&self, _: &SandboxId) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn terminate(&self, _: &SandboxId) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    fn server_with_computer(dir: &Path) -> (PublicationsServer, Arc<AdvisoryMailbox>) {
        let experiment = Experiment::new("lab", "problem", "default", 2, Profile::Research);
        let mailbox = Arc::new(AdvisoryMailbox::for_agents(&experiment.agent_indices()));
        let ledger = Arc::new(PublicationLedger::new(
            Arc::new(InMemoryPublicationRepository::new()),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(FsContentStore::new(dir)),
            mailbox.clone(),
            1,
        ));
        let sandbox = Arc::new(FileSandbox {
            files: HashMap::from([("/home/agent/out/data.csv".to_string(), "a,b\n1,2".to_string())]),
        });
        let computer = Arc::new(AgentComputer::new(
            sandbox,
            "lab-agent-0",
            Profile::Research,
            Duration::from_secs(5),
        ));
        (
            PublicationsServer::new(experiment, AgentIndex(0), ledger, Some(computer)),
            mailbox,
        )
    }

    #[tokio::test]
    async fn test_missing_attachment_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (author, mailbox) = server_with_computer(dir.path());

        let err = author
            .call(
                "submit_publication",
                &json!({"title": "T", "content": "Body", "attachments": ["out/data.csv", "missing.txt"]}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(author
            .ledger
            .list_by_author(author.experiment.id, AgentIndex(0))
            .await
            .unwrap()
            .is_empty());
        assert!(mailbox.drain(AgentIndex(1)).is_empty());

        author
            .call(
                "submit_publication",
                &json!({"title": "T", "content": "Body", "attachments": ["out/data.csv"]}),
            )
            .await
            .unwrap();
        let own = author
            .call("list_publications", &json!({"status": "SUBMITTED"}))
            .await
            .unwrap();
        assert!(own.contains("attachments=[data.csv]"));
        assert_eq!(mailbox.drain(AgentIndex(1)).len(), 1);
    }

    #[tokio::test]
    async fn test_attachment_paths_must_name_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let (author, _) = server_with_computer(dir.path());

        for attachments in [
            json!(["out/"]),
            json!(["out/.."]),
            json!(["out/data.csv", "/home/agent/out/data.csv"]),
        ] {
            let err = author
                .call(
                    "submit_publication",
                    &json!({"title": "T", "content": "Body", "attachments": attachments}),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidParameters);
        }
        assert!(author
            .ledger
            .list_by_author(author.experiment.id, AgentIndex(0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_own_submissions_follow_requested_order() {
        let dir = tempfile::tempdir().unwrap();
        let (author, reviewer) = servers(dir.path());

        let submit = |title: &str, content: String| {
            json!({"title": title, "content": content})
        };
        author.call("submit_publication", &submit("Older", "a".into())).await.unwrap();
        author.call("submit_publication", &submit("Newer", "b".into())).await.unwrap();

        let older = author
            .ledger
            .list_by_author(author.experiment.id, AgentIndex(0))
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.title == "Older")
            .unwrap();
        author
            .call("submit_publication", &submit("Follow-up", format!("Extends [{}].", older.reference)))
            .await
            .unwrap();
        let follow_up = author
            .ledger
            .list_by_author(author.experiment.id, AgentIndex(0))
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.title == "Follow-up")
            .unwrap();
        reviewer
            .call(
                "submit_review",
                &json!({"publication": follow_up.reference.as_str(), "grade": "ACCEPT", "content": "ok"}),
            )
            .await
            .unwrap();

        let titles = |listing: String| -> Vec<String> {
            listing
                .lines()
                .filter_map(|l| l.strip_prefix("title=").map(str::to_string))
                .collect()
        };
        let latest = author
            .call("list_publications", &json!({"status": "SUBMITTED"}))
            .await
            .unwrap();
        assert_eq!(titles(latest), vec!["Newer", "Older"]);
        let cited = author
            .call("list_publications", &json!({"status": "SUBMITTED", "order": "citations"}))
            .await
            .unwrap();
        assert_eq!(titles(cited), vec!["Older", "Newer"]);
    }
}
