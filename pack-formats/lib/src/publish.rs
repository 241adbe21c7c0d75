//! Publishing the mapping file as a GitHub pull request.
//!
//! Every step is idempotent so a re-run converges on the same state: the PR
//! branch is force-reset to the base, the file is upserted with one commit,
//! an existing open PR for the branch is reused, and auto-merge is enabled
//! when requested.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::PublishError;
use crate::resolver::BoxFuture;

/// Default REST API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const AUTO_MERGE_MUTATION: &str = "mutation ($pr: ID!) { enablePullRequestAutoMerge(input: {pullRequestId: $pr, mergeMethod: SQUASH}) { clientMutationId } }";

/// Everything needed to publish one update.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Local path of the flushed mapping file.
    pub mapping_path: PathBuf,
    /// Path of the file inside the repository.
    pub repo_path: String,
    /// Branch the pull request is opened from.
    pub branch: String,
    /// Branch the pull request targets.
    pub base: String,
    /// Rendered commit message, also used as PR title.
    pub commit_message: String,
    /// Versions added by this run, in catalog order.
    pub versions: Vec<String>,
    pub auto_merge: bool,
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub pr_number: u64,
    /// `false` when an open pull request was reused.
    pub created: bool,
    pub auto_merge: bool,
}

/// Downstream collaborator that receives a flushed mapping.
pub trait Publisher: Send + Sync {
    fn publish<'a>(
        &'a self,
        request: &'a PublishRequest,
    ) -> BoxFuture<'a, Result<PublishOutcome, PublishError>>;
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// [`Publisher`] backed by the GitHub REST and GraphQL APIs.
#[derive(Debug, Clone)]
pub struct GitHubPublisher {
    client: Client,
    api_url: String,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubPublisher {
    /// Creates a publisher for `repository` (`owner/repo`).
    ///
    /// ## Errors
    ///
    /// Returns [`PublishError::InvalidRepository`] if `repository` is not in
    /// `owner/repo` form.
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
        repository: &str,
    ) -> Result<Self, PublishError> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| PublishError::InvalidRepository(repository.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn repo_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/repos/{}/{}/{path}", self.api_url, self.owner, self.repo);
        debug!("{method} {url}");
        self.authorized(self.client.request(method, url))
    }

    /// GraphQL lives beside the REST root (`/api/v3` -> `/api/graphql` on Enterprise).
    fn graphql_url(&self) -> String {
        match self.api_url.strip_suffix("/v3") {
            Some(root) => format!("{root}/graphql"),
            None => format!("{}/graphql", self.api_url),
        }
    }

    async fn check(action: &'static str, response: Response) -> Result<Response, PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Status {
            action,
            status: status.as_u16(),
            body,
        })
    }

    async fn base_sha(&self, base: &str) -> Result<String, PublishError> {
        let response = self
            .repo_request(Method::GET, &format!("git/ref/heads/{base}"))
            .send()
            .await?;
        let git_ref: GitRef = Self::check("resolve base ref", response).await?.json().await?;
        Ok(git_ref.object.sha)
    }

    async fn reset_branch(&self, branch: &str, sha: &str) -> Result<(), PublishError> {
        let existing = self
            .repo_request(Method::GET, &format!("git/ref/heads/{branch}"))
            .send()
            .await?;

        if existing.status() == StatusCode::NOT_FOUND {
            let response = self
                .repo_request(Method::POST, "git/refs")
                .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }))
                .send()
                .await?;
            Self::check("create branch", response).await?;
            debug!("Created branch {branch} at {sha}");
            return Ok(());
        }

        Self::check("read branch", existing).await?;
        let response = self
            .repo_request(Method::PATCH, &format!("git/refs/heads/{branch}"))
            .json(&json!({ "sha": sha, "force": true }))
            .send()
            .await?;
        Self::check("reset branch", response).await?;
        debug!("Reset branch {branch} to {sha}");
        Ok(())
    }

    async fn file_sha(&self, path: &str, branch: &str) -> Result<Option<String>, PublishError> {
        let response = self
            .repo_request(Method::GET, &format!("contents/{path}"))
            .query(&[("ref", branch)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let content: FileContent = Self::check("read file", response).await?.json().await?;
        Ok(Some(content.sha))
    }

    async fn put_file(&self, request: &PublishRequest, content: &[u8]) -> Result<(), PublishError> {
        let sha = self.file_sha(&request.repo_path, &request.branch).await?;

        let mut body = json!({
            "message": request.commit_message,
            "content": STANDARD.encode(content),
            "branch": request.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let response = self
            .repo_request(Method::PUT, &format!("contents/{}", request.repo_path))
            .json(&body)
            .send()
            .await?;
        Self::check("commit file", response).await?;
        Ok(())
    }

    async fn find_or_create_pr(
        &self,
        request: &PublishRequest,
    ) -> Result<(PullRequest, bool), PublishError> {
        let head = format!("{}:{}", self.owner, request.branch);
        let response = self
            .repo_request(Method::GET, "pulls")
            .query(&[
                ("head", head.as_str()),
                ("base", request.base.as_str()),
                ("state", "open"),
            ])
            .send()
            .await?;
        let open: Vec<PullRequest> = Self::check("list pull requests", response)
            .await?
            .json()
            .await?;
        if let Some(existing) = open.into_iter().next() {
            return Ok((existing, false));
        }

        let body = format!(
            "Automated update of **{}**.\n\nVersions added: {}.",
            request.repo_path,
            request.versions.join(", ")
        );
        let response = self
            .repo_request(Method::POST, "pulls")
            .json(&json!({
                "title": request.commit_message,
                "head": request.branch,
                "base": request.base,
                "body": body,
            }))
            .send()
            .await?;
        let created: PullRequest = Self::check("create pull request", response)
            .await?
            .json()
            .await?;
        Ok((created, true))
    }

    async fn enable_auto_merge(&self, node_id: &str) -> Result<(), PublishError> {
        let response = self
            .authorized(self.client.post(self.graphql_url()))
            .json(&json!({ "query": AUTO_MERGE_MUTATION, "variables": { "pr": node_id } }))
            .send()
            .await?;
        let result: GraphQlResponse = Self::check("enable auto-merge", response)
            .await?
            .json()
            .await?;
        if !result.errors.is_empty() {
            let messages: Vec<_> = result.errors.into_iter().map(|e| e.message).collect();
            return Err(PublishError::GraphQl(messages.join("; ")));
        }
        Ok(())
    }

    async fn publish_update(&self, request: &PublishRequest) -> Result<PublishOutcome, PublishError> {
        let content =
            std::fs::read(&request.mapping_path).map_err(|source| PublishError::Read {
                path: request.mapping_path.clone(),
                source,
            })?;

        let sha = self.base_sha(&request.base).await?;
        self.reset_branch(&request.branch, &sha).await?;
        self.put_file(request, &content).await?;

        let (pr, created) = self.find_or_create_pr(request).await?;
        if request.auto_merge {
            self.enable_auto_merge(&pr.node_id).await?;
        }

        info!("Pushed commit and PR #{}", pr.number);
        Ok(PublishOutcome {
            pr_number: pr.number,
            created,
            auto_merge: request.auto_merge,
        })
    }
}

impl Publisher for GitHubPublisher {
    fn publish<'a>(
        &'a self,
        request: &'a PublishRequest,
    ) -> BoxFuture<'a, Result<PublishOutcome, PublishError>> {
        Box::pin(self.publish_update(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(dir: &TempDir, auto_merge: bool) -> PublishRequest {
        let mapping_path = dir.path().join("formats.json");
        std::fs::write(&mapping_path, r#"{"1.21":{"datapack":48,"resourcepack":34}}"#).unwrap();
        PublishRequest {
            mapping_path,
            repo_path: "formats.json".to_string(),
            branch: "pack-formats/update".to_string(),
            base: "main".to_string(),
            commit_message: "chore: update pack formats for 1.21".to_string(),
            versions: vec!["1.21".to_string()],
            auto_merge,
        }
    }

    fn publisher(server: &MockServer) -> GitHubPublisher {
        GitHubPublisher::new(Client::new(), server.uri(), "t0ken", "octo/formats").unwrap()
    }

    async fn mount_base_ref(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/git/ref/heads/main"))
            .and(header("Authorization", "Bearer t0ken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": "base123" } })),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn rejects_malformed_repository() {
        for bad in ["", "octo", "/formats", "octo/", "a/b/c"] {
            assert!(matches!(
                GitHubPublisher::new(Client::new(), GITHUB_API_URL, "t", bad),
                Err(PublishError::InvalidRepository(_))
            ));
        }
    }

    #[test]
    fn graphql_url_follows_api_root() {
        let public = GitHubPublisher::new(Client::new(), GITHUB_API_URL, "t", "a/b").unwrap();
        assert_eq!(public.graphql_url(), "https://api.github.com/graphql");

        let enterprise =
            GitHubPublisher::new(Client::new(), "https://ghe.example/api/v3/", "t", "a/b").unwrap();
        assert_eq!(enterprise.graphql_url(), "https://ghe.example/api/graphql");
    }

    #[tokio::test]
    async fn first_publish_creates_branch_file_and_pr() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_base_ref(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/git/ref/heads/pack-formats/update"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/formats/git/refs"))
            .and(body_partial_json(
                json!({ "ref": "refs/heads/pack-formats/update", "sha": "base123" }),
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/contents/formats.json"))
            .and(query_param("ref", "pack-formats/update"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo/formats/contents/formats.json"))
            .and(body_partial_json(json!({
                "message": "chore: update pack formats for 1.21",
                "branch": "pack-formats/update",
                "content": STANDARD.encode(r#"{"1.21":{"datapack":48,"resourcepack":34}}"#),
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/pulls"))
            .and(query_param("head", "octo:pack-formats/update"))
            .and(query_param("base", "main"))
            .and(query_param("state", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/formats/pulls"))
            .and(body_partial_json(json!({
                "title": "chore: update pack formats for 1.21",
                "head": "pack-formats/update",
                "base": "main",
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "number": 7, "node_id": "PR_kw7" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = publisher(&server)
            .publish(&request(&dir, false))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PublishOutcome {
                pr_number: 7,
                created: true,
                auto_merge: false
            }
        );
    }

    #[tokio::test]
    async fn republish_resets_branch_updates_file_and_reuses_pr() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_base_ref(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/git/ref/heads/pack-formats/update"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": "old456" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/repos/octo/formats/git/refs/heads/pack-formats/update"))
            .and(body_partial_json(json!({ "sha": "base123", "force": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/contents/formats.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sha": "file789" })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo/formats/contents/formats.json"))
            .and(body_partial_json(json!({ "sha": "file789" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/pulls"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "number": 3, "node_id": "PR_kw3" }])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/formats/pulls"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "variables": { "pr": "PR_kw3" } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "enablePullRequestAutoMerge": null } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = publisher(&server)
            .publish(&request(&dir, true))
            .await
            .unwrap();
        assert_eq!(outcome.pr_number, 3);
        assert!(!outcome.created);
        assert!(outcome.auto_merge);
    }

    #[tokio::test]
    async fn api_rejection_is_reported_with_action() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/git/ref/heads/main"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let err = publisher(&server)
            .publish(&request(&dir, false))
            .await
            .unwrap_err();
        match err {
            PublishError::Status {
                action,
                status,
                body,
            } => {
                assert_eq!(action, "resolve base ref");
                assert_eq!(status, 401);
                assert_eq!(body, "Bad credentials");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn graphql_errors_fail_the_publish() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_base_ref(&server).await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/git/ref/heads/pack-formats/update"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/formats/git/refs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/contents/formats.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo/formats/contents/formats.json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/formats/pulls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/formats/pulls"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "number": 9, "node_id": "PR_kw9" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{ "message": "Auto merge is not allowed for this repository" }]
            })))
            .mount(&server)
            .await;

        let err = publisher(&server)
            .publish(&request(&dir, true))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::GraphQl(msg) if msg.contains("Auto merge")));
    }
}
