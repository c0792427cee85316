//! GitHub Releases API backend for the release host.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ReleaseCredentials;
use crate::errors::ReleaseError;
use crate::ports::{PublishedRelease, ReleaseHost, ReleaseRequest};

const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(300);

/// Publishes releases through the GitHub REST API.
///
/// A release is created as a draft, assets are uploaded to it, and only then
/// is it published. If any upload fails the draft is deleted, so a tag never
/// carries a partial asset set.
#[derive(Debug, Clone)]
pub struct HttpReleaseHost {
    client: reqwest::Client,
    base_url: String,
    repository: String,
    timeout: Duration,
}

impl HttpReleaseHost {
    /// Creates a release host for `owner/repo` with explicit credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Auth`] when the token cannot be carried in a
    /// header, and [`ReleaseError::Host`] when the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: impl Into<String>,
        repository: impl Into<String>,
        credentials: &ReleaseCredentials,
    ) -> Result<Self, ReleaseError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", credentials.token()))
            .map_err(|_| {
                ReleaseError::Auth("token contains characters not allowed in a header".to_string())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("slipway/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ReleaseError::Host(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            repository: repository.into(),
            timeout: DEFAULT_RELEASE_TIMEOUT,
        })
    }

    /// Sets the per-request time limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.base_url, self.repository)
    }

    async fn delete_draft(&self, id: u64) {
        let url = format!("{}/{id}", self.releases_url());
        if let Err(e) = self.client.delete(&url).timeout(self.timeout).send().await {
            tracing::debug!(error = %e, id, "could not delete draft release");
        }
    }
}

/// Release resource returned by the create call.
#[derive(Debug, Deserialize)]
struct CreatedRelease {
    id: u64,
    upload_url: String,
    html_url: Option<String>,
}

/// Maps an API error status onto the release error contract.
fn classify_status(status: StatusCode, tag: &str, body: &str) -> ReleaseError {
    match status.as_u16() {
        401 | 403 => ReleaseError::Auth(format!("release host returned {status}")),
        409 => ReleaseError::TagConflict(tag.to_string()),
        422 if body.contains("already_exists") => ReleaseError::TagConflict(tag.to_string()),
        _ => ReleaseError::Host(format!(
            "release host returned {status}: {}",
            body.trim()
        )),
    }
}

#[async_trait]
impl ReleaseHost for HttpReleaseHost {
    async fn create_release(
        &self,
        request: ReleaseRequest,
    ) -> Result<PublishedRelease, ReleaseError> {
        let created: CreatedRelease = {
            let response = self
                .client
                .post(self.releases_url())
                .timeout(self.timeout)
                .json(&serde_json::json!({
                    "tag_name": request.tag,
                    "name": request.title,
                    "draft": true,
                }))
                .send()
                .await
                .map_err(|e| ReleaseError::Host(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, &request.tag, &body));
            }
            response
                .json()
                .await
                .map_err(|e| ReleaseError::Host(e.to_string()))?
        };

        // "{?name,label}" template suffix on the upload URL.
        let upload_base = created
            .upload_url
            .split('{')
            .next()
            .unwrap_or(&created.upload_url)
            .to_string();

        for asset in &request.assets {
            let url = format!("{upload_base}?name={}", asset.file_name);
            let outcome = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .header("Content-Type", "application/octet-stream")
                .body(asset.bytes.clone())
                .send()
                .await;

            let failure = match outcome {
                Ok(response) if response.status().is_success() => None,
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    Some(classify_status(status, &request.tag, &body))
                }
                Err(e) => Some(ReleaseError::Host(e.to_string())),
            };

            if let Some(err) = failure {
                tracing::warn!(
                    tag = %request.tag,
                    asset = %asset.file_name,
                    "asset upload failed, deleting draft release"
                );
                self.delete_draft(created.id).await;
                return Err(err);
            }
        }

        let publish = self
            .client
            .patch(format!("{}/{}", self.releases_url(), created.id))
            .timeout(self.timeout)
            .json(&serde_json::json!({ "draft": false }))
            .send()
            .await;

        match publish {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                self.delete_draft(created.id).await;
                return Err(classify_status(status, &request.tag, &body));
            }
            Err(e) => {
                self.delete_draft(created.id).await;
                return Err(ReleaseError::Host(e.to_string()));
            }
        }

        tracing::info!(tag = %request.tag, assets = request.assets.len(), "release published");
        Ok(PublishedRelease {
            tag: request.tag,
            url: created.html_url,
            assets: request
                .assets
                .iter()
                .map(|asset| asset.file_name.clone())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ReleaseAsset;
    use mockito::Matcher;

    fn host_for(server: &mockito::Server) -> HttpReleaseHost {
        HttpReleaseHost::new(
            server.url(),
            "acme/tool",
            &ReleaseCredentials::new("t-token"),
        )
        .unwrap()
    }

    fn request_with_asset() -> ReleaseRequest {
        ReleaseRequest::new("v1.0.0").with_asset(ReleaseAsset::new("tool-linux", b"binary".to_vec()))
    }

    fn created_body(server: &mockito::Server) -> String {
        format!(
            r#"{{"id": 7, "upload_url": "{}/upload/assets{{?name,label}}", "html_url": "https://example.com/releases/v1.0.0"}}"#,
            server.url()
        )
    }

    #[tokio::test]
    async fn test_create_release_publishes_draft_with_assets() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/repos/acme/tool/releases")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "tag_name": "v1.0.0",
                "draft": true,
            })))
            .with_status(201)
            .with_body(created_body(&server))
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/upload/assets")
            .match_query(Matcher::UrlEncoded("name".into(), "tool-linux".into()))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let publish = server
            .mock("PATCH", "/repos/acme/tool/releases/7")
            .match_body(Matcher::PartialJson(serde_json::json!({ "draft": false })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let release = host_for(&server)
            .create_release(request_with_asset())
            .await
            .unwrap();

        assert_eq!(release.tag, "v1.0.0");
        assert_eq!(release.assets, vec!["tool-linux"]);
        assert_eq!(
            release.url.as_deref(),
            Some("https://example.com/releases/v1.0.0")
        );
        create.assert_async().await;
        upload.assert_async().await;
        publish.assert_async().await;
    }

    #[tokio::test]
    async fn test_conflict_status_is_tag_conflict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/tool/releases")
            .with_status(409)
            .with_body("{}")
            .create_async()
            .await;

        let err = host_for(&server)
            .create_release(request_with_asset())
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::TagConflict(tag) if tag == "v1.0.0"));
    }

    #[tokio::test]
    async fn test_already_exists_validation_is_tag_conflict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/tool/releases")
            .with_status(422)
            .with_body(r#"{"errors": [{"code": "already_exists"}]}"#)
            .create_async()
            .await;

        let err = host_for(&server)
            .create_release(request_with_asset())
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::TagConflict(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/tool/releases")
            .with_status(401)
            .with_body("{}")
            .create_async()
            .await;

        let err = host_for(&server)
            .create_release(request_with_asset())
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Auth(_)));
    }

    #[tokio::test]
    async fn test_failed_upload_deletes_draft() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/tool/releases")
            .with_status(201)
            .with_body(created_body(&server))
            .create_async()
            .await;
        server
            .mock("POST", "/upload/assets")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("{}")
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/repos/acme/tool/releases/7")
            .with_status(204)
            .create_async()
            .await;

        let err = host_for(&server)
            .create_release(request_with_asset())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::Host(_)));
        delete.assert_async().await;
    }
}
