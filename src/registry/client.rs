//! HTTP implementation of the registry lookups.
//!
//! One shared `reqwest` client serves the module registry, the provider
//! registry and the GitHub releases API. Transient failures (5xx, 429) are
//! retried with exponential backoff; a 404 is not an error at this layer,
//! it means "not published".

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::RegistryConfig;
use crate::parser::DEFAULT_REGISTRY;
use crate::registry::{
    LatestRelease, ModuleSchema, ProviderSchema, RateLimitConfig, Registry,
};
use crate::types::{LocatedSource, SourceKind};
use crate::Result;

/// Registry client speaking the module/provider registry protocol v1 and
/// the GitHub REST API.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    retry: RateLimitConfig,
    module_base: String,
    provider_base: String,
    github_base: String,
    github_token: Option<String>,
}

impl HttpRegistry {
    /// Build a client from the registry configuration.
    #[must_use]
    pub fn new(config: &RegistryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("vigie/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            retry: config.rate_limit(),
            module_base: config.module_base_url.trim_end_matches('/').to_string(),
            provider_base: config.provider_base_url.trim_end_matches('/').to_string(),
            github_base: config.github_base_url.trim_end_matches('/').to_string(),
            github_token: config.github_token.clone(),
        }
    }

    /// Module registry endpoint for a clean source.
    ///
    /// A four-segment source carries its own registry host
    /// (`host/namespace/name/provider`); the default host is replaced by the
    /// configured base so overrides keep working.
    fn module_url(&self, clean_source: &str) -> String {
        let (base, path) = match split_registry_host(clean_source, 4) {
            Some((host, path)) if host != DEFAULT_REGISTRY => (format!("https://{host}"), path),
            Some((_, path)) => (self.module_base.clone(), path),
            None => (self.module_base.clone(), clean_source.to_string()),
        };
        format!("{base}/v1/modules/{path}")
    }

    /// Provider registry endpoint for a probed source.
    fn provider_url(&self, source: &str) -> String {
        let (base, path) = match split_registry_host(source, 3) {
            Some((host, path)) if host != DEFAULT_REGISTRY => (format!("https://{host}"), path),
            Some((_, path)) => (self.provider_base.clone(), path),
            None => (self.provider_base.clone(), source.to_string()),
        };
        format!("{base}/v1/providers/{path}")
    }

    /// GET a JSON document, retrying transient failures.
    ///
    /// Returns `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Option<&str>,
    ) -> Result<Option<T>> {
        let mut attempts = 0;
        let mut delay = self.retry.delay_ms;

        loop {
            attempts += 1;
            let mut request = self.client.get(url);
            if let Some(header) = auth {
                request = request.header("Authorization", header);
            }

            let response = request.send().await.map_err(|e| {
                crate::err!(Http {
                    message: format!("request to {url} failed: {e}"),
                    status_code: e.status().map(|s| s.as_u16()),
                })
            })?;

            let status = response.status();
            if status.is_success() {
                return response.json::<T>().await.map(Some).map_err(|e| {
                    crate::err!(RegistryResponse {
                        url: url.to_string(),
                        message: format!("invalid JSON body: {e}"),
                    })
                });
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let transient =
                status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
            if transient && attempts <= self.retry.max_retries {
                tracing::warn!(
                    url = %url,
                    status = %status,
                    attempt = attempts,
                    max_retries = self.retry.max_retries,
                    delay_ms = delay,
                    "Registry request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay as f64 * self.retry.backoff_multiplier) as u64;
                continue;
            }

            return Err(crate::err!(Http {
                message: format!("request to {url} failed"),
                status_code: Some(status.as_u16()),
            }));
        }
    }

    async fn module_registry_latest(&self, clean_source: &str) -> Result<LatestRelease> {
        let url = self.module_url(clean_source);
        let response: Option<ModuleVersionResponse> = self.get_json(&url, None).await?;
        match response {
            Some(body) => Ok(LatestRelease {
                version: body.version,
                source_url: body.source,
            }),
            None => Err(crate::err!(RegistryResponse {
                url: url,
                message: format!("module '{clean_source}' not found"),
            })),
        }
    }

    async fn github_latest(&self, source: &str) -> Result<LatestRelease> {
        let Some((owner, repo)) = github_owner_repo(source) else {
            return Err(crate::err!(RegistryResponse {
                url: source.to_string(),
                message: "cannot derive GitHub owner/repo from source".to_string(),
            }));
        };
        let auth = self.github_token.as_ref().map(|t| format!("token {t}"));
        let repo_url = format!("https://github.com/{owner}/{repo}");

        let release_url = format!("{}/repos/{owner}/{repo}/releases/latest", self.github_base);
        let release: Option<GitHubRelease> =
            self.get_json(&release_url, auth.as_deref()).await?;
        if let Some(release) = release {
            return Ok(LatestRelease {
                version: release.tag_name,
                source_url: Some(repo_url),
            });
        }

        // Repositories without formal releases still carry tags.
        let tags_url = format!("{}/repos/{owner}/{repo}/tags", self.github_base);
        let tags: Option<Vec<GitHubTag>> = self.get_json(&tags_url, auth.as_deref()).await?;
        match tags.and_then(|mut tags| (!tags.is_empty()).then(|| tags.remove(0))) {
            Some(tag) => Ok(LatestRelease {
                version: tag.name,
                source_url: Some(repo_url),
            }),
            None => Err(crate::err!(RegistryResponse {
                url: tags_url,
                message: format!("{owner}/{repo} has no releases or tags"),
            })),
        }
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn latest_module(&self, located: &LocatedSource) -> Result<LatestRelease> {
        if located.clean_source.contains("github.com") {
            self.github_latest(&located.clean_source).await
        } else if located.kind == SourceKind::Registry {
            self.module_registry_latest(&located.clean_source).await
        } else {
            Err(crate::err!(RegistryResponse {
                url: located.clean_source.clone(),
                message: format!("no registry endpoint for {} sources", located.kind),
            }))
        }
    }

    async fn latest_provider(&self, source: &str) -> Result<LatestRelease> {
        let url = self.provider_url(source);
        let response: Option<ProviderVersionResponse> = self.get_json(&url, None).await?;
        match response {
            Some(body) => Ok(LatestRelease {
                version: body.version,
                source_url: body.source,
            }),
            None => Err(crate::err!(RegistryResponse {
                url: url,
                message: format!("provider '{source}' not found"),
            })),
        }
    }

    async fn module_schema(
        &self,
        clean_source: &str,
        version: &str,
    ) -> Result<Option<ModuleSchema>> {
        let url = format!("{}/{version}", self.module_url(clean_source));
        self.get_json(&url, None).await
    }

    async fn provider_schema(
        &self,
        source: &str,
        version: &str,
    ) -> Result<Option<ProviderSchema>> {
        let url = format!("{}/{version}", self.provider_url(source));
        self.get_json(&url, None).await
    }
}

/// Split `host/rest...` when the path has `segments` parts and the first one
/// looks like a hostname.
fn split_registry_host(path: &str, segments: usize) -> Option<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() == segments && parts[0].contains('.') {
        Some((parts[0].to_string(), parts[1..].join("/")))
    } else {
        None
    }
}

/// Extract `(owner, repo)` from any GitHub-hosted source string.
fn github_owner_repo(source: &str) -> Option<(String, String)> {
    let idx = source.find("github.com")?;
    let rest = source[idx + "github.com".len()..].trim_start_matches([':', '/']);
    let rest = rest.split('?').next().unwrap_or(rest);

    let mut parts = rest.split('/');
    let owner = parts.next()?.to_string();
    let repo = parts.next()?.trim_end_matches(".git").to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

/// Module registry latest-version response.
#[derive(Debug, Deserialize)]
struct ModuleVersionResponse {
    version: String,
    #[serde(default)]
    source: Option<String>,
}

/// Provider registry latest-version response.
#[derive(Debug, Deserialize)]
struct ProviderVersionResponse {
    version: String,
    #[serde(default)]
    source: Option<String>,
}

/// GitHub release response (only the tag matters here).
#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

/// GitHub tag list entry.
#[derive(Debug, Deserialize)]
struct GitHubTag {
    name: String,
}
