//! HTTPS client for the OCI Distribution Spec catalog and referrers
//! endpoints. Cooperative-async: every round trip is an `await` point and
//! the caller supplies the executor.

use crate::error::{Error, Result};
use crate::index::Index;
use crate::media_type;
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use tracing::{debug, trace};

const CATALOG_PAGE_SIZE: usize = 100;

#[derive(serde::Deserialize)]
struct CatalogResponse {
    repositories: Vec<String>,
}

/// A thin HTTPS client over a registry's `/v2` endpoints.
pub struct RegistryClient {
    client: Client,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// List repositories, optionally scoped to those starting with `prefix`,
    /// paginating `n=100` at a time and skipping ahead when a long enough
    /// prefix lets the server seed `last` directly.
    pub async fn catalog(&self, registry: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut last: Option<String> = prefix
            .filter(|p| p.len() >= 2)
            .map(|p| p[..p.len() - 1].to_string());

        loop {
            let page = self
                .fetch_catalog_page(registry, CATALOG_PAGE_SIZE, last.as_deref())
                .await?;
            trace!(registry, page_len = page.len(), ?last, "fetched catalog page");

            let mut stop = false;
            for (i, name) in page.iter().enumerate() {
                let matches_prefix = prefix.map_or(true, |p| name.starts_with(p));
                if matches_prefix && seen.insert(name.clone()) {
                    results.push(name.clone());
                }
                if i == page.len() - 1 {
                    if let Some(p) = prefix {
                        if !name.starts_with(p) && name.as_str() > p {
                            stop = true;
                        }
                    }
                }
            }

            let page_len = page.len();
            last = page.last().cloned();

            if stop || page_len < CATALOG_PAGE_SIZE {
                break;
            }
        }

        debug!(registry, count = results.len(), "catalog enumeration complete");
        Ok(results)
    }

    async fn fetch_catalog_page(
        &self,
        registry: &str,
        n: usize,
        last: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut url = format!("{}/v2/_catalog?n={n}", base_url(registry));
        if let Some(last) = last {
            url.push_str("&last=");
            url.push_str(&urlencode(last));
        }
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        let body: CatalogResponse = resp.json().await?;
        Ok(body.repositories)
    }

    /// Fetch the referrers index for `digest`, falling back to the tag
    /// schema (`sha256-<hex>`) on a 404. Every fallback failure degrades to
    /// an empty index rather than propagating an error.
    pub async fn referrers(
        &self,
        registry: &str,
        name: &str,
        digest: &str,
        artifact_type: Option<&str>,
    ) -> Result<Index> {
        let mut url = format!("{}/v2/{name}/referrers/{digest}", base_url(registry));
        if let Some(at) = artifact_type {
            url.push_str("?artifactType=");
            url.push_str(&urlencode(at));
        }

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, media_type::IMAGE_INDEX_MEDIA_TYPE)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(registry, name, digest, "referrers 404, falling back to tag schema");
            return Ok(self
                .referrers_tag_fallback(registry, name, digest, artifact_type)
                .await
                .unwrap_or_else(|_| Index::empty()));
        }
        if !resp.status().is_success() {
            return Err(Error::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }

        let idx: Index = resp.json().await?;
        Ok(idx.filter_artifact_type(artifact_type))
    }

    async fn referrers_tag_fallback(
        &self,
        registry: &str,
        name: &str,
        digest: &str,
        artifact_type: Option<&str>,
    ) -> Result<Index> {
        let tag = digest.replace(':', "-");
        let url = format!("{}/v2/{name}/manifests/{tag}", base_url(registry));
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, media_type::IMAGE_INDEX_MEDIA_TYPE)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        let idx: Index = resp.json().await?;
        Ok(idx.filter_artifact_type(artifact_type))
    }
}

/// `registry` may already carry a scheme (used by tests pointed at a
/// plain-HTTP stub); otherwise assume HTTPS as every real registry
/// requires.
fn base_url(registry: &str) -> String {
    if registry.contains("://") {
        registry.trim_end_matches('/').to_string()
    } else {
        format!("https://{registry}")
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_leaves_safe_chars_alone_and_escapes_colon() {
        assert_eq!(urlencode("sha256:abcd"), "sha256%3Aabcd");
        assert_eq!(urlencode("lib-prefix_9.0"), "lib-prefix_9.0");
    }
}
