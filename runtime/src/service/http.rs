use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::{
    config::ServiceConfig,
    query::ODataQuery,
    value_help::{ExternalService, ExternalServiceReference},
};

use super::{ExternalServiceProvider, ODataResponse, QueryExecutor};

const METADATA_SEGMENT: &str = "$metadata";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// reqwest backed access to the main service and its value help services.
pub struct HttpServiceProvider {
    http: Client,
    base: String,
    service_path: String,
    sap_client: Option<String>,
    credentials: Option<Credentials>,
}

impl HttpServiceProvider {
    pub fn new(config: &ServiceConfig, credentials: Option<Credentials>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base: config.base_url.trim_end_matches('/').to_string(),
            service_path: with_trailing_slash(&config.path),
            sap_client: config.client.clone(),
            credentials,
        })
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// Every query value is percent-encoded; `sap-client` comes last.
    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base, path))
            .with_context(|| format!("invalid request url {}{path}", self.base))?;
        if !params.is_empty() || self.sap_client.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
            if let Some(client) = &self.sap_client {
                pairs.append_pair("sap-client", client);
            }
        }
        Ok(url)
    }

    fn request(&self, url: Url) -> RequestBuilder {
        let builder = self.http.get(url);
        match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<ODataResponse> {
        let url = self.url(path, params)?;
        debug!(%url, "GET");
        let res = self
            .request(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("Network error requesting {url}"))?;

        let status = res.status();
        if !status.is_success() {
            let err_txt = res.text().await.unwrap_or_default();
            bail!("Request to {url} failed with {status}: {err_txt}");
        }
        let body: Value = res
            .json()
            .await
            .with_context(|| format!("Invalid JSON returned by {url}"))?;
        Ok(ODataResponse::new(body))
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path, &[])?;
        debug!(%url, "GET");
        let res = self
            .request(url.clone())
            .send()
            .await
            .with_context(|| format!("Network error requesting {url}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("Error reading response of {url}"))?;
        if !status.is_success() {
            bail!("Request to {url} failed with {status}: {text}");
        }
        Ok(text)
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

#[async_trait]
impl QueryExecutor for HttpServiceProvider {
    async fn get(&self, query: &ODataQuery) -> Result<ODataResponse> {
        self.get_json(
            &format!("{}{}", self.service_path, query.entity_set),
            &query.params,
        )
        .await
    }

    async fn metadata(&self) -> Result<String> {
        self.get_text(&format!("{}{METADATA_SEGMENT}", self.service_path))
            .await
    }
}

#[async_trait]
impl ExternalServiceProvider for HttpServiceProvider {
    /// One `$metadata` request per distinct service path; every reference
    /// group of that path shares the document.
    async fn fetch_external_services(
        &self,
        references: &[ExternalServiceReference],
    ) -> Result<Vec<ExternalService>> {
        let mut by_path: BTreeMap<&str, Vec<&ExternalServiceReference>> = BTreeMap::new();
        for reference in references {
            by_path.entry(reference.path.as_str()).or_default().push(reference);
        }

        let fetched = join_all(by_path.into_iter().map(|(path, refs)| async move {
            let metadata = self
                .get_text(&format!("{path}{METADATA_SEGMENT}"))
                .await;
            (path, refs, metadata)
        }))
        .await;

        let mut services: Vec<ExternalService> = Vec::new();
        let mut failures = 0usize;
        for (path, refs, metadata) in fetched {
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(error = %err, service_path = %path, "failed to fetch value help metadata");
                    failures += 1;
                    continue;
                }
            };
            for reference in refs {
                let target = reference.target_entity();
                if services
                    .iter()
                    .any(|s| s.kind == reference.kind && s.path == path && s.target == target)
                {
                    continue;
                }
                services.push(ExternalService {
                    kind: reference.kind,
                    target: target.to_string(),
                    path: path.to_string(),
                    metadata: metadata.clone(),
                    entity_data: Vec::new(),
                });
            }
        }

        if services.is_empty() && failures > 0 {
            bail!("failed to fetch metadata for all {failures} value help services");
        }
        Ok(services)
    }

    async fn fetch_entity_set(
        &self,
        service_path: &str,
        entity_set: &str,
        top: usize,
    ) -> Result<ODataResponse> {
        let service_path = with_trailing_slash(service_path);
        self.get_json(
            &format!("{service_path}{entity_set}"),
            &[("$top", top.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Entity, ListEntity, SemanticKeyFilter},
        query::assemble_query,
    };

    fn provider(client: Option<&str>) -> HttpServiceProvider {
        let config = ServiceConfig {
            base_url: "https://example.com:44300/".to_string(),
            path: "/sap/opu/odata4/srv/0001".to_string(),
            client: client.map(str::to_string),
            timeout_secs: 5,
        };
        HttpServiceProvider::new(&config, None).unwrap()
    }

    #[test]
    fn builds_query_urls_below_the_service_path() {
        let provider = provider(None);
        assert_eq!(provider.service_path(), "/sap/opu/odata4/srv/0001/");
        let url = provider
            .url(
                "/sap/opu/odata4/srv/0001/Travel",
                &[("$expand", "_Booking".to_string()), ("$top", "1".to_string())],
            )
            .unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/sap/opu/odata4/srv/0001/Travel");
        assert_eq!(url.query(), Some("%24expand=_Booking&%24top=1"));
    }

    #[test]
    fn appends_sap_client() {
        let url = provider(Some("100"))
            .url("/srv/Travel", &[("$top", "1".to_string())])
            .unwrap();
        assert_eq!(url.query(), Some("%24top=1&sap-client=100"));
    }

    #[test]
    fn metadata_url_has_no_query() {
        let url = provider(None).url("/srv/$metadata", &[]).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn reserved_characters_in_filter_values_are_encoded() {
        let list = ListEntity::new(Entity::new("Travel", "Travel")).with_semantic_keys(vec![
            SemanticKeyFilter::new("Name", "Edm.String").with_value("A&B#1+2"),
        ]);
        let request = assemble_query(&list, &[], 1).request;
        let url = provider(Some("100"))
            .url(&format!("/srv/{}", request.entity_set), &request.params)
            .unwrap();

        assert_eq!(url.fragment(), None);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("$filter".to_string(), "Name eq 'A&B#1+2'".to_string()),
                ("$count".to_string(), "true".to_string()),
                ("sap-client".to_string(), "100".to_string()),
            ]
        );
    }
}
