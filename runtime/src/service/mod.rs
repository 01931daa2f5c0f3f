use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    query::ODataQuery,
    value_help::{ExternalService, ExternalServiceReference},
};

pub mod http;

pub use http::{Credentials, HttpServiceProvider};

/// Issues queries against the main service.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// `query` addresses an entity set below the service root.
    async fn get(&self, query: &ODataQuery) -> Result<ODataResponse>;

    /// The main service's `$metadata` document.
    async fn metadata(&self) -> Result<String>;
}

/// Fetches value help services referenced from the main service.
#[async_trait]
pub trait ExternalServiceProvider: Send + Sync {
    async fn fetch_external_services(
        &self,
        references: &[ExternalServiceReference],
    ) -> Result<Vec<ExternalService>>;

    async fn fetch_entity_set(
        &self,
        service_path: &str,
        entity_set: &str,
        top: usize,
    ) -> Result<ODataResponse>;
}

/// Parsed JSON body of an OData response.
#[derive(Debug, Clone, PartialEq)]
pub struct ODataResponse {
    body: Value,
}

impl ODataResponse {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Unwrap the payload: the entity collection as an array, or a single entity.
    ///
    /// Understands V4 (`value`) and V2 (`d.results`, `d`) envelopes.
    pub fn odata(self) -> Result<Value> {
        let Value::Object(mut root) = self.body else {
            bail!("OData response is not a JSON object");
        };

        if let Some(error) = root.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str().or_else(|| m.get("value").and_then(Value::as_str)))
                .unwrap_or("unknown error");
            bail!("OData error: {message}");
        }

        if let Some(value) = root.remove("value") {
            if value.is_array() {
                return Ok(value);
            }
            root.insert("value".to_string(), value);
        }

        if let Some(d) = root.remove("d") {
            return match d {
                Value::Object(mut inner) => match inner.remove("results") {
                    Some(results @ Value::Array(_)) => Ok(results),
                    Some(other) => {
                        inner.insert("results".to_string(), other);
                        Ok(Value::Object(inner))
                    }
                    None => Ok(Value::Object(inner)),
                },
                Value::Array(items) => Ok(Value::Array(items)),
                other => Err(anyhow!("unexpected OData V2 payload: {other}")),
            };
        }

        Ok(Value::Object(root))
    }

    /// Payload rows, a single entity counting as one row.
    pub fn rows(self) -> Result<Vec<Value>> {
        match self.odata()? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }
}
