//! Calm v3 REST client used to refresh the cache
//!
//! The sync engine only needs two calls per entity type: list everything,
//! and fetch one entity by UUID. `RemoteCatalog` captures that contract so
//! the engine can run against the HTTP client or an in-memory double.

use std::collections::BTreeMap;
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::core::config::Config;
use crate::core::entity_type::EntityType;

/// Page size for list calls
pub const LIST_PAGE_LENGTH: u64 = 250;

/// API root below the server address
const API_ROOT: &str = "api/nutanix/v3";

/// One entity as returned by the remote API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub name: String,
    pub uuid: String,
    pub attributes: BTreeMap<String, String>,
}

impl RemoteEntity {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Build from a v3 entity document
    ///
    /// Returns `None` when the document has no usable name or UUID.
    pub fn from_json(entity_type: EntityType, doc: &serde_json::Value) -> Option<Self> {
        let name = doc
            .pointer("/status/name")
            .and_then(|v| v.as_str())
            .or_else(|| doc.pointer("/spec/name").and_then(|v| v.as_str()))?;
        let uuid = doc.pointer("/metadata/uuid").and_then(|v| v.as_str())?;

        Some(Self {
            name: name.to_string(),
            uuid: uuid.to_string(),
            attributes: entity_type.extract_attributes(doc),
        })
    }
}

/// Errors that can occur while talking to the Calm server
#[derive(Debug, Error, Diagnostic)]
pub enum RemoteError {
    #[error("Calm server is not configured ({0} is missing)")]
    #[diagnostic(
        code(calm::remote::not_configured),
        help("Set it with `calm config set <key> <value>` or the matching CALM_DSL_* variable")
    )]
    NotConfigured(&'static str),

    #[error("Request to {url} failed: {source}")]
    #[diagnostic(code(calm::remote::transport))]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {message}")]
    #[diagnostic(code(calm::remote::status))]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected response from {url}: {message}")]
    #[diagnostic(code(calm::remote::decode))]
    Decode { url: String, message: String },
}

/// Source of truth the cache is refreshed from
pub trait RemoteCatalog {
    /// List every entity of a type
    fn list_entities(&self, entity_type: EntityType) -> Result<Vec<RemoteEntity>, RemoteError>;

    /// Fetch a single entity by UUID
    fn get_entity(&self, entity_type: EntityType, uuid: &str) -> Result<RemoteEntity, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    entities: Vec<serde_json::Value>,
    #[serde(default)]
    metadata: ListMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ListMetadata {
    total_matches: Option<u64>,
}

/// Blocking HTTP client for one Prism Central
pub struct CalmClient {
    http: reqwest::blocking::Client,
    base_url: String,
    username: String,
    password: String,
}

impl CalmClient {
    /// Create a client from resolved configuration
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let host = config
            .pc_ip
            .as_deref()
            .ok_or(RemoteError::NotConfigured("pc_ip"))?;
        let username = config
            .username
            .clone()
            .ok_or(RemoteError::NotConfigured("username"))?;
        let password = config
            .password
            .clone()
            .ok_or(RemoteError::NotConfigured("password"))?;

        let base_url = format!("https://{}:{}/{}", host, config.port(), API_ROOT);

        Self::new(
            base_url,
            username,
            password,
            Duration::from_secs(config.timeout_secs()),
            config.verify_tls(),
        )
    }

    /// Create a client for an explicit API base URL
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        timeout: Duration,
        verify_tls: bool,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|source| RemoteError::Transport {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url,
            username,
            password,
        })
    }

    /// Base URL of the v3 API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn send(
        &self,
        url: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, RemoteError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|source| RemoteError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<serde_json::Value>()
            .map_err(|e| RemoteError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn list_page(&self, entity_type: EntityType, offset: u64) -> Result<ListResponse, RemoteError> {
        let url = self.url(&entity_type.list_api_suffix());
        let body = json!({
            "kind": entity_type.api_kind(),
            "length": LIST_PAGE_LENGTH,
            "offset": offset,
        });

        debug!(%url, offset, "listing {}", entity_type);
        let value = self.send(&url, self.http.post(&url).json(&body))?;

        serde_json::from_value(value).map_err(|e| RemoteError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

impl RemoteCatalog for CalmClient {
    fn list_entities(&self, entity_type: EntityType) -> Result<Vec<RemoteEntity>, RemoteError> {
        let mut entities = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.list_page(entity_type, offset)?;
            let fetched = page.entities.len() as u64;

            for doc in &page.entities {
                match RemoteEntity::from_json(entity_type, doc) {
                    Some(entity) => entities.push(entity),
                    None => debug!("skipping {} without name or uuid", entity_type),
                }
            }

            match next_offset(offset, fetched, page.metadata.total_matches) {
                Some(next) => offset = next,
                None => break,
            }
        }

        Ok(entities)
    }

    fn get_entity(&self, entity_type: EntityType, uuid: &str) -> Result<RemoteEntity, RemoteError> {
        let url = self.url(&format!("{}/{}", entity_type.resource_path(), uuid));
        debug!(%url, "fetching {}", entity_type);

        let doc = self.send(&url, self.http.get(&url))?;
        RemoteEntity::from_json(entity_type, &doc).ok_or_else(|| RemoteError::Decode {
            url,
            message: "entity has no name or uuid".to_string(),
        })
    }
}

/// Offset of the next page, or `None` once everything has been read
fn next_offset(offset: u64, fetched: u64, total_matches: Option<u64>) -> Option<u64> {
    if fetched == 0 {
        return None;
    }
    let next = offset + fetched;
    match total_matches {
        Some(total) => (next < total).then_some(next),
        // Without a total, only a full page means there may be more
        None => (fetched >= LIST_PAGE_LENGTH).then_some(next),
    }
}

/// Pull a human-readable message out of an API error body
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/message_list/0/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
}
