use crate::domain::{Project, SessionMeta, SourceCapability};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid base url {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {code}")]
    Status { url: String, code: u16 },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// The listing endpoints the timeline consumes.
pub trait SessionApi: Send + Sync {
    fn list_projects(&self) -> Result<Vec<Project>, ApiError>;

    fn list_sessions(
        &self,
        project_id: &str,
        source_hint: Option<&str>,
    ) -> Result<Vec<SessionMeta>, ApiError>;

    fn list_source_capabilities(&self) -> Result<Vec<SourceCapability>, ApiError>;
}

pub struct HttpSessionApi {
    base_url: Url,
    agent: ureq::Agent,
}

impl HttpSessionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut parsed = Url::parse(base_url).map_err(|error| ApiError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: error.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl {
                url: base_url.to_string(),
                message: "url cannot be used as a base".to_string(),
            });
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        Ok(Self {
            base_url: parsed,
            agent: make_agent(timeout),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        let url_text = url.to_string();
        let mut response = self
            .agent
            .get(url.as_str())
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .call()
            .map_err(|error| match error {
                ureq::Error::StatusCode(code) => ApiError::Status {
                    url: url_text.clone(),
                    code,
                },
                other => ApiError::Request {
                    url: url_text.clone(),
                    message: other.to_string(),
                },
            })?;

        response
            .body_mut()
            .read_json::<T>()
            .map_err(|error| ApiError::Decode {
                url: url_text,
                message: error.to_string(),
            })
    }
}

impl SessionApi for HttpSessionApi {
    fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let url = self.endpoint(&["api", "projects"]);
        let listing: Listing<Project> = self.get_json(&url)?;
        Ok(listing.into_items())
    }

    fn list_sessions(
        &self,
        project_id: &str,
        source_hint: Option<&str>,
    ) -> Result<Vec<SessionMeta>, ApiError> {
        let mut url = self.endpoint(&["api", "projects", project_id, "sessions"]);
        if let Some(hint) = source_hint {
            url.query_pairs_mut().append_pair("source", hint);
        }
        let listing: Listing<SessionMeta> = self.get_json(&url)?;
        Ok(listing.into_items())
    }

    fn list_source_capabilities(&self) -> Result<Vec<SourceCapability>, ApiError> {
        let url = self.endpoint(&["api", "sources"]);
        let listing: Listing<SourceCapability> = self.get_json(&url)?;
        Ok(listing.into_items())
    }
}

/// Listing responses come either as a bare array or wrapped in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "projects", alias = "sessions", alias = "sources")]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Self::Bare(items) => items,
            Self::Wrapped { items } => items,
        }
    }
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_encode_project_ids() {
        let api = HttpSessionApi::new("http://localhost:3000/base", Duration::from_secs(1))
            .expect("api builds");
        let url = api.endpoint(&["api", "projects", "a/b c", "sessions"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/base/api/projects/a%2Fb%20c/sessions"
        );
    }

    #[test]
    fn rejects_invalid_base_urls() {
        assert!(matches!(
            HttpSessionApi::new("not a url", Duration::from_secs(1)),
            Err(ApiError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            HttpSessionApi::new("mailto:me@example.com", Duration::from_secs(1)),
            Err(ApiError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn listing_accepts_bare_and_wrapped_arrays() {
        let bare: Listing<Project> =
            serde_json::from_value(serde_json::json!([{ "id": "p1", "name": "A" }]))
                .expect("bare parses");
        assert_eq!(bare.into_items().len(), 1);

        let wrapped: Listing<SessionMeta> = serde_json::from_value(serde_json::json!({
            "sessions": [{ "id": "s1", "modifiedAt": "2026-02-01T10:00:00Z" }]
        }))
        .expect("wrapped parses");
        let items = wrapped.into_items();
        assert_eq!(items[0].id, "s1");
    }
}
