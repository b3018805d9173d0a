//! Blocking HTTP client over `esearch.fcgi` / `efetch.fcgi`.

use std::io::Read;
use std::time::Duration;

use harvest_core::config::{RemoteConfig, MAX_PAGE_SIZE};
use harvest_core::{ContentSource, CorpusSource, DocId, IdPage, RemoteError};
use thiserror::Error;

use crate::parse::{parse_esearch, ArticleSplitter};

const USER_AGENT: &str = concat!("harvest/", env!("CARGO_PKG_VERSION"));

/// Errors building a client from configuration.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid article element {element:?}: {source}")]
    Element {
        element: String,
        #[source]
        source: regex::Error,
    },
}

/// E-utilities client bound to one database and query.
#[derive(Debug)]
pub struct EutilsClient {
    agent: ureq::Agent,
    base_url: String,
    database: String,
    query: String,
    rettype: String,
    api_key: Option<String>,
    splitter: ArticleSplitter,
}

impl EutilsClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, ClientError> {
        let splitter =
            ArticleSplitter::new(&config.article_element).map_err(|source| ClientError::Element {
                element: config.article_element.clone(),
                source,
            })?;
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(USER_AGENT)
            .build();
        Ok(Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            query: config.query.clone(),
            rettype: config.rettype.clone(),
            api_key: config.api_key.clone(),
            splitter,
        })
    }

    fn endpoint(&self, tool: &str) -> String {
        format!("{}/{tool}.fcgi", self.base_url)
    }
}

impl CorpusSource for EutilsClient {
    fn page(&self, offset: usize, limit: usize) -> Result<IdPage, RemoteError> {
        let url = self.endpoint("esearch");
        let target = format!(
            "{url}?db={}&term={}&retstart={offset}&retmax={limit}",
            self.database, self.query
        );
        if limit > MAX_PAGE_SIZE {
            return Err(RemoteError::Malformed {
                target,
                message: format!("retmax {limit} exceeds the maximum of {MAX_PAGE_SIZE}"),
            });
        }

        let mut request = self
            .agent
            .get(&url)
            .query("db", &self.database)
            .query("term", &self.query)
            .query("retstart", &offset.to_string())
            .query("retmax", &limit.to_string())
            .query("retmode", "json");
        if let Some(key) = &self.api_key {
            request = request.query("api_key", key);
        }

        tracing::debug!(offset, limit, "esearch");
        let response = request.call().map_err(|e| remote_error(&target, e))?;
        let body = response.into_string().map_err(|e| RemoteError::Transport {
            target: target.clone(),
            message: e.to_string(),
        })?;
        parse_esearch(&body).map_err(|message| RemoteError::Malformed { target, message })
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.database, self.query)
    }
}

impl ContentSource for EutilsClient {
    fn fetch(&self, ids: &[DocId]) -> Result<Vec<Vec<u8>>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint("efetch");
        let joined = ids.iter().map(DocId::as_str).collect::<Vec<_>>().join(",");
        let target = format!("{url} (db={}, {} ids)", self.database, ids.len());

        let mut form = vec![
            ("db", self.database.as_str()),
            ("id", joined.as_str()),
            ("rettype", self.rettype.as_str()),
            ("retmode", "xml"),
        ];
        if let Some(key) = &self.api_key {
            form.push(("api_key", key.as_str()));
        }

        tracing::debug!(ids = ids.len(), "efetch");
        let response = self
            .agent
            .post(&url)
            .send_form(&form)
            .map_err(|e| remote_error(&target, e))?;
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Transport {
                target: target.clone(),
                message: e.to_string(),
            })?;
        Ok(self.splitter.split(&body))
    }
}

fn remote_error(target: &str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => RemoteError::Status {
            code,
            reason: response.status_text().to_string(),
            target: target.to_string(),
        },
        ureq::Error::Transport(transport) => RemoteError::Transport {
            target: target.to_string(),
            message: transport.to_string(),
        },
    }
}
