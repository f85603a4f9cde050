use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Default number of QIDs bound into a single SPARQL VALUES set. Too large
/// risks endpoint query-size and timeout limits, too small multiplies round
/// trips; deployments have run anywhere from 300 to 500.
pub static DEFAULT_SPARQL_CHUNK_SIZE: usize = 300;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// A chunk request failed. Fatal for the whole call: a partial result
    /// list would be indistinguishable from "nothing missing".
    #[error("existence query failed for chunk {chunk_index}: {message}")]
    ExistenceQueryFailure { chunk_index: usize, message: String },
    #[error("malformed query response: {0}")]
    MalformedResponse(String),
    #[error("invalid language code: {0:?}")]
    InvalidLanguageCode(String),
}

/// A tracked item with no article in the requested language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingArticleRecord {
    pub qid: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en_link: Option<String>,
    #[serde(rename = "size", serialize_with = "serialize_size")]
    pub size_bytes: Option<u64>,
}

/// Absent sizes keep the historical `"unknown"` string in serialized output.
fn serialize_size<S: Serializer>(size: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
    match size {
        Some(bytes) => serializer.serialize_u64(*bytes),
        None => serializer.serialize_str("unknown"),
    }
}

#[async_trait]
pub trait ExistenceQuerier: Send + Sync {
    /// Returns the subset of `qids` that have no article in `language_code`,
    /// in endpoint order per chunk, chunks in emission order.
    async fn query_missing(
        &self,
        qids: &[String],
        language_code: &str,
    ) -> Result<Vec<MissingArticleRecord>, QueryError>;
}

#[derive(Debug, Clone)]
pub struct SparqlQuerier {
    endpoint: String,
    user_agent: String,
    chunk_size: usize,
    client: reqwest::Client,
}

impl SparqlQuerier {
    pub fn new(endpoint: &str, user_agent: &str, chunk_size: usize) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            user_agent: user_agent.to_string(),
            chunk_size: chunk_size.max(1),
            client: reqwest::Client::new(),
        }
    }

    /// Partitions `qids` into full chunks of `chunk_size`, except possibly
    /// the last; concatenation preserves the input order exactly.
    fn chunked<'a>(&self, qids: &'a [String]) -> std::slice::Chunks<'a, String> {
        qids.chunks(self.chunk_size)
    }

    /// Builds the per-chunk query: bind the chunk as a VALUES set, keep only
    /// items without an article in `language_code`, and join the English
    /// sitelink for display.
    fn build_query(chunk: &[String], language_code: &str) -> String {
        let values = chunk
            .iter()
            .map(|qid| format!("wd:{qid}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            r#"SELECT ?item ?itemLabel ?en_link WHERE {{
  VALUES ?item {{ {values} }}
  FILTER(NOT EXISTS {{
    ?article schema:about ?item ;
             schema:inLanguage "{language_code}" .
  }})
  OPTIONAL {{
    ?en_link schema:about ?item ;
             schema:isPartOf <https://en.wikipedia.org/> ;
             schema:inLanguage "en" .
  }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}"#
        )
    }

    /// Flattens a SPARQL JSON result into records, in binding order.
    fn parse_bindings(json: &Value) -> Result<Vec<MissingArticleRecord>, QueryError> {
        let bindings = json["results"]["bindings"].as_array().ok_or_else(|| {
            QueryError::MalformedResponse("results.bindings missing".to_string())
        })?;
        bindings
            .iter()
            .map(|binding| {
                let item_uri = binding["item"]["value"].as_str().ok_or_else(|| {
                    QueryError::MalformedResponse("item.value missing from binding".to_string())
                })?;
                let qid = item_uri.rsplit('/').next().unwrap_or(item_uri).to_string();
                let title = binding["itemLabel"]["value"]
                    .as_str()
                    .ok_or_else(|| {
                        QueryError::MalformedResponse(format!("itemLabel missing for {qid}"))
                    })?
                    .to_string();
                let en_link = binding["en_link"]["value"].as_str().map(str::to_string);
                Ok(MissingArticleRecord {
                    qid,
                    title,
                    en_link,
                    size_bytes: None,
                })
            })
            .collect()
    }
}

/// Language codes are interpolated into the query text, so only plain wiki
/// language codes are accepted.
pub fn is_valid_language_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 20
        && code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[async_trait]
impl ExistenceQuerier for SparqlQuerier {
    async fn query_missing(
        &self,
        qids: &[String],
        language_code: &str,
    ) -> Result<Vec<MissingArticleRecord>, QueryError> {
        if !is_valid_language_code(language_code) {
            return Err(QueryError::InvalidLanguageCode(language_code.to_string()));
        }
        let mut all_missing = Vec::new();
        for (chunk_index, chunk) in self.chunked(qids).enumerate() {
            let query = Self::build_query(chunk, language_code);
            let response = self
                .client
                .post(&self.endpoint)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .form(&[("query", query.as_str()), ("format", "json")])
                .send()
                .await
                .map_err(|e| QueryError::ExistenceQueryFailure {
                    chunk_index,
                    message: e.to_string(),
                })?;
            if !response.status().is_success() {
                return Err(QueryError::ExistenceQueryFailure {
                    chunk_index,
                    message: format!("HTTP status {}", response.status()),
                });
            }
            let json: Value =
                response
                    .json()
                    .await
                    .map_err(|e| QueryError::MalformedResponse(e.to_string()))?;
            all_missing.extend(Self::parse_bindings(&json)?);
        }
        Ok(all_missing)
    }
}
