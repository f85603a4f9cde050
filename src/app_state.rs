use crate::content_type::ContentType;
use crate::form_parameters::FormParameters;
use crate::missing_articles::{SparqlQuerier, DEFAULT_SPARQL_CHUNK_SIZE};
use crate::render::{output_json, MyResponse};
use crate::size_index::SizeIndex;
use crate::tracked_items::TrackedItemTable;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Settings read from `config.json` at startup, with defaults for everything
/// but the project-specific search marker.
#[derive(Debug, Clone)]
pub struct Settings {
    pub http_server: String,
    pub http_port: u16,
    pub api_endpoint: String,
    pub sparql_endpoint: String,
    pub user_agent: String,
    pub sparql_chunk_size: usize,
    pub search_query: String,
    pub importance_tag: String,
    pub tracked_items_file: String,
    pub size_index_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_server: "0.0.0.0".to_string(),
            http_port: 80,
            api_endpoint: "https://en.wikipedia.org/w/api.php".to_string(),
            sparql_endpoint: "https://query.wikidata.org/sparql".to_string(),
            user_agent: "missing_articles_rs/0.1".to_string(),
            sparql_chunk_size: DEFAULT_SPARQL_CHUNK_SIZE,
            search_query: "insource:\"COMPBIO=yes\"".to_string(),
            importance_tag: "COMPBIO-importance".to_string(),
            tracked_items_file: "data/tracked_items.tsv".to_string(),
            size_index_file: "data/qid_to_byte_sizes.json".to_string(),
        }
    }
}

impl Settings {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        let str_or = |key: &str, fallback: String| {
            config[key]
                .as_str()
                .map_or(fallback, |s| s.to_string())
        };
        Self {
            http_port: config["http_port"].as_u64().unwrap_or(80) as u16,
            sparql_chunk_size: config["sparql_chunk_size"]
                .as_u64()
                .map_or(defaults.sparql_chunk_size, |n| n as usize),
            http_server: str_or("http_server", defaults.http_server),
            api_endpoint: str_or("api_endpoint", defaults.api_endpoint),
            sparql_endpoint: str_or("sparql_endpoint", defaults.sparql_endpoint),
            user_agent: str_or("user_agent", defaults.user_agent),
            search_query: str_or("search_query", defaults.search_query),
            importance_tag: str_or("importance_tag", defaults.importance_tag),
            tracked_items_file: str_or("tracked_items_file", defaults.tracked_items_file),
            size_index_file: str_or("size_index_file", defaults.size_index_file),
        }
    }
}

/// Top-level application state: the tracked-item table and size index, loaded
/// once and treated as immutable for the lifetime of the process, plus the
/// settings and the form page template.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    table: TrackedItemTable,
    size_index: SizeIndex,
    settings: Settings,
    main_page: String,
}

impl AppState {
    pub fn new_from_config(config: &Value) -> Result<Self> {
        let settings = Settings::from_config(config);
        let table = TrackedItemTable::from_tsv_file(&settings.tracked_items_file)?;
        tracing::info!(
            "Loaded {} tracked items from {}",
            table.len(),
            settings.tracked_items_file
        );
        let size_index = if Path::new(&settings.size_index_file).exists() {
            SizeIndex::from_json_file(&settings.size_index_file)?
        } else {
            tracing::warn!(
                "No size index at {}; sizes will render as unknown",
                settings.size_index_file
            );
            SizeIndex::default()
        };
        let main_page_bytes = fs::read("./html/index.html")
            .map_err(|e| anyhow!("Could not read index.html file from disk: {e}"))?;
        let main_page = String::from_utf8_lossy(&main_page_bytes).to_string();
        Ok(Self::from_parts(table, size_index, settings, main_page))
    }

    pub const fn from_parts(
        table: TrackedItemTable,
        size_index: SizeIndex,
        settings: Settings,
        main_page: String,
    ) -> Self {
        Self {
            table,
            size_index,
            settings,
            main_page,
        }
    }

    pub const fn table(&self) -> &TrackedItemTable {
        &self.table
    }

    pub const fn size_index(&self) -> &SizeIndex {
        &self.size_index
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn querier(&self) -> SparqlQuerier {
        SparqlQuerier::new(
            &self.settings.sparql_endpoint,
            &self.settings.user_agent,
            self.settings.sparql_chunk_size,
        )
    }

    pub fn get_main_page(&self) -> String {
        self.main_page.clone()
    }

    pub fn render_error(&self, error: String, form_parameters: &FormParameters) -> MyResponse {
        match form_parameters.params.get("format").map(|s| s.as_str()) {
            Some("") | Some("html") | None => {
                let output = format!(
                    "<div class='alert alert-danger' role='alert'>{}</div>",
                    htmlescape::encode_minimal(&error)
                );
                let html = self
                    .main_page
                    .replace("<!--language-->", "")
                    .replace("<!--output-->", &output);
                MyResponse {
                    s: html,
                    content_type: ContentType::HTML,
                }
            }
            Some("json") => {
                let value = json!({ "error": error });
                output_json(&value, form_parameters.params.get("callback"), false)
            }
            _ => MyResponse {
                s: error,
                content_type: ContentType::Plain,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_state() -> AppState {
        AppState::from_parts(
            TrackedItemTable::default(),
            SizeIndex::default(),
            Settings::default(),
            "<body><!--output--></body>".to_string(),
        )
    }

    #[test]
    fn test_settings_from_config() {
        let config = json!({
            "http_port": 8080,
            "sparql_chunk_size": 500,
            "search_query": "insource:\"MED=yes\"",
        });
        let settings = Settings::from_config(&config);
        assert_eq!(settings.http_port, 8080);
        assert_eq!(settings.sparql_chunk_size, 500);
        assert_eq!(settings.search_query, "insource:\"MED=yes\"");
        // Unset keys keep their defaults
        assert_eq!(settings.sparql_endpoint, "https://query.wikidata.org/sparql");
    }

    #[test]
    fn test_render_error_html() {
        let state = minimal_state();
        let mut params = FormParameters::new();
        params
            .params
            .insert("format".to_string(), "html".to_string());
        let response = state.render_error("Test <error>".to_string(), &params);
        assert_eq!(response.content_type, ContentType::HTML);
        assert!(response.s.contains("Test &lt;error&gt;"));
    }

    #[test]
    fn test_render_error_json() {
        let state = minimal_state();
        let mut params = FormParameters::new();
        params
            .params
            .insert("format".to_string(), "json".to_string());
        let response = state.render_error("Test error".to_string(), &params);
        assert_eq!(response.content_type, ContentType::JSON);
        assert!(response.s.contains("Test error"));
    }

    #[test]
    fn test_render_error_plain() {
        let state = minimal_state();
        let mut params = FormParameters::new();
        params
            .params
            .insert("format".to_string(), "plaintext".to_string());
        let response = state.render_error("Test error".to_string(), &params);
        assert_eq!(response.s, "Test error");
        assert_eq!(response.content_type, ContentType::Plain);
    }
}
