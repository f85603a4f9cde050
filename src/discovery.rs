use crate::importance::Importance;
use crate::size_index::SizeIndex;
use crate::tracked_items::{TrackedItem, TrackedItemTable};
use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// The action API caps `srlimit` at 500 for anonymous requests.
pub static MAX_SEARCH_PAGE_SIZE: usize = 500;
/// The action API caps `titles=` at 50 titles per request.
pub static TITLE_BATCH_SIZE: usize = 50;

/// Finds talk pages carrying the WikiProject banner via full-text search,
/// following the `sroffset` continuation cursor until the result set is
/// exhausted. Each hit yields the article title (talk prefix stripped) and
/// the importance tag extracted from the snippet.
#[derive(Debug, Clone)]
pub struct TitleDiscoverer {
    api_endpoint: String,
    page_size: usize,
    importance_re: Regex,
    client: reqwest::Client,
}

impl TitleDiscoverer {
    pub fn new(api_endpoint: &str, importance_tag: &str, page_size: usize) -> Result<Self> {
        let pattern = format!("{}=([\\w-]+)", regex::escape(importance_tag));
        Ok(Self {
            api_endpoint: api_endpoint.to_string(),
            page_size: page_size.clamp(1, MAX_SEARCH_PAGE_SIZE),
            importance_re: Regex::new(&pattern)
                .map_err(|e| anyhow!("Bad importance tag {importance_tag:?}: {e}"))?,
            client: reqwest::Client::new(),
        })
    }

    /// Pages through the search results for `search_query`. A failed request
    /// ends the loop and returns whatever was accumulated; the only clean
    /// termination is a response without a continuation cursor.
    pub async fn discover(&self, search_query: &str) -> Vec<(String, Importance)> {
        let mut results: Vec<(String, Importance)> = Vec::new();
        let mut sroffset: Option<u64> = None;
        loop {
            let limit = self.page_size.to_string();
            let mut params: Vec<(&str, String)> = vec![
                ("action", "query".to_string()),
                ("list", "search".to_string()),
                ("srsearch", search_query.to_string()),
                ("srnamespace", "1".to_string()),
                ("format", "json".to_string()),
                ("srlimit", limit),
            ];
            if let Some(offset) = sroffset {
                params.push(("sroffset", offset.to_string()));
            }
            let response = match self.client.get(&self.api_endpoint).query(&params).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Search request failed, keeping partial results: {e}");
                    break;
                }
            };
            if !response.status().is_success() {
                tracing::warn!(
                    "Search returned HTTP {}, keeping partial results",
                    response.status()
                );
                break;
            }
            let data: Value = match response.json().await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Search response was not JSON, keeping partial results: {e}");
                    break;
                }
            };
            sroffset = self.collect_page(&data, &mut results);
            if sroffset.is_none() {
                break;
            }
        }
        results
    }

    /// Appends one page of search hits to `out` and returns the next
    /// continuation offset, if the response carries one.
    fn collect_page(&self, data: &Value, out: &mut Vec<(String, Importance)>) -> Option<u64> {
        if let Some(pages) = data["query"]["search"].as_array() {
            for page in pages {
                let title = match page["title"].as_str() {
                    Some(title) => title.strip_prefix("Talk:").unwrap_or(title),
                    None => continue,
                };
                let snippet = page["snippet"].as_str().unwrap_or("");
                let importance = self
                    .importance_re
                    .captures(snippet)
                    .and_then(|cap| cap.get(1))
                    .map_or(Importance::Unknown, |m| Importance::from_tag(m.as_str()));
                out.push((title.to_string(), importance));
            }
        }
        data["continue"]["sroffset"].as_u64()
    }
}

/// Resolves article titles to Wikidata QIDs via `prop=pageprops`, in batches
/// of at most [`TITLE_BATCH_SIZE`]. A failed batch contributes nothing; its
/// titles simply stay unresolved.
#[derive(Debug, Clone)]
pub struct QidResolver {
    api_endpoint: String,
    batch_size: usize,
    client: reqwest::Client,
}

impl QidResolver {
    pub fn new(api_endpoint: &str) -> Self {
        Self {
            api_endpoint: api_endpoint.to_string(),
            batch_size: TITLE_BATCH_SIZE,
            client: reqwest::Client::new(),
        }
    }

    pub async fn resolve(&self, titles: &[String]) -> HashMap<String, Option<String>> {
        let mut qid_map = HashMap::new();
        for batch in titles.chunks(self.batch_size.max(1)) {
            let params = [
                ("action", "query".to_string()),
                ("prop", "pageprops".to_string()),
                ("ppprop", "wikibase_item".to_string()),
                ("titles", batch.join("|")),
                ("format", "json".to_string()),
            ];
            match self.get_json(&params).await {
                Ok(data) => Self::collect_batch(&data, &mut qid_map),
                Err(e) => {
                    tracing::warn!("QID resolution failed for a batch of {}: {e}", batch.len());
                }
            }
        }
        qid_map
    }

    async fn get_json(&self, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(&self.api_endpoint)
            .query(params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP status {}", response.status()));
        }
        Ok(response.json().await?)
    }

    fn collect_batch(data: &Value, out: &mut HashMap<String, Option<String>>) {
        let pages = match data["query"]["pages"].as_object() {
            Some(pages) => pages,
            None => return,
        };
        for page in pages.values() {
            let title = match page["title"].as_str() {
                Some(title) => title.strip_prefix("Talk:").unwrap_or(title),
                None => continue,
            };
            let qid = page["pageprops"]["wikibase_item"]
                .as_str()
                .map(str::to_string);
            out.insert(title.to_string(), qid);
        }
    }
}

/// Fetches current revision byte sizes for resolved items via
/// `prop=revisions&rvprop=size`, batched like [`QidResolver`], and builds the
/// persisted size index. Missing pages are skipped, not errors.
#[derive(Debug, Clone)]
pub struct SizeFetcher {
    api_endpoint: String,
    batch_size: usize,
    client: reqwest::Client,
}

impl SizeFetcher {
    pub fn new(api_endpoint: &str) -> Self {
        Self {
            api_endpoint: api_endpoint.to_string(),
            batch_size: TITLE_BATCH_SIZE,
            client: reqwest::Client::new(),
        }
    }

    pub async fn fetch_sizes(&self, table: &TrackedItemTable) -> SizeIndex {
        let title_to_qid: HashMap<String, String> = table
            .items()
            .iter()
            .filter_map(|item| Some((item.title.clone(), item.qid.clone()?)))
            .collect();
        let mut titles: Vec<String> = title_to_qid.keys().cloned().collect();
        titles.sort();
        let mut sizes: HashMap<String, u64> = HashMap::new();
        for batch in titles.chunks(self.batch_size.max(1)) {
            let params = [
                ("action", "query".to_string()),
                ("prop", "revisions".to_string()),
                ("rvprop", "size".to_string()),
                ("titles", batch.join("|")),
                ("format", "json".to_string()),
            ];
            let response = match self.client.get(&self.api_endpoint).query(&params).send().await
            {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::warn!("Size fetch returned HTTP {}", response.status());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Size fetch failed for a batch of {}: {e}", batch.len());
                    continue;
                }
            };
            match response.json::<Value>().await {
                Ok(data) => Self::collect_batch(&data, &title_to_qid, &mut sizes),
                Err(e) => tracing::warn!("Size fetch response was not JSON: {e}"),
            }
        }
        SizeIndex::new(sizes)
    }

    fn collect_batch(
        data: &Value,
        title_to_qid: &HashMap<String, String>,
        out: &mut HashMap<String, u64>,
    ) {
        let pages = match data["query"]["pages"].as_object() {
            Some(pages) => pages,
            None => return,
        };
        for page in pages.values() {
            let title = match page["title"].as_str() {
                Some(title) => title,
                None => continue,
            };
            let size = match page["revisions"][0]["size"].as_u64() {
                Some(size) => size,
                None => continue,
            };
            if let Some(qid) = title_to_qid.get(title) {
                out.insert(qid.clone(), size);
            }
        }
    }
}

/// One-time discovery pass: search for banner-tagged talk pages, resolve
/// their titles to QIDs, and assemble the tracked-item table.
pub async fn build_tracked_table(
    discoverer: &TitleDiscoverer,
    resolver: &QidResolver,
    search_query: &str,
) -> TrackedItemTable {
    let page_info = discoverer.discover(search_query).await;
    tracing::info!("Discovered {} tagged talk pages", page_info.len());
    let titles: Vec<String> = page_info.iter().map(|(title, _)| title.clone()).collect();
    let qid_map = resolver.resolve(&titles).await;
    let items = page_info
        .into_iter()
        .map(|(title, importance)| TrackedItem {
            qid: qid_map.get(&title).cloned().flatten(),
            title,
            importance,
        })
        .collect();
    TrackedItemTable::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discoverer() -> TitleDiscoverer {
        TitleDiscoverer::new("http://127.0.0.1/w/api.php", "COMPBIO-importance", 2)
            .expect("discoverer builds")
    }

    fn search_page(hits: &[(&str, &str)], next_offset: Option<u64>) -> Value {
        let results: Vec<Value> = hits
            .iter()
            .map(|(title, snippet)| json!({"title": title, "snippet": snippet}))
            .collect();
        let mut page = json!({"query": {"search": results}});
        if let Some(offset) = next_offset {
            page["continue"] = json!({"sroffset": offset});
        }
        page
    }

    #[test]
    fn test_collect_page_extracts_tiers() {
        let d = discoverer();
        let page = search_page(
            &[
                ("Talk:Protein", "... COMPBIO-importance=top ..."),
                ("Talk:BLAST", "banner without the marker"),
            ],
            None,
        );
        let mut out = Vec::new();
        let next = d.collect_page(&page, &mut out);
        assert_eq!(next, None);
        assert_eq!(
            out,
            vec![
                ("Protein".to_string(), Importance::Top),
                ("BLAST".to_string(), Importance::Unknown),
            ]
        );
    }

    #[test]
    fn test_pagination_terminates_after_expected_pages() {
        // 5 results with page size 2: 3 pages, each result seen exactly once
        let d = discoverer();
        let pages = [
            search_page(
                &[("Talk:A", "COMPBIO-importance=top"), ("Talk:B", "COMPBIO-importance=high")],
                Some(2),
            ),
            search_page(
                &[("Talk:C", "COMPBIO-importance=mid"), ("Talk:D", "COMPBIO-importance=low")],
                Some(4),
            ),
            search_page(&[("Talk:E", "COMPBIO-importance=top")], None),
        ];
        let mut out = Vec::new();
        let mut cursor: Option<u64> = None;
        let mut pages_visited = 0;
        for page in &pages {
            pages_visited += 1;
            cursor = d.collect_page(page, &mut out);
            if cursor.is_none() {
                break;
            }
        }
        assert_eq!(pages_visited, 3);
        assert_eq!(cursor, None);
        let titles: Vec<&str> = out.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_collect_page_continuation_cursor() {
        let d = discoverer();
        let page = search_page(&[("Talk:A", "COMPBIO-importance=top")], Some(500));
        let mut out = Vec::new();
        assert_eq!(d.collect_page(&page, &mut out), Some(500));
    }

    #[test]
    fn test_page_size_clamped() {
        let d = TitleDiscoverer::new("http://127.0.0.1/w/api.php", "X-importance", 9999)
            .expect("discoverer builds");
        assert_eq!(d.page_size, MAX_SEARCH_PAGE_SIZE);
    }

    #[test]
    fn test_resolver_collect_batch() {
        let data = json!({"query": {"pages": {
            "123": {"title": "Talk:Protein", "pageprops": {"wikibase_item": "Q8054"}},
            "456": {"title": "Talk:BLAST"}
        }}});
        let mut out = HashMap::new();
        QidResolver::collect_batch(&data, &mut out);
        assert_eq!(out.get("Protein"), Some(&Some("Q8054".to_string())));
        assert_eq!(out.get("BLAST"), Some(&None));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_resolver_collect_batch_idempotent() {
        let data = json!({"query": {"pages": {
            "123": {"title": "Protein", "pageprops": {"wikibase_item": "Q8054"}}
        }}});
        let mut first = HashMap::new();
        QidResolver::collect_batch(&data, &mut first);
        let mut second = first.clone();
        QidResolver::collect_batch(&data, &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_size_fetcher_collect_batch() {
        let title_to_qid: HashMap<String, String> =
            [("Protein".to_string(), "Q8054".to_string())].into();
        let data = json!({"query": {"pages": {
            "123": {"title": "Protein", "revisions": [{"size": 54321}]},
            "-1": {"title": "Gone", "missing": ""}
        }}});
        let mut out = HashMap::new();
        SizeFetcher::collect_batch(&data, &title_to_qid, &mut out);
        assert_eq!(out.get("Q8054"), Some(&54_321));
        assert_eq!(out.len(), 1);
    }
}
