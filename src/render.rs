use crate::content_type::ContentType;
use crate::importance::Importance;
use crate::missing_articles::MissingArticleRecord;
use serde_json::Value;
use std::collections::HashMap;

pub type ImportanceBuckets = HashMap<Importance, Vec<MissingArticleRecord>>;

#[derive(Debug, Clone)]
pub struct MyResponse {
    pub s: String,
    pub content_type: ContentType,
}

/// Renders the per-tier buckets as JSON, optionally wrapped in a JSONP
/// callback. Tiers appear in fixed order (top, high, mid, low).
pub fn render_json(
    buckets: &ImportanceBuckets,
    language: &str,
    callback: Option<&String>,
    pretty: bool,
) -> MyResponse {
    let mut tiers = serde_json::Map::new();
    for importance in Importance::QUERIED {
        if let Some(records) = buckets.get(&importance) {
            tiers.insert(importance.as_str().to_string(), json!(records));
        }
    }
    let value = json!({
        "language": language,
        "missing_articles": Value::Object(tiers),
    });
    output_json(&value, callback, pretty)
}

pub fn output_json(value: &Value, callback: Option<&String>, pretty: bool) -> MyResponse {
    let json_string = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|e| format!("{{\"error\":\"JSON serialization failed: {e}\"}}"));
    match callback {
        Some(callback) => MyResponse {
            s: format!("{callback}({json_string})"),
            content_type: ContentType::JSONP,
        },
        None => MyResponse {
            s: json_string,
            content_type: if pretty {
                ContentType::Plain
            } else {
                ContentType::JSON
            },
        },
    }
}

/// Renders the buckets into the form page, replacing its output placeholder.
pub fn render_html(main_page: &str, buckets: &ImportanceBuckets, language: &str) -> MyResponse {
    let mut output = format!(
        "<h1>Articles missing in <code>{}</code></h1>\n",
        htmlescape::encode_minimal(language)
    );
    for importance in Importance::QUERIED {
        let records = match buckets.get(&importance) {
            Some(records) => records,
            None => continue,
        };
        output += &format!(
            "<h2>{} importance ({})</h2>\n",
            importance.as_str(),
            records.len()
        );
        if records.is_empty() {
            output += "<p>No missing articles.</p>\n";
            continue;
        }
        output += "<table class='table table-striped'>\n";
        output += "<tr><th>Article</th><th>Item</th><th>Size (bytes)</th></tr>\n";
        for record in records {
            output += &render_record_row(record);
        }
        output += "</table>\n";
    }
    let html = main_page
        .replace("<!--language-->", &htmlescape::encode_minimal(language))
        .replace("<!--output-->", &output);
    MyResponse {
        s: html,
        content_type: ContentType::HTML,
    }
}

fn render_record_row(record: &MissingArticleRecord) -> String {
    let title = htmlescape::encode_minimal(&record.title);
    let title_cell = match &record.en_link {
        Some(link) => format!(
            "<a href=\"{}\" target=\"_blank\">{title}</a>",
            htmlescape::encode_attribute(link)
        ),
        None => title,
    };
    let qid = htmlescape::encode_minimal(&record.qid);
    let size_cell = match record.size_bytes {
        Some(bytes) => bytes.to_string(),
        None => "unknown".to_string(),
    };
    format!(
        "<tr><td>{title_cell}</td><td><a href=\"https://www.wikidata.org/wiki/{qid}\" target=\"_blank\">{qid}</a></td><td>{size_cell}</td></tr>\n"
    )
}
