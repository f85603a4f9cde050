use crate::aggregator::missing_articles_by_importance;
use crate::app_state::{AppState, Settings};
use crate::discovery::{build_tracked_table, QidResolver, SizeFetcher, TitleDiscoverer};
use crate::form_parameters::FormParameters;
use crate::missing_articles::is_valid_language_code;
use crate::render::render_json;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::env;
use std::fs::File;
use std::sync::Arc;
use url::form_urlencoded;

/// One-shot CLI dispatch. `discover` rebuilds the tracked-item table,
/// `sizes` rebuilds the byte-size index, anything else is treated as a query
/// string (for example `language=fr`) and answered as JSON on stdout.
pub async fn command_line_usage(config: &Value) -> Result<()> {
    let mut args = std::env::args();
    let _ = args.next(); // the actual command
    let argument: String = args
        .next()
        .ok_or_else(|| anyhow!("No command line argument provided"))?;

    match argument.as_str() {
        "discover" => run_discovery(&Settings::from_config(config)).await,
        "sizes" => run_size_fetch(&Settings::from_config(config)).await,
        query => run_query(config, query).await,
    }
}

async fn run_discovery(settings: &Settings) -> Result<()> {
    let discoverer = TitleDiscoverer::new(
        &settings.api_endpoint,
        &settings.importance_tag,
        crate::discovery::MAX_SEARCH_PAGE_SIZE,
    )?;
    let resolver = QidResolver::new(&settings.api_endpoint);
    let table = build_tracked_table(&discoverer, &resolver, &settings.search_query).await;
    table.write_tsv_file(&settings.tracked_items_file)?;
    tracing::info!(
        "Saved {} entries to {}",
        table.len(),
        settings.tracked_items_file
    );
    Ok(())
}

async fn run_size_fetch(settings: &Settings) -> Result<()> {
    let table = crate::tracked_items::TrackedItemTable::from_tsv_file(&settings.tracked_items_file)?;
    let fetcher = SizeFetcher::new(&settings.api_endpoint);
    let size_index = fetcher.fetch_sizes(&table).await;
    size_index.write_json_file(&settings.size_index_file)?;
    tracing::info!(
        "Saved byte sizes for {} items to {}",
        size_index.len(),
        settings.size_index_file
    );
    Ok(())
}

async fn run_query(config: &Value, query: &str) -> Result<()> {
    let app_state = Arc::new(AppState::new_from_config(config)?);
    let parameter_pairs = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let form_parameters = FormParameters::new_from_pairs(parameter_pairs);
    let language = form_parameters
        .get_param("language")
        .ok_or_else(|| anyhow!("Missing parameter 'language'"))?
        .trim()
        .to_ascii_lowercase();
    if !is_valid_language_code(&language) {
        return Err(anyhow!("Not a language code: {language:?}"));
    }
    let querier = app_state.querier();
    let buckets = missing_articles_by_importance(
        app_state.table(),
        app_state.size_index(),
        &querier,
        &language,
    )
    .await?;
    let response = render_json(
        &buckets,
        &language,
        None,
        form_parameters.has_param("json-pretty"),
    );
    println!("{}", response.s);
    Ok(())
}

/// # Panics
/// Panics if the config file can not be opened or parsed.
pub fn get_config() -> Value {
    let basedir = env::current_dir()
        .expect("Can't get CWD")
        .to_str()
        .expect("Can't convert CWD to_str")
        .to_string();
    let path = basedir + "/config.json";
    let file =
        File::open(&path).unwrap_or_else(|_| panic!("Can not open config file at {}", &path));
    let config: Value =
        serde_json::from_reader(file).expect("Can not parse JSON from config file");
    config
}
