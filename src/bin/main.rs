use missing_articles_rs::app_state::AppState;
use missing_articles_rs::command_line::{command_line_usage, get_config};
use missing_articles_rs::webserver::WebServer;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let config = get_config();

    let args = std::env::args();
    if args.len() > 1 {
        command_line_usage(&config).await?;
    } else {
        let app_state = Arc::new(AppState::new_from_config(&config)?);
        let webserver = WebServer::new(app_state);
        webserver.run().await?;
    }
    Ok(())
}
