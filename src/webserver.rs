use crate::aggregator::missing_articles_by_importance;
use crate::app_state::AppState;
use crate::content_type::ContentType;
use crate::form_parameters::FormParameters;
use crate::missing_articles::is_valid_language_code;
use crate::render::{render_html, render_json, MyResponse};
use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::form_urlencoded;

const MAX_POST_SIZE: u64 = 1024 * 64;
static NOTFOUND: &[u8] = b"Not Found";
static BODY_TOO_BIG: &[u8] = b"POST body too large";

#[derive(Debug, Clone, Default)]
pub struct WebServer {
    app_state: Arc<AppState>,
}

impl WebServer {
    pub fn new(app_state: Arc<AppState>) -> Self {
        WebServer { app_state }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = self.start_webserver().await?;

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("web_server: Cannot accept request: {e}");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let me = self.clone();

            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service_fn(|req| me.process_request(req)))
                    .await
                {
                    tracing::error!("Error serving connection: {err}");
                }
            });
        }
    }

    async fn start_webserver(&self) -> Result<TcpListener> {
        let settings = self.app_state.settings();
        let ip_address: std::net::Ipv4Addr = settings
            .http_server
            .parse()
            .with_context(|| format!("Invalid http_server IP address: '{}'", settings.http_server))?;
        let addr = SocketAddr::from((ip_address, settings.http_port));
        tracing::info!("Listening on http://{addr}");

        TcpListener::bind(addr)
            .await
            .with_context(|| format!("web_server: Cannot bind to {addr}"))
    }

    async fn process_request(
        &self,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let path = req.uri().path().to_string();

        // URL GET query
        if let Some(query) = req.uri().query() {
            if !query.is_empty() {
                return self.process_from_query(query).await;
            }
        };

        // POST
        if req.method() == Method::POST {
            let upper = req.body().size_hint().upper().unwrap_or(u64::MAX);
            if upper > MAX_POST_SIZE {
                let mut resp = Response::new(Full::from(BODY_TOO_BIG));
                *resp.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
                return Ok(resp);
            }
            let collected = match req.collect().await {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to read POST body: {e}");
                    let mut resp =
                        Response::new(Full::from(b"Internal Server Error".as_ref()));
                    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    return Ok(resp);
                }
            };
            let query = collected.to_bytes();
            if !query.is_empty() {
                let query = String::from_utf8_lossy(&query);
                return self.process_from_query(&query).await;
            }
        }

        // Fallback: Static file
        self.serve_file_path(&path).await
    }

    async fn process_from_query(&self, query: &str) -> Result<Response<Full<Bytes>>, Infallible> {
        let ret = self.process_form(query).await;
        let response = Response::builder()
            .header(header::CONTENT_TYPE, ret.content_type.as_str())
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(Full::from(ret.s))
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP response: {e}");
                Response::new(Full::from(b"Internal Server Error".as_ref()))
            });
        Ok(response)
    }

    async fn process_form(&self, parameters: &str) -> MyResponse {
        let parameter_pairs = form_urlencoded::parse(parameters.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let form_parameters = FormParameters::new_from_pairs(parameter_pairs);

        // No language selected yet: just show the form page
        let language = match form_parameters.get_param("language") {
            Some(language) => language.trim().to_ascii_lowercase(),
            None => {
                return MyResponse {
                    s: self.app_state.get_main_page(),
                    content_type: ContentType::HTML,
                }
            }
        };
        if !is_valid_language_code(&language) {
            return self
                .app_state
                .render_error(format!("Not a language code: {language:?}"), &form_parameters);
        }

        tracing::info!("Querying missing articles for language {language}");
        let querier = self.app_state.querier();
        let result = missing_articles_by_importance(
            self.app_state.table(),
            self.app_state.size_index(),
            &querier,
            &language,
        )
        .await;

        // A failed existence query surfaces as an explicit error, never as an
        // empty result list.
        let buckets = match result {
            Ok(buckets) => buckets,
            Err(e) => {
                tracing::error!("Existence query failed: {e}");
                return self.app_state.render_error(e.to_string(), &form_parameters);
            }
        };

        match form_parameters.get_param_default("format", "html").as_str() {
            "json" => render_json(
                &buckets,
                &language,
                form_parameters.params.get("callback"),
                form_parameters.has_param("json-pretty"),
            ),
            _ => render_html(&self.app_state.get_main_page(), &buckets, &language),
        }
    }

    async fn serve_file_path(&self, filename: &str) -> Result<Response<Full<Bytes>>, Infallible> {
        match filename {
            "/" | "/index.html" => {
                self.simple_file_send("/index.html", "text/html; charset=utf-8")
                    .await
            }
            "/favicon.ico" => {
                self.simple_file_send(filename, "image/x-icon; charset=utf-8")
                    .await
            }
            "/robots.txt" => {
                self.simple_file_send(filename, "text/plain; charset=utf-8")
                    .await
            }
            _ => Self::not_found(),
        }
    }

    /// HTTP status code 404
    fn not_found() -> Result<Response<Full<Bytes>>, Infallible> {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(NOTFOUND.into())
            .unwrap_or_else(|_| Response::new(Full::from(NOTFOUND))))
    }

    async fn simple_file_send(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let filename = format!("html{filename}");
        match std::fs::read(filename) {
            Ok(bytes) => {
                let body = Full::from(bytes);
                let response = Response::builder()
                    .header(header::CONTENT_TYPE, content_type)
                    .body(body)
                    .unwrap_or_else(|_| Response::new(Full::from(NOTFOUND)));
                Ok(response)
            }
            Err(_) => Self::not_found(),
        }
    }
}
