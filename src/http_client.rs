//! Verb-shaped calls on top of the request queue.
//!
//! Every call becomes one `queue_request` with a default priority and dedup
//! policy per verb:
//!
//! | verb     | priority | dedup by default |
//! |----------|----------|------------------|
//! | GET      | 5        | yes              |
//! | POST     | 7        | no (opt-in)      |
//! | PUT      | 8        | no (opt-in)      |
//! | PATCH    | 8        | no (opt-in)      |
//! | DELETE   | 9        | no (opt-in)      |
//! | upload   | 6        | never            |
//! | download | 4        | never            |
//!
//! The thunk attaches the bearer token, tags the call with an
//! `X-Request-ID`, unwraps `{success, data, message}` envelopes and signs the
//! session out on a 401.

use bytes::Bytes;
use futures::FutureExt;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::auth::Session;
use crate::cache::{make_cache_key, unique_key};
use crate::config::PanelConfig;
use crate::error::RequestError;
use crate::metrics::{REQUEST_LATENCY, SLOW_REQUESTS};
use crate::request_manager::RequestManager;

pub const GET_PRIORITY: i32 = 5;
pub const POST_PRIORITY: i32 = 7;
pub const PUT_PRIORITY: i32 = 8;
pub const PATCH_PRIORITY: i32 = 8;
pub const DELETE_PRIORITY: i32 = 9;
pub const UPLOAD_PRIORITY: i32 = 6;
pub const DOWNLOAD_PRIORITY: i32 = 4;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub priority: Option<i32>,
    // None keeps the verb's default policy
    pub dedup: Option<bool>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn dedup(mut self, dedup: bool) -> Self {
        self.dedup = Some(dedup);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

// What the queue hands back for a backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Json(Value),
    File(Download),
}

pub struct UploadFile {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            bytes,
            mime: None,
            fields: Vec::new(),
        }
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    fn into_form(self) -> Result<reqwest::multipart::Form, RequestError> {
        let mut part = reqwest::multipart::Part::bytes(self.bytes).file_name(self.file_name);
        if let Some(mime) = self.mime {
            part = part
                .mime_str(&mime)
                .map_err(|err| RequestError::InvalidRequest(err.to_string()))?;
        }
        let mut form = reqwest::multipart::Form::new().part(self.field, part);
        for (key, value) in self.fields {
            form = form.text(key, value);
        }
        Ok(form)
    }
}

enum Body {
    Empty,
    Json(Value),
    Upload(UploadFile),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Expect {
    Json,
    File,
}

pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    manager: RequestManager<Response>,
    session: Session,
    slow_threshold: Duration,
}

impl HttpClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        slow_threshold: Duration,
        manager: RequestManager<Response>,
        session: Session,
    ) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RequestError::InvalidRequest(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            manager,
            session,
            slow_threshold,
        })
    }

    pub fn from_config(
        config: &PanelConfig,
        manager: RequestManager<Response>,
        session: Session,
    ) -> Result<Self, RequestError> {
        Self::new(
            &config.api_base_url,
            config.request_timeout,
            config.slow_request_threshold,
            manager,
            session,
        )
    }

    pub fn manager(&self) -> &RequestManager<Response> {
        &self.manager
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn clear_cache(&self, prefix: Option<&str>) {
        self.manager.clear_cache(prefix);
    }

    pub fn get(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        self.dispatch(Method::GET, path, Body::Empty, options, GET_PRIORITY, true, Expect::Json)
            .map(into_json)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        let value = self.get(path, options).await?;
        serde_json::from_value(value).map_err(|err| RequestError::Decode(err.to_string()))
    }

    pub fn post(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        self.dispatch(Method::POST, path, Body::Json(body), options, POST_PRIORITY, false, Expect::Json)
            .map(into_json)
    }

    pub fn put(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        self.dispatch(Method::PUT, path, Body::Json(body), options, PUT_PRIORITY, false, Expect::Json)
            .map(into_json)
    }

    pub fn patch(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        self.dispatch(Method::PATCH, path, Body::Json(body), options, PATCH_PRIORITY, false, Expect::Json)
            .map(into_json)
    }

    pub fn delete(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        self.dispatch(Method::DELETE, path, Body::Empty, options, DELETE_PRIORITY, false, Expect::Json)
            .map(into_json)
    }

    pub fn upload_file(
        &self,
        path: &str,
        file: UploadFile,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        let options = RequestOptions {
            dedup: Some(false),
            ..options
        };
        self.dispatch(Method::POST, path, Body::Upload(file), options, UPLOAD_PRIORITY, false, Expect::Json)
            .map(into_json)
    }

    pub fn download_file(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Download, RequestError>> + Send + 'static {
        let options = RequestOptions {
            dedup: Some(false),
            ..options
        };
        self.dispatch(Method::GET, path, Body::Empty, options, DOWNLOAD_PRIORITY, false, Expect::File)
            .map(|outcome| match outcome? {
                Response::File(download) => Ok(download),
                Response::Json(_) => Err(RequestError::Decode("expected a file response".to_string())),
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Body,
        options: RequestOptions,
        default_priority: i32,
        dedup_by_default: bool,
        expect: Expect,
    ) -> impl Future<Output = Result<Response, RequestError>> + Send + 'static {
        let priority = options.priority.unwrap_or(default_priority);
        let key = if options.dedup.unwrap_or(dedup_by_default) {
            let json = match &body {
                Body::Json(value) => Some(value),
                _ => None,
            };
            make_cache_key(method.as_str(), path, &options.query, json)
        } else {
            unique_key(method.as_str(), path)
        };

        let call = Call {
            http: self.http.clone(),
            url: endpoint_url(&self.base_url, path),
            method,
            query: options.query,
            body,
            expect,
            session: self.session.clone(),
            slow_threshold: self.slow_threshold,
        };
        self.manager.queue_request(key, move || call.execute(), priority)
    }
}

// Everything a queued thunk needs to perform one backend call
struct Call {
    http: reqwest::Client,
    url: String,
    method: Method,
    query: Vec<(String, String)>,
    body: Body,
    expect: Expect,
    session: Session,
    slow_threshold: Duration,
}

impl Call {
    async fn execute(self) -> Result<Response, RequestError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut url =
            Url::parse(&self.url).map_err(|err| RequestError::InvalidRequest(err.to_string()))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let mut request = self
            .http
            .request(self.method.clone(), url)
            .header(REQUEST_ID_HEADER, &request_id)
            .header(ACCEPT, "application/json");
        if let Some(token) = self.session.bearer_token() {
            request = request.bearer_auth(token);
        }
        request = match self.body {
            Body::Empty => request,
            Body::Json(value) => request.json(&value),
            Body::Upload(file) => request.multipart(file.into_form()?),
        };

        let started = Instant::now();
        let result = request.send().await;
        let elapsed = started.elapsed();
        REQUEST_LATENCY.observe(elapsed.as_secs_f64());
        if elapsed > self.slow_threshold {
            SLOW_REQUESTS.inc();
            warn!(
                request_id = %request_id,
                method = %self.method,
                url = %self.url,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow request"
            );
        }

        let response = result.map_err(RequestError::from)?;
        let status = response.status();
        debug!(
            request_id = %request_id,
            method = %self.method,
            url = %self.url,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "request finished"
        );

        if status == StatusCode::UNAUTHORIZED {
            let message = error_message(status, &response.bytes().await.unwrap_or_default());
            self.session.handle_unauthorized(&message);
            return Err(RequestError::Unauthorized(message));
        }
        if !status.is_success() {
            let message = error_message(status, &response.bytes().await.unwrap_or_default());
            return Err(RequestError::Status {
                status: status.as_u16(),
                message,
            });
        }

        match self.expect {
            Expect::File => {
                let headers = response.headers();
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let filename = headers
                    .get(CONTENT_DISPOSITION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(disposition_filename);
                let bytes = response.bytes().await.map_err(RequestError::from)?;
                Ok(Response::File(Download {
                    bytes,
                    content_type,
                    filename,
                }))
            }
            Expect::Json => {
                let bytes = response.bytes().await.map_err(RequestError::from)?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(Response::Json(Value::Null));
                }
                let body: Value = serde_json::from_slice(&bytes)
                    .map_err(|err| RequestError::Decode(err.to_string()))?;
                unwrap_envelope(body).map(Response::Json)
            }
        }
    }
}

fn into_json(outcome: Result<Response, RequestError>) -> Result<Value, RequestError> {
    match outcome? {
        Response::Json(value) => Ok(value),
        Response::File(_) => Err(RequestError::Decode("expected a json response".to_string())),
    }
}

/// `{success: true, data}` becomes `data`, `{success: false, message}` an
/// [`RequestError::Api`]. Bodies without a boolean `success` pass through.
pub fn unwrap_envelope(body: Value) -> Result<Value, RequestError> {
    match body {
        Value::Object(mut fields) if fields.get("success").is_some_and(Value::is_boolean) => {
            if fields.get("success").and_then(Value::as_bool) == Some(true) {
                Ok(fields.remove("data").unwrap_or(Value::Null))
            } else {
                let message = fields
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("request failed")
                    .to_string();
                Err(RequestError::Api(message))
            }
        }
        other => Ok(other),
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = fields.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    }
}

fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
