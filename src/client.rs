use std::env;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS,
    CLIENT_TOKEN_REFRESH_FAILURES, CLIENT_TOKEN_REFRESHES,
};
use crate::types::{
    AuthResponse, ChatSessionRecord, Credentials, EmailRequest, FileId, FileRecord, HealthStatus,
    MessageRecord, NewMessage, ProcessRequest, ProcessResponse, RefreshTokenRequest,
    RenameRequest, ResetPasswordRequest, SessionFileLink, SessionId, UploadResponse,
    VerifyEmailRequest,
};
use crate::upload::LocalFile;

const DEFAULT_API_URL: &str = "https://localhost:8000/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const API_URL_ENV: &str = "DOCCHAT_API_URL";
const GENERIC_FAILURE: &str = "Request failed";

/// Client for the document-chat REST API.
///
/// Authentication rides on the `access_token` and `refresh_token` cookies the
/// backend sets at login, so the client keeps a cookie store.  A request that
/// comes back 401 triggers one token refresh and one retry.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

enum Body<'a> {
    Empty,
    Json(Value),
    Multipart(&'a LocalFile),
}

struct Call<'a> {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Body<'a>,
    skip_auth_refresh: bool,
}

impl<'a> Call<'a> {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
            skip_auth_refresh: false,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    fn multipart(mut self, file: &'a LocalFile) -> Self {
        self.body = Body::Multipart(file);
        self
    }

    /// The session refresh call, which never triggers a refresh itself.
    fn refresh() -> Result<Self> {
        let mut call = Self::post("user/refresh-token").json(&RefreshTokenRequest::default())?;
        call.skip_auth_refresh = true;
        Ok(call)
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }
}

impl ApiClient {
    /// Create a new client.
    ///
    /// The base URL can be provided directly or read from the DOCCHAT_API_URL
    /// environment variable; it defaults to `https://localhost:8000/`.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let raw = base_url
            .or_else(|| env::var(API_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = normalize_base_url(&raw)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus> {
        self.execute(Call::get("health")).await
    }

    fn endpoint(&self, call: &Call<'_>) -> Result<Url> {
        let mut url = self.base_url.join(&call.path)?;
        if !call.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &call.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    async fn send_once(&self, call: &Call<'_>) -> Result<Response> {
        let url = self.endpoint(call)?;
        let mut request = self
            .client
            .request(call.method.clone(), url)
            .header(header::ACCEPT, HeaderValue::from_static("application/json"));
        request = match &call.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Multipart(file) => request.multipart(file.to_form()?),
        };
        request.send().await.map_err(|e| self.transport_error(e))
    }

    /// Issue a call, refreshing the session cookie once on 401.
    async fn execute<T: DeserializeOwned>(&self, call: Call<'_>) -> Result<T> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        tracing::debug!(method = %call.method, path = %call.path, "sending request");

        let mut response = self.send_once(&call).await?;
        if response.status() == StatusCode::UNAUTHORIZED
            && !call.skip_auth_refresh
            && self.refresh_session().await
        {
            CLIENT_REQUEST_RETRIES.click();
            tracing::debug!(path = %call.path, "retrying after token refresh");
            response = self.send_once(&call).await?;
        }
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::debug!(path = %call.path, error = %err, "request failed");
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// One refresh attempt.  Never recurses: the refresh call is flagged to
    /// skip the refresh path and is sent without `execute`.
    async fn refresh_session(&self) -> bool {
        CLIENT_TOKEN_REFRESHES.click();
        let Ok(call) = Call::refresh() else {
            return false;
        };
        let refreshed = match self.send_once(&call).await {
            Ok(response) if response.status().is_success() => response
                .json::<AuthResponse>()
                .await
                .map(|body| body.success)
                .unwrap_or(false),
            Ok(response) => {
                tracing::debug!(status = %response.status(), "token refresh rejected");
                false
            }
            Err(err) => {
                tracing::debug!(error = %err, "token refresh failed");
                false
            }
        };
        if !refreshed {
            CLIENT_TOKEN_REFRESH_FAILURES.click();
        }
        refreshed
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        let error_message = extract_error_message(&error_body);

        match status_code {
            400 | 422 => Error::bad_request(error_message),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None, None),
            408 => Error::timeout(error_message, None),
            413 => Error::validation(error_message, Some("file".to_string())),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_message),
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Pull the human-readable message out of an error body.
///
/// FastAPI puts it in `detail` (a string, or a list of validation errors);
/// other handlers use `error` or `message`.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() || trimmed.starts_with('<') {
            GENERIC_FAILURE.to_string()
        } else {
            trimmed.to_string()
        };
    };
    for key in ["detail", "error", "message"] {
        match value.get(key) {
            Some(Value::String(message)) if !message.is_empty() => return message.clone(),
            Some(Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }
    }
    GENERIC_FAILURE.to_string()
}

#[async_trait::async_trait]
impl Backend for ApiClient {
    async fn register(&self, credentials: &Credentials) -> Result<AuthResponse> {
        self.execute(Call::post("user/register").json(credentials)?)
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        self.execute(Call::post("user/login").json(credentials)?)
            .await
    }

    async fn logout(&self) -> Result<AuthResponse> {
        self.execute(Call::post("user/logout").json(&RefreshTokenRequest::default())?)
            .await
    }

    async fn refresh_token(&self) -> Result<AuthResponse> {
        self.execute(Call::refresh()?).await
    }

    async fn forgot_password(&self, email: &str) -> Result<AuthResponse> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        self.execute(Call::post("user/forgot-password").json(&body)?)
            .await
    }

    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<AuthResponse> {
        self.execute(Call::post("user/reset-password").json(request)?)
            .await
    }

    async fn verify_email(&self, request: &VerifyEmailRequest) -> Result<AuthResponse> {
        self.execute(Call::post("user/verify").json(request)?).await
    }

    async fn resend_verification(&self, email: &str) -> Result<AuthResponse> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        self.execute(Call::post("user/resend-verification").json(&body)?)
            .await
    }

    async fn profile(&self) -> Result<AuthResponse> {
        self.execute(Call::get("user/profile")).await
    }

    async fn create_session(&self, title: &str) -> Result<ChatSessionRecord> {
        self.execute(Call::post("chat/create").query("title", title))
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSessionRecord>> {
        // The backend answers `null` when the user has no sessions.
        let sessions: Option<Vec<ChatSessionRecord>> =
            self.execute(Call::get("chat/user/")).await?;
        Ok(sessions.unwrap_or_default())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<ChatSessionRecord> {
        self.execute(Call::get(format!("chat/session/{session_id}")))
            .await
    }

    async fn get_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>> {
        self.execute(Call::get(format!("chat/session/{session_id}/messages")))
            .await
    }

    async fn save_message(
        &self,
        session_id: SessionId,
        message: &NewMessage,
    ) -> Result<MessageRecord> {
        self.execute(Call::post(format!("chat/session/{session_id}/messages")).json(message)?)
            .await
    }

    async fn upload_file(&self, session_id: SessionId, file: &LocalFile) -> Result<FileRecord> {
        let response: UploadResponse = self
            .execute(Call::post(format!("chat/session/{session_id}/upload")).multipart(file))
            .await?;
        Ok(response.into_record(file.name(), file.mime_type(), file.size()))
    }

    async fn process_message(
        &self,
        session_id: SessionId,
        user_message: &str,
    ) -> Result<ProcessResponse> {
        let body = ProcessRequest {
            user_message: user_message.to_string(),
        };
        self.execute(Call::post(format!("chat/session/{session_id}/process")).json(&body)?)
            .await
    }

    async fn rename_session(
        &self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<ChatSessionRecord> {
        let body = RenameRequest {
            new_name: new_name.to_string(),
        };
        let call = Call::new(Method::PUT, format!("chat/session/{session_id}/rename")).json(&body)?;
        self.execute(call).await
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<bool> {
        self.execute(Call::new(
            Method::DELETE,
            format!("chat/session/{session_id}"),
        ))
        .await
    }

    async fn list_session_files(&self, session_id: SessionId) -> Result<Vec<SessionFileLink>> {
        self.execute(Call::get(format!("chat/session/{session_id}/files")))
            .await
    }

    async fn get_file(&self, file_id: FileId) -> Result<FileRecord> {
        self.execute(Call::get(format!("chat/file/{file_id}"))).await
    }

    async fn delete_file(&self, file_id: FileId) -> Result<bool> {
        self.execute(Call::new(Method::DELETE, format!("chat/file/{file_id}")))
            .await
    }
}
