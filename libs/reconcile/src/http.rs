//! HTTP backend over `reqwest`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{AssignReceipt, AssignRequest, Backend};
use crate::error::ConsoleError;
use crate::idempotency::{assign_key, IDEMPOTENCY_KEY_HEADER};
use crate::model::{Alert, Bed, Forecast, Kpis, NewPatient, Patient, SimRequest, SimResult, Ward};
use crate::session::{LoginResponse, SessionContext};
use crate::suggestions::SuggestionSet;

/// Backend client. The bearer token is read from the session on every call,
/// so an expired or logged-out session stops all traffic at once.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

fn build_client() -> Result<reqwest::Client, ConsoleError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(concat!("smartbed/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConsoleError::Network(format!("failed to create HTTP client: {e}")))
}

fn normalize_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

impl HttpBackend {
    pub fn new(base_url: &str, session: SessionContext) -> Result<Self, ConsoleError> {
        Ok(Self {
            client: build_client()?,
            base_url: normalize_base(base_url),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange credentials for a token. Needs no session.
    pub async fn login(
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ConsoleError> {
        let client = build_client()?;
        let url = format!("{}/api/auth/login", normalize_base(base_url));

        let response = client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ConsoleError::Auth(error_detail(response).await));
        }
        parse_response(response, "login").await
    }

    /// `GET /api/forecast`. The backend restricts it to planning roles.
    pub async fn forecast(&self) -> Result<Forecast, ConsoleError> {
        self.get("/api/forecast").await
    }

    /// `POST /api/patients`. Returns the queued patient with its new id.
    pub async fn create_patient(&self, patient: &NewPatient) -> Result<Patient, ConsoleError> {
        patient.validate()?;
        self.post("/api/patients", Some(patient), None).await
    }

    /// `POST /api/simulator/run`. A what-if projection; changes no state.
    pub async fn simulate(&self, request: &SimRequest) -> Result<SimResult, ConsoleError> {
        request.validate()?;
        self.post("/api/simulator/run", Some(request), None).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConsoleError> {
        let token = self.session.token()?;
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;

        self.handle_response(response, path).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> Result<T, ConsoleError> {
        let token = self.session.token()?;
        let mut request = self.client.post(self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        let response = request.send().await?;

        self.handle_response(response, path).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, ConsoleError> {
        if response.status() == StatusCode::UNAUTHORIZED {
            let detail = error_detail(response).await;
            self.session.expire();
            return Err(ConsoleError::Auth(detail));
        }
        parse_response(response, what).await
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, ConsoleError> {
    let status = response.status();
    if !status.is_success() {
        let detail = error_detail(response).await;
        debug!(status = status.as_u16(), detail = %detail, "Backend rejected request");
        return Err(ConsoleError::rejected(status.as_u16(), detail));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ConsoleError::decode(what, e))
}

/// Error body. `detail` is a string for handled errors and a list for
/// request validation failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string();

    match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) if !detail.is_null() => detail.to_string(),
        _ => fallback,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn patient_queue(&self) -> Result<Vec<Patient>, ConsoleError> {
        self.get("/api/patients/queue").await
    }

    async fn beds(&self) -> Result<Vec<Bed>, ConsoleError> {
        self.get("/api/beds").await
    }

    async fn wards(&self) -> Result<Vec<Ward>, ConsoleError> {
        self.get("/api/wards").await
    }

    async fn kpis(&self) -> Result<Kpis, ConsoleError> {
        self.get("/api/dashboard/kpis").await
    }

    async fn alerts(&self) -> Result<Vec<Alert>, ConsoleError> {
        self.get("/api/dashboard/alerts").await
    }

    async fn optimize(&self) -> Result<SuggestionSet, ConsoleError> {
        self.post::<_, ()>("/api/allocation/optimize", None, None)
            .await
    }

    async fn assign(&self, request: &AssignRequest) -> Result<AssignReceipt, ConsoleError> {
        let path = format!("/api/patients/{}/assign", request.patient_id);
        let key = assign_key(request);
        self.post(&path, Some(request), Some(&key)).await
    }
}
