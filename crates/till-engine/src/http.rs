//! # HTTP Backend
//!
//! reqwest implementation of every remote service port.
//!
//! ## Endpoints
//! ```text
//! GET  products                 → [Product]
//! GET  discounts                → [DiscountDefinition]
//! GET  carts/{terminal}         → { items: [LineItem] }     (404 = empty)
//! PUT  carts/{terminal}           { items: [LineItem] }     (full replace)
//! POST transactions               TransactionRequest  → TransactionRecord
//! POST stock/decrement            { items: [StockDelta] }
//! POST auth/verify-pin            { pin, hint? }      → { success, approver }
//! POST voids                      VoidRecord
//! ```
//!
//! Responses may be bare or wrapped as `{ "success": .., "data": .. }`;
//! both decode the same.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use till_core::discount::DiscountDefinition;
use till_core::{
    LineItem, Operator, Product, StockDelta, TransactionRecord, TransactionRequest, VoidRecord,
};

use crate::config::ServiceSettings;
use crate::error::{EngineError, EngineResult, ServiceError, ServiceResult};
use crate::services::{
    CartRemoteStore, DiscountCatalog, PinVerdict, PinVerifier, ProductCatalog, StockService,
    TransactionService, VoidLog,
};

// =============================================================================
// Wire Shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped {
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        message: Option<String>,
        data: T,
    },
    Failure {
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(T),
}

#[derive(Serialize, Deserialize)]
struct CartBody {
    #[serde(default)]
    items: Vec<LineItem>,
}

#[derive(Serialize)]
struct CartBodyRef<'a> {
    items: &'a [LineItem],
}

#[derive(Serialize)]
struct StockBody<'a> {
    items: &'a [StockDelta],
}

#[derive(Serialize)]
struct PinRequest<'a> {
    pin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Deserialize)]
struct PinResponse {
    success: bool,
    #[serde(default, alias = "user")]
    approver: Option<Operator>,
}

/// Decodes a bare or wrapped body.
fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> ServiceResult<T> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

    match envelope {
        Envelope::Bare(value) => Ok(value),
        Envelope::Wrapped {
            success: Some(false),
            message,
            ..
        }
        | Envelope::Failure {
            success: false,
            message,
        } => Err(ServiceError::Rejected(
            message.unwrap_or_else(|| "request failed".to_string()),
        )),
        Envelope::Wrapped { data, .. } => Ok(data),
        Envelope::Failure { success: true, .. } => Err(ServiceError::InvalidResponse(
            "response carried no data".to_string(),
        )),
    }
}

/// Maps a PIN verification answer to a verdict.
///
/// 401 and 403 are a "no", not a transport failure.
fn pin_verdict(status: StatusCode, bytes: &[u8]) -> ServiceResult<PinVerdict> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Ok(PinVerdict::Rejected);
    }
    if !status.is_success() {
        return Err(ServiceError::Status {
            status: status.as_u16(),
            message: String::from_utf8_lossy(bytes).into_owned(),
        });
    }

    let response: PinResponse = serde_json::from_slice(bytes)
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
    match (response.success, response.approver) {
        (false, _) => Ok(PinVerdict::Rejected),
        (true, Some(approver)) => Ok(PinVerdict::Approved(approver)),
        (true, None) => Err(ServiceError::InvalidResponse(
            "PIN accepted without an approver identity".to_string(),
        )),
    }
}

// =============================================================================
// Backend
// =============================================================================

/// HTTP client for the POS backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Creates a backend from the service settings.
    pub fn new(settings: &ServiceSettings) -> EngineResult<Self> {
        let mut base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::InvalidUrl(settings.base_url.clone()));
        }
        // Trailing slash so paths nest under the base instead of replacing it
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpBackend {
            client,
            base_url,
            token: settings.api_token.clone(),
            request_timeout: settings.request_timeout(),
        })
    }

    /// Builds the URL for `segments`, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> ServiceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Unreachable(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout {
                operation: "HTTP request",
                after: self.request_timeout,
            }
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Unreachable(err.to_string())
        }
    }

    async fn send(&self, request: RequestBuilder) -> ServiceResult<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    async fn body(&self, response: Response) -> ServiceResult<Vec<u8>> {
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| self.transport_error(e))
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> ServiceResult<T> {
        let status = response.status();
        let bytes = self.body(response).await?;

        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        decode_body(&bytes)
    }

    /// Checks the status and discards the body.
    async fn handle_empty(&self, response: Response) -> ServiceResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let bytes = self.body(response).await?;
        Err(ServiceError::Status {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ServiceResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.send(self.client.get(url)).await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ServiceResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.send(self.client.post(url).json(body)).await?;
        self.handle_response(response).await
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> ServiceResult<()> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.send(self.client.post(url).json(body)).await?;
        self.handle_empty(response).await
    }
}

// =============================================================================
// Port Implementations
// =============================================================================

#[async_trait]
impl ProductCatalog for HttpBackend {
    async fn fetch_products(&self) -> ServiceResult<Vec<Product>> {
        self.get(&["products"]).await
    }
}

#[async_trait]
impl DiscountCatalog for HttpBackend {
    async fn fetch_discounts(&self) -> ServiceResult<Vec<DiscountDefinition>> {
        self.get(&["discounts"]).await
    }
}

#[async_trait]
impl CartRemoteStore for HttpBackend {
    async fn load_cart(&self, terminal: &str) -> ServiceResult<Vec<LineItem>> {
        let url = self.endpoint(&["carts", terminal])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: CartBody = self.handle_response(response).await?;
        Ok(body.items)
    }

    async fn save_cart(&self, terminal: &str, items: &[LineItem]) -> ServiceResult<()> {
        let url = self.endpoint(&["carts", terminal])?;
        let response = self
            .send(self.client.put(url).json(&CartBodyRef { items }))
            .await?;
        self.handle_empty(response).await
    }
}

#[async_trait]
impl TransactionService for HttpBackend {
    async fn submit_transaction(
        &self,
        request: &TransactionRequest,
    ) -> ServiceResult<TransactionRecord> {
        self.post(&["transactions"], request).await
    }
}

#[async_trait]
impl StockService for HttpBackend {
    async fn decrement_stock(&self, deltas: &[StockDelta]) -> ServiceResult<()> {
        self.post_empty(&["stock", "decrement"], &StockBody { items: deltas })
            .await
    }
}

#[async_trait]
impl PinVerifier for HttpBackend {
    async fn verify_pin(&self, pin: &str, hint: Option<&str>) -> ServiceResult<PinVerdict> {
        let url = self.endpoint(&["auth", "verify-pin"])?;
        let response = self
            .send(self.client.post(url).json(&PinRequest { pin, hint }))
            .await?;
        let status = response.status();
        let bytes = self.body(response).await?;
        pin_verdict(status, &bytes)
    }
}

#[async_trait]
impl VoidLog for HttpBackend {
    async fn submit_void(&self, record: &VoidRecord) -> ServiceResult<()> {
        self.post_empty(&["voids"], record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use till_core::{Money, TransactionStatus};

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(&ServiceSettings {
            base_url: base_url.to_string(),
            ..ServiceSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_nests_under_base_path() {
        let http = backend("https://pos.example.com/api");
        assert_eq!(
            http.endpoint(&["stock", "decrement"]).unwrap().as_str(),
            "https://pos.example.com/api/stock/decrement"
        );

        let http = backend("https://pos.example.com/api/");
        assert_eq!(
            http.endpoint(&["products"]).unwrap().as_str(),
            "https://pos.example.com/api/products"
        );
    }

    #[test]
    fn test_endpoint_encodes_terminal_key() {
        let http = backend("http://localhost:8080/");
        assert_eq!(
            http.endpoint(&["carts", "front till/2"]).unwrap().as_str(),
            "http://localhost:8080/carts/front%20till%2F2"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpBackend::new(&ServiceSettings {
            base_url: "mailto:ops@example.com".into(),
            ..ServiceSettings::default()
        });
        assert!(matches!(result, Err(EngineError::InvalidUrl(_))));
    }

    #[test]
    fn test_decode_bare_and_wrapped() {
        let bare = br#"{"id":"tx-1","receiptId":"R-7","status":"Completed","total":99.5}"#;
        let record: TransactionRecord = decode_body(bare).unwrap();
        assert_eq!(record.receipt_id.as_deref(), Some("R-7"));
        assert_eq!(record.total, Money::from_cents(9_950));

        let wrapped = br#"{"success":true,"data":{"id":"tx-2","status":"Voided","total":10}}"#;
        let record: TransactionRecord = decode_body(wrapped).unwrap();
        assert_eq!(record.id, "tx-2");
        assert_eq!(record.status, TransactionStatus::Voided);
    }

    #[test]
    fn test_decode_reported_failure() {
        let body = br#"{"success":false,"message":"Register closed"}"#;
        let result: ServiceResult<TransactionRecord> = decode_body(body);
        assert_eq!(result, Err(ServiceError::Rejected("Register closed".into())));
    }

    #[test]
    fn test_decode_garbage() {
        let result: ServiceResult<Vec<Product>> = decode_body(b"<html>502</html>");
        assert!(matches!(result, Err(ServiceError::InvalidResponse(_))));
    }

    #[test]
    fn test_pin_verdicts() {
        let ok = br#"{"success":true,"approver":{"id":"m-1","name":"Marisol","role":"manager"}}"#;
        match pin_verdict(StatusCode::OK, ok).unwrap() {
            PinVerdict::Approved(approver) => {
                assert_eq!(approver.id, "m-1");
                assert_eq!(approver.role.as_deref(), Some("manager"));
            }
            PinVerdict::Rejected => panic!("expected approval"),
        }

        let user_alias = br#"{"success":true,"user":{"id":"m-2","name":"Dee"}}"#;
        assert!(matches!(
            pin_verdict(StatusCode::OK, user_alias),
            Ok(PinVerdict::Approved(_))
        ));

        assert_eq!(
            pin_verdict(StatusCode::OK, br#"{"success":false}"#),
            Ok(PinVerdict::Rejected)
        );
        assert_eq!(
            pin_verdict(StatusCode::UNAUTHORIZED, b"bad pin"),
            Ok(PinVerdict::Rejected)
        );
        assert!(matches!(
            pin_verdict(StatusCode::BAD_GATEWAY, b""),
            Err(ServiceError::Status { status: 502, .. })
        ));
    }
}
