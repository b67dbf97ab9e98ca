//! Internal HTTP client for the Proxmox REST API.

use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult, ValidationError};
use crate::core::domain::model::backend_config::RateLimitConfig;
use crate::core::domain::model::task::TaskStatus;
use crate::core::domain::value_object::{ApiToken, ApiUrl};
use crate::core::infrastructure::task_waiter::TaskStatusSource;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Certificate, Client, Method};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// How server certificates are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Verify against the system roots.
    SystemRoots,
    /// Verify against the system roots plus a PEM bundle.
    CustomBundle(Vec<u8>),
    /// Accept any certificate.
    Insecure,
}

impl TlsPolicy {
    /// Combines the two TLS settings; skipping verification while also
    /// supplying a CA bundle is contradictory and rejected.
    pub fn resolve(verify_tls: bool, ca_bundle: Option<Vec<u8>>) -> Result<Self, ValidationError> {
        match (verify_tls, ca_bundle) {
            (false, Some(_)) => Err(ValidationError::ConstraintViolation(
                "a CA bundle cannot be combined with disabled TLS verification".to_string(),
            )),
            (false, None) => Ok(TlsPolicy::Insecure),
            (true, Some(pem)) => Ok(TlsPolicy::CustomBundle(pem)),
            (true, None) => Ok(TlsPolicy::SystemRoots),
        }
    }
}

/// Token-authenticated HTTP client returning the `.data` payload of each
/// API response.
///
/// Every request passes through the optional rate limiter, and every wait
/// (limiter, send, body read) is raced against the caller's [`OpContext`].
#[derive(Debug)]
pub struct ApiClient {
    http_client: Client,
    base_url: ApiUrl,
    token: ApiToken,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Errors
    /// Returns `BackendError::Connection` if the HTTP client cannot be built,
    /// or a validation error for a bad CA bundle or rate limit.
    pub fn new(
        base_url: ApiUrl,
        token: ApiToken,
        tls: TlsPolicy,
        request_timeout: Duration,
        rate_limit: Option<RateLimitConfig>,
    ) -> BackendResult<Self> {
        let mut builder = Client::builder().timeout(request_timeout);
        match tls {
            TlsPolicy::SystemRoots => {}
            TlsPolicy::Insecure => builder = builder.danger_accept_invalid_certs(true),
            TlsPolicy::CustomBundle(pem) => {
                let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
                    ValidationError::Format(format!("invalid CA bundle: {}", e))
                })?;
                if certs.is_empty() {
                    return Err(ValidationError::Format(
                        "CA bundle contains no certificates".to_string(),
                    )
                    .into());
                }
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }
        let http_client = builder
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let rate_limiter = match rate_limit {
            Some(rl) => Some(Arc::new(build_rate_limiter(rl)?)),
            None => None,
        };

        Ok(Self {
            http_client,
            base_url,
            token,
            rate_limiter,
        })
    }

    pub fn base_url(&self) -> &ApiUrl {
        &self.base_url
    }

    /// Performs a GET request.
    pub async fn get(
        &self,
        ctx: &OpContext,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> BackendResult<Value> {
        self.execute_request(ctx, Method::GET, segments, query, &[])
            .await
    }

    /// Performs a GET request and decodes the payload.
    pub async fn get_as<T>(&self, ctx: &OpContext, segments: &[&str]) -> BackendResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let data = self.get(ctx, segments, &[]).await?;
        serde_json::from_value(data).map_err(|e| {
            BackendError::Parse(format!("unexpected payload from /{}: {}", segments.join("/"), e))
        })
    }

    /// Performs a POST request with a form-encoded body.
    pub async fn post(
        &self,
        ctx: &OpContext,
        segments: &[&str],
        form: &[(&str, String)],
    ) -> BackendResult<Value> {
        self.execute_request(ctx, Method::POST, segments, &[], form)
            .await
    }

    /// Performs a PUT request with a form-encoded body.
    pub async fn put(
        &self,
        ctx: &OpContext,
        segments: &[&str],
        form: &[(&str, String)],
    ) -> BackendResult<Value> {
        self.execute_request(ctx, Method::PUT, segments, &[], form)
            .await
    }

    /// Performs a DELETE request.
    pub async fn delete(
        &self,
        ctx: &OpContext,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> BackendResult<Value> {
        self.execute_request(ctx, Method::DELETE, segments, query, &[])
            .await
    }

    /// Core request execution: throttle, send, unwrap the envelope.
    async fn execute_request(
        &self,
        ctx: &OpContext,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        form: &[(&str, String)],
    ) -> BackendResult<Value> {
        if let Some(limiter) = &self.rate_limiter {
            ctx.run(async {
                limiter.until_ready().await;
                Ok(())
            })
            .await?;
        }

        let mut url = self.base_url.endpoint(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        debug!(method = %method, path = url.path(), "api request");

        let mut req_builder = self
            .http_client
            .request(method, url)
            .header(AUTHORIZATION, self.token.as_header_value());

        if !form.is_empty() {
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            req_builder = req_builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE).body(body);
        }

        let (status, text) = ctx
            .run(async {
                let response = req_builder
                    .send()
                    .await
                    .map_err(|e| BackendError::Connection(format!("HTTP request failed: {}", e)))?;
                let status = response.status();
                let text = response.text().await.map_err(|e| {
                    BackendError::Connection(format!("failed to read response body: {}", e))
                })?;
                Ok((status, text))
            })
            .await?;

        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&text, status.canonical_reason()),
            });
        }

        unwrap_data(&text)
    }
}

/// Extracts `.data` from a success envelope; an empty body is `null`.
fn unwrap_data(text: &str) -> BackendResult<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BackendError::Parse(format!("Failed to parse response: {}", e)))?;
    Ok(match value {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

/// Human-readable text of an error response: the `errors` map (values, with
/// their field names), else `message`, else the raw body.
pub(crate) fn error_message(body: &str, reason: Option<&str>) -> String {
    let trimmed = body.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        if let Some(Value::Object(errors)) = map.get("errors") {
            let joined = errors
                .iter()
                .map(|(field, message)| {
                    let message = match message {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    };
                    if field.is_empty() {
                        message
                    } else {
                        format!("{}: {}", field, message)
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
        if let Some(Value::String(message)) = map.get("message") {
            if !message.trim().is_empty() {
                return message.trim().to_string();
            }
        }
    }
    if trimmed.is_empty() {
        return reason.unwrap_or("unknown").to_string();
    }
    trimmed.to_string()
}

fn build_rate_limiter(config: RateLimitConfig) -> Result<DefaultDirectRateLimiter, ValidationError> {
    let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
        ValidationError::Field {
            field: "rate_limit.requests_per_second".to_string(),
            message: "must be greater than zero".to_string(),
        }
    })?;
    let burst = NonZeroU32::new(config.burst_size).ok_or_else(|| ValidationError::Field {
        field: "rate_limit.burst_size".to_string(),
        message: "must be greater than zero".to_string(),
    })?;
    Ok(DefaultDirectRateLimiter::direct(
        Quota::per_second(per_second).allow_burst(burst),
    ))
}

#[async_trait]
impl TaskStatusSource for ApiClient {
    async fn task_status(
        &self,
        ctx: &OpContext,
        node: &str,
        upid: &str,
    ) -> BackendResult<TaskStatus> {
        self.get_as(ctx, &["nodes", node, "tasks", upid, "status"])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string, header, method, path, query_param},
    };

    const TOKEN: &str = "root@pam!agentlab=00000000-1111-2222-3333-444444444444";

    fn create_test_client(server_url: &str, rate_limit: Option<RateLimitConfig>) -> ApiClient {
        let base_url = ApiUrl::new(&format!("{}/api2/json", server_url)).unwrap();
        let token = ApiToken::new(TOKEN).unwrap();
        ApiClient::new(
            base_url,
            token,
            TlsPolicy::SystemRoots,
            Duration::from_secs(5),
            rate_limit,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_success_sends_token() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), None);

        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .and(header("Authorization", format!("PVEAPIToken={}", TOKEN).as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"node": "pve"}]})),
            )
            .mount(&mock_server)
            .await;

        let result = client.get(&OpContext::new(), &["nodes"], &[]).await.unwrap();
        assert_eq!(result[0]["node"], "pve");
    }

    #[tokio::test]
    async fn test_post_is_form_encoded() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), None);

        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve/qemu/9000/clone"))
            .and(header("Content-Type", FORM_CONTENT_TYPE))
            .and(body_string("newid=101&full=1&name=my+vm"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": "UPID:pve:x"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let data = client
            .post(
                &OpContext::new(),
                &["nodes", "pve", "qemu", "9000", "clone"],
                &[
                    ("newid", "101".to_string()),
                    ("full", "1".to_string()),
                    ("name", "my vm".to_string()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(data, "UPID:pve:x");
    }

    #[tokio::test]
    async fn test_delete_with_query() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), None);

        Mock::given(method("DELETE"))
            .and(path("/api2/json/nodes/pve/qemu/100"))
            .and(query_param("purge", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let data = client
            .delete(
                &OpContext::new(),
                &["nodes", "pve", "qemu", "100"],
                &[("purge", "1".to_string())],
            )
            .await
            .unwrap();
        assert!(data.is_null());
    }

    #[tokio::test]
    async fn test_error_body_surfaces_status_and_text() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), None);

        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve/qemu/100/config"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "data": null,
                "message": "Configuration file 'nodes/pve/qemu-server/100.conf' does not exist\n"
            })))
            .mount(&mock_server)
            .await;

        let err = client
            .get(&OpContext::new(), &["nodes", "pve", "qemu", "100", "config"], &[])
            .await
            .unwrap_err();
        match err {
            BackendError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.ends_with("does not exist"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_message_variants() {
        assert_eq!(
            error_message(r#"{"errors":{"":"linked clone requires snapshot support"}}"#, None),
            "linked clone requires snapshot support"
        );
        assert_eq!(
            error_message(
                r#"{"errors":{"net0.fwgroup":"property is not defined in schema"},"message":"Parameter verification failed."}"#,
                None
            ),
            "net0.fwgroup: property is not defined in schema"
        );
        assert_eq!(error_message(r#"{"message":"no such VM"}"#, None), "no such VM");
        assert_eq!(error_message("plain failure\n", None), "plain failure");
        assert_eq!(error_message("", Some("Bad Request")), "Bad Request");
    }

    #[test]
    fn test_tls_policy_rejects_insecure_with_bundle() {
        assert!(TlsPolicy::resolve(false, Some(b"pem".to_vec())).is_err());
        assert_eq!(TlsPolicy::resolve(false, None).unwrap(), TlsPolicy::Insecure);
        assert_eq!(TlsPolicy::resolve(true, None).unwrap(), TlsPolicy::SystemRoots);
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let err = ApiClient::new(
            ApiUrl::new("https://pve:8006").unwrap(),
            ApiToken::new(TOKEN).unwrap(),
            TlsPolicy::SystemRoots,
            Duration::from_secs(5),
            Some(RateLimitConfig {
                requests_per_second: 0,
                burst_size: 1,
            }),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rate_limiting_delays_requests() {
        use std::time::Instant;

        let mock_server = MockServer::start().await;
        let client = create_test_client(
            &mock_server.uri(),
            Some(RateLimitConfig {
                requests_per_second: 2,
                burst_size: 2,
            }),
        );

        Mock::given(method("GET"))
            .and(path("/api2/json/version"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": "ok"})),
            )
            .expect(4)
            .mount(&mock_server)
            .await;

        let ctx = OpContext::new();
        // The burst passes without delay.
        let start = Instant::now();
        let (res1, res2) = tokio::join!(
            client.get(&ctx, &["version"], &[]),
            client.get(&ctx, &["version"], &[])
        );
        res1.unwrap();
        res2.unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));

        // The next two wait for the 2/sec quota.
        let start = Instant::now();
        let (res3, res4) = tokio::join!(
            client.get(&ctx, &["version"], &[]),
            client.get(&ctx, &["version"], &[])
        );
        res3.unwrap();
        res4.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_request() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), None);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let ctx = OpContext::new();
        ctx.cancel();
        let err = client.get(&ctx, &["nodes"], &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Cancelled));
    }

    #[tokio::test]
    async fn test_task_status_source() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), None);
        let upid = "UPID:pve:0000ABCD:0001F2A3:65B7C0DE:qmstart:100:root@pam:";

        Mock::given(method("GET"))
            .and(path(format!("/api2/json/nodes/pve/tasks/{}/status", upid)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"status": "stopped", "exitstatus": "OK", "upid": upid}
            })))
            .mount(&mock_server)
            .await;

        let status = client.task_status(&OpContext::new(), "pve", upid).await.unwrap();
        assert!(status.is_stopped());
        assert!(status.succeeded());
    }
}
