//! `reqwest`-backed token endpoint client

use async_trait::async_trait;

use super::{
    CodeExchangeRequest, EndpointError, ErrorResponse, RefreshRequest, RevokeRequest,
    TokenEndpoint, TokenResponse,
};

/// Form-encoded POSTs to the provider's token and revocation endpoints
#[derive(Debug, Clone, Default)]
pub struct HttpTokenEndpoint {
    http_client: reqwest::Client,
}

impl HttpTokenEndpoint {
    /// Create a client with default `reqwest` settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies, retry middleware)
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&'static str, &str)],
    ) -> Result<(reqwest::StatusCode, String), EndpointError> {
        let response = self
            .http_client
            .post(url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        Ok((status, body))
    }

    async fn token_request(
        &self,
        url: &str,
        form: &[(&'static str, &str)],
    ) -> Result<TokenResponse, EndpointError> {
        let (status, body) = self.post_form(url, form).await?;
        parse_token_response(status, &body)
    }
}

/// Interpret a token endpoint reply
///
/// An OAuth error body wins over the status code; a non-success status
/// without one is an invalid response.
fn parse_token_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<TokenResponse, EndpointError> {
    // Try to parse as error first
    if let Ok(error) = serde_json::from_str::<ErrorResponse>(body) {
        return Err(error.into());
    }

    if !status.is_success() {
        return Err(EndpointError::InvalidResponse(format!(
            "HTTP {status} without OAuth error body"
        )));
    }

    // Body is not echoed: it carries tokens
    serde_json::from_str::<TokenResponse>(body).map_err(|e| {
        EndpointError::InvalidResponse(format!("Failed to parse token response: {e}"))
    })
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        request: CodeExchangeRequest,
    ) -> Result<TokenResponse, EndpointError> {
        tracing::debug!(endpoint = %request.token_endpoint, "Exchanging authorization code");
        self.token_request(&request.token_endpoint, &request.form())
            .await
    }

    async fn refresh(&self, request: RefreshRequest) -> Result<TokenResponse, EndpointError> {
        tracing::debug!(endpoint = %request.token_endpoint, "Refreshing token set");
        self.token_request(&request.token_endpoint, &request.form())
            .await
    }

    async fn revoke(&self, request: RevokeRequest) -> Result<(), EndpointError> {
        tracing::debug!(endpoint = %request.revocation_endpoint, "Revoking token");
        let (status, body) = self
            .post_form(&request.revocation_endpoint, &request.form())
            .await?;

        if status.is_success() {
            return Ok(());
        }
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => Err(error.into()),
            Err(_) => Err(EndpointError::InvalidResponse(format!(
                "Revocation failed with HTTP {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_parse_success() {
        let body = r#"{
            "access_token": "a",
            "id_token": "h.p.s",
            "refresh_token": "r",
            "expires_in": 86399,
            "token_type": "bearer",
            "scope": "openid offline"
        }"#;
        let response = parse_token_response(StatusCode::OK, body).unwrap();
        assert_eq!(response.id_token.as_deref(), Some("h.p.s"));
        assert_eq!(response.expires_in, Some(86399));
    }

    #[test]
    fn test_parse_oauth_error() {
        let body = r#"{"error": "invalid_grant", "error_description": "expired"}"#;
        let err = parse_token_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert_eq!(
            err,
            EndpointError::Rejected {
                error: "invalid_grant".to_string(),
                description: Some("expired".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_error_status_without_body() {
        let err = parse_token_response(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(matches!(err, EndpointError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_garbage_success_body_does_not_leak() {
        let err = parse_token_response(StatusCode::OK, r#"{"secret": "x"}"#).unwrap_err();
        match err {
            EndpointError::InvalidResponse(msg) => assert!(!msg.contains("\"x\"")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
