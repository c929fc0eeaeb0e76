//! OAuth2 refresh-token grant over HTTP.

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{AuthError, AuthResult, OAuthToken, TokenRefresher};
use crate::util::{compact_text, is_http_url, unix_timestamp_now};

/// Refreshes tokens against a standard OAuth2 token endpoint.
#[derive(Clone)]
pub struct OAuthRefreshClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl OAuthRefreshClient {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> AuthResult<Self> {
        let token_url = token_url.into().trim().to_string();
        if !is_http_url(&token_url) {
            return Err(AuthError::InvalidConfiguration(
                "Token URL must include http:// or https://".to_string(),
            ));
        }
        let client_id = client_id.into().trim().to_string();
        if client_id.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "OAuth client id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().build()?,
            token_url,
            client_id,
            client_secret,
        })
    }
}

#[async_trait::async_trait]
impl TokenRefresher for OAuthRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<OAuthToken> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::NotAuthenticated);
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(&self.token_url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let payload: TokenResponse = serde_json::from_str(&body)
            .map_err(|error| AuthError::Api(format!("Invalid token response: {error}")))?;
        Ok(payload.into_token(refresh_token, unix_timestamp_now()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Providers that do not rotate refresh tokens omit it from the response.
    fn into_token(self, previous_refresh_token: &str, now: i64) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .unwrap_or_else(|| previous_refresh_token.to_string()),
            expires_at: now.saturating_add(self.expires_in.unwrap_or(3600)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

fn classify_error(status: StatusCode, body: &str) -> AuthError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let code = parsed.as_ref().and_then(|payload| payload.error.clone());

    // A revoked or expired refresh token cannot be recovered without signing in
    if code.as_deref() == Some("invalid_grant") || status == StatusCode::UNAUTHORIZED {
        return AuthError::NotAuthenticated;
    }

    let message = parsed
        .and_then(|payload| payload.error_description.or(payload.error))
        .unwrap_or_else(|| compact_text(body));
    if message.is_empty() {
        AuthError::Api(format!("HTTP {}", status.as_u16()))
    } else {
        AuthError::Api(format!("{} ({})", message, status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_rejects_bad_configuration() {
        assert!(matches!(
            OAuthRefreshClient::new("api.dropboxapi.com/oauth2/token", "app", None),
            Err(AuthError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            OAuthRefreshClient::new("https://api.dropboxapi.com/oauth2/token", "  ", None),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn response_without_refresh_token_keeps_previous() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"sl.abc","token_type":"bearer","expires_in":14400}"#)
                .unwrap();

        let token = response.into_token("old-refresh", 1_000);

        assert_eq!(token.access_token, "sl.abc");
        assert_eq!(token.refresh_token, "old-refresh");
        assert_eq!(token.expires_at, 15_400);
    }

    #[test]
    fn invalid_grant_means_sign_in_again() {
        let error = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"refresh token is malformed"}"#,
        );
        assert_eq!(error, AuthError::NotAuthenticated);
    }

    #[test]
    fn other_errors_keep_description_and_status() {
        let error = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_client","error_description":"bad app key"}"#,
        );
        assert_eq!(error, AuthError::Api("bad app key (400)".to_string()));

        let error = classify_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(error, AuthError::Api("HTTP 502".to_string()));
    }
}
