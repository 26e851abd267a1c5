//! GitHub App installation authentication.
//!
//! Requests are authorized with short-lived installation tokens minted
//! from an RS256 App JWT. The installation id is discovered once (first
//! installation of the App); tokens are cached and refreshed one minute
//! before expiry.

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct Installation {
    id: i64,
}

#[derive(Deserialize)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct TokenState {
    installation_id: Option<i64>,
    token: Option<CachedToken>,
}

/// Installation token source for a GitHub App.
pub struct AppAuth {
    app_id: i64,
    key: EncodingKey,
    base_url: String,
    http: reqwest::Client,
    state: Mutex<TokenState>,
}

impl AppAuth {
    pub fn new(
        app_id: i64,
        private_key_pem: &[u8],
        base_url: String,
        http: reqwest::Client,
    ) -> anyhow::Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .context("failed to parse App private key")?;
        Ok(Self {
            app_id,
            key,
            base_url,
            http,
            state: Mutex::new(TokenState::default()),
        })
    }

    /// A valid installation token, minting a fresh one when the cached
    /// token is absent or within a minute of expiry.
    pub async fn bearer_token(&self) -> anyhow::Result<String> {
        let mut state = self.state.lock().await;

        if let Some(cached) = &state.token {
            if Utc::now() < cached.expires_at - Duration::minutes(1) {
                return Ok(cached.value.clone());
            }
        }

        let jwt = self.app_jwt()?;

        let installation_id = match state.installation_id {
            Some(id) => id,
            None => {
                let id = self.fetch_installation_id(&jwt).await?;
                state.installation_id = Some(id);
                id
            }
        };

        let token = self.fetch_installation_token(&jwt, installation_id).await?;
        let value = token.token.clone();
        state.token = Some(CachedToken {
            value: token.token,
            expires_at: token.expires_at,
        });
        Ok(value)
    }

    /// RS256 App JWT: issued a minute in the past, valid ten minutes.
    fn app_jwt(&self) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iat: (now - Duration::seconds(60)).timestamp(),
            exp: (now + Duration::minutes(10)).timestamp(),
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("failed to sign App JWT")
    }

    async fn fetch_installation_id(&self, jwt: &str) -> anyhow::Result<i64> {
        let resp = self
            .http
            .get(format!("{}/app/installations", self.base_url))
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("installations request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("failed to list installations (status={status}): {body}");
        }

        let installations: Vec<Installation> = resp
            .json()
            .await
            .context("installations response parse failed")?;
        match installations.first() {
            Some(installation) => Ok(installation.id),
            None => bail!("no installation found for this GitHub App"),
        }
    }

    async fn fetch_installation_token(
        &self,
        jwt: &str,
        installation_id: i64,
    ) -> anyhow::Result<AccessToken> {
        let resp = self
            .http
            .post(format!(
                "{}/app/installations/{installation_id}/access_tokens",
                self.base_url
            ))
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("access token request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("failed to mint installation token (status={status}): {body}");
        }

        resp.json()
            .await
            .context("access token response parse failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_parses_expiry() {
        let json = r#"{"token":"ghs_abc","expires_at":"2026-02-25T09:00:00Z"}"#;
        let token: AccessToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.token, "ghs_abc");
        assert_eq!(
            token.expires_at,
            DateTime::parse_from_rfc3339("2026-02-25T09:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_installation_list_parses() {
        let json = r#"[{"id": 42, "account": {"login": "octo"}}]"#;
        let installations: Vec<Installation> = serde_json::from_str(json).unwrap();
        assert_eq!(installations[0].id, 42);
    }
}
