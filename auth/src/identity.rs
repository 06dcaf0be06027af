use serde::Deserialize;

use common::config::AuthConfig;
use common::error::AppError;

/// Tokens returned by the identity provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
}

/// Identity resolved from the userinfo endpoint plus group membership.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub department_code: String,
    pub department_name: Option<String>,
}

/// OAuth2 client for the corporate identity provider: authorization-code
/// exchange, refresh, and the userinfo lookup the login flow needs.
#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    config: AuthConfig,
}

impl IdentityClient {
    pub fn new(http: reqwest::Client, config: AuthConfig) -> Self {
        Self { http, config }
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let url = url::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", self.config.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::InvalidSession(format!("invalid authorize URL: {}", e)))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AppError> {
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ],
            false,
        )
        .await
    }

    /// Obtain a fresh access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AppError> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            true,
        )
        .await
    }

    async fn token_request(
        &self,
        grant: &[(&str, &str)],
        is_refresh: bool,
    ) -> Result<TokenSet, AppError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed {
                attempts: 1,
                message: format!("token endpoint unreachable: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!("token endpoint returned {}: {}", status, detail);
            return Err(if is_refresh {
                AppError::TokenExpired(message)
            } else {
                AppError::InvalidSession(message)
            });
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("malformed token response: {}", e)))
    }

    /// Fetch the caller's identity and resolve their department from group
    /// membership. Group display names follow `PREFIX_CODE_NAME`; the first
    /// group matching the configured prefix wins. Users without a matching
    /// group have no department and are rejected by the login flow.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, AppError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed {
                attempts: 1,
                message: format!("userinfo endpoint unreachable: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::InvalidSession(format!(
                "userinfo endpoint returned {}",
                status
            )));
        }

        let info = response
            .json::<UserInfo>()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("malformed userinfo response: {}", e)))?;

        let email = info
            .email
            .or(info.preferred_username)
            .ok_or_else(|| AppError::InvalidResponse("userinfo has no email".to_string()))?;
        let display_name = info.name.unwrap_or_else(|| email.clone());

        let department = resolve_department(&info.groups, &self.config.department_group_prefix);
        let (department_code, department_name) = match department {
            Some(d) => d,
            None => {
                return Err(AppError::InvalidSession(
                    "no department group membership".to_string(),
                ))
            }
        };

        Ok(UserProfile {
            user_id: info.sub,
            email,
            display_name,
            department_code,
            department_name,
        })
    }
}

/// `DEPT_001_Sales` with prefix `DEPT` -> `("001", Some("Sales"))`.
fn resolve_department(groups: &[String], prefix: &str) -> Option<(String, Option<String>)> {
    let group = groups.iter().find(|g| g.starts_with(prefix))?;
    let mut parts = group.split('_');
    parts.next()?; // prefix segment
    let code = parts.next()?.to_string();
    if code.is_empty() {
        return None;
    }
    let name = parts.collect::<Vec<_>>().join("_");
    let name = if name.is_empty() { None } else { Some(name) };
    Some((code, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> AuthConfig {
        AuthConfig {
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/token", base),
            userinfo_url: format!("{}/userinfo", base),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            scope: "openid profile email offline_access".to_string(),
            department_group_prefix: "DEPT".to_string(),
        }
    }

    #[test]
    fn department_is_resolved_from_prefixed_group() {
        let groups = vec![
            "All Staff".to_string(),
            "DEPT_001_Sales".to_string(),
            "DEPT_002_Engineering".to_string(),
        ];
        assert_eq!(
            resolve_department(&groups, "DEPT"),
            Some(("001".to_string(), Some("Sales".to_string())))
        );
        assert_eq!(resolve_department(&groups[..1], "DEPT"), None);
    }

    #[test]
    fn department_name_may_contain_underscores() {
        let groups = vec!["DEPT_003_Customer_Success".to_string()];
        assert_eq!(
            resolve_department(&groups, "DEPT"),
            Some(("003".to_string(), Some("Customer_Success".to_string())))
        );
    }

    #[test]
    fn authorize_url_carries_all_parameters() {
        let client = IdentityClient::new(reqwest::Client::new(), config("https://login.example.com"));
        let url = client.authorize_url("state-1").unwrap();
        assert!(url.starts_with("https://login.example.com/authorize?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("response_type=code"));
    }

    #[tokio::test]
    async fn exchange_code_posts_grant_and_parses_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 1800
            })))
            .mount(&server)
            .await;

        let client = IdentityClient::new(reqwest::Client::new(), config(&server.uri()));
        let tokens = client.exchange_code("auth-code-1").await.unwrap();
        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(tokens.expires_in, 1800);
    }

    #[tokio::test]
    async fn refresh_failure_maps_to_token_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let client = IdentityClient::new(reqwest::Client::new(), config(&server.uri()));
        let err = client.refresh("stale").await.unwrap_err();
        assert!(matches!(err, AppError::TokenExpired(_)));
    }

    #[tokio::test]
    async fn fetch_profile_resolves_department() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "user-1",
                "email": "user@example.com",
                "name": "Test User",
                "groups": ["All Staff", "DEPT_001_Sales"]
            })))
            .mount(&server)
            .await;

        let client = IdentityClient::new(reqwest::Client::new(), config(&server.uri()));
        let profile = client.fetch_profile("access-1").await.unwrap();
        assert_eq!(profile.user_id, "user-1");
        assert_eq!(profile.department_code, "001");
        assert_eq!(profile.department_name.as_deref(), Some("Sales"));
    }

    #[tokio::test]
    async fn fetch_profile_without_department_group_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "user-1",
                "email": "user@example.com",
                "groups": ["All Staff"]
            })))
            .mount(&server)
            .await;

        let client = IdentityClient::new(reqwest::Client::new(), config(&server.uri()));
        let err = client.fetch_profile("access-1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSession(_)));
    }
}
