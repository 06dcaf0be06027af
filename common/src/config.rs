use serde::Deserialize;

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_scope() -> String {
    "openid profile email offline_access".to_string()
}

fn default_department_group_prefix() -> String {
    "DEPT".to_string()
}

fn default_session_max_age_secs() -> i64 {
    86_400
}

fn default_refresh_buffer_secs() -> i64 {
    300
}

fn default_cookie_secure() -> bool {
    true
}

fn default_max_query_length() -> usize {
    2_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Group display names formatted `PREFIX_CODE_NAME`; the first group
    /// matching this prefix determines the user's department.
    #[serde(default = "default_department_group_prefix")]
    pub department_group_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    #[serde(default = "default_session_max_age_secs")]
    pub max_age_secs: i64,
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: i64,
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_query_length: default_max_query_length(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path, e))?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.session.secret.len() < 32 {
            anyhow::bail!("session.secret must be at least 32 characters");
        }
        if self.upstream.base_url.is_empty() {
            anyhow::bail!("upstream.base_url must not be empty");
        }
        if self.upstream.api_key.is_empty() {
            anyhow::bail!("upstream.api_key must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [upstream]
        base_url = "https://dify.example.com/v1"
        api_key = "app-test-key"

        [auth]
        authorize_url = "https://login.example.com/authorize"
        token_url = "https://login.example.com/token"
        userinfo_url = "https://login.example.com/userinfo"
        client_id = "client-1"
        client_secret = "secret-1"
        redirect_uri = "http://localhost:8080/auth/callback"

        [session]
        secret = "0123456789abcdef0123456789abcdef"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.upstream.max_retries, 3);
        assert_eq!(config.session.max_age_secs, 86_400);
        assert_eq!(config.session.refresh_buffer_secs, 300);
        assert_eq!(config.chat.max_query_length, 2_000);
        assert_eq!(config.auth.department_group_prefix, "DEPT");
    }

    #[test]
    fn short_secret_is_rejected() {
        let short = MINIMAL.replace("0123456789abcdef0123456789abcdef", "too-short");
        let config: AppConfig = toml::from_str(&short).unwrap();
        assert!(config.validate().is_err());
    }
}
