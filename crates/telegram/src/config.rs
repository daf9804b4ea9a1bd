use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Configuration of the Telegram bot.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Bot API base URL. Point this at a self-hosted Bot API server to lift
    /// the 50 MB upload limit of the public one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Chat IDs or usernames allowed to use the bot. Empty means anyone.
    pub allowlist: Vec<String>,
}

impl TelegramConfig {
    /// Parsed [`api_url`](Self::api_url), if set.
    pub fn api_url(&self) -> Result<Option<url::Url>> {
        self.api_url
            .as_deref()
            .map(|raw| {
                url::Url::parse(raw).map_err(|e| Error::external(format!("api_url {raw}"), e))
            })
            .transpose()
    }

    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("allowlist", &self.allowlist)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            api_url: None,
            allowlist: Vec::new(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = TelegramConfig::default();
        assert!(!cfg.has_token());
        assert!(cfg.api_url.is_none());
        assert!(cfg.allowlist.is_empty());
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{
            "token": "123:ABC",
            "allowlist": ["alice", "-100200300"]
        }"#;
        let cfg: TelegramConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.allowlist, vec!["alice", "-100200300"]);
        assert!(cfg.api_url().unwrap().is_none());
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramConfig {
            token: Secret::new("123:SECRET".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("SECRET"));
    }

    #[test]
    fn api_url_is_parsed() {
        let cfg = TelegramConfig {
            api_url: Some("http://localhost:8081".into()),
            ..Default::default()
        };
        assert_eq!(
            cfg.api_url().unwrap().unwrap().as_str(),
            "http://localhost:8081/"
        );

        let bad = TelegramConfig {
            api_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(bad.api_url().is_err());
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let cfg = TelegramConfig {
            token: Secret::new("   ".into()),
            ..Default::default()
        };
        assert!(!cfg.has_token());
    }
}
