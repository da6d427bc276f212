use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Versioned server configuration. The current value is always the row
/// with the highest version; rows are never updated in place.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub version: i64,
    pub callback_secret: SecretString,
    pub invoker_base_url: String,
    pub allowed_models: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ServerSettings {
    pub fn model_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|allowed| allowed == model)
    }

    /// Compares a presented callback secret against the configured one.
    pub fn secret_matches(&self, presented: &str) -> bool {
        constant_time_eq(self.callback_secret.expose_secret().as_bytes(), presented.as_bytes())
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::ServerSettings;

    fn settings(secret: &str) -> ServerSettings {
        ServerSettings {
            version: 1,
            callback_secret: secret.to_string().into(),
            invoker_base_url: "http://localhost:8001".to_string(),
            allowed_models: vec!["gpt-4o-mini".to_string(), "claude-haiku".to_string()],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn secret_comparison_rejects_mismatch_and_prefix() {
        let settings = settings("s3cret");
        assert!(settings.secret_matches("s3cret"));
        assert!(!settings.secret_matches("s3cre"));
        assert!(!settings.secret_matches("s3cret-extra"));
    }

    #[test]
    fn model_allow_list_is_exact_match() {
        let settings = settings("s3cret");
        assert!(settings.model_allowed("gpt-4o-mini"));
        assert!(!settings.model_allowed("gpt-4o"));
    }
}
