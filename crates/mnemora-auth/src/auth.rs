use mnemora_relational::{ApiKeyRecord, RelationalError, RelationalStore};

use crate::error::{AuthError, Result};

/// Strips a leading `Bearer ` prefix from an `Authorization` header value.
pub fn parse_bearer(header_value: Option<&str>) -> Result<&str> {
    let raw = header_value.ok_or(AuthError::MissingKey)?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        return Err(AuthError::MissingKey);
    }
    Ok(token)
}

/// Validates a bearer token against the relational store's API-key
/// registry, translating its not-found/disabled distinction into the
/// gateway's 401 messages.
pub fn authenticate(store: &RelationalStore, header_value: Option<&str>) -> Result<ApiKeyRecord> {
    let token = parse_bearer(header_value)?;
    store.validate_api_key(token).map_err(|e| match e {
        RelationalError::ApiKeyNotFound => AuthError::InvalidKey,
        RelationalError::ApiKeyDisabled => AuthError::Disabled,
        other => AuthError::Store(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_missing_key() {
        assert!(matches!(parse_bearer(None), Err(AuthError::MissingKey)));
    }

    #[test]
    fn strips_bearer_prefix() {
        assert_eq!(parse_bearer(Some("Bearer sk-abc123")).unwrap(), "sk-abc123");
    }

    #[test]
    fn accepts_raw_token_without_prefix() {
        assert_eq!(parse_bearer(Some("sk-abc123")).unwrap(), "sk-abc123");
    }

    #[test]
    fn authenticate_distinguishes_invalid_and_disabled() {
        let store = RelationalStore::open_in_memory().unwrap();
        let created = store.create_api_key("u1", vec!["*".to_string()], Default::default()).unwrap();

        assert!(matches!(
            authenticate(&store, Some("sk-not-a-real-key")),
            Err(AuthError::InvalidKey)
        ));

        store.disable_api_key(&created.record.key_id).unwrap();
        assert!(matches!(
            authenticate(&store, Some(&format!("Bearer {}", created.plaintext))),
            Err(AuthError::Disabled)
        ));
    }
}
