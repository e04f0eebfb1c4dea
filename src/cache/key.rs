//! Cache key generation.

use crate::types::{CacheCategory, Request};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Content address of a request: a 64-char hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }
    pub fn as_str(&self) -> &str {
        &self.hash
    }
    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        match self.hash.char_indices().nth(12) {
            Some((end, _)) => &self.hash[..end],
            None => &self.hash,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Derives content addresses from requests.
///
/// The canonical form is a JSON object with sorted keys holding the prompt, model,
/// serialized config, category and a digest of the user context. The context itself
/// never appears in the canonical form.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { salt: None }
    }
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(&self, request: &Request, category: CacheCategory) -> CacheKey {
        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("prompt", request.prompt.clone());
        parts.insert("model", request.model.clone());
        parts.insert(
            "config",
            serde_json::to_string(&request.config).unwrap_or_default(),
        );
        parts.insert("category", category.as_str().to_string());
        let context_digest = match &request.user_context {
            Some(ctx) => hex_digest(serde_json::to_string(ctx).unwrap_or_default().as_bytes()),
            None => "none".to_string(),
        };
        parts.insert("context", context_digest);
        if let Some(ref s) = self.salt {
            parts.insert("salt", s.clone());
        }
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        CacheKey::new(hex_digest(canonical.as_bytes()))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn base() -> Request {
        Request::new("list 3 breakfasts", "fast")
            .with_category(CacheCategory::RecipeSuggestion)
            .with_temperature(0.5)
            .with_context_value("diet", "vegan")
            .with_context_value("servings", 2)
    }

    #[test]
    fn test_short_respects_char_boundaries() {
        let key = CacheKey::from("aéééééééééééééé");
        assert_eq!(key.short(), "aééééééééééé");
        assert_eq!(CacheKey::from("abc").short(), "abc");
        let hashed = CacheKeyGenerator::new().generate(&base(), CacheCategory::General);
        assert_eq!(hashed.short(), &hashed.as_str()[..12]);
    }

    #[test]
    fn test_key_is_fixed_length_hex() {
        let key = CacheKeyGenerator::new().generate(&base(), CacheCategory::RecipeSuggestion);
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key.short().len(), 12);
    }

    #[test]
    fn test_equal_requests_equal_keys() {
        let gen = CacheKeyGenerator::new();
        let a = gen.generate(&base(), CacheCategory::RecipeSuggestion);
        let b = gen.generate(&base(), CacheCategory::RecipeSuggestion);
        assert_eq!(a, b);
    }

    #[test]
    fn test_context_insertion_order_does_not_matter() {
        let gen = CacheKeyGenerator::new();
        let mut m1 = Map::new();
        m1.insert("a".into(), json!(1));
        m1.insert("b".into(), json!({"y": 2, "x": 1}));
        let mut m2 = Map::new();
        m2.insert("b".into(), json!({"x": 1, "y": 2}));
        m2.insert("a".into(), json!(1));
        let r1 = Request::new("p", "m").with_user_context(m1);
        let r2 = Request::new("p", "m").with_user_context(m2);
        assert_eq!(
            gen.generate(&r1, CacheCategory::General),
            gen.generate(&r2, CacheCategory::General)
        );
    }

    #[test]
    fn test_any_field_difference_changes_key() {
        let gen = CacheKeyGenerator::new();
        let cat = CacheCategory::RecipeSuggestion;
        let original = gen.generate(&base(), cat);

        let variants = vec![
            Request { prompt: "list 4 breakfasts".into(), ..base() },
            Request { model: "quality".into(), ..base() },
            base().with_temperature(0.6),
            base().with_max_output_tokens(100),
            base().with_json_output(true),
            base().with_context_value("diet", "keto"),
            Request { user_context: None, ..base() },
        ];
        for v in &variants {
            assert_ne!(gen.generate(v, cat), original, "variant {:?}", v);
        }
        assert_ne!(gen.generate(&base(), CacheCategory::Recipe), original);
    }

    #[test]
    fn test_salt_namespaces_keys() {
        let plain = CacheKeyGenerator::new().generate(&base(), CacheCategory::General);
        let salted = CacheKeyGenerator::new()
            .with_salt("staging")
            .generate(&base(), CacheCategory::General);
        assert_ne!(plain, salted);
    }
}
