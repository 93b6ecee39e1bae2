//! Response cache keyed by a canonical turn fingerprint.
//!
//! The key hashes persona, intent, optimized prompt, and the context payload
//! with volatile fields removed, so two semantically identical turns land on
//! the same entry even across sessions.

use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use tutoria_core::Persona;

/// Fields stripped from the context before hashing. `timestamp` changes every
/// turn; the conversation history grows with each exchange.
const VOLATILE_CONTEXT_KEYS: &[&str] = &["timestamp"];

/// A cached answer together with the guard verdict that approved it.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response_text: String,
    pub guardrail_decision: Value,
}

/// Cache for guard-approved responses.
///
/// No single-flight: two concurrent misses on the same key both reach the
/// provider and the later completion wins the slot.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<CachedResponse>;
    async fn set(&self, key: String, value: CachedResponse);
}

/// Canonical fingerprint for one turn.
///
/// serde_json serializes maps with sorted keys, so the digest input is stable
/// regardless of insertion order.
pub fn cache_key(persona: Persona, intent: &str, optimized_prompt: &str, context: &Value) -> String {
    let mut context = context.clone();
    if let Some(object) = context.as_object_mut() {
        for key in VOLATILE_CONTEXT_KEYS {
            object.remove(*key);
        }
        if let Some(extras) = object.get_mut("extras").and_then(Value::as_object_mut) {
            extras.remove("history");
        }
    }
    let payload = json!({
        "persona": persona.as_str(),
        "intent": intent,
        "prompt": optimized_prompt,
        "context": context,
    });
    let serialized = payload.to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    format!("ai-response:{:x}", digest)
}

/// Process-local TTL cache.
pub struct InMemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, CachedResponse)>>,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: String, value: CachedResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (Instant::now(), value));
        }
    }
}
