use serde_json::Value;
use sha2::{Digest, Sha256};

// Create a dedup key (hash of url + sorted query + body), prefixed with the method
// so that clear_cache can target a verb or path prefix.
pub fn make_cache_key(
    method: &str,
    path: &str,
    query: &[(String, String)],
    body: Option<&Value>,
) -> String {
    let mut params = query.to_vec();
    params.sort();

    let mut hasher = Sha256::new();
    update_framed(&mut hasher, path.as_bytes());
    for (key, value) in &params {
        update_framed(&mut hasher, key.as_bytes());
        update_framed(&mut hasher, value.as_bytes());
    }
    if let Some(body) = body {
        hasher.update([1u8]);
        // serde_json orders object keys, so equal bodies serialize equally
        update_framed(&mut hasher, body.to_string().as_bytes());
    }
    format!("{}:{}:{:x}", method.to_ascii_uppercase(), path, hasher.finalize())
}

// Length-prefixed so adjacent components cannot run into each other
fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

// Call-unique key, never equal to any other key
pub fn unique_key(method: &str, path: &str) -> String {
    format!(
        "{}:{}:{}",
        method.to_ascii_uppercase(),
        path,
        uuid::Uuid::new_v4()
    )
}
