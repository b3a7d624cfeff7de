//! Typed Cache Example
//!
//! Shows how values keep their type through a store that only holds bytes,
//! and what a partner process sees in the raw store.
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_typed_cache
//! ```

use std::sync::Arc;
use std::time::Duration;

use psychrocam_core::{
    cache::tag_key, CacheValue, KeyValueStore, MemoryStore, RemoteHandle, TypedCache,
};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Psychrocam Typed Cache Example");
    println!("==============================\n");

    let store = Arc::new(MemoryStore::new());
    let cache = TypedCache::new(store.clone());

    // Scalars are stored as text next to a type tag
    cache.set("pressure_kpa", &CacheValue::Float(101.3), None)?;
    cache.set("altitude", &CacheValue::Int(650), None)?;
    cache.set_json("chart_zones", &json!({"zones": [{"label": "comfort"}]}))?;

    for key in ["pressure_kpa", "altitude", "chart_zones"] {
        let tag = store.get(&tag_key(key))?.unwrap_or_default();
        let raw = store.get(key)?.unwrap_or_default();
        println!(
            "{key:>14}: tag {:<18} value {}",
            String::from_utf8_lossy(&tag),
            String::from_utf8_lossy(&raw)
        );
    }
    println!();

    // Reads dispatch on the tag
    println!("pressure_kpa -> {:?}", cache.get("pressure_kpa", false)?);
    println!("altitude     -> {:?}", cache.get_f64("altitude")?);

    // Opaque path for closed shapes that never leave Rust
    let handle = RemoteHandle {
        base_url: "http://hass.local:8123".into(),
        api_password: None,
    };
    cache.set_opaque("ha_api", &handle)?;
    println!("ha_api       -> {:?}", cache.get_opaque::<RemoteHandle>("ha_api")?);

    // A TTL applies to the tag, so the whole entry expires
    cache.set("making_chart_now", &CacheValue::Int(1), Some(Duration::from_secs(300)))?;
    println!("\nrun flag set: {}", cache.is_flag_set("making_chart_now")?);

    // Removing and clearing are idempotent
    cache.remove("altitude")?;
    cache.remove("altitude")?;
    println!("altitude after remove: {:?}", cache.get_or("altitude", CacheValue::Int(0))?);

    let cleared = cache.clear()?;
    println!("cleared {cleared} entries, store now holds {} keys", store.len());
    println!("second clear: {} entries", cache.clear()?);

    Ok(())
}
