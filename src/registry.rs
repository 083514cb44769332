//! Shared worker registry backed by Redis.
//!
//! One hash per namespace (`{prefix}:{namespace}`) maps worker address to a
//! serialized pressure record. Every gateway instance reads and writes the
//! same hash, so the registry is the single source of truth for fleet load
//! state; no process-local cache stands in for it.
//!
//! TTL semantics: the expiry applies to the whole hash and is refreshed on
//! every write. A lone live worker keeps sibling records alive until
//! reconciliation removes them; actual staleness is bounded by the refresh
//! cadence.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, warn};

use crate::pressure::PressureRecord;
use crate::types::{GatewayError, Result};

/// Server-side increment of a record's `running` counter. Runs as a single
/// atomic script so concurrent dispatches from multiple gateway instances
/// cannot lose updates to a read-modify-write race.
const INCREMENT_RUNNING: &str = r#"
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if not raw then
  return 0
end
local record = cjson.decode(raw)
record['running'] = record['running'] + 1
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(record))
return 1
"#;

/// Record envelope as stored in the hash. The namespace tag marks which
/// logical environment wrote the record and never leaves the registry.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    namespace: String,
    #[serde(flatten)]
    record: PressureRecord,
}

pub struct WorkerRegistry {
    conn: ConnectionManager,
    namespace: String,
    key: String,
    ttl: Duration,
    increment: Script,
}

impl WorkerRegistry {
    /// Connect to the store. Fails fast: the registry is not optional.
    pub async fn connect(
        url: &str,
        prefix: &str,
        namespace: &str,
        ttl: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GatewayError::Registry(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| GatewayError::Registry(format!("redis connection failed: {e}")))?;

        Ok(Self {
            conn,
            namespace: namespace.to_string(),
            key: format!("{prefix}:{namespace}"),
            ttl,
            increment: Script::new(INCREMENT_RUNNING),
        })
    }

    /// All records tagged with this registry's namespace. Records written by
    /// a different environment (stale entries surviving a topology change)
    /// and undecodable entries are dropped.
    pub async fn list(&self) -> Result<Vec<PressureRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .hvals(&self.key)
            .await
            .map_err(|e| GatewayError::Registry(format!("registry list failed: {e}")))?;

        Ok(decode_records(&self.namespace, raw))
    }

    /// Write or overwrite the record for `record.address`, tagging it with
    /// this registry's namespace and refreshing the collection TTL.
    pub async fn upsert(&self, record: &PressureRecord) -> Result<()> {
        let stored = StoredRecord {
            namespace: self.namespace.clone(),
            record: record.clone(),
        };
        let payload = serde_json::to_string(&stored)
            .map_err(|e| GatewayError::Registry(format!("record serialization failed: {e}")))?;

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .hset(&self.key, &record.address, payload)
            .ignore()
            .expire(&self.key, self.ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Registry(format!("registry upsert failed: {e}")))?;

        Ok(())
    }

    /// Delete the record for `address`. Cleanup is best-effort: failures are
    /// logged, not propagated.
    pub async fn remove(&self, address: &str) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<i64> = conn.hdel(&self.key, address).await;
        match result {
            Ok(removed) => {
                debug!(address = %address, removed, "registry record removed");
            }
            Err(e) => {
                warn!(address = %address, error = %e, "failed to remove registry record");
            }
        }
    }

    /// Atomically bump `running` on the stored record. Returns `false` when
    /// the record has already been evicted; the next probe cycle corrects
    /// the count either way.
    pub async fn increment_running(&self, address: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .increment
            .key(&self.key)
            .arg(address)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Registry(format!("running increment failed: {e}")))?;

        Ok(updated == 1)
    }

    /// Store connectivity check for the readiness probe.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Registry(format!("registry ping failed: {e}")))?;
        Ok(())
    }
}

/// Decode raw hash values, keeping only records tagged with `namespace`.
fn decode_records(namespace: &str, raw: Vec<String>) -> Vec<PressureRecord> {
    raw.into_iter()
        .filter_map(|entry| match serde_json::from_str::<StoredRecord>(&entry) {
            Ok(stored) if stored.namespace == namespace => Some(stored.record),
            Ok(stored) => {
                warn!(
                    record_namespace = %stored.namespace,
                    address = %stored.record.address,
                    "dropping registry record from foreign namespace"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "dropping undecodable registry record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(namespace: &str, address: &str) -> String {
        let stored = StoredRecord {
            namespace: namespace.to_string(),
            record: PressureRecord {
                address: address.to_string(),
                observed_at: Utc::now(),
                is_available: true,
                running: 1,
                queued: 0,
                recently_rejected: 0,
                max_concurrent: 10,
                max_queued: 5,
                cpu: Some(12.0),
                memory: 40.0,
            },
        };
        serde_json::to_string(&stored).unwrap()
    }

    #[test]
    fn decode_filters_foreign_namespaces() {
        let raw = vec![
            stored("production", "10.0.0.1"),
            stored("staging", "10.0.0.2"),
            stored("production", "10.0.0.3"),
        ];

        let records = decode_records("production", raw);
        let addresses: Vec<&str> = records.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["10.0.0.1", "10.0.0.3"]);
    }

    #[test]
    fn decode_skips_garbage_entries() {
        let raw = vec!["not json".to_string(), stored("production", "10.0.0.1")];
        let records = decode_records("production", raw);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn stored_envelope_flattens_record_fields() {
        // The Lua increment script reads `running` as a top-level field of
        // the stored JSON, so the envelope must flatten the record.
        let raw = stored("production", "10.0.0.1");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["namespace"], "production");
        assert_eq!(value["running"], 1);
        assert_eq!(value["address"], "10.0.0.1");
        assert!(value.get("record").is_none());
    }

    #[test]
    fn stored_envelope_round_trips() {
        let raw = stored("production", "10.0.0.1");
        let decoded: StoredRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.record.address, "10.0.0.1");
        assert_eq!(decoded.record.running, 1);
        assert_eq!(decoded.namespace, "production");
    }
}
