use crate::errors::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    PathSearch,
    PricingCalculation,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PathSearch => "PATH_SEARCH",
            AuditAction::PricingCalculation => "PRICING_CALCULATION",
        }
    }
}

/// One immutable record per search or pricing invocation, carrying the
/// complete request and response payloads, not a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: AuditAction,
    pub input: Value,
    pub output: Value,
    pub duration_ms: u64,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), EngineError>;
    async fn list(&self) -> Vec<AuditLogEntry>;
    /// Bulk clear; individual entries are never deletable.
    async fn clear(&self) -> usize;
    async fn export_csv(&self) -> String;
}

#[derive(Default)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), EngineError> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn list(&self) -> Vec<AuditLogEntry> {
        self.entries.read().clone()
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    async fn export_csv(&self) -> String {
        let entries = self.entries.read();
        let mut out = String::from("id,timestamp,user,action,duration_ms,input,output\n");
        for entry in entries.iter() {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                csv_field(&entry.id),
                csv_field(&entry.timestamp.to_rfc3339()),
                csv_field(&entry.user),
                entry.action.as_str(),
                entry.duration_ms,
                csv_field(&entry.input.to_string()),
                csv_field(&entry.output.to_string()),
            ));
        }
        out
    }
}

/// Fire-and-forget recording: the append runs on a spawned task so a
/// failing audit sink can never block or fail the caller's response.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn AuditStore> {
        self.store.clone()
    }

    pub fn record(
        &self,
        user: Option<&str>,
        action: AuditAction,
        input: Value,
        output: Value,
        duration: Duration,
    ) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user: user.unwrap_or("anonymous").to_string(),
            action,
            input,
            output,
            duration_ms: duration.as_millis() as u64,
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.append(entry).await {
                tracing::warn!("audit append failed: {err}");
            }
        });
    }
}
