//! Usage accounting
//!
//! Converts usage quantities (audio seconds, token counts) into a running
//! monetary total and persists a JSON record per session plus an aggregate
//! summary. Recording is fire-and-forget from the session's perspective:
//! persistence failures are logged and never propagate.

use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// What kind of usage an event accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    AudioInput,
    AudioOutput,
    TextInput,
    TextOutput,
    ToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageUnit {
    Seconds,
    Tokens,
    Calls,
}

/// One recorded quantity of usage.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub kind: UsageKind,
    pub quantity: f64,
    pub unit: UsageUnit,
    pub model: String,
}

/// Accounting collaborator the session records usage through.
pub trait UsageLedger: Send + Sync {
    /// Fire-and-forget; the session never waits on persistence.
    fn record(&self, event: UsageEvent);
    fn current_total(&self) -> f64;
    /// Called once at session teardown; flushes whatever needs flushing.
    fn finish(&self) {}
}

/// Per-model pricing, dollars. Realtime audio is billed per minute, text
/// per thousand tokens.
#[derive(Debug, Clone, Copy)]
struct Pricing {
    audio_input_per_min: f64,
    audio_output_per_min: f64,
    text_input_per_1k: f64,
    text_output_per_1k: f64,
}

const REALTIME_PRICING: Pricing = Pricing {
    audio_input_per_min: 0.06,
    audio_output_per_min: 0.24,
    text_input_per_1k: 0.005,
    text_output_per_1k: 0.02,
};

fn pricing_for(model: &str) -> Pricing {
    // Only realtime models are billed through this path today.
    let _ = model;
    REALTIME_PRICING
}

fn cost_of(event: &UsageEvent) -> f64 {
    let pricing = pricing_for(&event.model);
    match (event.kind, event.unit) {
        (UsageKind::AudioInput, UsageUnit::Seconds) => {
            event.quantity / 60.0 * pricing.audio_input_per_min
        }
        (UsageKind::AudioOutput, UsageUnit::Seconds) => {
            event.quantity / 60.0 * pricing.audio_output_per_min
        }
        (UsageKind::TextInput, UsageUnit::Tokens) => {
            event.quantity / 1000.0 * pricing.text_input_per_1k
        }
        (UsageKind::TextOutput, UsageUnit::Tokens) => {
            event.quantity / 1000.0 * pricing.text_output_per_1k
        }
        (UsageKind::ToolCall, _) => 0.0,
        // Mismatched unit for the kind: count nothing rather than guess.
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Serialize)]
struct LedgerEntry {
    timestamp: String,
    #[serde(flatten)]
    event: UsageEvent,
    cost: f64,
}

#[derive(Debug, Serialize)]
struct SessionStats {
    session_id: String,
    start_time: String,
    end_time: Option<String>,
    total_cost: f64,
    entries: Vec<LedgerEntry>,
}

/// File-backed ledger implementation.
pub struct CostLedger {
    log_dir: Option<PathBuf>,
    session_file: Option<PathBuf>,
    stats: Mutex<SessionStats>,
}

impl CostLedger {
    /// Create a ledger writing under `log_dir`; pass `None` to keep the
    /// record in memory only.
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        let started = Local::now();
        let session_id = started.format("%Y%m%d_%H%M%S").to_string();
        let session_file = log_dir.as_ref().map(|dir| {
            dir.join(format!(
                "session_{}.json",
                started.format("%Y-%m-%d_at_%H-%M-%S")
            ))
        });

        if let Some(dir) = &log_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("failed to create log directory {}: {}", dir.display(), e);
            }
        }

        Self {
            log_dir,
            session_file,
            stats: Mutex::new(SessionStats {
                session_id,
                start_time: started.to_rfc3339(),
                end_time: None,
                total_cost: 0.0,
                entries: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_session(&self, stats: &SessionStats) {
        let Some(path) = &self.session_file else {
            return;
        };
        match serde_json::to_string_pretty(stats) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("failed to save cost log: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize cost log: {}", e),
        }
    }

    fn update_summary(&self) {
        let Some(dir) = &self.log_dir else {
            return;
        };
        let summary_path = dir.join("usage_summary.json");

        let mut summary: serde_json::Value = std::fs::read_to_string(&summary_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_else(|| serde_json::json!({"sessions": [], "total_cost_all_time": 0.0}));

        let stats = self.lock();
        let session = serde_json::json!({
            "session_id": stats.session_id,
            "start": stats.start_time,
            "end": stats.end_time,
            "entries": stats.entries.len(),
            "cost": stats.total_cost,
        });
        drop(stats);

        if let Some(sessions) = summary.get_mut("sessions").and_then(|s| s.as_array_mut()) {
            sessions.push(session);
            let total: f64 = sessions
                .iter()
                .filter_map(|s| s.get("cost").and_then(|c| c.as_f64()))
                .sum();
            summary["total_cost_all_time"] = serde_json::json!(total);
        }

        match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&summary_path, json) {
                    warn!("failed to update usage summary: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize usage summary: {}", e),
        }
    }
}

impl UsageLedger for CostLedger {
    fn record(&self, event: UsageEvent) {
        let cost = cost_of(&event);
        debug!(?event.kind, quantity = event.quantity, cost, "usage recorded");
        let mut stats = self.lock();
        stats.total_cost += cost;
        stats.entries.push(LedgerEntry {
            timestamp: Local::now().to_rfc3339(),
            event,
            cost,
        });
        self.save_session(&stats);
    }

    fn current_total(&self) -> f64 {
        self.lock().total_cost
    }

    /// Mark the session finished and roll it into the aggregate summary.
    fn finish(&self) {
        {
            let mut stats = self.lock();
            stats.end_time = Some(Local::now().to_rfc3339());
            self.save_session(&stats);
        }
        self.update_summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("medivoice-ledger-{}-{}", tag, std::process::id()))
    }

    fn audio_out(seconds: f64) -> UsageEvent {
        UsageEvent {
            kind: UsageKind::AudioOutput,
            quantity: seconds,
            unit: UsageUnit::Seconds,
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
        }
    }

    #[test]
    fn test_costs_accumulate_per_pricing_table() {
        let ledger = CostLedger::new(None);
        ledger.record(audio_out(60.0));
        ledger.record(UsageEvent {
            kind: UsageKind::AudioInput,
            quantity: 60.0,
            unit: UsageUnit::Seconds,
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
        });
        ledger.record(UsageEvent {
            kind: UsageKind::TextOutput,
            quantity: 1000.0,
            unit: UsageUnit::Tokens,
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
        });

        // 0.24 + 0.06 + 0.02
        assert!((ledger.current_total() - 0.32).abs() < 1e-9);
    }

    #[test]
    fn test_tool_calls_are_free_but_counted() {
        let ledger = CostLedger::new(None);
        ledger.record(UsageEvent {
            kind: UsageKind::ToolCall,
            quantity: 1.0,
            unit: UsageUnit::Calls,
            model: "tool".to_string(),
        });
        assert_eq!(ledger.current_total(), 0.0);
        assert_eq!(ledger.lock().entries.len(), 1);
    }

    #[test]
    fn test_session_file_is_persisted() {
        let dir = temp_log_dir("persist");
        let _ = std::fs::remove_dir_all(&dir);

        let ledger = CostLedger::new(Some(dir.clone()));
        ledger.record(audio_out(30.0));
        ledger.finish();

        let session_files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("session_"))
            .collect();
        assert_eq!(session_files.len(), 1);

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(session_files[0].path()).unwrap())
                .unwrap();
        assert!((parsed["total_cost"].as_f64().unwrap() - 0.12).abs() < 1e-9);
        assert!(parsed["end_time"].is_string());

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.join("usage_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["sessions"].as_array().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_log_dir_never_fails() {
        // Memory-only ledger: recording still works, nothing is written.
        let ledger = CostLedger::new(None);
        ledger.record(audio_out(10.0));
        ledger.finish();
        assert!(ledger.current_total() > 0.0);
    }
}
