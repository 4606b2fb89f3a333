use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of the session journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: String,
    pub event_type: String,
    pub state: String,
    pub session_id: Option<String>,
    pub currency: Option<String>,
    pub address: Option<String>,
    pub amount: Option<f64>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

impl JournalEntry {
    pub fn new(event_type: &str, state: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            state: state.to_string(),
            session_id: None,
            currency: None,
            address: None,
            amount: None,
            tx_hash: None,
            error: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_deposit(mut self, address: Option<&str>, amount: Option<f64>) -> Self {
        self.address = address.map(str::to_string);
        self.amount = amount;
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: String) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Append-only JSONL record of session events.
#[derive(Debug, Clone)]
pub struct SessionJournal {
    path: PathBuf,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, entry: &JournalEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        tracing::debug!(event_type = %entry.event_type, session_id = ?entry.session_id, "Journal entry written");
        Ok(())
    }
}
