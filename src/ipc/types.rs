use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::entry::ResultGridStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Settings captured when an entry session opens; they stay fixed until it closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySettings {
    pub default_penalty_divisor: f64,
    pub net_display_decimals: u32,
    pub max_paste_lines: usize,
}

pub struct EntrySession {
    pub session_id: String,
    pub exam_type_id: String,
    pub settings: EntrySettings,
    pub store: ResultGridStore,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub entry: Option<EntrySession>,
}
