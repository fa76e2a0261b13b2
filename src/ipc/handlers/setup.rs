use crate::db;
use crate::entry::PenaltyDivisor;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, EntrySettings, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Entry,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(Self::Entry),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Entry => "setup.entry",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Entry => json!({
            "defaultPenaltyDivisor": PenaltyDivisor::DEFAULT,
            "netDisplayDecimals": 2,
            "maxPasteLines": 2000
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_divisor(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(n > 0.0 && n <= 10.0) {
        return Err(format!("{} must be > 0 and <= 10", key));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Entry => match k.as_str() {
                "defaultPenaltyDivisor" => {
                    obj.insert(k.clone(), Value::from(parse_divisor(v, k)?));
                }
                "netDisplayDecimals" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 4)?));
                }
                "maxPasteLines" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10_000)?));
                }
                _ => return Err(format!("unknown entry field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Typed view of the `entry` section, with defaults for anything unset.
pub fn load_entry_settings(conn: &rusqlite::Connection) -> anyhow::Result<EntrySettings> {
    let v = load_section(conn, SetupSection::Entry)?;
    Ok(EntrySettings {
        default_penalty_divisor: v
            .get("defaultPenaltyDivisor")
            .and_then(|x| x.as_f64())
            .unwrap_or(PenaltyDivisor::DEFAULT),
        net_display_decimals: v
            .get("netDisplayDecimals")
            .and_then(|x| x.as_u64())
            .unwrap_or(2) as u32,
        max_paste_lines: v
            .get("maxPasteLines")
            .and_then(|x| x.as_u64())
            .unwrap_or(2000) as usize,
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entry = match load_section(conn, SetupSection::Entry) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "entry": entry }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
