use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;
use crate::protocol::{ApiStatus, redacted};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    Diffed,
}

/// Appends every API exchange to a file as one JSON object per line.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_homes: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_homes: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, endpoint: &str, form: &[(String, String)]) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "endpoint": endpoint,
            "body": redacted(form),
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, endpoint: &str, status: &ApiStatus) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "resp",
            "endpoint": endpoint,
            "code": status.code,
            "key": status.key,
            "value": status.value,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, action: &str, home_id: &str, query: &[(&str, String)]) {
        let body: serde_json::Map<String, Value> = query
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "home": home_id,
            "query": body,
        });
        self.write_line(&entry);
    }

    pub fn log_home(&mut self, home_id: &str, data: &Value) {
        match self.mode {
            MessageLogMode::Full => {
                let entry = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "home",
                    "home": home_id,
                    "body": data,
                });
                self.write_line(&entry);
            }
            MessageLogMode::Diffed => {
                let entry = match self.previous_homes.get(home_id) {
                    None => json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "home",
                        "home": home_id,
                        "full": true,
                        "body": data,
                    }),
                    Some(prev) => {
                        let mut changes = Vec::new();
                        diff_json(prev, data, "", &mut changes);
                        let change_entries: Vec<Value> = changes
                            .iter()
                            .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                            .collect();
                        json!({
                            "ts": Utc::now().to_rfc3339(),
                            "dir": "home",
                            "home": home_id,
                            "changes": change_entries,
                        })
                    }
                };
                self.write_line(&entry);
                self.previous_homes.insert(home_id.to_string(), data.clone());
            }
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
