use serde_json::{Map, Value};

/// A single leaf-level difference: (dotted path, old value, new value).
pub(crate) type Change = (String, Value, Value);

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Recursively compare two JSON documents, collecting changed leaves.
///
/// Keys missing from `current` are reported with a `null` new value so the
/// message log shows when the vendor drops an entity from a snapshot.
pub(crate) fn diff_json(previous: &Value, current: &Value, path_prefix: &str, changes: &mut Vec<Change>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(path_prefix, key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(Map::new()), curr_val, &path, changes)
                    }
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    changes.push((join(path_prefix, key), prev_val.clone(), Value::Null));
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_changes() {
        let doc = json!({"devices": {"R1": {"gv_mode": "3"}}});
        let mut changes = Vec::new();
        diff_json(&doc, &doc, "", &mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn nested_leaf_change() {
        let prev = json!({"devices": {"R1": {"gv_mode": "3", "temperature_air": "210"}}});
        let curr = json!({"devices": {"R1": {"gv_mode": "0", "temperature_air": "210"}}});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes, vec![("devices.R1.gv_mode".to_string(), json!("3"), json!("0"))]);
    }

    #[test]
    fn new_object_reports_each_leaf() {
        let prev = json!({"devices": {}});
        let curr = json!({"devices": {"R2": {"gv_mode": "1", "label_interface": "Hall"}}});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|(path, old, _)| path.starts_with("devices.R2.") && old.is_null()));
    }

    #[test]
    fn removed_key_reported_as_null() {
        let prev = json!({"devices": {"R1": {"gv_mode": "3"}, "R2": {"gv_mode": "1"}}});
        let curr = json!({"devices": {"R1": {"gv_mode": "3"}}});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes, vec![("devices.R2".to_string(), json!({"gv_mode": "1"}), Value::Null)]);
    }
}
