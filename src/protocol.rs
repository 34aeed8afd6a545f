use serde_json::{Map, Value};

use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "e3.lvi.eu";
pub const API_PATH: &str = "/api/v0.1/";
pub const DEFAULT_LANG: &str = "en_GB";

pub const AUTH_ENDPOINT: &str = "human/user/auth/";
pub const USER_READ_ENDPOINT: &str = "human/user/read/";
pub const HOME_READ_ENDPOINT: &str = "human/smarthome/read/";
pub const QUERY_PUSH_ENDPOINT: &str = "human/query/push/";

pub const STATUS_READ_OK: i64 = 1;
pub const STATUS_WRITE_OK: i64 = 8;

/// Status key returned by the auth endpoint for a bad email/password pair.
pub const ERR_PARAM: &str = "ERR_PARAM";

const WRITE_CONTEXT: &str = "1";
const WRITE_PEREMPTION_MS: &str = "15000";

const REDACTED_FIELDS: &[&str] = &["password", "token"];

pub type Form = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStatus {
    pub code: i64,
    pub key: String,
    pub value: String,
}

/// Decoded response envelope: `{code: {code, key, value}, data, parameters}`.
#[derive(Debug, Clone)]
pub struct ApiResult {
    pub status: ApiStatus,
    pub data: Value,
    pub parameters: Value,
}

pub fn parse_envelope(body: &Value) -> Result<ApiResult> {
    let (code, data, parameters) = match (body.get("code"), body.get("data"), body.get("parameters")) {
        (Some(c), Some(d), Some(p)) => (c, d, p),
        _ => {
            return Err(Error::Malformed(
                "expected code, data and parameters in envelope".to_string(),
            ));
        }
    };

    let status = ApiStatus {
        code: field_i64(code, "code")
            .ok_or_else(|| Error::Malformed("status code is not an integer".to_string()))?,
        key: field_str(code, "key")
            .ok_or_else(|| Error::Malformed("status key missing".to_string()))?,
        value: field_str(code, "value").unwrap_or_default(),
    };

    Ok(ApiResult {
        status,
        data: data.clone(),
        parameters: parameters.clone(),
    })
}

/// Token rejections on read/write endpoints. The vendor reports these with a
/// key mentioning the token rather than a dedicated status code.
pub fn is_auth_status(status: &ApiStatus) -> bool {
    let key = status.key.to_ascii_uppercase();
    key.contains("TOKEN") || key.contains("AUTH")
}

pub fn password_hash(password: &str) -> String {
    format!("{:x}", md5::compute(password.as_bytes()))
}

pub fn auth_form(email: &str, password_hash: &str, lang: &str) -> Form {
    vec![
        ("email".to_string(), email.to_string()),
        ("password".to_string(), password_hash.to_string()),
        ("remember_me".to_string(), "true".to_string()),
        ("lang".to_string(), lang.to_string()),
    ]
}

pub fn user_read_form(email: &str) -> Form {
    vec![("email".to_string(), email.to_string())]
}

pub fn home_read_form(home_id: &str) -> Form {
    vec![("smarthome_id".to_string(), home_id.to_string())]
}

pub fn query_push_form(home_id: &str, query: &[(&str, String)]) -> Form {
    let mut form = vec![
        ("smarthome_id".to_string(), home_id.to_string()),
        ("context".to_string(), WRITE_CONTEXT.to_string()),
        ("peremption".to_string(), WRITE_PEREMPTION_MS.to_string()),
    ];
    for (field, value) in query {
        form.push((format!("query[{field}]"), value.clone()));
    }
    form
}

/// Form as a JSON object with credentials masked, for the message log.
pub fn redacted(form: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in form {
        let value = if REDACTED_FIELDS.contains(&key.as_str()) {
            "***".to_string()
        } else {
            value.clone()
        };
        map.insert(key.clone(), Value::String(value));
    }
    Value::Object(map)
}

/// The API encodes most scalars as strings; accept numbers too.
pub fn field_str(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

pub fn field_i64(data: &Value, key: &str) -> Option<i64> {
    match data.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn field_bool(data: &Value, key: &str) -> Option<bool> {
    match data.get(key)? {
        Value::Bool(b) => Some(*b),
        _ => field_i64(data, key).map(|v| v != 0),
    }
}
