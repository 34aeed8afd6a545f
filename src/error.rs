use std::fmt;

use crate::types::TempSlot;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Api { code: i64, key: String, value: String },
    Auth { key: String, message: String },
    NotAuthenticated,
    Malformed(String),
    Decode { entity: String, reason: String },
    InvalidUnit(String),
    InvalidMode(String),
    ReadOnlySlot(TempSlot),
    UnknownHome(String),
    UnknownDevice(String),
    UnsupportedDevice(String),
    Config(String),
    Io(std::io::Error),
}

impl Error {
    /// Credentials or token were rejected. Backing off does not help; the
    /// host has to re-authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. } | Error::NotAuthenticated)
    }

    /// Failures that are worth retrying on a later poll.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Api { .. } | Error::Malformed(_) | Error::Io(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { code, key, value } => {
                write!(f, "API request failed with status {key} ({code}): {value}")
            }
            Error::Auth { key, message } => write!(f, "authentication failed ({key}): {message}"),
            Error::NotAuthenticated => write!(f, "not authenticated"),
            Error::Malformed(msg) => write!(f, "malformed API response: {msg}"),
            Error::Decode { entity, reason } => write!(f, "cannot decode {entity}: {reason}"),
            Error::InvalidUnit(unit) => write!(f, "unknown temperature unit: {unit}"),
            Error::InvalidMode(mode) => write!(f, "invalid mode: {mode}"),
            Error::ReadOnlySlot(slot) => write!(f, "temperature slot is read-only: {slot}"),
            Error::UnknownHome(id) => write!(f, "unknown home: {id}"),
            Error::UnknownDevice(id) => write!(f, "unknown device: {id}"),
            Error::UnsupportedDevice(msg) => write!(f, "unsupported device operation: {msg}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => Error::Auth {
                key: "HTTP".to_string(),
                message: e.to_string(),
            },
            _ => Error::Http(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
