use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::home::{Home, User};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    API_PATH, AUTH_ENDPOINT, ApiResult, DEFAULT_HOST, DEFAULT_LANG, ERR_PARAM, Form, HOME_READ_ENDPOINT,
    QUERY_PUSH_ENDPOINT, STATUS_READ_OK, STATUS_WRITE_OK, USER_READ_ENDPOINT, auth_form, home_read_form,
    is_auth_status, parse_envelope, password_hash, query_push_form, user_read_form,
};
use crate::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct AuthData {
    token: String,
    user_infos: UserInfos,
}

#[derive(Deserialize)]
struct UserInfos {
    email: String,
}

pub struct ApiSessionBuilder {
    email: String,
    host: String,
    protocol: String,
    lang: String,
    token: Option<String>,
    timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl ApiSessionBuilder {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            host: DEFAULT_HOST.to_string(),
            protocol: "https".to_string(),
            lang: DEFAULT_LANG.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    /// Vendor host, e.g. `e3.lvi.eu`, or `ip:port` for a local mock.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn protocol(mut self, proto: &str) -> Self {
        self.protocol = proto.to_string();
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Reuse a token persisted from an earlier login.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ApiSession> {
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        Ok(ApiSession {
            http,
            base_url: format!("{}://{}{}", self.protocol, self.host, API_PATH),
            host: self.host,
            lang: self.lang,
            email: RwLock::new(self.email),
            token: RwLock::new(self.token),
            logger,
        })
    }
}

/// Authenticated request/response cycle against the vendor API.
///
/// Every method takes `&self`; share the session behind an `Arc`.
pub struct ApiSession {
    http: reqwest::Client,
    base_url: String,
    host: String,
    lang: String,
    email: RwLock<String>,
    token: RwLock<Option<String>>,
    logger: Option<Mutex<MessageLogger>>,
}

impl ApiSession {
    pub fn builder(email: impl Into<String>) -> ApiSessionBuilder {
        ApiSessionBuilder::new(email)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn email(&self) -> String {
        self.email.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    /// Log in with a clear-text password; it is MD5-hashed before sending.
    pub async fn authenticate(&self, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(Error::Auth {
                key: "NO_PASSWORD".to_string(),
                message: "no password provided".to_string(),
            });
        }
        self.authenticate_with_hash(&password_hash(password)).await
    }

    pub async fn authenticate_with_hash(&self, hash: &str) -> Result<()> {
        if hash.is_empty() {
            return Err(Error::Auth {
                key: "NO_PASSWORD".to_string(),
                message: "no password hash provided".to_string(),
            });
        }

        let email = self.email();
        let result = self.post(AUTH_ENDPOINT, auth_form(&email, hash, &self.lang)).await?;
        if result.status.code != STATUS_READ_OK {
            let message = if result.status.key == ERR_PARAM {
                "invalid email or password".to_string()
            } else {
                result.status.value.clone()
            };
            return Err(Error::Auth {
                key: result.status.key,
                message,
            });
        }

        let auth: AuthData = serde_json::from_value(result.data)
            .map_err(|e| Error::Malformed(format!("auth response: {e}")))?;
        debug!(email = %auth.user_infos.email, "authenticated");
        *self.email.write().unwrap_or_else(|e| e.into_inner()) = auth.user_infos.email;
        self.set_token(Some(auth.token));
        Ok(())
    }

    pub async fn get_user(&self) -> Result<User> {
        let mut user = User::new(self.email());
        user.apply(&self.read_user().await?)?;
        Ok(user)
    }

    pub async fn get_home(&self, home_id: &str) -> Result<Home> {
        let mut home = Home::new(home_id);
        home.apply_snapshot(&self.read_home(home_id).await?)?;
        Ok(home)
    }

    pub async fn read_user(&self) -> Result<Value> {
        let result = self.read(USER_READ_ENDPOINT, user_read_form(&self.email())).await?;
        Ok(result.data)
    }

    /// Raw `smarthome/read` payload for one home.
    pub async fn read_home(&self, home_id: &str) -> Result<Value> {
        let result = self.read(HOME_READ_ENDPOINT, home_read_form(home_id)).await?;
        if let Some(logger) = &self.logger {
            logger
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .log_home(home_id, &result.data);
        }
        Ok(result.data)
    }

    /// Queue a device change. The vendor applies it asynchronously.
    pub async fn push_query(&self, home_id: &str, action: &str, query: &[(&str, String)]) -> Result<()> {
        if let Some(logger) = &self.logger {
            logger
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .log_command(action, home_id, query);
        }
        self.write(QUERY_PUSH_ENDPOINT, query_push_form(home_id, query))
            .await?;
        Ok(())
    }

    pub async fn read(&self, endpoint: &str, form: Form) -> Result<ApiResult> {
        self.authorized(endpoint, form, STATUS_READ_OK).await
    }

    pub async fn write(&self, endpoint: &str, form: Form) -> Result<ApiResult> {
        self.authorized(endpoint, form, STATUS_WRITE_OK).await
    }

    async fn authorized(&self, endpoint: &str, mut form: Form, expected: i64) -> Result<ApiResult> {
        let token = self.token().ok_or(Error::NotAuthenticated)?;
        form.push(("token".to_string(), token));
        form.push(("lang".to_string(), self.lang.clone()));

        let result = self.post(endpoint, form).await?;
        if result.status.code == expected {
            return Ok(result);
        }

        let status = result.status;
        if is_auth_status(&status) {
            warn!(endpoint, key = %status.key, "token rejected");
            return Err(Error::Auth {
                message: status.value,
                key: status.key,
            });
        }
        Err(Error::Api {
            code: status.code,
            key: status.key,
            value: status.value,
        })
    }

    async fn post(&self, endpoint: &str, form: Form) -> Result<ApiResult> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, "posting to API");

        if let Some(logger) = &self.logger {
            logger
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .log_request(endpoint, &form);
        }

        let body: Value = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let result = parse_envelope(&body)?;
        trace!(endpoint, code = result.status.code, key = %result.status.key, "API status");

        if let Some(logger) = &self.logger {
            logger
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .log_response(endpoint, &result.status);
        }
        Ok(result)
    }
}
