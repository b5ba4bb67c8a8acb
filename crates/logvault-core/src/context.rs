//! User and session context attached to records
//!
//! A [`ContextProvider`] is consulted once per accepted record by the
//! dispatch facade; its result is attached to the record before it is
//! sanitized and delivered.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::value::{Metadata, Value};

/// Build flavour the application is running as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Debug,
    Release,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Debug => write!(f, "debug"),
            Environment::Release => write!(f, "release"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Who and what produced a record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// Signed-in user, if any
    pub user_id: Option<String>,
    /// Current session
    pub session_id: Option<String>,
    pub device_id: String,
    pub app_version: String,
    pub build_number: String,
    pub os_version: String,
    pub device_model: String,
    pub environment: Environment,
    /// Free-form attributes supplied by the application
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, Value>,
}

impl UserContext {
    /// Create a context for the given device, with everything else defaulted
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Default::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_app_version(
        mut self,
        version: impl Into<String>,
        build_number: impl Into<String>,
    ) -> Self {
        self.app_version = version.into();
        self.build_number = build_number.into();
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    /// Flatten into a metadata map
    ///
    /// Custom attributes are merged last and may shadow the fixed keys.
    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("deviceId".into(), Value::from(self.device_id.as_str()));
        map.insert("appVersion".into(), Value::from(self.app_version.as_str()));
        map.insert("buildNumber".into(), Value::from(self.build_number.as_str()));
        map.insert("osVersion".into(), Value::from(self.os_version.as_str()));
        map.insert("deviceModel".into(), Value::from(self.device_model.as_str()));
        map.insert("environment".into(), Value::from(self.environment.to_string()));
        if let Some(user_id) = &self.user_id {
            map.insert("userId".into(), Value::from(user_id.as_str()));
        }
        if let Some(session_id) = &self.session_id {
            map.insert("sessionId".into(), Value::from(session_id.as_str()));
        }
        for (key, value) in &self.custom_attributes {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

/// Supplies the ambient user context for new records
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn current_context(&self) -> UserContext;
}

/// Context provider backed by a fixed context with mutable user/session
pub struct StaticContextProvider {
    context: RwLock<UserContext>,
}

impl StaticContextProvider {
    pub fn new(context: UserContext) -> Self {
        Self {
            context: RwLock::new(context),
        }
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.context.write().user_id = user_id;
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.context.write().session_id = session_id;
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.context
            .write()
            .custom_attributes
            .insert(key.into(), value.into());
    }

    pub fn snapshot(&self) -> UserContext {
        self.context.read().clone()
    }
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn current_context(&self) -> UserContext {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_map_includes_optional_ids() {
        let ctx = UserContext::new("device-1")
            .with_user_id("u-42")
            .with_environment(Environment::Production)
            .with_attribute("plan", "pro");

        let map = ctx.to_map();
        assert_eq!(map["deviceId"], Value::from("device-1"));
        assert_eq!(map["userId"], Value::from("u-42"));
        assert_eq!(map["environment"], Value::from("production"));
        assert_eq!(map["plan"], Value::from("pro"));
        assert!(!map.contains_key("sessionId"));
    }

    #[tokio::test]
    async fn test_static_provider_reflects_updates() {
        let provider = StaticContextProvider::new(UserContext::new("device-1"));
        assert!(provider.current_context().await.user_id.is_none());

        provider.set_user_id(Some("u-1".into()));
        provider.set_session_id(Some("s-1".into()));

        let ctx = provider.current_context().await;
        assert_eq!(ctx.user_id.as_deref(), Some("u-1"));
        assert_eq!(ctx.session_id.as_deref(), Some("s-1"));
    }
}
