//! Configuration for a completion-tracking operation

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller overrides for one tracking operation.
///
/// The defaults track whatever sides the resource reports as open, observe
/// `error` signals, and detach all observers as soon as an outcome is known.
///
/// # Examples
///
/// ```rust
/// use settle::CompletionConfig;
///
/// // Only care about the writable side of a duplex resource
/// let config = CompletionConfig::default().with_readable(false);
/// assert_eq!(config.readable, Some(false));
/// assert!(config.error);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Track the readable side. `None` follows the resource's readable flag.
    pub readable: Option<bool>,

    /// Track the writable side. `None` follows the resource's writable flag.
    pub writable: Option<bool>,

    /// Observe `error` signals. When disabled, errors are left to other
    /// observers and only close/exit can fail the operation.
    pub error: bool,

    /// Detach all observers automatically once the outcome is produced.
    pub cleanup: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            readable: None,
            writable: None,
            error: true,
            cleanup: true,
        }
    }
}

impl CompletionConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Force tracking of the readable side on or off.
    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = Some(readable);
        self
    }

    /// Force tracking of the writable side on or off.
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    /// Enable or disable observation of `error` signals.
    pub fn with_errors(mut self, observe: bool) -> Self {
        self.error = observe;
        self
    }

    /// Enable or disable automatic cleanup.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Normalize an arbitrary options value.
    ///
    /// Anything that is not an object yields the default configuration.
    /// Inside an object, each recognized key is honored only when it holds a
    /// boolean; other values are ignored, so `{"error": "no"}` still observes
    /// errors.
    ///
    /// ```rust
    /// use settle::CompletionConfig;
    /// use serde_json::json;
    ///
    /// assert_eq!(CompletionConfig::normalize(&json!(null)), CompletionConfig::default());
    ///
    /// let config = CompletionConfig::normalize(&json!({ "writable": false, "cleanup": false }));
    /// assert_eq!(config.writable, Some(false));
    /// assert!(!config.cleanup);
    /// ```
    pub fn normalize(options: &Value) -> Self {
        let Value::Object(map) = options else {
            if !options.is_null() {
                tracing::debug!(kind = value_kind(options), "ignoring non-object options");
            }
            return Self::default();
        };

        let flag = |key: &str| map.get(key).and_then(Value::as_bool);
        let defaults = Self::default();
        Self {
            readable: flag("readable"),
            writable: flag("writable"),
            error: flag("error").unwrap_or(defaults.error),
            cleanup: flag("cleanup").unwrap_or(defaults.cleanup),
        }
    }
}

impl From<Value> for CompletionConfig {
    fn from(options: Value) -> Self {
        Self::normalize(&options)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
