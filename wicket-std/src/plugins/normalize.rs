//! Input normalization.
//!
//! Options (all default `true`):
//!
//! - `normalize`: apply normalization at all
//! - `strip_strings`: trim leading and trailing whitespace from strings
//! - `make_empty_strings_none`: turn empty strings into `null`
//!
//! Rules apply to strings and recursively to array elements and object
//! values. Object keys are left untouched.

use serde_json::Value;
use wicket_core::{Context, HookResult, Hooks, Options, Plugin};

/// Normalization switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    /// Trim strings.
    pub strip_strings: bool,
    /// Empty string becomes `null`.
    pub empty_to_null: bool,
}

impl Rules {
    /// Read the rules from a configuration snapshot.
    ///
    /// `None` when normalization is switched off.
    pub fn from_options(options: &Options) -> Option<Self> {
        options.flag("normalize", true).then(|| Rules {
            strip_strings: options.flag("strip_strings", true),
            empty_to_null: options.flag("make_empty_strings_none", true),
        })
    }

    /// Normalize `value` in place.
    pub fn apply(self, value: &mut Value) {
        if !self.strip_strings && !self.empty_to_null {
            return;
        }
        match value {
            Value::String(s) => {
                if self.strip_strings {
                    let trimmed = s.trim();
                    if trimmed.len() != s.len() {
                        *s = trimmed.to_string();
                    }
                }
                if self.empty_to_null && s.is_empty() {
                    *value = Value::Null;
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.apply(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.apply(v)),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}

/// Normalizes `input` according to the configured [`Rules`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeInputPlugin;

impl Plugin for NormalizeInputPlugin {
    fn implemented(&self) -> Hooks {
        Hooks::NORMALIZE_INPUT
    }

    fn name(&self) -> &'static str {
        "normalize_input"
    }

    async fn normalize_input(&self, ctx: &mut Context) -> HookResult {
        if let Some(rules) = Rules::from_options(ctx.options()) {
            if let Some(input) = ctx.input_mut() {
                rules.apply(input);
            }
        }
        Ok(())
    }
}
