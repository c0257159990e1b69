// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Policy Validator
//!
//! Two strictly ordered phases over a decoded payload:
//!
//! 1. **Filter**: drop every key the schema does not name, at every object
//!    level the schema describes. Dropped keys never reach Docker.
//! 2. **Validate**: check each surviving key against its [`FieldRule`].
//!
//! Filtering only descends through [`FieldRule::Nested`] fields. Arrays and
//! values under unrestricted fields are left untouched because the schema
//! says nothing about their contents.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Turns a payload into either a forwardable value or a violation list

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::domain::policy::{FieldRule, ObjectSchema};

/// Reported when a constant-rule field holds anything but its constant.
pub const ENUM_MISMATCH: &str = "must be an enum value";
/// Reported when a typed or nested field holds a value of the wrong type.
pub const WRONG_TYPE: &str = "is the wrong type";

const ROOT_PATH: &str = "data";

/// A single policy violation, serialized into the 403 response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Dotted path rooted at `data`, e.g. `data.HostConfig.Privileged`.
    pub field: String,
    pub message: String,
    /// The offending value as received.
    pub value: Value,
}

impl Violation {
    fn new(field: String, message: &str, value: &Value) -> Self {
        Self {
            field,
            message: message.to_string(),
            value: value.clone(),
        }
    }
}

/// Applies an [`ObjectSchema`] to decoded payloads.
///
/// Cheap to clone; the schema itself is shared and never mutated.
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    schema: Arc<ObjectSchema>,
}

impl PolicyValidator {
    pub fn new(schema: Arc<ObjectSchema>) -> Self {
        Self { schema }
    }

    /// Strip unknown keys in place, returning how many were removed.
    pub fn filter(&self, payload: &mut Value) -> usize {
        filter_object(&self.schema, payload)
    }

    /// Check an already filtered payload. An empty list means it passes.
    pub fn validate(&self, payload: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        validate_object(&self.schema, payload, ROOT_PATH, &mut violations);
        violations
    }

    /// Filter then validate, consuming the payload.
    ///
    /// On success the returned value is the filtered payload that may be
    /// forwarded. The unfiltered form is gone once this returns.
    pub fn admit(&self, mut payload: Value) -> Result<Value, Vec<Violation>> {
        let stripped = self.filter(&mut payload);
        if stripped > 0 {
            tracing::debug!(stripped, "Removed fields not covered by policy");
        }

        let violations = self.validate(&payload);
        if violations.is_empty() {
            Ok(payload)
        } else {
            Err(violations)
        }
    }
}

fn filter_object(schema: &ObjectSchema, value: &mut Value) -> usize {
    let Some(map) = value.as_object_mut() else {
        return 0;
    };

    let before = map.len();
    map.retain(|key, _| schema.allows(key));
    let mut stripped = before - map.len();

    for (name, rule) in schema.fields() {
        if let FieldRule::Nested(child) = rule {
            if let Some(nested) = map.get_mut(name) {
                stripped += filter_object(child, nested);
            }
        }
    }

    stripped
}

fn validate_object(
    schema: &ObjectSchema,
    value: &Value,
    path: &str,
    violations: &mut Vec<Violation>,
) {
    let Some(map) = value.as_object() else {
        violations.push(Violation::new(path.to_string(), WRONG_TYPE, value));
        return;
    };

    for (name, rule) in schema.fields() {
        let Some(field_value) = map.get(name) else {
            continue;
        };
        let field = format!("{}.{}", path, name);

        match rule {
            FieldRule::Unrestricted => {}
            FieldRule::Constant(expected) => {
                if field_value != expected {
                    violations.push(Violation::new(field, ENUM_MISMATCH, field_value));
                }
            }
            FieldRule::Typed(ty) => {
                if !ty.matches(field_value) {
                    violations.push(Violation::new(field, WRONG_TYPE, field_value));
                }
            }
            FieldRule::Nested(child) => {
                validate_object(child, field_value, &field, violations);
            }
        }
    }
}
