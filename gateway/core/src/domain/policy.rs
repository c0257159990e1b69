// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Container Create Policy
//!
//! Declarative whitelist applied to `POST /containers/create` payloads.
//! Every object level strips keys it does not name; the keys it does name
//! must satisfy their [`FieldRule`] or the request is refused.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Immutable schema shared read-only by every connection

use serde_json::{json, Value};

/// Primitive JSON type a [`FieldRule::Typed`] field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::Null => value.is_null(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Number => value.is_number(),
            JsonType::String => value.is_string(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
        }
    }
}

/// Constraint attached to one named field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Any value is accepted.
    Unrestricted,
    /// If present, the value must deep-equal this constant.
    Constant(Value),
    /// If present, the value must be of this type.
    Typed(JsonType),
    /// If present, the value must be an object conforming to the child schema.
    Nested(ObjectSchema),
}

/// One object level of the policy: an ordered list of permitted keys.
///
/// Declaration order is kept so violations are reported deterministically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    fields: Vec<(&'static str, FieldRule)>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field declaration.
    pub fn field(mut self, name: &'static str, rule: FieldRule) -> Self {
        self.fields.push((name, rule));
        self
    }

    pub fn unrestricted(self, name: &'static str) -> Self {
        self.field(name, FieldRule::Unrestricted)
    }

    pub fn constant(self, name: &'static str, value: Value) -> Self {
        self.field(name, FieldRule::Constant(value))
    }

    pub fn typed(self, name: &'static str, ty: JsonType) -> Self {
        self.field(name, FieldRule::Typed(ty))
    }

    pub fn nested(self, name: &'static str, schema: ObjectSchema) -> Self {
        self.field(name, FieldRule::Nested(schema))
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, rule)| rule)
    }

    pub fn allows(&self, name: &str) -> bool {
        self.rule(name).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (*name, rule))
    }
}

/// The policy enforced on container creation.
///
/// Anything not listed is stripped before the payload reaches Docker. Mounts,
/// port publishing, capabilities, devices, privileged mode and namespace
/// sharing are pinned to their defaults.
pub fn container_create_policy() -> ObjectSchema {
    let host_config = ObjectSchema::new()
        .constant("Binds", Value::Null)
        .unrestricted("Links")
        .constant("LxcConf", json!([]))
        .constant("PortBindings", json!({}))
        .constant("PublishAllPorts", json!(false))
        .constant("Privileged", json!(false))
        .typed("ReadonlyRootfs", JsonType::Boolean)
        .unrestricted("Dns")
        .unrestricted("DnsSearch")
        .unrestricted("ExtraHosts")
        .unrestricted("VolumesFrom")
        .constant("CapAdd", Value::Null)
        .constant("CapDrop", Value::Null)
        .unrestricted("RestartPolicy")
        .constant("NetworkMode", json!("bridge"))
        .constant("Devices", json!([]))
        // undocumented
        .constant("ContainerIDFile", json!(""))
        .constant("IpcMode", json!(""))
        .constant("PidMode", json!(""))
        .constant("SecurityOpt", Value::Null);

    ObjectSchema::new()
        .unrestricted("Hostname")
        .unrestricted("Domainname")
        .unrestricted("User")
        .unrestricted("Memory")
        .unrestricted("MemorySwap")
        .unrestricted("CpuShares")
        .unrestricted("Cpuset")
        .unrestricted("AttachStdin")
        .unrestricted("AttachStdout")
        .unrestricted("AttachStderr")
        .unrestricted("Tty")
        .unrestricted("OpenStdin")
        .unrestricted("StdinOnce")
        .unrestricted("Env")
        .unrestricted("Cmd")
        .unrestricted("Entrypoint")
        .unrestricted("Image")
        .unrestricted("WorkingDir")
        .unrestricted("NetworkDisabled")
        .unrestricted("OnBuild")
        .constant("MacAddress", json!(""))
        .constant("Volumes", json!({}))
        .constant("ExposedPorts", json!({}))
        .constant("SecurityOpts", Value::Null)
        .nested("HostConfig", host_config)
}
