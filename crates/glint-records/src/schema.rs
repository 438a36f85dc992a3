//! The schema registry.
//!
//! A schema maps each record type to its shape validator. It is built once at
//! process start and never changes; the host and every display process build
//! byte-for-byte the same registry, and replication treats any disagreement
//! (version or type list) as a fatal protocol error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Record, RecordType};

/// A record failed its shape check.
///
/// This is a programmer error: validated call sites never produce one.
/// Whether a caller crashes or logs-and-drops the mutation is the caller's
/// policy; the store itself only refuses the batch.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("schema violation in {type_tag}.{field}: {message}")]
pub struct SchemaViolation {
    /// The type tag of the offending record.
    pub type_tag: RecordType,
    /// The field that failed the check.
    pub field: &'static str,
    /// What was wrong with it.
    pub message: String,
}

impl SchemaViolation {
    pub fn new(type_tag: RecordType, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_tag,
            field,
            message: message.into(),
        }
    }
}

/// A per-type shape check.
pub type Validator = Arc<dyn Fn(&Record) -> Result<(), SchemaViolation> + Send + Sync>;

/// Builder for a [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    validators: BTreeMap<RecordType, Validator>,
}

impl SchemaBuilder {
    /// Registers a type tag with its validator. Re-registering a tag
    /// replaces the previous validator.
    pub fn register<F>(mut self, record_type: RecordType, validator: F) -> Self
    where
        F: Fn(&Record) -> Result<(), SchemaViolation> + Send + Sync + 'static,
    {
        self.validators.insert(record_type, Arc::new(validator));
        self
    }

    pub fn build(self, version: u32) -> Schema {
        Schema {
            version,
            validators: self.validators,
        }
    }
}

/// The fixed registry of record types and their validators.
#[derive(Clone)]
pub struct Schema {
    version: u32,
    validators: BTreeMap<RecordType, Validator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("version", &self.version)
            .field("record_types", &self.record_types())
            .finish()
    }
}

impl Schema {
    /// The schema version both processes must agree on.
    pub const CURRENT_VERSION: u32 = 1;

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// The registry used by the capture tool, identical in every process.
    pub fn capture_tool() -> Self {
        Self::builder()
            .register(RecordType::Display, |record| match record {
                Record::Display(display) => {
                    if !display.scale_factor.is_finite() || display.scale_factor <= 0.0 {
                        return Err(SchemaViolation::new(
                            RecordType::Display,
                            "scaleFactor",
                            format!("must be finite and positive, got {}", display.scale_factor),
                        ));
                    }
                    Ok(())
                }
                other => Err(variant_mismatch(other, RecordType::Display)),
            })
            .register(RecordType::Window, |record| match record {
                Record::Window(window) => {
                    if let Some(child) = &window.child_window_id {
                        if child.as_str().is_empty() {
                            return Err(SchemaViolation::new(
                                RecordType::Window,
                                "childWindowId",
                                "must not be empty when present",
                            ));
                        }
                    }
                    Ok(())
                }
                other => Err(variant_mismatch(other, RecordType::Window)),
            })
            .register(RecordType::Capture, |record| match record {
                Record::Capture(_) => Ok(()),
                other => Err(variant_mismatch(other, RecordType::Capture)),
            })
            .register(RecordType::Editor, |record| match record {
                Record::Editor(editor) => {
                    if let Some(path) = &editor.file_path {
                        if path.is_empty() {
                            return Err(SchemaViolation::new(
                                RecordType::Editor,
                                "filePath",
                                "must not be empty when present",
                            ));
                        }
                    }
                    Ok(())
                }
                other => Err(variant_mismatch(other, RecordType::Editor)),
            })
            .register(RecordType::Preferences, |record| match record {
                Record::Preferences(_) => Ok(()),
                other => Err(variant_mismatch(other, RecordType::Preferences)),
            })
            .build(Self::CURRENT_VERSION)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The registered type tags, in stable order.
    pub fn record_types(&self) -> Vec<RecordType> {
        self.validators.keys().copied().collect()
    }

    /// Checks whether a record instance belongs to the given type.
    pub fn is_instance(&self, record: &Record, record_type: RecordType) -> bool {
        record.record_type() == record_type
    }

    /// Validates one record: ID prefix against variant, then the type's
    /// registered shape check.
    pub fn validate(&self, record: &Record) -> Result<(), SchemaViolation> {
        let type_tag = record.record_type();
        match record.id().record_type() {
            Ok(prefix_type) if prefix_type == type_tag => {}
            Ok(prefix_type) => {
                return Err(SchemaViolation::new(
                    type_tag,
                    "id",
                    format!("ID prefix names {prefix_type}, record is {type_tag}"),
                ));
            }
            Err(prefix) => {
                return Err(SchemaViolation::new(
                    type_tag,
                    "id",
                    format!("unknown ID prefix {prefix:?}"),
                ));
            }
        }

        match self.validators.get(&type_tag) {
            Some(validator) => validator(record),
            None => Err(SchemaViolation::new(
                type_tag,
                "typeName",
                "type is not registered in this schema",
            )),
        }
    }

    /// The snapshot header describing this schema.
    pub fn info(&self) -> SchemaInfo {
        SchemaInfo {
            version: self.version,
            record_types: self.record_types(),
        }
    }

    /// Checks a snapshot header against this registry.
    pub fn accepts(&self, info: &SchemaInfo) -> bool {
        info.version == self.version && info.record_types == self.record_types()
    }
}

/// The schema header carried in every snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub version: u32,
    pub record_types: Vec<RecordType>,
}

fn variant_mismatch(record: &Record, expected: RecordType) -> SchemaViolation {
    SchemaViolation::new(
        record.record_type(),
        "typeName",
        format!(
            "validator for {expected} received a {} record",
            record.record_type()
        ),
    )
}
