// src/trigger/mod.rs

//! Trigger messages: typed model, schema validation, templates and the
//! writer that persists artifacts into the exchange directory.

pub mod model;
pub mod schema;
pub mod template;
pub mod writer;

pub use model::{Action, Metadata, Priority, SchemaEnum, Source, Timezone, TriggerMessage};
pub use schema::{
    parse_trigger, FieldError, ParseFailure, RawTrigger, ValidationErrors, SCHEMA_VERSION,
};
pub use template::{builtin_templates, TemplateRegistry, TriggerTemplate};
pub use writer::{
    artifact_id, unique_artifact_id, TriggerRequest, TriggerWriter, WrittenTrigger, GENERATOR,
};
