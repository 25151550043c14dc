use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::descriptor::{
    enclosing_nonanonymous_class, parse_field_descriptor, parse_method_descriptor,
};
use crate::finding::CodePosition;
use crate::ir::{
    Class, ClassLoader, Field, FieldRef, InstanceKey, InstructionKind, Procedure, ProcedureId,
    RawProgram, ValueNumber,
};

const PROGRAM_MODEL_SCHEMA: &str = include_str!("../schema/program-model.schema.json");

/// Static field identity: declaring class plus name.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct StaticField {
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) is_final: bool,
}

/// Field found by walking the class hierarchy.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResolvedField<'a> {
    pub(crate) declaring_class: &'a str,
    pub(crate) field: &'a Field,
}

/// Read-only, indexed view over the program snapshot.
#[derive(Debug)]
pub(crate) struct ProgramModel {
    classes: BTreeMap<String, Class>,
    procedures: Vec<Procedure>,
    local_points_to: BTreeMap<(ProcedureId, ValueNumber), BTreeSet<InstanceKey>>,
    static_points_to: BTreeMap<(String, String), BTreeSet<InstanceKey>>,
    empty: BTreeSet<InstanceKey>,
}

impl ProgramModel {
    /// Load and validate a JSON program model from disk.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read program model {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("invalid program model {}", path.display()))
    }

    pub(crate) fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("parse program model JSON")?;
        validate_schema(&value)?;
        let raw: RawProgram = serde_path_to_error::deserialize(value)
            .map_err(|err| anyhow!("program model at {}: {}", err.path(), err.inner()))?;
        Self::from_raw(raw)
    }

    pub(crate) fn from_raw(raw: RawProgram) -> Result<Self> {
        let mut classes = BTreeMap::new();
        let mut duplicates = BTreeSet::new();
        for class in raw.classes {
            for field in &class.fields {
                if let Some(descriptor) = &field.descriptor {
                    parse_field_descriptor(descriptor)
                        .with_context(|| format!("field {}.{}", class.name, field.name))?;
                }
            }
            if classes.contains_key(&class.name) {
                duplicates.insert(class.name.clone());
                continue;
            }
            classes.insert(class.name.clone(), class);
        }
        if !duplicates.is_empty() {
            let names: Vec<_> = duplicates.into_iter().collect();
            anyhow::bail!("duplicate classes found: {}", names.join(", "));
        }

        let procedure_count = raw.procedures.len();
        for (id, procedure) in raw.procedures.iter().enumerate() {
            if !classes.contains_key(&procedure.class) {
                anyhow::bail!(
                    "procedure {id} ({}) is declared by unknown class {}",
                    procedure.signature(),
                    procedure.class
                );
            }
            parse_method_descriptor(&procedure.descriptor)
                .with_context(|| format!("procedure {id} ({})", procedure.signature()))?;
            for call in &procedure.calls {
                if let Some(target) = call.targets.iter().find(|t| **t >= procedure_count) {
                    anyhow::bail!(
                        "procedure {id} call site {} targets unknown procedure {target}",
                        call.call_site
                    );
                }
            }
            for (index, instruction) in procedure.instructions().iter().enumerate() {
                if let InstructionKind::Invoke { call_site } = instruction.kind {
                    if !procedure.calls.iter().any(|c| c.call_site == call_site) {
                        tracing::debug!(
                            "procedure {id} instruction {index}: call site {call_site} has no resolved targets"
                        );
                    }
                }
            }
        }

        let mut local_points_to: BTreeMap<_, BTreeSet<InstanceKey>> = BTreeMap::new();
        for entry in raw.points_to.locals {
            if entry.procedure >= procedure_count {
                anyhow::bail!(
                    "points-to entry for value {} names unknown procedure {}",
                    entry.value,
                    entry.procedure
                );
            }
            local_points_to
                .entry((entry.procedure, entry.value))
                .or_default()
                .extend(entry.instances);
        }

        let mut static_points_to: BTreeMap<_, BTreeSet<InstanceKey>> = BTreeMap::new();
        for entry in raw.points_to.static_fields {
            let declared = classes
                .get(&entry.class)
                .and_then(|class| class.fields.iter().find(|f| f.name == entry.name));
            match declared {
                Some(field) if field.is_static => {}
                _ => anyhow::bail!(
                    "points-to entry names unknown static field {}.{}",
                    entry.class,
                    entry.name
                ),
            }
            static_points_to
                .entry((entry.class, entry.name))
                .or_default()
                .extend(entry.instances);
        }

        Ok(Self {
            classes,
            procedures: raw.procedures,
            local_points_to,
            static_points_to,
            empty: BTreeSet::new(),
        })
    }

    pub(crate) fn procedure_count(&self) -> usize {
        self.procedures.len()
    }

    /// Procedures in call graph order.
    pub(crate) fn procedures(&self) -> impl Iterator<Item = (ProcedureId, &Procedure)> {
        self.procedures.iter().enumerate()
    }

    pub(crate) fn procedure(&self, id: ProcedureId) -> Option<&Procedure> {
        self.procedures.get(id)
    }

    pub(crate) fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Classes defined by the platform loader are outside the analysis universe.
    pub(crate) fn is_ignored_class(&self, name: &str) -> bool {
        self.classes
            .get(name)
            .is_some_and(|class| class.loader == ClassLoader::Primordial)
    }

    pub(crate) fn is_ignored_procedure(&self, procedure: &Procedure) -> bool {
        self.is_ignored_class(&procedure.class)
    }

    /// Every static field declared by a non-ignored class.
    pub(crate) fn static_fields(&self) -> Vec<StaticField> {
        self.classes
            .values()
            .filter(|class| class.loader != ClassLoader::Primordial)
            .flat_map(|class| {
                class
                    .fields
                    .iter()
                    .filter(|field| field.is_static)
                    .map(|field| StaticField {
                        class: class.name.clone(),
                        name: field.name.clone(),
                        is_final: field.is_final,
                    })
            })
            .collect()
    }

    pub(crate) fn points_to_local(
        &self,
        procedure: ProcedureId,
        value: ValueNumber,
    ) -> &BTreeSet<InstanceKey> {
        self.local_points_to
            .get(&(procedure, value))
            .unwrap_or(&self.empty)
    }

    pub(crate) fn points_to_static(&self, field: &StaticField) -> &BTreeSet<InstanceKey> {
        self.static_points_to
            .get(&(field.class.clone(), field.name.clone()))
            .unwrap_or(&self.empty)
    }

    /// Resolve a field reference against the declaring class and its superclasses.
    pub(crate) fn resolve_field(&self, field: &FieldRef) -> Option<ResolvedField<'_>> {
        let mut visited = BTreeSet::new();
        let mut current = Some(field.class.as_str());
        while let Some(class_name) = current {
            if !visited.insert(class_name) {
                return None;
            }
            let class = self.classes.get(class_name)?;
            if let Some(declared) = class.fields.iter().find(|f| f.name == field.name) {
                return Some(ResolvedField {
                    declaring_class: &class.name,
                    field: declared,
                });
            }
            current = class.super_name.as_deref();
        }
        None
    }

    /// Declaration position of a procedure.
    pub(crate) fn procedure_position(&self, id: ProcedureId) -> Option<CodePosition> {
        let procedure = self.procedures.get(id)?;
        Some(self.position_at(procedure, procedure.line))
    }

    /// Position of one instruction, falling back to the procedure declaration line.
    pub(crate) fn instruction_position(
        &self,
        id: ProcedureId,
        index: usize,
    ) -> Option<CodePosition> {
        let procedure = self.procedures.get(id)?;
        let line = procedure
            .instructions()
            .get(index)
            .and_then(|instruction| instruction.line)
            .or(procedure.line);
        Some(self.position_at(procedure, line))
    }

    fn position_at(&self, procedure: &Procedure, line: Option<u32>) -> CodePosition {
        CodePosition {
            class_name: procedure.class.clone(),
            enclosing_class_name: enclosing_nonanonymous_class(&procedure.class).to_string(),
            method_name: procedure.name.clone(),
            descriptor: procedure.descriptor.clone(),
            source_file: self
                .classes
                .get(&procedure.class)
                .and_then(|class| class.source_file.clone()),
            line,
        }
    }
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(PROGRAM_MODEL_SCHEMA).context("parse embedded program model schema")?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|err| anyhow!("compile program model schema: {err}"))?;
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("program model violates schema: {}", errors.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::ProgramBuilder;

    #[test]
    fn loads_minimal_model_from_json() {
        let model = ProgramModel::from_json_str(
            r#"{
                "classes": [
                    {"name": "p/Test", "source_file": "p/Test.java", "fields": [
                        {"name": "counter", "is_static": true}
                    ]}
                ],
                "procedures": [
                    {"class": "p/Test", "name": "m", "descriptor": "()V", "line": 4,
                     "instructions": [
                        {"line": 5, "kind": {"op": "field_write", "field": {"class": "p/Test", "name": "counter"}}},
                        {"kind": {"op": "other"}}
                     ]}
                ],
                "points_to": {"static_fields": [{"class": "p/Test", "name": "counter", "instances": []}]}
            }"#,
        )
        .expect("load model");

        assert_eq!(model.procedure_count(), 1);
        assert_eq!(model.static_fields().len(), 1);
        let position = model.instruction_position(0, 1).expect("position");
        assert_eq!(position.line, Some(4));
        assert_eq!(position.source_file.as_deref(), Some("p/Test.java"));
    }

    #[test]
    fn builder_output_round_trips_through_json() {
        let mut builder = ProgramBuilder::new();
        builder.class("p/Test").static_field("counter");
        builder.procedure("p/Test", "m").field_write_static("p/Test", "counter");
        let json = serde_json::to_string(&builder.raw()).expect("serialize");

        let model = ProgramModel::from_json_str(&json).expect("load model");

        assert_eq!(model.procedure_count(), 1);
    }

    #[test]
    fn schema_rejects_unknown_instruction_kind() {
        let result = ProgramModel::from_json_str(
            r#"{"classes": [{"name": "p/A"}], "procedures": [
                {"class": "p/A", "name": "m", "descriptor": "()V",
                 "instructions": [{"kind": {"op": "jump"}}]}
            ]}"#,
        );

        let message = format!("{:#}", result.err().expect("schema error"));
        assert!(message.contains("violates schema"), "{message}");
    }

    #[test]
    fn rejects_duplicate_classes() {
        let result = ProgramModel::from_json_str(
            r#"{"classes": [{"name": "p/A"}, {"name": "p/A"}]}"#,
        );

        let message = format!("{:#}", result.err().expect("duplicate error"));
        assert!(message.contains("duplicate classes found: p/A"), "{message}");
    }

    #[test]
    fn rejects_out_of_range_call_target() {
        let result = ProgramModel::from_json_str(
            r#"{"classes": [{"name": "p/A"}], "procedures": [
                {"class": "p/A", "name": "m", "descriptor": "()V",
                 "calls": [{"call_site": 0, "targets": [3]}]}
            ]}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_descriptor() {
        let result = ProgramModel::from_json_str(
            r#"{"classes": [{"name": "p/A"}], "procedures": [
                {"class": "p/A", "name": "m", "descriptor": "(Q"}
            ]}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn malformed_descriptor_error_names_the_context() {
        let error = ProgramModel::from_json_str(
            r#"{"classes": [{"name": "p/A"}], "procedures": [
                {"class": "p/A", "name": "m", "descriptor": "(Q", "context": "Everywhere"}
            ]}"#,
        )
        .expect_err("malformed descriptor");

        assert!(format!("{error:#}").contains("p/A.m(Q [Everywhere]"));
    }

    #[test]
    fn rejects_malformed_field_descriptor() {
        let result = ProgramModel::from_json_str(
            r#"{"classes": [{"name": "p/A", "fields": [
                {"name": "count", "descriptor": "V", "is_static": true}
            ]}]}"#,
        );

        let error = result.expect_err("void field");
        assert!(format!("{error:#}").contains("field p/A.count"));
    }

    #[test]
    fn resolves_inherited_fields() {
        let mut builder = ProgramBuilder::new();
        builder.class("p/Base").static_field("shared");
        builder.class("p/Sub").extends("p/Base");
        let model = builder.build();

        let resolved = model
            .resolve_field(&FieldRef {
                class: "p/Sub".to_string(),
                name: "shared".to_string(),
            })
            .expect("resolved");

        assert_eq!(resolved.declaring_class, "p/Base");
        assert!(resolved.field.is_static);
    }

    #[test]
    fn ignores_primordial_static_fields() {
        let mut builder = ProgramBuilder::new();
        builder.class("java/lang/System").primordial().static_field("out");
        builder.class("p/Test").static_field("counter");
        let model = builder.build();

        let names: Vec<_> = model
            .static_fields()
            .into_iter()
            .map(|field| field.name)
            .collect();

        assert_eq!(names, vec!["counter".to_string()]);
        assert!(model.is_ignored_class("java/lang/System"));
    }
}
