use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;
use serde_sarif::sarif::{
    ArtifactLocation, Location, LogicalLocation, Message, PhysicalLocation, PropertyBag, Region,
    Result as SarifResult,
};

use crate::descriptor::java_class_name;

/// Reportable source location of a region or method.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct CodePosition {
    pub(crate) class_name: String,
    pub(crate) enclosing_class_name: String,
    pub(crate) method_name: String,
    pub(crate) descriptor: String,
    pub(crate) source_file: Option<String>,
    pub(crate) line: Option<u32>,
}

impl CodePosition {
    pub(crate) fn method_label(&self) -> String {
        format!(
            "{}.{}{}",
            java_class_name(&self.class_name),
            self.method_name,
            self.descriptor
        )
    }
}

/// Data a fixer needs: the static fields the unsafe region touches.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct FixInformation {
    pub(crate) static_fields: BTreeSet<String>,
}

/// Where a finding was raised.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RegionKind {
    SynchronizedBlock,
    SynchronizedMethod,
}

/// A reported defect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Finding {
    pub(crate) pattern_id: &'static str,
    pub(crate) region: RegionKind,
    pub(crate) position: CodePosition,
    pub(crate) fix: FixInformation,
}

impl Finding {
    pub(crate) fn message(&self) -> String {
        let fields: Vec<&str> = self.fix.static_fields.iter().map(String::as_str).collect();
        let region = match self.region {
            RegionKind::SynchronizedBlock => "Synchronized block in",
            RegionKind::SynchronizedMethod => "Synchronized method",
        };
        format!(
            "{region} {} uses an instance lock to guard static data ({}); lock on a static object instead.",
            self.position.method_label(),
            fields.join(", ")
        )
    }

    pub(crate) fn to_sarif(&self) -> SarifResult {
        let mut properties = BTreeMap::new();
        properties.insert(
            "lockscope.staticFields".to_string(),
            json!(self.fix.static_fields.iter().collect::<Vec<_>>()),
        );
        properties.insert(
            "lockscope.enclosingClass".to_string(),
            json!(java_class_name(&self.position.enclosing_class_name)),
        );
        SarifResult::builder()
            .rule_id(self.pattern_id)
            .message(result_message(self.message()))
            .locations(vec![position_location(&self.position)])
            .properties(
                PropertyBag::builder()
                    .additional_properties(properties)
                    .build(),
            )
            .build()
    }
}

pub(crate) fn position_location(position: &CodePosition) -> Location {
    let logical = LogicalLocation::builder()
        .name(format!(
            "{}.{}{}",
            position.class_name, position.method_name, position.descriptor
        ))
        .kind("function")
        .build();
    let Some(uri) = position.source_file.as_deref() else {
        return Location::builder().logical_locations(vec![logical]).build();
    };
    let artifact_location = ArtifactLocation::builder().uri(uri.to_string()).build();
    let physical = if let Some(line) = position.line {
        let region = Region::builder().start_line(line as i64).build();
        PhysicalLocation::builder()
            .artifact_location(artifact_location)
            .region(region)
            .build()
    } else {
        PhysicalLocation::builder()
            .artifact_location(artifact_location)
            .build()
    };
    Location::builder()
        .logical_locations(vec![logical])
        .physical_location(physical)
        .build()
}

pub(crate) fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}
