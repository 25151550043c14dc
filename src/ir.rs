use std::fmt;

use serde::{Deserialize, Serialize};

/// SSA value number local to one procedure.
pub(crate) type ValueNumber = u32;

/// Index of a procedure (call graph node) in the program model.
pub(crate) type ProcedureId = usize;

/// Receiver value number of instance methods.
pub(crate) const THIS_VALUE_NUMBER: ValueNumber = 1;

/// Abstract object identity produced by the points-to analysis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct InstanceKey(pub(crate) u64);

/// Whole-program snapshot written by the analysis front end.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawProgram {
    #[serde(default)]
    pub(crate) classes: Vec<Class>,
    #[serde(default)]
    pub(crate) procedures: Vec<Procedure>,
    #[serde(default)]
    pub(crate) points_to: PointsTo,
}

/// Class loader that defined a class.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ClassLoader {
    #[default]
    Application,
    Extension,
    Primordial,
}

/// Class declaration with the fields it declares.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Class {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) super_name: Option<String>,
    #[serde(default)]
    pub(crate) loader: ClassLoader,
    #[serde(default)]
    pub(crate) source_file: Option<String>,
    #[serde(default)]
    pub(crate) fields: Vec<Field>,
}

/// Field declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Field {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) descriptor: Option<String>,
    #[serde(default)]
    pub(crate) is_static: bool,
    #[serde(default)]
    pub(crate) is_final: bool,
}

/// One analyzed method activation context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Procedure {
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    #[serde(default)]
    pub(crate) is_static: bool,
    #[serde(default)]
    pub(crate) is_synchronized: bool,
    #[serde(default)]
    pub(crate) context: Option<String>,
    #[serde(default)]
    pub(crate) line: Option<u32>,
    /// `None` when the front end had no IR (native or unresolved methods).
    #[serde(default)]
    pub(crate) instructions: Option<Vec<Instruction>>,
    #[serde(default)]
    pub(crate) calls: Vec<CallSiteTargets>,
}

impl Procedure {
    pub(crate) fn receiver(&self) -> Option<ValueNumber> {
        (!self.is_static).then_some(THIS_VALUE_NUMBER)
    }

    pub(crate) fn instructions(&self) -> &[Instruction] {
        self.instructions.as_deref().unwrap_or(&[])
    }

    /// `class.name(descriptor)`, followed by the analysis context when there is one.
    pub(crate) fn signature(&self) -> String {
        match &self.context {
            Some(context) => format!(
                "{}.{}{} [{}]",
                self.class, self.name, self.descriptor, context
            ),
            None => format!("{}.{}{}", self.class, self.name, self.descriptor),
        }
    }
}

/// IR instruction with its source line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Instruction {
    #[serde(default)]
    pub(crate) line: Option<u32>,
    pub(crate) kind: InstructionKind,
}

/// Instruction kinds the detectors distinguish.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum InstructionKind {
    FieldRead {
        field: FieldRef,
        #[serde(default)]
        receiver: Option<ValueNumber>,
    },
    FieldWrite {
        field: FieldRef,
        #[serde(default)]
        receiver: Option<ValueNumber>,
    },
    MonitorEnter {
        lock: ValueNumber,
    },
    MonitorExit {
        lock: ValueNumber,
    },
    Invoke {
        call_site: u32,
    },
    Other,
}

/// Symbolic field reference as it appears in an instruction.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub(crate) struct FieldRef {
    pub(crate) class: String,
    pub(crate) name: String,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

/// Possible callees of one call site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct CallSiteTargets {
    pub(crate) call_site: u32,
    #[serde(default)]
    pub(crate) targets: Vec<ProcedureId>,
}

/// Points-to facts for locals and static fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct PointsTo {
    #[serde(default)]
    pub(crate) locals: Vec<LocalPointsTo>,
    #[serde(default)]
    pub(crate) static_fields: Vec<StaticFieldPointsTo>,
}

/// Points-to set of a procedure-local value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct LocalPointsTo {
    pub(crate) procedure: ProcedureId,
    pub(crate) value: ValueNumber,
    #[serde(default)]
    pub(crate) instances: Vec<InstanceKey>,
}

/// Points-to set of a static field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StaticFieldPointsTo {
    pub(crate) class: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) instances: Vec<InstanceKey>,
}
