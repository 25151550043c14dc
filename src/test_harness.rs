use crate::dataflow::cancel::CancellationToken;
use crate::engine::{AnalysisContext, build_context};
use crate::ir::{
    CallSiteTargets, Class, ClassLoader, Field, FieldRef, InstanceKey, Instruction,
    InstructionKind, LocalPointsTo, Procedure, ProcedureId, RawProgram, StaticFieldPointsTo,
    ValueNumber,
};
use crate::model::ProgramModel;

/// In-memory builder for program models used by tests.
#[derive(Default)]
pub(crate) struct ProgramBuilder {
    raw: RawProgram,
}

impl ProgramBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare a class, or reopen it when already declared.
    pub(crate) fn class(&mut self, name: &str) -> ClassBuilder<'_> {
        let index = match self.raw.classes.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.raw.classes.push(Class {
                    name: name.to_string(),
                    super_name: None,
                    loader: ClassLoader::Application,
                    source_file: None,
                    fields: Vec::new(),
                });
                self.raw.classes.len() - 1
            }
        };
        ClassBuilder {
            class: &mut self.raw.classes[index],
        }
    }

    /// Add an instance method `()V` with an empty instruction sequence.
    pub(crate) fn procedure(&mut self, class: &str, name: &str) -> ProcedureBuilder<'_> {
        let id = self.raw.procedures.len();
        self.raw.procedures.push(Procedure {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: "()V".to_string(),
            is_static: false,
            is_synchronized: false,
            context: None,
            line: None,
            instructions: Some(Vec::new()),
            calls: Vec::new(),
        });
        ProcedureBuilder {
            id,
            procedure: &mut self.raw.procedures[id],
        }
    }

    pub(crate) fn procedure_mut(&mut self, id: ProcedureId) -> ProcedureBuilder<'_> {
        ProcedureBuilder {
            id,
            procedure: &mut self.raw.procedures[id],
        }
    }

    pub(crate) fn points_to_local(
        &mut self,
        procedure: ProcedureId,
        value: ValueNumber,
        instances: &[u64],
    ) {
        self.raw.points_to.locals.push(LocalPointsTo {
            procedure,
            value,
            instances: instances.iter().copied().map(InstanceKey).collect(),
        });
    }

    pub(crate) fn points_to_static(&mut self, class: &str, name: &str, instances: &[u64]) {
        self.raw.points_to.static_fields.push(StaticFieldPointsTo {
            class: class.to_string(),
            name: name.to_string(),
            instances: instances.iter().copied().map(InstanceKey).collect(),
        });
    }

    pub(crate) fn raw(&self) -> RawProgram {
        self.raw.clone()
    }

    pub(crate) fn build(&self) -> ProgramModel {
        ProgramModel::from_raw(self.raw()).expect("valid program model")
    }

    pub(crate) fn context(&self) -> AnalysisContext {
        self.context_with_cancellation(CancellationToken::new())
    }

    pub(crate) fn context_with_cancellation(
        &self,
        cancellation: CancellationToken,
    ) -> AnalysisContext {
        build_context(self.build(), cancellation)
    }
}

pub(crate) struct ClassBuilder<'a> {
    class: &'a mut Class,
}

impl ClassBuilder<'_> {
    fn field(self, name: &str, is_static: bool, is_final: bool) -> Self {
        self.class.fields.push(Field {
            name: name.to_string(),
            descriptor: None,
            is_static,
            is_final,
        });
        self
    }

    pub(crate) fn static_field(self, name: &str) -> Self {
        self.field(name, true, false)
    }

    pub(crate) fn static_final_field(self, name: &str) -> Self {
        self.field(name, true, true)
    }

    pub(crate) fn instance_field(self, name: &str) -> Self {
        self.field(name, false, false)
    }

    pub(crate) fn instance_final_field(self, name: &str) -> Self {
        self.field(name, false, true)
    }

    pub(crate) fn extends(self, super_name: &str) -> Self {
        self.class.super_name = Some(super_name.to_string());
        self
    }

    pub(crate) fn primordial(self) -> Self {
        self.class.loader = ClassLoader::Primordial;
        self
    }

    pub(crate) fn source_file(self, path: &str) -> Self {
        self.class.source_file = Some(path.to_string());
        self
    }
}

pub(crate) struct ProcedureBuilder<'a> {
    id: ProcedureId,
    procedure: &'a mut Procedure,
}

impl ProcedureBuilder<'_> {
    pub(crate) fn id(self) -> ProcedureId {
        self.id
    }

    pub(crate) fn static_method(self) -> Self {
        self.procedure.is_static = true;
        self
    }

    pub(crate) fn synchronized(self) -> Self {
        self.procedure.is_synchronized = true;
        self
    }

    pub(crate) fn descriptor(self, descriptor: &str) -> Self {
        self.procedure.descriptor = descriptor.to_string();
        self
    }

    pub(crate) fn line(self, line: u32) -> Self {
        self.procedure.line = Some(line);
        self
    }

    pub(crate) fn missing_ir(self) -> Self {
        self.procedure.instructions = None;
        self
    }

    fn push(self, kind: InstructionKind) -> Self {
        self.procedure
            .instructions
            .get_or_insert_with(Vec::new)
            .push(Instruction { line: None, kind });
        self
    }

    pub(crate) fn monitor_enter(self, lock: ValueNumber) -> Self {
        self.push(InstructionKind::MonitorEnter { lock })
    }

    pub(crate) fn monitor_exit(self, lock: ValueNumber) -> Self {
        self.push(InstructionKind::MonitorExit { lock })
    }

    pub(crate) fn field_write_static(self, class: &str, name: &str) -> Self {
        self.push(InstructionKind::FieldWrite {
            field: field_ref(class, name),
            receiver: None,
        })
    }

    pub(crate) fn field_write(self, receiver: ValueNumber, class: &str, name: &str) -> Self {
        self.push(InstructionKind::FieldWrite {
            field: field_ref(class, name),
            receiver: Some(receiver),
        })
    }

    pub(crate) fn field_read_static(self, class: &str, name: &str) -> Self {
        self.push(InstructionKind::FieldRead {
            field: field_ref(class, name),
            receiver: None,
        })
    }

    pub(crate) fn field_read(self, receiver: ValueNumber, class: &str, name: &str) -> Self {
        self.push(InstructionKind::FieldRead {
            field: field_ref(class, name),
            receiver: Some(receiver),
        })
    }

    /// Append an invoke on a fresh call site resolved to `targets`.
    pub(crate) fn invoke(self, targets: &[ProcedureId]) -> Self {
        let call_site = self.procedure.calls.len() as u32;
        self.procedure.calls.push(CallSiteTargets {
            call_site,
            targets: targets.to_vec(),
        });
        self.push(InstructionKind::Invoke { call_site })
    }

    pub(crate) fn other(self) -> Self {
        self.push(InstructionKind::Other)
    }
}

fn field_ref(class: &str, name: &str) -> FieldRef {
    FieldRef {
        class: class.to_string(),
        name: name.to_string(),
    }
}
