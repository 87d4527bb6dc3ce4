//! Shared fixtures: programmatic construction of small class files.

use classweave::classfile::{
    Class, ClassAccess, ClassVersion, CONSTRUCTOR_NAME, Field, FieldAccess, Method, MethodAccess,
    MethodRef,
    code::{CodeBody, CodeElement, Instruction},
};

#[must_use]
pub fn class(name: &str) -> Class {
    Class {
        version: ClassVersion {
            major: 52,
            minor: 0,
        },
        access: ClassAccess::PUBLIC | ClassAccess::SUPER,
        name: name.to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
        signature: None,
        source_file: None,
        inner_classes: Vec::new(),
        annotations: Vec::new(),
        invisible_annotations: Vec::new(),
        bootstrap_methods: Vec::new(),
        is_synthetic: false,
        is_deprecated: false,
    }
}

#[must_use]
pub fn body(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> CodeBody {
    CodeBody {
        max_stack,
        max_locals,
        elements: instructions
            .into_iter()
            .map(CodeElement::Instruction)
            .collect(),
        handlers: Vec::new(),
        local_variables: Vec::new(),
        label_count: 0,
    }
}

#[must_use]
pub fn method(name: &str, descriptor: &str, access: MethodAccess, code: Option<CodeBody>) -> Method {
    Method {
        access,
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
        signature: None,
        exceptions: Vec::new(),
        annotations: Vec::new(),
        invisible_annotations: Vec::new(),
        code,
        is_synthetic: false,
        is_deprecated: false,
    }
}

#[must_use]
pub fn field(name: &str, descriptor: &str, access: FieldAccess) -> Field {
    Field {
        access,
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
        signature: None,
        constant_value: None,
        annotations: Vec::new(),
        invisible_annotations: Vec::new(),
        is_synthetic: false,
        is_deprecated: false,
    }
}

/// `ALOAD 0; INVOKESPECIAL super.<init>()V; RETURN`
#[must_use]
pub fn default_constructor(super_name: &str) -> Method {
    method(
        CONSTRUCTOR_NAME,
        "()V",
        MethodAccess::PUBLIC,
        Some(body(
            1,
            1,
            vec![
                Instruction::ALoad(0),
                Instruction::InvokeSpecial {
                    method: MethodRef {
                        owner: super_name.to_owned(),
                        name: CONSTRUCTOR_NAME.to_owned(),
                        descriptor: "()V".to_owned(),
                    },
                    interface: false,
                },
                Instruction::Return,
            ],
        )),
    )
}

/// All instructions of the named method in the class.
#[must_use]
pub fn instructions_of<'c>(class: &'c Class, name: &str, descriptor: &str) -> Vec<&'c Instruction> {
    class
        .get_method(name, descriptor)
        .and_then(|method| method.code.as_ref())
        .map(|code| code.instructions().collect())
        .unwrap_or_default()
}

/// Whether the method's body contains a call whose target name matches.
#[must_use]
pub fn calls(class: &Class, name: &str, descriptor: &str, callee: &str) -> bool {
    instructions_of(class, name, descriptor)
        .iter()
        .any(|instruction| match instruction {
            Instruction::InvokeVirtual(m)
            | Instruction::InvokeSpecial { method: m, .. }
            | Instruction::InvokeStatic { method: m, .. }
            | Instruction::InvokeInterface(m) => m.name == callee,
            _ => false,
        })
}
