//! Retargeting of student method bodies onto computed names.
//!
//! Every field or method reference whose owner is a submission class is
//! rewritten to its computed counterpart; when the access's static-ness
//! disagrees with the computed member, the reference is redirected to the
//! `$submission` mirror instead. Calls in the replacement table become
//! static trampoline calls. Type instructions, `ldc` constants, verifier
//! frames, and local variable scopes are translated with the same
//! name-substitution.

use log::trace;

use crate::{
    classfile::{
        FieldRef, MethodRef,
        code::{CodeBody, CodeElement, Instruction},
        constant_pool::{ConstantValue, MethodHandle},
    },
    context::TransformContext,
    errors::TransformError,
    runtime::abi,
};

/// Rewrites one student body in place.
///
/// # Errors
/// Propagates analysis failures of referenced submission classes.
pub fn rewrite_body(body: &mut CodeBody, context: &TransformContext) -> Result<(), TransformError> {
    for element in &mut body.elements {
        match element {
            CodeElement::Instruction(instruction) => rewrite_instruction(instruction, context)?,
            CodeElement::Frame(frame) => {
                *frame = frame.map_class_names(&|name| {
                    let computed = context.computed_internal_name(name);
                    (computed != name).then_some(computed)
                });
            }
            CodeElement::Label(_) | CodeElement::LineNumber(_) => {}
        }
    }
    for handler in &mut body.handlers {
        if let Some(catch_type) = &handler.catch_type {
            handler.catch_type = Some(context.computed_internal_name(catch_type));
        }
    }
    for variable in &mut body.local_variables {
        variable.descriptor = context.computed_descriptor(&variable.descriptor);
    }
    Ok(())
}

fn rewrite_instruction(
    instruction: &mut Instruction,
    context: &TransformContext,
) -> Result<(), TransformError> {
    use Instruction as I;
    match instruction {
        I::GetStatic(field) | I::PutStatic(field) => rewrite_field(field, true, context)?,
        I::GetField(field) | I::PutField(field) => rewrite_field(field, false, context)?,
        I::InvokeVirtual(method) | I::InvokeInterface(method) => {
            if let Some(replaced) = replacement(method, context) {
                *instruction = replaced;
            } else {
                rewrite_method(method, false, context)?;
            }
        }
        I::InvokeSpecial { method, .. } => {
            if let Some(replaced) = replacement(method, context) {
                *instruction = replaced;
            } else {
                rewrite_method(method, false, context)?;
            }
        }
        I::InvokeStatic { method, .. } => {
            if let Some(replaced) = replacement(method, context) {
                *instruction = replaced;
            } else {
                rewrite_method(method, true, context)?;
            }
        }
        I::InvokeDynamic { descriptor, .. } => {
            *descriptor = context.computed_descriptor(descriptor);
        }
        I::Ldc(constant) => rewrite_constant(constant, context)?,
        I::New(name) | I::ANewArray(name) | I::CheckCast(name) | I::InstanceOf(name) => {
            *name = context.computed_internal_name(name);
        }
        I::MultiANewArray { descriptor, .. } => {
            *descriptor = context.computed_internal_name(descriptor);
        }
        _ => {}
    }
    Ok(())
}

/// Rewrites the method handles and class constants reachable from a loaded
/// constant, including bootstrap-method arguments.
pub(crate) fn rewrite_constant(
    constant: &mut ConstantValue,
    context: &TransformContext,
) -> Result<(), TransformError> {
    match constant {
        ConstantValue::Class(name) => {
            *name = context.computed_internal_name(name);
        }
        ConstantValue::MethodType(descriptor) => {
            *descriptor = context.computed_descriptor(descriptor);
        }
        ConstantValue::Handle(handle) => rewrite_handle(handle, context)?,
        ConstantValue::Dynamic { descriptor, .. } => {
            *descriptor = context.computed_descriptor(descriptor);
        }
        _ => {}
    }
    Ok(())
}

pub(crate) fn rewrite_handle(
    handle: &mut MethodHandle,
    context: &TransformContext,
) -> Result<(), TransformError> {
    match handle {
        MethodHandle::GetField(field) | MethodHandle::PutField(field) => {
            rewrite_field(field, false, context)
        }
        MethodHandle::GetStatic(field) | MethodHandle::PutStatic(field) => {
            rewrite_field(field, true, context)
        }
        MethodHandle::InvokeVirtual(method)
        | MethodHandle::InvokeSpecial { method, .. }
        | MethodHandle::NewInvokeSpecial(method)
        | MethodHandle::InvokeInterface(method) => rewrite_method(method, false, context),
        MethodHandle::InvokeStatic { method, .. } => rewrite_method(method, true, context),
    }
}

fn rewrite_field(
    field: &mut FieldRef,
    static_access: bool,
    context: &TransformContext,
) -> Result<(), TransformError> {
    if !context.is_submission_class(&field.owner) {
        return Ok(());
    }
    let info = context.submission_info(&field.owner)?;
    let computed_owner = context.computed_internal_name(&field.owner);
    if let Some(computed) = info.computed_field(&field.name) {
        let computed_name = if computed.is_static() == static_access {
            computed.name.clone()
        } else {
            // The access disagrees with the computed field; the submission's
            // mirror keeps the declared static-ness.
            format!("{}{}", computed.name, abi::SUBMISSION_SUFFIX)
        };
        let computed_descriptor = if computed.is_static() == static_access {
            context.computed_descriptor(&computed.descriptor)
        } else {
            context.computed_descriptor(&field.descriptor)
        };
        trace!(
            "retarget field {}.{} -> {computed_owner}.{computed_name}",
            field.owner, field.name
        );
        field.owner = computed_owner;
        field.name = computed_name;
        field.descriptor = computed_descriptor;
    } else {
        field.owner = computed_owner;
        field.descriptor = context.computed_descriptor(&field.descriptor);
    }
    Ok(())
}

fn rewrite_method(
    method: &mut MethodRef,
    static_access: bool,
    context: &TransformContext,
) -> Result<(), TransformError> {
    let plain_owner = method.owner.strip_prefix('[').is_none();
    if !plain_owner || !context.is_submission_class(&method.owner) {
        // Array-typed owners propagate their dimension prefix; everything
        // else outside the project only gets its descriptor translated.
        method.owner = context.computed_internal_name(&method.owner);
        method.descriptor = context.computed_descriptor(&method.descriptor);
        return Ok(());
    }
    let info = context.submission_info(&method.owner)?;
    let computed_owner = context.computed_internal_name(&method.owner);
    if let Some(computed) = info.computed_method(&method.name, &method.descriptor) {
        let matches_static = computed.is_static() == static_access;
        let computed_name = if matches_static {
            computed.name.clone()
        } else {
            format!("{}{}", computed.name, abi::SUBMISSION_SUFFIX)
        };
        let computed_descriptor = if matches_static {
            context.computed_descriptor(&computed.descriptor)
        } else {
            context.computed_descriptor(&method.descriptor)
        };
        trace!(
            "retarget call {}.{}{} -> {computed_owner}.{computed_name}{computed_descriptor}",
            method.owner, method.name, method.descriptor
        );
        method.owner = computed_owner;
        method.name = computed_name;
        method.descriptor = computed_descriptor;
    } else {
        method.owner = computed_owner;
        method.descriptor = context.computed_descriptor(&method.descriptor);
    }
    Ok(())
}

fn replacement(method: &MethodRef, context: &TransformContext) -> Option<Instruction> {
    let trampoline = context.method_replacement(&method.owner, &method.name, &method.descriptor)?;
    trace!(
        "replace call {}.{}{} with trampoline {}",
        method.owner, method.name, method.descriptor, trampoline
    );
    Some(Instruction::InvokeStatic {
        method: MethodRef {
            owner: trampoline.owner.clone(),
            name: trampoline.name.clone(),
            descriptor: trampoline.descriptor.clone(),
        },
        interface: false,
    })
}
