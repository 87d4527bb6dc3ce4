//! Synthesis of merged methods: the dispatch prologue, the
//! constructor-substitution chain, and the splicing of reference and
//! student bodies.
//!
//! The prologue at the top of every merged method selects among log-only,
//! substitute, delegate-to-reference, and run-student. Its locals live in
//! the slots immediately after the parameters: the control-surface handle,
//! the reified method header, the substitute functor, the
//! constructor-invocation record, and the unpacked-args array. Explicit
//! frame directives anchor every branch target (`append` after new locals,
//! `same` along a branch chain, a `full` frame immediately before each
//! spliced body, which also re-anchors that body's own frame chain).

use std::collections::BTreeSet;

use log::warn;

use crate::{
    classfile::{
        CONSTRUCTOR_NAME, Method, MethodAccess, MethodRef,
        code::{CodeBody, FrameDirective, Instruction, VerificationType},
    },
    context::TransformContext,
    errors::TransformError,
    headers::MethodHeader,
    runtime::abi,
    submission::SubmissionClassInfo,
    types::{FieldType, MethodDescriptor, PrimitiveType, ReturnType},
};

use super::{assembler::CodeAssembler, rewrite::rewrite_body};

/// Emits the merged form of one method.
#[derive(Debug, Clone, Copy)]
pub struct MethodMerger<'c> {
    context: &'c TransformContext,
    info: &'c SubmissionClassInfo,
}

/// The prologue local slots, relative to the end of the parameters.
const SLOT_REGISTRY: u16 = 0;
const SLOT_HEADER: u16 = 1;
const SLOT_FUNCTOR: u16 = 2;
const SLOT_CONSTRUCTOR_CALL: u16 = 3;
const SLOT_ARGS: u16 = 4;
const PROLOGUE_SLOTS: u16 = 5;

impl<'c> MethodMerger<'c> {
    /// Creates a merger for one submission class.
    #[must_use]
    pub fn new(context: &'c TransformContext, info: &'c SubmissionClassInfo) -> Self {
        Self { context, info }
    }

    /// Merges a student-declared method, returning the emitted method(s):
    /// the merged method, plus the `$submission` mirror when the declared
    /// shape disagrees with the bound reference.
    ///
    /// # Errors
    /// Analysis failures of referenced classes.
    pub fn merge(
        &self,
        method: &Method,
        reference_body: Option<&Method>,
    ) -> Result<Vec<Method>, TransformError> {
        self.merge_with_preamble(method, reference_body, |_| {})
    }

    /// Like [`merge`](Self::merge), with a preamble emitted ahead of the
    /// dispatch prologue (static-field capture in `<clinit>`, enum constant
    /// recording in enum constructors).
    ///
    /// # Errors
    /// Analysis failures of referenced classes.
    pub fn merge_with_preamble(
        &self,
        method: &Method,
        reference_body: Option<&Method>,
        preamble: impl FnOnce(&mut CodeAssembler),
    ) -> Result<Vec<Method>, TransformError> {
        let owner = &self.info.class().name;
        let original = MethodHeader::of(owner, method);
        let computed = self
            .info
            .computed_method(&method.name, &method.descriptor)
            .cloned()
            .unwrap_or_else(|| original.clone());

        let emitted_name = computed.name.clone();
        let emitted_descriptor = self.context.computed_descriptor(&computed.descriptor);
        let translated_declared = self.context.computed_descriptor(&original.descriptor);
        let static_mismatch = original.is_static() != computed.is_static();
        let descriptor_mismatch = translated_declared != emitted_descriptor;

        if static_mismatch || descriptor_mismatch {
            warn!(
                "`{owner}.{}{}` disagrees with its computed shape `{emitted_name}{emitted_descriptor}`",
                method.name, method.descriptor
            );
            return self.emit_mismatch(method, &original, &computed);
        }

        let Some(student_body) = method.code.clone() else {
            // Abstract and native methods carry no dispatch; only their
            // identity is retargeted.
            let mut emitted = method.clone();
            emitted.name = emitted_name;
            emitted.descriptor = emitted_descriptor;
            return Ok(vec![emitted]);
        };

        let emitted_header = self.emitted_header(&computed, &emitted_descriptor);
        let mut access = if self.is_reference_bound(&computed) {
            computed.access
        } else {
            original.access
        };
        access.remove(MethodAccess::ABSTRACT | MethodAccess::NATIVE);

        let body = self.emit_merged_body(
            &emitted_header,
            student_body,
            reference_body.and_then(|it| it.code.clone()),
            preamble,
        )?;

        Ok(vec![Method {
            access,
            name: emitted_header.name.clone(),
            descriptor: emitted_header.descriptor.clone(),
            signature: computed.signature.clone(),
            exceptions: computed.exceptions.clone(),
            annotations: method.annotations.clone(),
            invisible_annotations: method.invisible_annotations.clone(),
            code: Some(body),
            is_synthetic: method.is_synthetic,
            is_deprecated: method.is_deprecated,
        }])
    }

    /// Wraps a reference method that has no student counterpart: the same
    /// dispatch prologue, with the reference body as the only body.
    ///
    /// # Errors
    /// Analysis failures of referenced classes.
    pub fn wrap_reference_only(&self, reference_method: &Method) -> Result<Method, TransformError> {
        self.wrap_reference_with_preamble(reference_method, |_| {})
    }

    /// Like [`wrap_reference_only`](Self::wrap_reference_only), with a
    /// preamble ahead of the dispatch prologue.
    ///
    /// # Errors
    /// Analysis failures of referenced classes.
    pub fn wrap_reference_with_preamble(
        &self,
        reference_method: &Method,
        preamble: impl FnOnce(&mut CodeAssembler),
    ) -> Result<Method, TransformError> {
        let Some(reference_code) = reference_method.code.clone() else {
            return Ok(reference_method.clone());
        };
        let owner = self.info.computed_header().name.clone();
        let header = MethodHeader::of(&owner, reference_method);
        let body = self.emit_merged_body(&header, reference_code, None, preamble)?;
        let mut emitted = reference_method.clone();
        emitted.code = Some(body);
        Ok(emitted)
    }

    /// Whether the computed header came from the bound reference (identity
    /// mappings keep the declaring class as owner).
    fn is_reference_bound(&self, computed: &MethodHeader) -> bool {
        computed.owner != self.info.class().name
    }

    fn emitted_header(&self, computed: &MethodHeader, emitted_descriptor: &str) -> MethodHeader {
        MethodHeader {
            owner: self.context.computed_internal_name(&computed.owner),
            access: computed.access,
            name: computed.name.clone(),
            descriptor: emitted_descriptor.to_owned(),
            signature: computed.signature.clone(),
            exceptions: computed.exceptions.clone(),
        }
    }

    /// The mismatch path: the computed-shape slot throws on invocation, and
    /// the student body stays callable under the `$submission` suffix.
    fn emit_mismatch(
        &self,
        method: &Method,
        original: &MethodHeader,
        computed: &MethodHeader,
    ) -> Result<Vec<Method>, TransformError> {
        let translated_descriptor = self.context.computed_descriptor(&original.descriptor);
        let mut emitted = Vec::new();

        let stub_body = self.emit_incompatible_stub(original, computed, &translated_descriptor);
        emitted.push(Method {
            access: original.access & !(MethodAccess::ABSTRACT | MethodAccess::NATIVE),
            name: computed.name.clone(),
            descriptor: translated_descriptor.clone(),
            signature: original.signature.clone(),
            exceptions: original.exceptions.clone(),
            annotations: method.annotations.clone(),
            invisible_annotations: method.invisible_annotations.clone(),
            code: Some(stub_body),
            is_synthetic: method.is_synthetic,
            is_deprecated: method.is_deprecated,
        });

        if let Some(mut body) = method.code.clone() {
            rewrite_body(&mut body, self.context)?;
            emitted.push(Method {
                access: original.access,
                name: format!("{}{}", computed.name, abi::SUBMISSION_SUFFIX),
                descriptor: translated_descriptor,
                signature: original.signature.clone(),
                exceptions: original.exceptions.clone(),
                annotations: Vec::new(),
                invisible_annotations: Vec::new(),
                code: Some(body),
                is_synthetic: true,
                is_deprecated: false,
            });
        }
        Ok(emitted)
    }

    /// A body that throws the incompatible-header exception carrying both
    /// headers. All other emission for the method is suppressed.
    fn emit_incompatible_stub(
        &self,
        original: &MethodHeader,
        computed: &MethodHeader,
        translated_descriptor: &str,
    ) -> CodeBody {
        let mut assembler = CodeAssembler::new();
        assembler.new_object(abi::INCOMPATIBLE_HEADER_EXCEPTION);
        assembler.dup();
        assembler.push_str("submission member does not match its computed header");
        computed.build(&mut assembler);
        original.build(&mut assembler);
        assembler.invoke_special(abi::INCOMPATIBLE_HEADER_INIT);
        assembler.emit(Instruction::AThrow);

        let descriptor: MethodDescriptor = translated_descriptor
            .parse()
            .unwrap_or_else(|_| "()V".parse().expect("valid descriptor"));
        let params = descriptor.parameter_slots() + u16::from(!original.is_static());
        assembler.finish(0, params.max(1), Vec::new())
    }

    /// Emits prologue plus bodies for one merged method.
    #[allow(clippy::too_many_lines)]
    fn emit_merged_body(
        &self,
        header: &MethodHeader,
        mut student_body: CodeBody,
        reference_body: Option<CodeBody>,
        preamble: impl FnOnce(&mut CodeAssembler),
    ) -> Result<CodeBody, TransformError> {
        let descriptor: MethodDescriptor = header
            .descriptor
            .parse()
            .map_err(crate::classfile::ParseError::from)?;
        let is_static = header.is_static();
        let is_constructor = header.is_constructor();
        let captures_receiver = !is_static && !is_constructor;
        let params_base = u16::from(!is_static);
        let locals_base = params_base + descriptor.parameter_slots();

        let mut assembler = CodeAssembler::new();
        preamble(&mut assembler);

        // Acquire the control surface and reify the method header.
        assembler.invoke_static(abi::GET_INSTANCE);
        assembler.emit(Instruction::AStore(locals_base + SLOT_REGISTRY));
        header.build(&mut assembler);
        assembler.emit(Instruction::AStore(locals_base + SLOT_HEADER));

        let substitute_label = assembler.fresh_label();
        let body_label = assembler.fresh_label();

        // Log branch.
        assembler.emit(Instruction::ALoad(locals_base + SLOT_REGISTRY));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
        assembler.invoke_virtual(abi::LOG_INVOCATION);
        assembler.emit(Instruction::IfEq(substitute_label));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_REGISTRY));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
        self.build_invocation(
            &mut assembler,
            &descriptor,
            locals_base,
            params_base,
            captures_receiver,
        );
        assembler.invoke_virtual(abi::ADD_INVOCATION);

        // Substitute branch.
        assembler.place(substitute_label);
        assembler.frame(FrameDirective::Append(vec![
            VerificationType::Object(abi::EXECUTION_REGISTRY.to_owned()),
            VerificationType::Object(abi::METHOD_HEADER.to_owned()),
        ]));
        let after_substitute = if reference_body.is_some() {
            assembler.fresh_label()
        } else {
            body_label
        };
        assembler.emit(Instruction::ALoad(locals_base + SLOT_REGISTRY));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
        assembler.invoke_virtual(abi::USE_SUBSTITUTION);
        assembler.emit(Instruction::IfEq(after_substitute));
        if is_constructor {
            self.emit_constructor_substitution(
                &mut assembler,
                header,
                &descriptor,
                locals_base,
                params_base,
            )?;
        } else {
            self.emit_plain_substitution(
                &mut assembler,
                &descriptor,
                locals_base,
                params_base,
                captures_receiver,
            );
        }

        // Delegate branch, only when a reference body exists.
        let mut stack_floor = student_body.max_stack;
        let mut max_locals = locals_base + PROLOGUE_SLOTS;
        max_locals = max_locals.max(student_body.max_locals);
        let mut local_variables = Vec::new();
        if let Some(mut reference) = reference_body {
            assembler.place(after_substitute);
            // A full frame: the substitute branch may have emitted its own
            // frames (the constructor chain), so the prologue state cannot
            // be expressed relative to the previous table entry.
            let mut locals = self.entry_locals(header, &descriptor, is_constructor);
            locals.push(VerificationType::Object(abi::EXECUTION_REGISTRY.to_owned()));
            locals.push(VerificationType::Object(abi::METHOD_HEADER.to_owned()));
            assembler.frame(FrameDirective::Full {
                locals,
                stack: Vec::new(),
            });
            assembler.emit(Instruction::ALoad(locals_base + SLOT_REGISTRY));
            assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
            assembler.invoke_virtual(abi::USE_SUBMISSION_IMPL);
            assembler.emit(Instruction::IfNe(body_label));
            let entry = self.entry_locals(header, &descriptor, is_constructor);
            if !absolutize_leading_frame(&mut reference, &entry) {
                assembler.frame(FrameDirective::Full {
                    locals: entry,
                    stack: Vec::new(),
                });
            }
            stack_floor = stack_floor.max(reference.max_stack);
            max_locals = max_locals.max(reference.max_locals);
            let base = assembler.reserve_labels(reference.label_count);
            reference.shift_labels(base);
            local_variables.extend(assembler.splice(reference));
        }

        // Student body.
        assembler.place(body_label);
        rewrite_body(&mut student_body, self.context)?;
        let entry = self.entry_locals(header, &descriptor, is_constructor);
        if !absolutize_leading_frame(&mut student_body, &entry) {
            assembler.frame(FrameDirective::Full {
                locals: entry,
                stack: Vec::new(),
            });
        }
        let base = assembler.reserve_labels(student_body.label_count);
        student_body.shift_labels(base);
        local_variables.extend(assembler.splice(student_body));

        Ok(assembler.finish(stack_floor, max_locals, local_variables))
    }

    /// Builds an `Invocation` on the stack: receiver when applicable, then
    /// every parameter boxed in declaration order. `params_base` is the
    /// first parameter slot (1 for instance methods and constructors, 0 for
    /// static methods).
    fn build_invocation(
        &self,
        assembler: &mut CodeAssembler,
        descriptor: &MethodDescriptor,
        locals_base: u16,
        params_base: u16,
        captures_receiver: bool,
    ) {
        assembler.new_object(abi::INVOCATION);
        assembler.dup();
        assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
        if captures_receiver {
            assembler.emit(Instruction::ALoad(0));
            assembler.invoke_special(abi::INVOCATION_INIT_RECEIVER);
        } else {
            assembler.invoke_special(abi::INVOCATION_INIT);
        }
        let mut slot = params_base;
        for parameter in &descriptor.parameters {
            assembler.dup();
            assembler.load(parameter, slot);
            if let FieldType::Primitive(sort) = parameter {
                assembler.box_primitive(*sort);
            }
            assembler.invoke_virtual(abi::ADD_PARAMETER);
            slot += if parameter.is_category_2() { 2 } else { 1 };
        }
    }

    /// The non-constructor substitute branch: run the functor, adapt the
    /// result to the return sort, return.
    fn emit_plain_substitution(
        &self,
        assembler: &mut CodeAssembler,
        descriptor: &MethodDescriptor,
        locals_base: u16,
        params_base: u16,
        captures_receiver: bool,
    ) {
        assembler.emit(Instruction::ALoad(locals_base + SLOT_REGISTRY));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
        assembler.invoke_virtual(abi::GET_SUBSTITUTION);
        assembler.emit(Instruction::AStore(locals_base + SLOT_FUNCTOR));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_FUNCTOR));
        self.build_invocation(assembler, descriptor, locals_base, params_base, captures_receiver);
        assembler.invoke_interface(abi::SUBSTITUTION_EXECUTE);
        match &descriptor.return_type {
            ReturnType::Void => {
                assembler.emit(Instruction::Pop);
                assembler.emit(Instruction::Return);
            }
            ReturnType::Some(FieldType::Primitive(sort)) => {
                assembler.unbox_primitive(*sort);
                assembler.ret(&descriptor.return_type);
            }
            ReturnType::Some(reference) => {
                assembler.emit(Instruction::CheckCast(cast_operand(reference)));
                assembler.emit(Instruction::AReturn);
            }
        }
    }

    /// The constructor substitute branch: obtain the constructor-invocation
    /// record, chain to the matching `this`/`super` constructor, then run
    /// `execute` for the post-construction effects.
    fn emit_constructor_substitution(
        &self,
        assembler: &mut CodeAssembler,
        header: &MethodHeader,
        descriptor: &MethodDescriptor,
        locals_base: u16,
        params_base: u16,
    ) -> Result<(), TransformError> {
        assembler.emit(Instruction::ALoad(locals_base + SLOT_REGISTRY));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_HEADER));
        assembler.invoke_virtual(abi::GET_SUBSTITUTION);
        assembler.emit(Instruction::AStore(locals_base + SLOT_FUNCTOR));
        assembler.emit(Instruction::ALoad(locals_base + SLOT_FUNCTOR));
        self.build_invocation(assembler, descriptor, locals_base, params_base, false);
        assembler.invoke_interface(abi::SUBSTITUTION_CONSTRUCTOR_INVOCATION);
        assembler.emit(Instruction::AStore(locals_base + SLOT_CONSTRUCTOR_CALL));

        let after_chain = assembler.fresh_label();
        let mut first_candidate = true;
        for (candidate_owner, candidate_descriptor) in self.constructor_candidates(header) {
            let next = assembler.fresh_label();
            assembler.emit(Instruction::ALoad(locals_base + SLOT_CONSTRUCTOR_CALL));
            assembler.invoke_virtual(abi::CONSTRUCTOR_GET_OWNER);
            assembler.push_str(&candidate_owner);
            assembler.emit(Instruction::InvokeVirtual(string_equals()));
            assembler.emit(Instruction::IfEq(next));
            assembler.emit(Instruction::ALoad(locals_base + SLOT_CONSTRUCTOR_CALL));
            assembler.invoke_virtual(abi::CONSTRUCTOR_GET_DESCRIPTOR);
            assembler.push_str(&candidate_descriptor);
            assembler.emit(Instruction::InvokeVirtual(string_equals()));
            assembler.emit(Instruction::IfEq(next));

            assembler.emit(Instruction::ALoad(locals_base + SLOT_CONSTRUCTOR_CALL));
            assembler.invoke_virtual(abi::CONSTRUCTOR_GET_ARGS);
            assembler.emit(Instruction::AStore(locals_base + SLOT_ARGS));
            assembler.emit(Instruction::ALoad(0));
            let candidate: MethodDescriptor = candidate_descriptor
                .parse()
                .map_err(crate::classfile::ParseError::from)?;
            for (index, parameter) in candidate.parameters.iter().enumerate() {
                assembler.emit(Instruction::ALoad(locals_base + SLOT_ARGS));
                assembler.push_int(i32::try_from(index).unwrap_or(i32::MAX));
                assembler.emit(Instruction::AALoad);
                match parameter {
                    FieldType::Primitive(sort) => assembler.unbox_primitive(*sort),
                    reference => {
                        assembler.emit(Instruction::CheckCast(cast_operand(reference)));
                    }
                }
            }
            assembler.emit(Instruction::InvokeSpecial {
                method: MethodRef {
                    owner: candidate_owner,
                    name: CONSTRUCTOR_NAME.to_owned(),
                    descriptor: candidate_descriptor,
                },
                interface: false,
            });
            assembler.emit(Instruction::Goto(after_chain));

            assembler.place(next);
            if first_candidate {
                assembler.frame(FrameDirective::Append(vec![
                    VerificationType::Object(abi::METHOD_SUBSTITUTION.to_owned()),
                    VerificationType::Object(abi::CONSTRUCTOR_INVOCATION.to_owned()),
                ]));
                first_candidate = false;
            } else {
                assembler.frame(FrameDirective::Same);
            }
        }
        if first_candidate {
            // No candidates at all; the frame state after the record store
            // still needs anchoring for the throw path reached by fall-in.
            assembler.frame(FrameDirective::Append(vec![
                VerificationType::Object(abi::METHOD_SUBSTITUTION.to_owned()),
                VerificationType::Object(abi::CONSTRUCTOR_INVOCATION.to_owned()),
            ]));
        }

        // No candidate matched.
        assembler.new_object("java/lang/IllegalArgumentException");
        assembler.dup();
        assembler.push_str("substitute selected no matching constructor");
        assembler.emit(Instruction::InvokeSpecial {
            method: MethodRef {
                owner: "java/lang/IllegalArgumentException".to_owned(),
                name: CONSTRUCTOR_NAME.to_owned(),
                descriptor: "(Ljava/lang/String;)V".to_owned(),
            },
            interface: false,
        });
        assembler.emit(Instruction::AThrow);

        assembler.place(after_chain);
        // `this` is initialized once any branch of the chain completed.
        let mut locals = self.entry_locals(header, descriptor, false);
        locals.push(VerificationType::Object(abi::EXECUTION_REGISTRY.to_owned()));
        locals.push(VerificationType::Object(abi::METHOD_HEADER.to_owned()));
        locals.push(VerificationType::Object(abi::METHOD_SUBSTITUTION.to_owned()));
        locals.push(VerificationType::Object(
            abi::CONSTRUCTOR_INVOCATION.to_owned(),
        ));
        assembler.frame(FrameDirective::Full {
            locals,
            stack: Vec::new(),
        });
        assembler.emit(Instruction::ALoad(locals_base + SLOT_FUNCTOR));
        self.build_invocation(assembler, descriptor, locals_base, params_base, false);
        assembler.invoke_interface(abi::SUBSTITUTION_EXECUTE);
        assembler.emit(Instruction::Pop);
        assembler.emit(Instruction::Return);
        Ok(())
    }

    /// The `(owner, descriptor)` pairs the constructor chain dispatches
    /// over: the direct superclass's constructors and this class's own,
    /// under computed names.
    fn constructor_candidates(&self, header: &MethodHeader) -> BTreeSet<(String, String)> {
        let mut candidates = BTreeSet::new();
        for computed in self.info.super_constructors().values() {
            candidates.insert((
                self.context.computed_internal_name(&computed.owner),
                self.context.computed_descriptor(&computed.descriptor),
            ));
        }
        for (original, computed) in self.info.methods() {
            if original.is_constructor() {
                candidates.insert((
                    self.context.computed_internal_name(&computed.owner),
                    self.context.computed_descriptor(&computed.descriptor),
                ));
            }
        }
        // A constructor never chains to its own shape; that would recurse.
        candidates.retain(|(owner, descriptor)| {
            owner != &header.owner || descriptor != &header.descriptor
        });
        candidates
    }

    /// The verification types of the method entry state: receiver (or
    /// uninitialized `this` in constructors) plus the declared parameters.
    fn entry_locals(
        &self,
        header: &MethodHeader,
        descriptor: &MethodDescriptor,
        constructor: bool,
    ) -> Vec<VerificationType> {
        let mut locals = Vec::new();
        if !header.is_static() {
            locals.push(if constructor {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(header.owner.clone())
            });
        }
        for parameter in &descriptor.parameters {
            locals.push(verification_type(parameter));
        }
        locals
    }

}

/// A spliced body whose first instruction already carries a frame would put
/// two frames at one offset next to the entry frame the merger pins there.
/// Instead, such a leading frame is rewritten into the full frame it means
/// relative to the entry state, and the merger emits no entry frame of its
/// own. Returns whether a leading frame was found.
fn absolutize_leading_frame(body: &mut CodeBody, entry: &[VerificationType]) -> bool {
    for element in &mut body.elements {
        match element {
            crate::classfile::code::CodeElement::Instruction(_) => return false,
            crate::classfile::code::CodeElement::Frame(frame) => {
                *frame = absolute_frame(frame, entry);
                return true;
            }
            _ => {}
        }
    }
    false
}

/// The full frame a relative directive denotes against the entry state.
fn absolute_frame(frame: &FrameDirective, entry: &[VerificationType]) -> FrameDirective {
    match frame {
        FrameDirective::Same => FrameDirective::Full {
            locals: entry.to_vec(),
            stack: Vec::new(),
        },
        FrameDirective::SameLocals1(ty) => FrameDirective::Full {
            locals: entry.to_vec(),
            stack: vec![ty.clone()],
        },
        FrameDirective::Chop(count) => {
            let mut locals = entry.to_vec();
            for _ in 0..*count {
                locals.pop();
            }
            FrameDirective::Full {
                locals,
                stack: Vec::new(),
            }
        }
        FrameDirective::Append(appended) => {
            let mut locals = entry.to_vec();
            locals.extend(appended.iter().cloned());
            FrameDirective::Full {
                locals,
                stack: Vec::new(),
            }
        }
        full @ FrameDirective::Full { .. } => full.clone(),
    }
}

fn string_equals() -> MethodRef {
    MethodRef {
        owner: "java/lang/String".to_owned(),
        name: "equals".to_owned(),
        descriptor: "(Ljava/lang/Object;)Z".to_owned(),
    }
}

fn cast_operand(ty: &FieldType) -> String {
    match ty {
        FieldType::Object(name) => name.clone(),
        other => other.descriptor(),
    }
}

/// The verification type describing a value of the given field type.
fn verification_type(ty: &FieldType) -> VerificationType {
    match ty {
        FieldType::Primitive(PrimitiveType::Long) => VerificationType::Long,
        FieldType::Primitive(PrimitiveType::Float) => VerificationType::Float,
        FieldType::Primitive(PrimitiveType::Double) => VerificationType::Double,
        FieldType::Primitive(_) => VerificationType::Integer,
        FieldType::Object(name) => VerificationType::Object(name.clone()),
        array @ FieldType::Array(_) => VerificationType::Object(array.descriptor()),
    }
}
