//! The per-class driver: decides the emitted header, merges fields and
//! methods, appends reference members the submission never declared, and
//! injects the metadata accessors.

use std::collections::HashSet;

use log::debug;

use crate::{
    classfile::{
        BootstrapMethod, CONSTRUCTOR_NAME, Class, ClassAccess, ConstantValue, Field, FieldAccess,
        Method, MethodAccess, STATIC_INITIALIZER_NAME,
        code::{CodeBody, CodeElement, Instruction},
    },
    context::TransformContext,
    errors::TransformError,
    headers::{ClassHeader, FieldHeader, MethodHeader},
    runtime::abi,
    submission::SubmissionClassInfo,
    transform::assembler::CodeAssembler,
    types::{FieldType, MethodDescriptor, PrimitiveType},
};

use super::{MethodMerger, rewrite};

/// Transforms one submission class into its merged form.
#[derive(Debug, Clone, Copy)]
pub struct ClassMerger<'c> {
    context: &'c TransformContext,
}

impl<'c> ClassMerger<'c> {
    /// Creates a merger over the given context.
    #[must_use]
    pub fn new(context: &'c TransformContext) -> Self {
        Self { context }
    }

    /// Transforms the named (previously registered) submission class and
    /// serializes the merged class file.
    ///
    /// # Errors
    /// Analysis and generation failures.
    pub fn transform(&self, class_name: &str) -> Result<Vec<u8>, TransformError> {
        let info = self.context.submission_info(class_name)?;
        let merged = self.merge(&info)?;
        Ok(merged.to_bytes()?)
    }

    /// Produces the merged class model.
    ///
    /// # Errors
    /// Analysis failures of referenced classes.
    #[allow(clippy::too_many_lines)]
    pub fn merge(&self, info: &SubmissionClassInfo) -> Result<Class, TransformError> {
        let context = self.context;
        let class = info.class();
        let reference = info
            .solution_name()
            .and_then(|name| context.reference_class(name));
        let computed_header = info.computed_header();
        debug!("merging `{}` as `{}`", class.name, computed_header.name);

        // Header: the computed header plus any extra submission interfaces.
        // Without a bound reference the computed header repeats the declared
        // interfaces, which still need translation.
        let mut interfaces = if reference.is_some() {
            computed_header.interfaces.clone()
        } else {
            Vec::new()
        };
        for declared in &class.interfaces {
            let translated = context.computed_internal_name(declared);
            if !interfaces.contains(&translated) {
                interfaces.push(translated);
            }
        }
        let version = match reference {
            Some(it) => class.version.max(it.class().version),
            None => class.version,
        };

        // Bootstrap methods: the submission's (rewritten), then the
        // reference's; spliced reference bodies have their indices shifted
        // past the submission entries.
        let mut bootstrap_methods: Vec<BootstrapMethod> = Vec::new();
        for bootstrap in &class.bootstrap_methods {
            let mut rewritten = bootstrap.clone();
            rewrite::rewrite_handle(&mut rewritten.handle, context)?;
            for argument in &mut rewritten.arguments {
                rewrite::rewrite_constant(argument, context)?;
            }
            bootstrap_methods.push(rewritten);
        }
        let bootstrap_offset = u16::try_from(bootstrap_methods.len()).unwrap_or(u16::MAX);
        if let Some(reference) = reference {
            bootstrap_methods.extend(reference.class().bootstrap_methods.iter().cloned());
        }

        let is_interface = computed_header.access.contains(ClassAccess::INTERFACE)
            || class.is_interface();
        let is_enum = class.is_enum();
        let enum_constant_names: HashSet<String> = if is_enum {
            class
                .fields
                .iter()
                .filter(|it| it.access.contains(FieldAccess::ENUM))
                .map(|it| it.name.clone())
                .collect()
        } else {
            HashSet::new()
        };

        // Fields.
        let mut fields: Vec<Field> = Vec::new();
        let mut emitted_field_names: HashSet<String> = HashSet::new();
        let mut static_literals: Vec<(String, String, ConstantValue)> = Vec::new();
        for field in &class.fields {
            if is_enum && reference.is_some() && enum_constant_names.contains(&field.name) {
                // The reference layout is authoritative for enum constants.
                continue;
            }
            if field.access.contains(FieldAccess::STATIC) {
                if let Some(value) = &field.constant_value {
                    static_literals.push((
                        field.name.clone(),
                        field.descriptor.clone(),
                        value.clone(),
                    ));
                }
            }
            for emitted in self.merge_field(info, field, is_interface) {
                emitted_field_names.insert(emitted.name.clone());
                fields.push(emitted);
            }
        }

        // Missing reference fields.
        if let Some(reference) = reference {
            for field in reference.fields() {
                if !emitted_field_names.contains(&field.name) {
                    emitted_field_names.insert(field.name.clone());
                    fields.push(field.clone());
                }
            }
        }

        let capture_static_values = !static_literals.is_empty()
            || class.get_method(STATIC_INITIALIZER_NAME, "()V").is_some();
        if capture_static_values {
            fields.push(static_values_field());
        }

        // Methods.
        let merger = MethodMerger::new(context, info);
        let mut methods: Vec<Method> = Vec::new();
        let mut emitted_method_keys: HashSet<(String, String)> = HashSet::new();
        let mut has_clinit = false;
        for method in &class.methods {
            if method.is_lambda_helper() {
                let mut emitted = method.clone();
                emitted.descriptor = context.computed_descriptor(&method.descriptor);
                if let Some(body) = emitted.code.as_mut() {
                    rewrite::rewrite_body(body, context)?;
                }
                emitted_method_keys.insert((emitted.name.clone(), emitted.descriptor.clone()));
                methods.push(emitted);
                continue;
            }
            if method.is_static_initializer() {
                has_clinit = true;
                let reference_body =
                    self.reference_method(info, method, reference, bootstrap_offset);
                // Stores into dropped enum-constant fields become discards of
                // the constructed receiver; the constructor preamble has
                // already recorded the `(name, ordinal, args)` triple.
                let enum_adjusted = (is_enum && reference.is_some()).then(|| {
                    drop_enum_constant_stores(method, &class.name, &enum_constant_names)
                });
                let source = enum_adjusted.as_ref().unwrap_or(method);
                let literals = static_literals.clone();
                let emitted = merger.merge_with_preamble(
                    source,
                    reference_body.as_ref(),
                    |assembler| emit_static_capture(assembler, computed_header, &literals),
                )?;
                for method in emitted {
                    emitted_method_keys.insert((method.name.clone(), method.descriptor.clone()));
                    methods.push(method);
                }
                continue;
            }
            let reference_body = self.reference_method(info, method, reference, bootstrap_offset);
            let emitted = if is_enum && method.is_constructor() {
                let original_name = class.name.clone();
                let descriptor = context
                    .computed_descriptor(&method.descriptor)
                    .parse::<MethodDescriptor>()
                    .map_err(crate::classfile::ParseError::from)?;
                merger.merge_with_preamble(method, reference_body.as_ref(), |assembler| {
                    emit_enum_record(assembler, &original_name, &descriptor);
                })?
            } else {
                merger.merge(method, reference_body.as_ref())?
            };
            for method in emitted {
                emitted_method_keys.insert((method.name.clone(), method.descriptor.clone()));
                methods.push(method);
            }
        }

        // A `<clinit>` is always emitted once static values are captured or
        // the reference carries static initialization.
        if !has_clinit {
            let reference_clinit = reference
                .and_then(|it| it.method(STATIC_INITIALIZER_NAME, "()V"))
                .filter(|it| it.code.is_some());
            if let Some(reference_clinit) = reference_clinit {
                let prepared = prepare(reference_clinit, bootstrap_offset);
                let literals = static_literals.clone();
                let emitted = if capture_static_values {
                    merger.wrap_reference_with_preamble(&prepared, |assembler| {
                        emit_static_capture(assembler, computed_header, &literals);
                    })?
                } else {
                    merger.wrap_reference_only(&prepared)?
                };
                emitted_method_keys.insert((emitted.name.clone(), emitted.descriptor.clone()));
                methods.push(emitted);
            } else if capture_static_values {
                let mut assembler = CodeAssembler::new();
                emit_static_capture(&mut assembler, computed_header, &static_literals);
                assembler.emit(Instruction::Return);
                methods.push(Method {
                    access: MethodAccess::STATIC,
                    name: STATIC_INITIALIZER_NAME.to_owned(),
                    descriptor: "()V".to_owned(),
                    signature: None,
                    exceptions: Vec::new(),
                    annotations: Vec::new(),
                    invisible_annotations: Vec::new(),
                    code: Some(assembler.finish(0, 0, Vec::new())),
                    is_synthetic: false,
                    is_deprecated: false,
                });
                emitted_method_keys.insert((STATIC_INITIALIZER_NAME.to_owned(), "()V".to_owned()));
            }
        }

        // Missing reference methods, wrapped with the same prologue.
        if let Some(reference) = reference {
            for method in reference.methods() {
                let key = (method.name.clone(), method.descriptor.clone());
                if emitted_method_keys.contains(&key) {
                    continue;
                }
                emitted_method_keys.insert(key);
                let mut prepared = method.clone();
                if let Some(body) = prepared.code.as_mut() {
                    shift_bootstrap_indices(body, bootstrap_offset);
                }
                let emitted = if prepared.is_lambda_helper() || prepared.code.is_none() {
                    prepared
                } else {
                    merger.wrap_reference_only(&prepared)?
                };
                methods.push(emitted);
            }
        }

        // Metadata accessors.
        methods.push(self.class_header_accessor(info));
        methods.push(self.field_headers_accessor(info));
        methods.push(self.method_headers_accessor(info));
        if capture_static_values {
            methods.push(static_values_accessor(computed_header));
        }
        if is_enum {
            methods.push(enum_constants_accessor(&class.name));
        }

        Ok(Class {
            version,
            access: computed_header.access,
            name: computed_header.name.clone(),
            super_name: match &computed_header.super_name {
                Some(name) if reference.is_some() => Some(name.clone()),
                Some(name) => Some(context.computed_internal_name(name)),
                None => None,
            },
            interfaces,
            fields,
            methods,
            signature: computed_header.signature.clone(),
            source_file: class.source_file.clone(),
            inner_classes: class
                .inner_classes
                .iter()
                .map(|inner| {
                    let mut translated = inner.clone();
                    translated.inner = context.computed_internal_name(&inner.inner);
                    translated.outer = inner
                        .outer
                        .as_deref()
                        .map(|it| context.computed_internal_name(it));
                    translated
                })
                .collect(),
            annotations: class.annotations.clone(),
            invisible_annotations: class.invisible_annotations.clone(),
            bootstrap_methods,
            is_synthetic: class.is_synthetic,
            is_deprecated: class.is_deprecated,
        })
    }

    /// Emits one declared field: its computed form, or the `$submission`
    /// mirror plus the reference's field when the shapes disagree.
    fn merge_field(
        &self,
        info: &SubmissionClassInfo,
        field: &Field,
        is_interface: bool,
    ) -> Vec<Field> {
        let context = self.context;
        let translated_descriptor = context.computed_descriptor(&field.descriptor);
        let computed = info.computed_field(&field.name);

        let force_final = |mut access: FieldAccess| {
            if is_interface {
                access.insert(FieldAccess::FINAL);
            }
            access
        };

        let Some(computed) = computed.filter(|it| it.owner != info.class().name) else {
            // Identity mapping: the field keeps its declared shape.
            let mut emitted = field.clone();
            emitted.descriptor = translated_descriptor;
            emitted.access = force_final(field.access);
            return vec![emitted];
        };

        let static_mismatch =
            field.access.contains(FieldAccess::STATIC) != computed.is_static();
        let descriptor_mismatch = translated_descriptor != computed.descriptor;
        let final_only_mismatch = !static_mismatch
            && !descriptor_mismatch
            && (field.access ^ computed.access) == FieldAccess::FINAL
            && context.config().mirror_final_mismatch;

        if static_mismatch || descriptor_mismatch || final_only_mismatch {
            let mirror = Field {
                access: force_final(field.access | FieldAccess::SYNTHETIC),
                name: format!("{}{}", computed.name, abi::SUBMISSION_SUFFIX),
                descriptor: translated_descriptor,
                signature: field.signature.clone(),
                constant_value: field.constant_value.clone(),
                annotations: Vec::new(),
                invisible_annotations: Vec::new(),
                is_synthetic: true,
                is_deprecated: false,
            };
            let reference_version = Field {
                access: force_final(computed.access),
                name: computed.name.clone(),
                descriptor: computed.descriptor.clone(),
                signature: computed.signature.clone(),
                constant_value: None,
                annotations: Vec::new(),
                invisible_annotations: Vec::new(),
                is_synthetic: false,
                is_deprecated: false,
            };
            vec![mirror, reference_version]
        } else {
            vec![Field {
                access: force_final(computed.access),
                name: computed.name.clone(),
                descriptor: computed.descriptor.clone(),
                signature: computed.signature.clone(),
                constant_value: field.constant_value.clone(),
                annotations: field.annotations.clone(),
                invisible_annotations: field.invisible_annotations.clone(),
                is_synthetic: field.is_synthetic,
                is_deprecated: field.is_deprecated,
            }]
        }
    }

    /// Finds the reference body backing a student method, with bootstrap
    /// indices shifted into the merged table.
    fn reference_method(
        &self,
        info: &SubmissionClassInfo,
        method: &Method,
        reference: Option<&crate::reference::ReferenceClass>,
        bootstrap_offset: u16,
    ) -> Option<Method> {
        let reference = reference?;
        let computed = info.computed_method(&method.name, &method.descriptor)?;
        reference
            .method(&computed.name, &computed.descriptor)
            .filter(|it| it.code.is_some())
            .map(|it| prepare(it, bootstrap_offset))
    }

    fn class_header_accessor(&self, info: &SubmissionClassInfo) -> Method {
        let mut assembler = CodeAssembler::new();
        info.original_header().build(&mut assembler);
        assembler.emit(Instruction::AReturn);
        accessor(
            abi::ORIGINAL_CLASS_HEADER,
            format!("()L{};", abi::CLASS_HEADER),
            assembler.finish(0, 0, Vec::new()),
        )
    }

    fn field_headers_accessor(&self, info: &SubmissionClassInfo) -> Method {
        let class = info.class();
        let mut assembler = CodeAssembler::new();
        new_collection(&mut assembler, "java/util/HashSet");
        for field in &class.fields {
            if field.is_synthetic() {
                continue;
            }
            assembler.dup();
            FieldHeader::of(&class.name, field).build(&mut assembler);
            collection_add(&mut assembler, "java/util/HashSet");
        }
        unmodifiable(&mut assembler, "Set");
        assembler.emit(Instruction::AReturn);
        accessor(
            abi::ORIGINAL_FIELD_HEADERS,
            "()Ljava/util/Set;".to_owned(),
            assembler.finish(0, 0, Vec::new()),
        )
    }

    fn method_headers_accessor(&self, info: &SubmissionClassInfo) -> Method {
        let class = info.class();
        let mut assembler = CodeAssembler::new();
        new_collection(&mut assembler, "java/util/HashSet");
        for method in &class.methods {
            if method.is_synthetic || method.access.contains(MethodAccess::SYNTHETIC) {
                continue;
            }
            assembler.dup();
            MethodHeader::of(&class.name, method).build(&mut assembler);
            collection_add(&mut assembler, "java/util/HashSet");
        }
        unmodifiable(&mut assembler, "Set");
        assembler.emit(Instruction::AReturn);
        accessor(
            abi::ORIGINAL_METHOD_HEADERS,
            "()Ljava/util/Set;".to_owned(),
            assembler.finish(0, 0, Vec::new()),
        )
    }
}

fn prepare(method: &Method, bootstrap_offset: u16) -> Method {
    let mut prepared = method.clone();
    if let Some(body) = prepared.code.as_mut() {
        shift_bootstrap_indices(body, bootstrap_offset);
    }
    prepared
}

/// Rewrites an enum `<clinit>` so that each store into a dropped constant
/// field pops the newly constructed receiver instead. The reference layout
/// stays authoritative; observation comes from the constructor preamble.
fn drop_enum_constant_stores(
    method: &Method,
    owner: &str,
    constants: &HashSet<String>,
) -> Method {
    let mut adjusted = method.clone();
    let Some(body) = adjusted.code.as_mut() else {
        return adjusted;
    };
    for element in &mut body.elements {
        let CodeElement::Instruction(instruction) = element else {
            continue;
        };
        if let Instruction::PutStatic(field) = instruction {
            if field.owner == owner && constants.contains(&field.name) {
                let wide = matches!(field.descriptor.as_str(), "J" | "D");
                *instruction = if wide {
                    Instruction::Pop2
                } else {
                    Instruction::Pop
                };
            }
        }
    }
    adjusted
}

/// Rebases `invokedynamic` call sites and dynamic constants of a reference
/// body onto the merged bootstrap-method table.
fn shift_bootstrap_indices(body: &mut CodeBody, offset: u16) {
    if offset == 0 {
        return;
    }
    for element in &mut body.elements {
        if let CodeElement::Instruction(instruction) = element {
            match instruction {
                Instruction::InvokeDynamic {
                    bootstrap_index, ..
                } => *bootstrap_index += offset,
                Instruction::Ldc(ConstantValue::Dynamic {
                    bootstrap_index, ..
                }) => *bootstrap_index += offset,
                _ => {}
            }
        }
    }
}

fn accessor(name: &str, descriptor: String, body: CodeBody) -> Method {
    Method {
        access: MethodAccess::PUBLIC | MethodAccess::STATIC | MethodAccess::SYNTHETIC,
        name: name.to_owned(),
        descriptor,
        signature: None,
        exceptions: Vec::new(),
        annotations: Vec::new(),
        invisible_annotations: Vec::new(),
        code: Some(body),
        is_synthetic: true,
        is_deprecated: false,
    }
}

fn new_collection(assembler: &mut CodeAssembler, class: &str) {
    assembler.new_object(class);
    assembler.dup();
    assembler.emit(Instruction::InvokeSpecial {
        method: crate::classfile::MethodRef {
            owner: class.to_owned(),
            name: CONSTRUCTOR_NAME.to_owned(),
            descriptor: "()V".to_owned(),
        },
        interface: false,
    });
}

fn collection_add(assembler: &mut CodeAssembler, class: &str) {
    assembler.emit(Instruction::InvokeVirtual(crate::classfile::MethodRef {
        owner: class.to_owned(),
        name: "add".to_owned(),
        descriptor: "(Ljava/lang/Object;)Z".to_owned(),
    }));
    assembler.emit(Instruction::Pop);
}

fn unmodifiable(assembler: &mut CodeAssembler, kind: &str) {
    assembler.emit(Instruction::InvokeStatic {
        method: crate::classfile::MethodRef {
            owner: "java/util/Collections".to_owned(),
            name: format!("unmodifiable{kind}"),
            descriptor: format!("(Ljava/util/{kind};)Ljava/util/{kind};"),
        },
        interface: false,
    });
}

fn static_values_field() -> Field {
    Field {
        access: FieldAccess::PRIVATE | FieldAccess::STATIC | FieldAccess::SYNTHETIC,
        name: abi::STATIC_VALUES_FIELD.to_owned(),
        descriptor: "Ljava/util/Map;".to_owned(),
        signature: None,
        constant_value: None,
        annotations: Vec::new(),
        invisible_annotations: Vec::new(),
        is_synthetic: true,
        is_deprecated: false,
    }
}

/// The `<clinit>` preamble: create the side-table and record every
/// static-initialized literal under its original field name.
fn emit_static_capture(
    assembler: &mut CodeAssembler,
    computed_header: &ClassHeader,
    literals: &[(String, String, ConstantValue)],
) {
    let owner = computed_header.name.clone();
    let map_field = |name: &str| crate::classfile::FieldRef {
        owner: owner.clone(),
        name: name.to_owned(),
        descriptor: "Ljava/util/Map;".to_owned(),
    };
    new_collection(assembler, "java/util/HashMap");
    assembler.emit(Instruction::PutStatic(map_field(abi::STATIC_VALUES_FIELD)));
    for (name, descriptor, value) in literals {
        assembler.emit(Instruction::GetStatic(map_field(abi::STATIC_VALUES_FIELD)));
        assembler.push_str(name);
        push_boxed_literal(assembler, descriptor, value);
        assembler.emit(Instruction::InvokeInterface(crate::classfile::MethodRef {
            owner: "java/util/Map".to_owned(),
            name: "put".to_owned(),
            descriptor: "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;".to_owned(),
        }));
        assembler.emit(Instruction::Pop);
    }
}

/// Pushes a `ConstantValue` literal boxed to an object, following the
/// field's declared sort.
fn push_boxed_literal(assembler: &mut CodeAssembler, descriptor: &str, value: &ConstantValue) {
    let sort = descriptor.parse::<FieldType>().ok();
    match (value, sort) {
        (ConstantValue::Integer(it), Some(FieldType::Primitive(sort))) => {
            assembler.push_int(*it);
            match sort {
                PrimitiveType::Byte => assembler.emit(Instruction::I2B),
                PrimitiveType::Short => assembler.emit(Instruction::I2S),
                PrimitiveType::Char => assembler.emit(Instruction::I2C),
                _ => {}
            }
            assembler.box_primitive(sort);
        }
        (ConstantValue::Long(_) | ConstantValue::Float(_) | ConstantValue::Double(_), _) => {
            let sort = match value {
                ConstantValue::Long(_) => PrimitiveType::Long,
                ConstantValue::Float(_) => PrimitiveType::Float,
                _ => PrimitiveType::Double,
            };
            assembler.emit(Instruction::Ldc(value.clone()));
            assembler.box_primitive(sort);
        }
        _ => {
            // Strings and anything else loadable push as objects directly.
            assembler.emit(Instruction::Ldc(value.clone()));
        }
    }
}

/// The enum-constructor preamble: record `(name, ordinal, args)` before any
/// dispatch happens, keyed by the original class name.
fn emit_enum_record(
    assembler: &mut CodeAssembler,
    original_name: &str,
    descriptor: &MethodDescriptor,
) {
    if descriptor.parameters.len() < 2 {
        return;
    }
    assembler.push_str(original_name);
    assembler.emit(Instruction::ALoad(1));
    assembler.emit(Instruction::ILoad(2));
    let extra = &descriptor.parameters[2..];
    assembler.push_int(i32::try_from(extra.len()).unwrap_or(i32::MAX));
    assembler.emit(Instruction::ANewArray("java/lang/Object".into()));
    let mut slot = 3;
    for (index, parameter) in extra.iter().enumerate() {
        assembler.dup();
        assembler.push_int(i32::try_from(index).unwrap_or(i32::MAX));
        assembler.load(parameter, slot);
        if let FieldType::Primitive(sort) = parameter {
            assembler.box_primitive(*sort);
        }
        assembler.emit(Instruction::AAStore);
        slot += if parameter.is_category_2() { 2 } else { 1 };
    }
    assembler.invoke_static(abi::ENUM_RECORD);
}

fn static_values_accessor(computed_header: &ClassHeader) -> Method {
    let mut assembler = CodeAssembler::new();
    assembler.emit(Instruction::GetStatic(crate::classfile::FieldRef {
        owner: computed_header.name.clone(),
        name: abi::STATIC_VALUES_FIELD.to_owned(),
        descriptor: "Ljava/util/Map;".to_owned(),
    }));
    unmodifiable(&mut assembler, "Map");
    assembler.emit(Instruction::AReturn);
    accessor(
        abi::ORIGINAL_STATIC_FIELD_VALUES,
        "()Ljava/util/Map;".to_owned(),
        assembler.finish(0, 0, Vec::new()),
    )
}

fn enum_constants_accessor(original_name: &str) -> Method {
    let mut assembler = CodeAssembler::new();
    assembler.push_str(original_name);
    assembler.invoke_static(abi::ENUM_FOR_CLASS);
    assembler.emit(Instruction::AReturn);
    accessor(
        abi::ORIGINAL_ENUM_CONSTANTS,
        "()Ljava/util/List;".to_owned(),
        assembler.finish(0, 0, Vec::new()),
    )
}
