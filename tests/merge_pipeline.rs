//! End-to-end structural properties of merged classes.

mod common;

use std::collections::HashMap;

use classweave::{
    TransformContext, TransformerConfig,
    classfile::{
        Annotation, Class, ClassAccess, ConstantValue, ElementValue, FieldAccess, FieldRef,
        MethodAccess, MethodRef,
        code::Instruction,
    },
    reference::ReferenceClass,
    runtime::{EnumConstantRecord, ExecutionRegistry, Value, abi},
    transform::ClassMerger,
};
use common::{body, calls, class, default_constructor, field, instructions_of, method};

fn reference_map(classes: Vec<Class>) -> HashMap<String, ReferenceClass> {
    classes
        .into_iter()
        .map(|it| {
            let parsed = ReferenceClass::parse(&it.to_bytes().unwrap()).unwrap();
            (parsed.name().to_owned(), parsed)
        })
        .collect()
}

fn context_with(references: Vec<Class>, threshold: f64) -> TransformContext {
    let mut config = TransformerConfig::new("edu/sub/");
    config.similarity_threshold = threshold;
    TransformContext::new(config, reference_map(references)).unwrap()
}

fn transform(context: &TransformContext, submission: &Class) -> Class {
    context
        .register_submission(&submission.to_bytes().unwrap())
        .unwrap();
    let bytes = ClassMerger::new(context)
        .transform(&submission.name)
        .unwrap();
    Class::from_bytes(&bytes).unwrap()
}

fn plain_submission() -> Class {
    let mut submission = class("edu/sub/Plain");
    submission.methods.push(default_constructor("java/lang/Object"));
    submission.methods.push(method(
        "twice",
        "(I)I",
        MethodAccess::PUBLIC,
        Some(body(
            2,
            2,
            vec![
                Instruction::ILoad(1),
                Instruction::ILoad(1),
                Instruction::IAdd,
                Instruction::IReturn,
            ],
        )),
    ));
    submission
}

#[test]
fn identity_preservation_without_reference() {
    let context = context_with(Vec::new(), 0.9);
    let merged = transform(&context, &plain_submission());

    assert_eq!(merged.name, "edu/sub/Plain");
    let twice = merged.get_method("twice", "(I)I").expect("member survives");
    assert_eq!(twice.access, MethodAccess::PUBLIC);
    assert!(
        instructions_of(&merged, "twice", "(I)I")
            .iter()
            .any(|it| matches!(it, Instruction::IAdd))
    );
    assert!(
        merged
            .methods
            .iter()
            .all(|it| !it.name.ends_with(abi::SUBMISSION_SUFFIX))
    );
    assert!(
        merged
            .fields
            .iter()
            .all(|it| !it.name.ends_with(abi::SUBMISSION_SUFFIX))
    );

    // The three metadata accessors are always injected.
    for accessor in [
        abi::ORIGINAL_CLASS_HEADER,
        abi::ORIGINAL_FIELD_HEADERS,
        abi::ORIGINAL_METHOD_HEADERS,
    ] {
        assert!(
            merged.methods.iter().any(|it| it.name == accessor),
            "missing accessor {accessor}"
        );
    }
}

#[test]
fn emitted_bytes_are_deterministic() {
    let context = context_with(Vec::new(), 0.9);
    let submission = plain_submission();
    context
        .register_submission(&submission.to_bytes().unwrap())
        .unwrap();
    let merger = ClassMerger::new(&context);
    let first = merger.transform("edu/sub/Plain").unwrap();
    let second = merger.transform("edu/sub/Plain").unwrap();
    assert_eq!(first, second);
}

fn counting_reference() -> Class {
    let mut reference = class("ref/Counter");
    reference.methods.push(default_constructor("java/lang/Object"));
    reference.methods.push(method(
        "count",
        "(I)I",
        MethodAccess::PUBLIC,
        Some(body(1, 2, vec![Instruction::ILoad(1), Instruction::IReturn])),
    ));
    reference
}

fn renamed_submission() -> Class {
    let mut submission = class("edu/sub/Compteur");
    submission.methods.push(default_constructor("java/lang/Object"));
    submission.methods.push(method(
        "compte",
        "(I)I",
        MethodAccess::PUBLIC,
        Some(body(
            2,
            2,
            vec![
                Instruction::ILoad(1),
                Instruction::IConst(1),
                Instruction::IAdd,
                Instruction::IReturn,
            ],
        )),
    ));
    submission
}

#[test]
fn fuzzy_binding_renames_class_and_member() {
    let context = context_with(vec![counting_reference()], 0.8);
    let merged = transform(&context, &renamed_submission());

    // The class migrates to the reference header and the renamed method is
    // reachable under the reference's name.
    assert_eq!(merged.name, "ref/Counter");
    assert!(merged.get_method("count", "(I)I").is_some());
    assert!(merged.get_method("compte", "(I)I").is_none());

    // The merged body carries the dispatch prologue and both bodies: the
    // student's (iadd) and the reference's.
    assert!(calls(&merged, "count", "(I)I", abi::LOG_INVOCATION.name));
    assert!(calls(&merged, "count", "(I)I", abi::USE_SUBSTITUTION.name));
    assert!(calls(&merged, "count", "(I)I", abi::USE_SUBMISSION_IMPL.name));
    assert!(
        instructions_of(&merged, "count", "(I)I")
            .iter()
            .any(|it| matches!(it, Instruction::IAdd))
    );
}

#[test]
fn below_threshold_keeps_identity() {
    let context = context_with(vec![counting_reference()], 0.95);
    let merged = transform(&context, &renamed_submission());
    // 0.95 is above the similarity of Compteur/Counter; nothing binds.
    assert_eq!(merged.name, "edu/sub/Compteur");
    assert!(merged.get_method("compte", "(I)I").is_some());
    // The prologue is still injected: every merged method consults the
    // control surface.
    assert!(calls(&merged, "compte", "(I)I", abi::LOG_INVOCATION.name));
}

fn force_signature(identifier: &str) -> Annotation {
    Annotation {
        type_descriptor: abi::FORCE_SIGNATURE_DESCRIPTOR.to_owned(),
        elements: vec![(
            "identifier".to_owned(),
            ElementValue::Constant('s', ConstantValue::string(identifier)),
        )],
    }
}

#[test]
fn forced_mapping_bypasses_similarity() {
    let mut reference = class("ref/Tally");
    reference.methods.push(default_constructor("java/lang/Object"));
    reference
        .fields
        .push(field("accumulator", "I", FieldAccess::PRIVATE));

    let mut submission = class("edu/sub/Bucket");
    submission.annotations.push(force_signature("ref/Tally"));
    submission.methods.push(default_constructor("java/lang/Object"));
    let mut pinned = field("total", "I", FieldAccess::PRIVATE);
    pinned.annotations.push(force_signature("accumulator"));
    submission.fields.push(pinned);

    let context = context_with(vec![reference], 0.9);
    let merged = transform(&context, &submission);

    assert_eq!(merged.name, "ref/Tally");
    assert!(merged.get_field("accumulator").is_some());
    assert!(merged.get_field("total").is_none());
}

#[test]
fn static_mismatch_emits_throwing_stub_and_mirror() {
    let mut reference = class("ref/Dice");
    reference.methods.push(default_constructor("java/lang/Object"));
    reference.methods.push(method(
        "roll",
        "()I",
        MethodAccess::PUBLIC | MethodAccess::STATIC,
        Some(body(1, 0, vec![Instruction::IConst(4), Instruction::IReturn])),
    ));

    let mut submission = class("edu/sub/Dice");
    submission.methods.push(default_constructor("java/lang/Object"));
    submission.methods.push(method(
        "roll",
        "()I",
        MethodAccess::PUBLIC,
        Some(body(1, 1, vec![Instruction::IConst(2), Instruction::IReturn])),
    ));

    let context = context_with(vec![reference], 0.9);
    let merged = transform(&context, &submission);

    // The computed-shape slot throws the incompatible-header exception when
    // actually invoked; the student body stays callable under the suffix.
    let stub = merged.get_method("roll", "()I").expect("stub emitted");
    assert!(!stub.access.contains(MethodAccess::STATIC));
    let stub_instructions = instructions_of(&merged, "roll", "()I");
    assert!(stub_instructions.iter().any(|it| matches!(
        it,
        Instruction::New(name) if name == abi::INCOMPATIBLE_HEADER_EXCEPTION
    )));
    assert!(
        stub_instructions
            .iter()
            .any(|it| matches!(it, Instruction::AThrow))
    );
    let mirror = format!("roll{}", abi::SUBMISSION_SUFFIX);
    assert!(merged.methods.iter().any(|it| it.name == mirror));

    // Other methods stay usable.
    assert!(merged.get_method("<init>", "()V").is_some());
}

#[test]
fn constructor_prologue_chains_through_super() {
    let mut submission = class("edu/sub/Pair");
    submission.methods.push(method(
        "<init>",
        "(I)V",
        MethodAccess::PUBLIC,
        Some(body(
            1,
            2,
            vec![
                Instruction::ALoad(0),
                Instruction::InvokeSpecial {
                    method: classweave::classfile::MethodRef {
                        owner: "java/lang/Object".to_owned(),
                        name: "<init>".to_owned(),
                        descriptor: "()V".to_owned(),
                    },
                    interface: false,
                },
                Instruction::Return,
            ],
        )),
    ));

    let context = context_with(Vec::new(), 0.9);
    let merged = transform(&context, &submission);

    let instructions = instructions_of(&merged, "<init>", "(I)V");
    // The substitute branch resolves the constructor-invocation record and
    // dispatches over the super constructor by (owner, descriptor).
    assert!(calls(
        &merged,
        "<init>",
        "(I)V",
        abi::SUBSTITUTION_CONSTRUCTOR_INVOCATION.name
    ));
    assert!(instructions.iter().any(|it| matches!(
        it,
        Instruction::Ldc(ConstantValue::String(s)) if s.as_utf8() == Some("java/lang/Object")
    )));
    // An unmatched record raises IllegalArgumentException.
    assert!(instructions.iter().any(|it| matches!(
        it,
        Instruction::New(name) if name == "java/lang/IllegalArgumentException"
    )));
}

fn enum_class(name: &str, constants: &[&str]) -> Class {
    let mut fixture = class(name);
    fixture.access =
        ClassAccess::PUBLIC | ClassAccess::SUPER | ClassAccess::FINAL | ClassAccess::ENUM;
    fixture.super_name = Some("java/lang/Enum".to_owned());
    for constant in constants {
        fixture.fields.push(field(
            constant,
            &format!("L{name};"),
            FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL | FieldAccess::ENUM,
        ));
    }
    fixture.methods.push(method(
        "<init>",
        "(Ljava/lang/String;I)V",
        MethodAccess::PRIVATE,
        Some(body(
            3,
            3,
            vec![
                Instruction::ALoad(0),
                Instruction::ALoad(1),
                Instruction::ILoad(2),
                Instruction::InvokeSpecial {
                    method: MethodRef {
                        owner: "java/lang/Enum".to_owned(),
                        name: "<init>".to_owned(),
                        descriptor: "(Ljava/lang/String;I)V".to_owned(),
                    },
                    interface: false,
                },
                Instruction::Return,
            ],
        )),
    ));
    fixture
}

fn enum_initializer(owner: &str, constants: &[&str]) -> classweave::classfile::Method {
    let mut instructions = Vec::new();
    for (ordinal, constant) in constants.iter().enumerate() {
        instructions.extend([
            Instruction::New(owner.to_owned()),
            Instruction::Dup,
            Instruction::Ldc(ConstantValue::string(*constant)),
            Instruction::IConst(i32::try_from(ordinal).unwrap()),
            Instruction::InvokeSpecial {
                method: MethodRef {
                    owner: owner.to_owned(),
                    name: "<init>".to_owned(),
                    descriptor: "(Ljava/lang/String;I)V".to_owned(),
                },
                interface: false,
            },
            Instruction::PutStatic(FieldRef {
                owner: owner.to_owned(),
                name: (*constant).to_owned(),
                descriptor: format!("L{owner};"),
            }),
        ]);
    }
    instructions.push(Instruction::Return);
    method("<clinit>", "()V", MethodAccess::STATIC, Some(body(4, 0, instructions)))
}

#[test]
fn enum_initializer_pops_dropped_constant_stores() {
    let mut submission = enum_class("edu/sub/Suit", &["HEARTS", "SPADES"]);
    submission
        .methods
        .push(enum_initializer("edu/sub/Suit", &["HEARTS", "SPADES"]));
    let reference = enum_class("ref/Suit", &["HEARTS", "SPADES"]);

    let context = context_with(vec![reference], 0.9);
    let merged = transform(&context, &submission);

    // The reference layout is authoritative: the constants exist exactly
    // once, under the reference's descriptors.
    assert_eq!(merged.name, "ref/Suit");
    assert_eq!(
        merged.get_field("HEARTS").map(|it| it.descriptor.as_str()),
        Some("Lref/Suit;")
    );
    assert_eq!(
        merged
            .fields
            .iter()
            .filter(|it| it.name == "SPADES")
            .count(),
        1
    );

    // The student's wiring still constructs, but the receiver is discarded
    // rather than stored into the dropped fields.
    let initializer = instructions_of(&merged, "<clinit>", "()V");
    assert!(initializer.iter().all(|it| !matches!(
        it,
        Instruction::PutStatic(f) if f.name == "HEARTS" || f.name == "SPADES"
    )));
    assert!(
        initializer
            .iter()
            .any(|it| matches!(it, Instruction::New(name) if name == "ref/Suit"))
    );
    let discards = initializer
        .iter()
        .filter(|it| matches!(it, Instruction::Pop))
        .count();
    assert!(discards >= 2, "one discard per dropped constant store");

    // Each construction records its (name, ordinal, args) triple, keyed by
    // the original class name, and the ordered accessor is injected.
    assert!(calls(
        &merged,
        "<init>",
        "(Ljava/lang/String;I)V",
        abi::ENUM_RECORD.name
    ));
    let constructor = instructions_of(&merged, "<init>", "(Ljava/lang/String;I)V");
    assert!(constructor.iter().any(|it| matches!(
        it,
        Instruction::Ldc(ConstantValue::String(s)) if s.as_utf8() == Some("edu/sub/Suit")
    )));
    assert!(
        merged
            .methods
            .iter()
            .any(|it| it.name == abi::ORIGINAL_ENUM_CONSTANTS)
    );
}

#[test]
fn enum_constant_records_keep_construction_order() {
    let registry = ExecutionRegistry::new();
    registry.record_enum_constant(
        "edu/sub/Suit",
        EnumConstantRecord {
            name: "HEARTS".to_owned(),
            ordinal: 0,
            args: Vec::new(),
        },
    );
    registry.record_enum_constant(
        "edu/sub/Suit",
        EnumConstantRecord {
            name: "SPADES".to_owned(),
            ordinal: 1,
            args: vec![Value::Int(3)],
        },
    );

    let records = registry.enum_constants("edu/sub/Suit");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "HEARTS");
    assert_eq!(records[0].ordinal, 0);
    assert_eq!(records[1].name, "SPADES");
    assert_eq!(records[1].args, vec![Value::Int(3)]);
    assert!(registry.enum_constants("edu/sub/Other").is_empty());
}

#[test]
fn missing_reference_members_are_appended_with_prologue() {
    let mut reference = class("ref/Counter");
    reference.methods.push(default_constructor("java/lang/Object"));
    reference.methods.push(method(
        "count",
        "(I)I",
        MethodAccess::PUBLIC,
        Some(body(1, 2, vec![Instruction::ILoad(1), Instruction::IReturn])),
    ));
    reference.methods.push(method(
        "reset",
        "()V",
        MethodAccess::PUBLIC,
        Some(body(0, 1, vec![Instruction::Return])),
    ));
    reference.fields.push(field("total", "I", FieldAccess::PRIVATE));

    let context = context_with(vec![reference], 0.8);
    let merged = transform(&context, &renamed_submission());

    // `reset` and `total` exist only in the reference; both are appended,
    // and the appended method dispatches like everything else.
    assert!(merged.get_field("total").is_some());
    assert!(merged.get_method("reset", "()V").is_some());
    assert!(calls(&merged, "reset", "()V", abi::LOG_INVOCATION.name));
}
