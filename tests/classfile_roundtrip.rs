//! Write → parse → write fidelity of the class-file substrate.

mod common;

use classweave::classfile::{
    Class, FieldAccess, MethodAccess, MethodRef,
    code::{
        CodeBody, CodeElement, ExceptionHandler, FrameDirective, Instruction, Label,
        LocalVariableEntry, VerificationType,
    },
    constant_pool::ConstantValue,
};
use common::{body, class, default_constructor, field, method};

fn branching_body() -> CodeBody {
    // abs(int): negative inputs are negated.
    let mut code = CodeBody {
        max_stack: 1,
        max_locals: 2,
        ..CodeBody::default()
    };
    let positive = code.fresh_label();
    code.elements = vec![
        CodeElement::Instruction(Instruction::ILoad(1)),
        CodeElement::Instruction(Instruction::IfGe(positive)),
        CodeElement::Instruction(Instruction::ILoad(1)),
        CodeElement::Instruction(Instruction::INeg),
        CodeElement::Instruction(Instruction::IReturn),
        CodeElement::Label(positive),
        CodeElement::Frame(FrameDirective::Same),
        CodeElement::Instruction(Instruction::ILoad(1)),
        CodeElement::Instruction(Instruction::IReturn),
    ];
    code
}

fn switching_body() -> CodeBody {
    let mut code = CodeBody {
        max_stack: 1,
        max_locals: 2,
        ..CodeBody::default()
    };
    let one = code.fresh_label();
    let fallback = code.fresh_label();
    code.elements = vec![
        CodeElement::Instruction(Instruction::ILoad(1)),
        CodeElement::Instruction(Instruction::TableSwitch {
            default: fallback,
            low: 1,
            targets: vec![one],
        }),
        CodeElement::Label(one),
        CodeElement::Frame(FrameDirective::Same),
        CodeElement::Instruction(Instruction::IConst(1)),
        CodeElement::Instruction(Instruction::IReturn),
        CodeElement::Label(fallback),
        CodeElement::Frame(FrameDirective::Same),
        CodeElement::Instruction(Instruction::IConst(0)),
        CodeElement::Instruction(Instruction::IReturn),
    ];
    code
}

fn guarded_body() -> CodeBody {
    // try { parse() } catch (RuntimeException e) { -1 }
    let mut code = CodeBody {
        max_stack: 1,
        max_locals: 2,
        ..CodeBody::default()
    };
    let start = code.fresh_label();
    let end = code.fresh_label();
    let handler = code.fresh_label();
    code.elements = vec![
        CodeElement::Label(start),
        CodeElement::LineNumber(12),
        CodeElement::Instruction(Instruction::InvokeStatic {
            method: MethodRef {
                owner: "util/Source".to_owned(),
                name: "parse".to_owned(),
                descriptor: "()I".to_owned(),
            },
            interface: false,
        }),
        CodeElement::Label(end),
        CodeElement::Instruction(Instruction::IReturn),
        CodeElement::Label(handler),
        CodeElement::Frame(FrameDirective::SameLocals1(VerificationType::Object(
            "java/lang/RuntimeException".to_owned(),
        ))),
        CodeElement::Instruction(Instruction::AStore(1)),
        CodeElement::LineNumber(14),
        CodeElement::Instruction(Instruction::IConst(-1)),
        CodeElement::Instruction(Instruction::IReturn),
    ];
    code.handlers.push(ExceptionHandler {
        start,
        end,
        handler,
        catch_type: Some("java/lang/RuntimeException".to_owned()),
    });
    code.local_variables.push(LocalVariableEntry {
        start: handler,
        end: handler,
        index: 1,
        name: "failure".to_owned(),
        descriptor: "Ljava/lang/RuntimeException;".to_owned(),
    });
    code
}

fn fixture() -> Class {
    let mut fixture = class("util/Numbers");
    fixture.source_file = Some("Numbers.java".to_owned());
    fixture.fields.push(field(
        "SCALE",
        "J",
        FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL,
    ));
    fixture.fields[0].constant_value = Some(ConstantValue::Long(1_000));
    fixture.methods.push(default_constructor("java/lang/Object"));
    fixture.methods.push(method(
        "abs",
        "(I)I",
        MethodAccess::PUBLIC,
        Some(branching_body()),
    ));
    fixture.methods.push(method(
        "isOne",
        "(I)I",
        MethodAccess::PUBLIC,
        Some(switching_body()),
    ));
    fixture.methods.push(method(
        "tryParse",
        "()I",
        MethodAccess::PUBLIC | MethodAccess::STATIC,
        Some(guarded_body()),
    ));
    fixture.methods.push(method(
        "wide",
        "(D)D",
        MethodAccess::PUBLIC | MethodAccess::STATIC,
        Some(body(
            4,
            2,
            vec![
                Instruction::DLoad(0),
                Instruction::Ldc(ConstantValue::double(2.5)),
                Instruction::DMul,
                Instruction::DReturn,
            ],
        )),
    ));
    fixture
}

#[test]
fn write_parse_write_is_stable() {
    let first = fixture().to_bytes().expect("serialize fixture");
    let reparsed = Class::from_bytes(&first).expect("parse emitted class");
    let second = reparsed.to_bytes().expect("serialize reparsed class");
    assert_eq!(first, second);
}

#[test]
fn structure_survives_round_trip() {
    let bytes = fixture().to_bytes().unwrap();
    let parsed = Class::from_bytes(&bytes).unwrap();

    assert_eq!(parsed.name, "util/Numbers");
    assert_eq!(parsed.super_name.as_deref(), Some("java/lang/Object"));
    assert_eq!(parsed.source_file.as_deref(), Some("Numbers.java"));
    assert_eq!(
        parsed.get_field("SCALE").unwrap().constant_value,
        Some(ConstantValue::Long(1_000))
    );

    let abs = parsed.get_method("abs", "(I)I").unwrap();
    let code = abs.code.as_ref().unwrap();
    assert!(code.instructions().any(|it| matches!(it, Instruction::IfGe(_))));
    assert!(
        code.elements
            .iter()
            .any(|it| matches!(it, CodeElement::Frame(FrameDirective::Same)))
    );

    let guarded = parsed.get_method("tryParse", "()I").unwrap();
    let code = guarded.code.as_ref().unwrap();
    assert_eq!(code.handlers.len(), 1);
    assert_eq!(
        code.handlers[0].catch_type.as_deref(),
        Some("java/lang/RuntimeException")
    );
    assert_eq!(code.local_variables.len(), 1);
    assert_eq!(code.local_variables[0].name, "failure");
    assert!(
        code.elements
            .iter()
            .any(|it| matches!(it, CodeElement::LineNumber(12)))
    );

    let switching = parsed.get_method("isOne", "(I)I").unwrap();
    let has_switch = switching
        .code
        .as_ref()
        .unwrap()
        .instructions()
        .any(|it| matches!(it, Instruction::TableSwitch { .. }));
    assert!(has_switch);
}

#[test]
fn labels_resolve_to_matching_targets() {
    let bytes = fixture().to_bytes().unwrap();
    let parsed = Class::from_bytes(&bytes).unwrap();
    let code = parsed
        .get_method("abs", "(I)I")
        .unwrap()
        .code
        .as_ref()
        .unwrap();

    let target = code
        .instructions()
        .find_map(|it| match it {
            Instruction::IfGe(target) => Some(*target),
            _ => None,
        })
        .expect("branch survived");
    let placed: Vec<Label> = code
        .elements
        .iter()
        .filter_map(|it| match it {
            CodeElement::Label(label) => Some(*label),
            _ => None,
        })
        .collect();
    assert!(placed.contains(&target));
}
