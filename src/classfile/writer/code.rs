//! Laying out and encoding the `Code` attribute.
//!
//! Layout is two-pass: the first pass assigns byte offsets to every element
//! (switch padding depends on the instruction's own offset), the second pass
//! encodes with branch displacements and stack-map deltas resolved from
//! label positions. `goto` is relaxed to `goto_w` iteratively when its
//! displacement does not fit in 16 bits; conditional branches have no wide
//! form and overflow is an error.

use std::collections::{HashMap, HashSet};

use crate::{
    classfile::{
        code::{
            CodeBody, CodeElement, FrameDirective, Instruction, Label, VerificationType,
        },
        constant_pool::ConstantPool,
    },
    types::{MethodDescriptor, PrimitiveType},
};

use super::{GenerationError, write_length};

const MAX_CODE_LENGTH: usize = 65535;

struct Layout {
    /// Byte offset of every label.
    labels: HashMap<Label, u32>,
    /// Byte offset of every instruction element, keyed by element index.
    instructions: HashMap<usize, u32>,
    /// Stack map frames with their resolved offsets, in stream order.
    frames: Vec<(u32, FrameDirective)>,
    /// Line number entries with their resolved offsets.
    lines: Vec<(u32, u16)>,
    /// Total code length in bytes.
    length: u32,
}

pub(super) fn write_code(
    body: &CodeBody,
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, GenerationError> {
    let mut wide_gotos: HashSet<usize> = HashSet::new();
    let layout = loop {
        let layout = compute_layout(body, &wide_gotos)?;
        let mut grown = false;
        for (index, element) in body.elements.iter().enumerate() {
            if let CodeElement::Instruction(Instruction::Goto(target)) = element {
                if wide_gotos.contains(&index) {
                    continue;
                }
                let from = layout.instructions[&index];
                let to = resolve(&layout.labels, *target)?;
                let displacement = i64::from(to) - i64::from(from);
                if i16::try_from(displacement).is_err() {
                    wide_gotos.insert(index);
                    grown = true;
                }
            }
        }
        if !grown {
            break layout;
        }
    };
    if layout.length as usize > MAX_CODE_LENGTH {
        return Err(GenerationError::CodeTooLarge(layout.length as usize));
    }

    let mut code = Vec::with_capacity(layout.length as usize);
    for (index, element) in body.elements.iter().enumerate() {
        if let CodeElement::Instruction(instruction) = element {
            let offset = layout.instructions[&index];
            debug_assert_eq!(offset as usize, code.len());
            encode(
                instruction,
                offset,
                wide_gotos.contains(&index),
                &layout.labels,
                pool,
                &mut code,
            )?;
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(&body.max_stack.to_be_bytes());
    out.extend_from_slice(&body.max_locals.to_be_bytes());
    write_length::<u32>(&mut out, code.len())?;
    out.extend_from_slice(&code);

    write_length::<u16>(&mut out, body.handlers.len())?;
    for handler in &body.handlers {
        let start = narrow(resolve(&layout.labels, handler.start)?)?;
        let end = narrow(resolve(&layout.labels, handler.end)?)?;
        let target = narrow(resolve(&layout.labels, handler.handler)?)?;
        let catch_index = match &handler.catch_type {
            Some(name) => pool.put_class(name)?,
            None => 0,
        };
        out.extend_from_slice(&start.to_be_bytes());
        out.extend_from_slice(&end.to_be_bytes());
        out.extend_from_slice(&target.to_be_bytes());
        out.extend_from_slice(&catch_index.to_be_bytes());
    }

    let mut attribute_count: u16 = 0;
    let mut attribute_bytes = Vec::new();
    if !layout.lines.is_empty() {
        let mut contents = Vec::new();
        write_length::<u16>(&mut contents, layout.lines.len())?;
        for (offset, line) in &layout.lines {
            contents.extend_from_slice(&narrow(*offset)?.to_be_bytes());
            contents.extend_from_slice(&line.to_be_bytes());
        }
        push_attribute(&mut attribute_bytes, &mut attribute_count, pool, "LineNumberTable", &contents)?;
    }
    if !body.local_variables.is_empty() {
        let mut contents = Vec::new();
        write_length::<u16>(&mut contents, body.local_variables.len())?;
        for variable in &body.local_variables {
            let start = narrow(resolve(&layout.labels, variable.start)?)?;
            let end = narrow(resolve(&layout.labels, variable.end)?)?;
            let length = end.checked_sub(start).ok_or_else(|| {
                GenerationError::Unencodable(format!(
                    "local variable `{}` has a negative scope",
                    variable.name
                ))
            })?;
            contents.extend_from_slice(&start.to_be_bytes());
            contents.extend_from_slice(&length.to_be_bytes());
            let name_index = pool.put_utf8(variable.name.as_str())?;
            contents.extend_from_slice(&name_index.to_be_bytes());
            let descriptor_index = pool.put_utf8(variable.descriptor.as_str())?;
            contents.extend_from_slice(&descriptor_index.to_be_bytes());
            contents.extend_from_slice(&variable.index.to_be_bytes());
        }
        push_attribute(&mut attribute_bytes, &mut attribute_count, pool, "LocalVariableTable", &contents)?;
    }
    if !layout.frames.is_empty() {
        let contents = write_frames(&layout.frames, &layout.labels, pool)?;
        push_attribute(&mut attribute_bytes, &mut attribute_count, pool, "StackMapTable", &contents)?;
    }
    out.extend_from_slice(&attribute_count.to_be_bytes());
    out.extend_from_slice(&attribute_bytes);
    Ok(out)
}

fn push_attribute(
    out: &mut Vec<u8>,
    count: &mut u16,
    pool: &mut ConstantPool,
    name: &str,
    contents: &[u8],
) -> Result<(), GenerationError> {
    let name_index = pool.put_utf8(name)?;
    out.extend_from_slice(&name_index.to_be_bytes());
    write_length::<u32>(out, contents.len())?;
    out.extend_from_slice(contents);
    *count += 1;
    Ok(())
}

fn resolve(labels: &HashMap<Label, u32>, label: Label) -> Result<u32, GenerationError> {
    labels
        .get(&label)
        .copied()
        .ok_or(GenerationError::UnplacedLabel(label))
}

fn narrow(offset: u32) -> Result<u16, GenerationError> {
    u16::try_from(offset).map_err(|_| GenerationError::CodeTooLarge(offset as usize))
}

fn compute_layout(body: &CodeBody, wide_gotos: &HashSet<usize>) -> Result<Layout, GenerationError> {
    let mut labels = HashMap::new();
    let mut instructions = HashMap::new();
    let mut frames = Vec::new();
    let mut lines = Vec::new();
    let mut offset: u32 = 0;
    for (index, element) in body.elements.iter().enumerate() {
        match element {
            CodeElement::Label(label) => {
                if labels.insert(*label, offset).is_some() {
                    return Err(GenerationError::Unencodable(format!(
                        "label {label} appears twice"
                    )));
                }
            }
            CodeElement::Frame(frame) => frames.push((offset, frame.clone())),
            CodeElement::LineNumber(line) => lines.push((offset, *line)),
            CodeElement::Instruction(instruction) => {
                instructions.insert(index, offset);
                offset += encoded_size(instruction, offset, wide_gotos.contains(&index))?;
            }
        }
    }
    Ok(Layout {
        labels,
        instructions,
        frames,
        lines,
        length: offset,
    })
}

/// Size of a load/store with the `_<n>`, plain, and `wide` encodings.
const fn var_size(index: u16) -> u32 {
    if index <= 3 {
        1
    } else if index <= 255 {
        2
    } else {
        4
    }
}

const fn switch_padding(opcode_offset: u32) -> u32 {
    (4 - ((opcode_offset + 1) % 4)) % 4
}

#[allow(clippy::match_same_arms)]
fn encoded_size(
    instruction: &Instruction,
    offset: u32,
    wide_goto: bool,
) -> Result<u32, GenerationError> {
    use Instruction as I;
    let size = match instruction {
        I::Nop
        | I::AConstNull
        | I::IConst(_)
        | I::LConst(_)
        | I::FConst(_)
        | I::DConst(_)
        | I::IALoad
        | I::LALoad
        | I::FALoad
        | I::DALoad
        | I::AALoad
        | I::BALoad
        | I::CALoad
        | I::SALoad
        | I::IAStore
        | I::LAStore
        | I::FAStore
        | I::DAStore
        | I::AAStore
        | I::BAStore
        | I::CAStore
        | I::SAStore
        | I::Pop
        | I::Pop2
        | I::Dup
        | I::DupX1
        | I::DupX2
        | I::Dup2
        | I::Dup2X1
        | I::Dup2X2
        | I::Swap
        | I::IAdd
        | I::LAdd
        | I::FAdd
        | I::DAdd
        | I::ISub
        | I::LSub
        | I::FSub
        | I::DSub
        | I::IMul
        | I::LMul
        | I::FMul
        | I::DMul
        | I::IDiv
        | I::LDiv
        | I::FDiv
        | I::DDiv
        | I::IRem
        | I::LRem
        | I::FRem
        | I::DRem
        | I::INeg
        | I::LNeg
        | I::FNeg
        | I::DNeg
        | I::IShl
        | I::LShl
        | I::IShr
        | I::LShr
        | I::IUShr
        | I::LUShr
        | I::IAnd
        | I::LAnd
        | I::IOr
        | I::LOr
        | I::IXor
        | I::LXor
        | I::I2L
        | I::I2F
        | I::I2D
        | I::L2I
        | I::L2F
        | I::L2D
        | I::F2I
        | I::F2L
        | I::F2D
        | I::D2I
        | I::D2L
        | I::D2F
        | I::I2B
        | I::I2C
        | I::I2S
        | I::LCmp
        | I::FCmpL
        | I::FCmpG
        | I::DCmpL
        | I::DCmpG
        | I::IReturn
        | I::LReturn
        | I::FReturn
        | I::DReturn
        | I::AReturn
        | I::Return
        | I::ArrayLength
        | I::AThrow
        | I::MonitorEnter
        | I::MonitorExit => 1,
        I::BiPush(_) => 2,
        I::SiPush(_) => 3,
        I::Ldc(_) => 3,
        I::ILoad(index)
        | I::LLoad(index)
        | I::FLoad(index)
        | I::DLoad(index)
        | I::ALoad(index)
        | I::IStore(index)
        | I::LStore(index)
        | I::FStore(index)
        | I::DStore(index)
        | I::AStore(index) => var_size(*index),
        I::IInc { index, delta } => {
            if *index <= 255 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        I::IfEq(_)
        | I::IfNe(_)
        | I::IfLt(_)
        | I::IfGe(_)
        | I::IfGt(_)
        | I::IfLe(_)
        | I::IfICmpEq(_)
        | I::IfICmpNe(_)
        | I::IfICmpLt(_)
        | I::IfICmpGe(_)
        | I::IfICmpGt(_)
        | I::IfICmpLe(_)
        | I::IfACmpEq(_)
        | I::IfACmpNe(_)
        | I::IfNull(_)
        | I::IfNonNull(_) => 3,
        I::Goto(_) => {
            if wide_goto {
                5
            } else {
                3
            }
        }
        I::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * u32::try_from(targets.len())?
        }
        I::LookupSwitch { pairs, .. } => {
            1 + switch_padding(offset) + 8 + 8 * u32::try_from(pairs.len())?
        }
        I::GetStatic(_)
        | I::PutStatic(_)
        | I::GetField(_)
        | I::PutField(_)
        | I::InvokeVirtual(_)
        | I::InvokeSpecial { .. }
        | I::InvokeStatic { .. }
        | I::New(_)
        | I::ANewArray(_)
        | I::CheckCast(_)
        | I::InstanceOf(_) => 3,
        I::InvokeInterface(_) | I::InvokeDynamic { .. } => 5,
        I::NewArray(_) => 2,
        I::MultiANewArray { .. } => 4,
    };
    Ok(size)
}

#[allow(clippy::too_many_lines, clippy::cast_sign_loss)]
fn encode(
    instruction: &Instruction,
    offset: u32,
    wide_goto: bool,
    labels: &HashMap<Label, u32>,
    pool: &mut ConstantPool,
    out: &mut Vec<u8>,
) -> Result<(), GenerationError> {
    use Instruction as I;

    let displacement_16 = |target: Label, labels: &HashMap<Label, u32>| {
        let to = resolve(labels, target)?;
        let displacement = i64::from(to) - i64::from(offset);
        i16::try_from(displacement)
            .map_err(|_| GenerationError::BranchOverflow(displacement, instruction.mnemonic()))
    };
    let displacement_32 = |target: Label, labels: &HashMap<Label, u32>| {
        let to = resolve(labels, target)?;
        let displacement = i64::from(to) - i64::from(offset);
        i32::try_from(displacement)
            .map_err(|_| GenerationError::BranchOverflow(displacement, instruction.mnemonic()))
    };
    let small = |value: u8, limit: u8, what: &str| {
        if value > limit {
            Err(GenerationError::Unencodable(format!("{what} {value}")))
        } else {
            Ok(value)
        }
    };

    match instruction {
        I::Nop => out.push(0x00),
        I::AConstNull => out.push(0x01),
        I::IConst(value) => {
            if !(-1..=5).contains(value) {
                return Err(GenerationError::Unencodable(format!("iconst {value}")));
            }
            out.push((0x03 + *value) as u8);
        }
        I::LConst(value) => {
            if !(0..=1).contains(value) {
                return Err(GenerationError::Unencodable(format!("lconst {value}")));
            }
            out.push(0x09 + (*value as u8));
        }
        I::FConst(ordinal) => out.push(0x0b + small(*ordinal, 2, "fconst")?),
        I::DConst(ordinal) => out.push(0x0e + small(*ordinal, 1, "dconst")?),
        I::BiPush(value) => {
            out.push(0x10);
            out.push(*value as u8);
        }
        I::SiPush(value) => {
            out.push(0x11);
            out.extend_from_slice(&value.to_be_bytes());
        }
        I::Ldc(constant) => {
            let index = pool.put_constant_value(constant)?;
            out.push(if constant.is_wide() { 0x14 } else { 0x13 });
            out.extend_from_slice(&index.to_be_bytes());
        }
        I::ILoad(index) => encode_var(out, 0x15, 0x1a, *index),
        I::LLoad(index) => encode_var(out, 0x16, 0x1e, *index),
        I::FLoad(index) => encode_var(out, 0x17, 0x22, *index),
        I::DLoad(index) => encode_var(out, 0x18, 0x26, *index),
        I::ALoad(index) => encode_var(out, 0x19, 0x2a, *index),
        I::IStore(index) => encode_var(out, 0x36, 0x3b, *index),
        I::LStore(index) => encode_var(out, 0x37, 0x3f, *index),
        I::FStore(index) => encode_var(out, 0x38, 0x43, *index),
        I::DStore(index) => encode_var(out, 0x39, 0x47, *index),
        I::AStore(index) => encode_var(out, 0x3a, 0x4b, *index),
        I::IALoad => out.push(0x2e),
        I::LALoad => out.push(0x2f),
        I::FALoad => out.push(0x30),
        I::DALoad => out.push(0x31),
        I::AALoad => out.push(0x32),
        I::BALoad => out.push(0x33),
        I::CALoad => out.push(0x34),
        I::SALoad => out.push(0x35),
        I::IAStore => out.push(0x4f),
        I::LAStore => out.push(0x50),
        I::FAStore => out.push(0x51),
        I::DAStore => out.push(0x52),
        I::AAStore => out.push(0x53),
        I::BAStore => out.push(0x54),
        I::CAStore => out.push(0x55),
        I::SAStore => out.push(0x56),
        I::Pop => out.push(0x57),
        I::Pop2 => out.push(0x58),
        I::Dup => out.push(0x59),
        I::DupX1 => out.push(0x5a),
        I::DupX2 => out.push(0x5b),
        I::Dup2 => out.push(0x5c),
        I::Dup2X1 => out.push(0x5d),
        I::Dup2X2 => out.push(0x5e),
        I::Swap => out.push(0x5f),
        I::IAdd => out.push(0x60),
        I::LAdd => out.push(0x61),
        I::FAdd => out.push(0x62),
        I::DAdd => out.push(0x63),
        I::ISub => out.push(0x64),
        I::LSub => out.push(0x65),
        I::FSub => out.push(0x66),
        I::DSub => out.push(0x67),
        I::IMul => out.push(0x68),
        I::LMul => out.push(0x69),
        I::FMul => out.push(0x6a),
        I::DMul => out.push(0x6b),
        I::IDiv => out.push(0x6c),
        I::LDiv => out.push(0x6d),
        I::FDiv => out.push(0x6e),
        I::DDiv => out.push(0x6f),
        I::IRem => out.push(0x70),
        I::LRem => out.push(0x71),
        I::FRem => out.push(0x72),
        I::DRem => out.push(0x73),
        I::INeg => out.push(0x74),
        I::LNeg => out.push(0x75),
        I::FNeg => out.push(0x76),
        I::DNeg => out.push(0x77),
        I::IShl => out.push(0x78),
        I::LShl => out.push(0x79),
        I::IShr => out.push(0x7a),
        I::LShr => out.push(0x7b),
        I::IUShr => out.push(0x7c),
        I::LUShr => out.push(0x7d),
        I::IAnd => out.push(0x7e),
        I::LAnd => out.push(0x7f),
        I::IOr => out.push(0x80),
        I::LOr => out.push(0x81),
        I::IXor => out.push(0x82),
        I::LXor => out.push(0x83),
        I::IInc { index, delta } => {
            if *index <= 255 && i8::try_from(*delta).is_ok() {
                out.push(0x84);
                out.push(*index as u8);
                out.push((*delta as i8) as u8);
            } else {
                out.push(0xc4);
                out.push(0x84);
                out.extend_from_slice(&index.to_be_bytes());
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        I::I2L => out.push(0x85),
        I::I2F => out.push(0x86),
        I::I2D => out.push(0x87),
        I::L2I => out.push(0x88),
        I::L2F => out.push(0x89),
        I::L2D => out.push(0x8a),
        I::F2I => out.push(0x8b),
        I::F2L => out.push(0x8c),
        I::F2D => out.push(0x8d),
        I::D2I => out.push(0x8e),
        I::D2L => out.push(0x8f),
        I::D2F => out.push(0x90),
        I::I2B => out.push(0x91),
        I::I2C => out.push(0x92),
        I::I2S => out.push(0x93),
        I::LCmp => out.push(0x94),
        I::FCmpL => out.push(0x95),
        I::FCmpG => out.push(0x96),
        I::DCmpL => out.push(0x97),
        I::DCmpG => out.push(0x98),
        I::IfEq(target) => encode_jump(out, 0x99, displacement_16(*target, labels)?),
        I::IfNe(target) => encode_jump(out, 0x9a, displacement_16(*target, labels)?),
        I::IfLt(target) => encode_jump(out, 0x9b, displacement_16(*target, labels)?),
        I::IfGe(target) => encode_jump(out, 0x9c, displacement_16(*target, labels)?),
        I::IfGt(target) => encode_jump(out, 0x9d, displacement_16(*target, labels)?),
        I::IfLe(target) => encode_jump(out, 0x9e, displacement_16(*target, labels)?),
        I::IfICmpEq(target) => encode_jump(out, 0x9f, displacement_16(*target, labels)?),
        I::IfICmpNe(target) => encode_jump(out, 0xa0, displacement_16(*target, labels)?),
        I::IfICmpLt(target) => encode_jump(out, 0xa1, displacement_16(*target, labels)?),
        I::IfICmpGe(target) => encode_jump(out, 0xa2, displacement_16(*target, labels)?),
        I::IfICmpGt(target) => encode_jump(out, 0xa3, displacement_16(*target, labels)?),
        I::IfICmpLe(target) => encode_jump(out, 0xa4, displacement_16(*target, labels)?),
        I::IfACmpEq(target) => encode_jump(out, 0xa5, displacement_16(*target, labels)?),
        I::IfACmpNe(target) => encode_jump(out, 0xa6, displacement_16(*target, labels)?),
        I::Goto(target) => {
            if wide_goto {
                out.push(0xc8);
                out.extend_from_slice(&displacement_32(*target, labels)?.to_be_bytes());
            } else {
                encode_jump(out, 0xa7, displacement_16(*target, labels)?);
            }
        }
        I::TableSwitch {
            default,
            low,
            targets,
        } => {
            out.push(0xaa);
            for _ in 0..switch_padding(offset) {
                out.push(0);
            }
            out.extend_from_slice(&displacement_32(*default, labels)?.to_be_bytes());
            let high = low
                .checked_add(i32::try_from(targets.len())?.checked_sub(1).ok_or_else(|| {
                    GenerationError::Unencodable("tableswitch without targets".into())
                })?)
                .ok_or_else(|| GenerationError::Unencodable("tableswitch range overflow".into()))?;
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            for target in targets {
                out.extend_from_slice(&displacement_32(*target, labels)?.to_be_bytes());
            }
        }
        I::LookupSwitch { default, pairs } => {
            out.push(0xab);
            for _ in 0..switch_padding(offset) {
                out.push(0);
            }
            out.extend_from_slice(&displacement_32(*default, labels)?.to_be_bytes());
            out.extend_from_slice(&i32::try_from(pairs.len())?.to_be_bytes());
            for (key, target) in pairs {
                out.extend_from_slice(&key.to_be_bytes());
                out.extend_from_slice(&displacement_32(*target, labels)?.to_be_bytes());
            }
        }
        I::IfNull(target) => encode_jump(out, 0xc6, displacement_16(*target, labels)?),
        I::IfNonNull(target) => encode_jump(out, 0xc7, displacement_16(*target, labels)?),
        I::IReturn => out.push(0xac),
        I::LReturn => out.push(0xad),
        I::FReturn => out.push(0xae),
        I::DReturn => out.push(0xaf),
        I::AReturn => out.push(0xb0),
        I::Return => out.push(0xb1),
        I::GetStatic(field) => encode_member(out, 0xb2, pool.put_field_ref(field)?),
        I::PutStatic(field) => encode_member(out, 0xb3, pool.put_field_ref(field)?),
        I::GetField(field) => encode_member(out, 0xb4, pool.put_field_ref(field)?),
        I::PutField(field) => encode_member(out, 0xb5, pool.put_field_ref(field)?),
        I::InvokeVirtual(method) => {
            encode_member(out, 0xb6, pool.put_method_ref(method, false)?);
        }
        I::InvokeSpecial { method, interface } => {
            encode_member(out, 0xb7, pool.put_method_ref(method, *interface)?);
        }
        I::InvokeStatic { method, interface } => {
            encode_member(out, 0xb8, pool.put_method_ref(method, *interface)?);
        }
        I::InvokeInterface(method) => {
            let descriptor: MethodDescriptor = method.descriptor.parse().map_err(|_| {
                GenerationError::Unencodable(format!(
                    "invalid descriptor `{}` on invokeinterface",
                    method.descriptor
                ))
            })?;
            let count = 1 + descriptor.parameter_slots();
            let count = u8::try_from(count)
                .map_err(|_| GenerationError::Unencodable("invokeinterface arity".into()))?;
            encode_member(out, 0xb9, pool.put_method_ref(method, true)?);
            out.push(count);
            out.push(0);
        }
        I::InvokeDynamic {
            bootstrap_index,
            name,
            descriptor,
        } => {
            let index = pool.put_invoke_dynamic(*bootstrap_index, name, descriptor)?;
            encode_member(out, 0xba, index);
            out.push(0);
            out.push(0);
        }
        I::New(class) => encode_member(out, 0xbb, pool.put_class(class)?),
        I::NewArray(sort) => {
            out.push(0xbc);
            out.push(match sort {
                PrimitiveType::Boolean => 4,
                PrimitiveType::Char => 5,
                PrimitiveType::Float => 6,
                PrimitiveType::Double => 7,
                PrimitiveType::Byte => 8,
                PrimitiveType::Short => 9,
                PrimitiveType::Int => 10,
                PrimitiveType::Long => 11,
            });
        }
        I::ANewArray(class) => encode_member(out, 0xbd, pool.put_class(class)?),
        I::ArrayLength => out.push(0xbe),
        I::AThrow => out.push(0xbf),
        I::CheckCast(class) => encode_member(out, 0xc0, pool.put_class(class)?),
        I::InstanceOf(class) => encode_member(out, 0xc1, pool.put_class(class)?),
        I::MonitorEnter => out.push(0xc2),
        I::MonitorExit => out.push(0xc3),
        I::MultiANewArray {
            descriptor,
            dimensions,
        } => {
            encode_member(out, 0xc5, pool.put_class(descriptor)?);
            out.push(*dimensions);
        }
    }
    Ok(())
}

fn encode_var(out: &mut Vec<u8>, opcode: u8, short_opcode: u8, index: u16) {
    if index <= 3 {
        #[allow(clippy::cast_possible_truncation)]
        out.push(short_opcode + index as u8);
    } else if index <= 255 {
        out.push(opcode);
        #[allow(clippy::cast_possible_truncation)]
        out.push(index as u8);
    } else {
        out.push(0xc4);
        out.push(opcode);
        out.extend_from_slice(&index.to_be_bytes());
    }
}

fn encode_jump(out: &mut Vec<u8>, opcode: u8, displacement: i16) {
    out.push(opcode);
    out.extend_from_slice(&displacement.to_be_bytes());
}

fn encode_member(out: &mut Vec<u8>, opcode: u8, index: u16) {
    out.push(opcode);
    out.extend_from_slice(&index.to_be_bytes());
}

fn write_frames(
    frames: &[(u32, FrameDirective)],
    labels: &HashMap<Label, u32>,
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, GenerationError> {
    let mut out = Vec::new();
    write_length::<u16>(&mut out, frames.len())?;
    let mut previous: Option<u32> = None;
    for (offset, frame) in frames {
        let delta = match previous {
            None => *offset,
            Some(previous) if *offset > previous => *offset - previous - 1,
            Some(previous) => {
                return Err(GenerationError::Unencodable(format!(
                    "stack map frames at offsets {previous} and {offset} are not increasing"
                )));
            }
        };
        previous = Some(*offset);
        let delta = narrow(delta)?;
        match frame {
            FrameDirective::Same => {
                if delta <= 63 {
                    #[allow(clippy::cast_possible_truncation)]
                    out.push(delta as u8);
                } else {
                    out.push(251);
                    out.extend_from_slice(&delta.to_be_bytes());
                }
            }
            FrameDirective::SameLocals1(ty) => {
                if delta <= 63 {
                    #[allow(clippy::cast_possible_truncation)]
                    out.push(64 + delta as u8);
                } else {
                    out.push(247);
                    out.extend_from_slice(&delta.to_be_bytes());
                }
                write_verification_type(ty, labels, pool, &mut out)?;
            }
            FrameDirective::Chop(count) => {
                if !(1..=3).contains(count) {
                    return Err(GenerationError::Unencodable(format!(
                        "chop frame removing {count} locals"
                    )));
                }
                out.push(251 - count);
                out.extend_from_slice(&delta.to_be_bytes());
            }
            FrameDirective::Append(locals) => {
                let count = u8::try_from(locals.len())?;
                if !(1..=3).contains(&count) {
                    return Err(GenerationError::Unencodable(format!(
                        "append frame adding {count} locals"
                    )));
                }
                out.push(251 + count);
                out.extend_from_slice(&delta.to_be_bytes());
                for ty in locals {
                    write_verification_type(ty, labels, pool, &mut out)?;
                }
            }
            FrameDirective::Full { locals, stack } => {
                out.push(255);
                out.extend_from_slice(&delta.to_be_bytes());
                write_length::<u16>(&mut out, locals.len())?;
                for ty in locals {
                    write_verification_type(ty, labels, pool, &mut out)?;
                }
                write_length::<u16>(&mut out, stack.len())?;
                for ty in stack {
                    write_verification_type(ty, labels, pool, &mut out)?;
                }
            }
        }
    }
    Ok(out)
}

fn write_verification_type(
    ty: &VerificationType,
    labels: &HashMap<Label, u32>,
    pool: &mut ConstantPool,
    out: &mut Vec<u8>,
) -> Result<(), GenerationError> {
    match ty {
        VerificationType::Top => out.push(0),
        VerificationType::Integer => out.push(1),
        VerificationType::Float => out.push(2),
        VerificationType::Double => out.push(3),
        VerificationType::Long => out.push(4),
        VerificationType::Null => out.push(5),
        VerificationType::UninitializedThis => out.push(6),
        VerificationType::Object(name) => {
            out.push(7);
            let index = pool.put_class(name)?;
            out.extend_from_slice(&index.to_be_bytes());
        }
        VerificationType::Uninitialized(label) => {
            out.push(8);
            let offset = narrow(resolve(labels, *label)?)?;
            out.extend_from_slice(&offset.to_be_bytes());
        }
    }
    Ok(())
}
