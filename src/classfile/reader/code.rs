//! Parsing the `Code` attribute: instruction decoding, offset-to-label
//! lifting, and reattachment of frames, line numbers, and variable scopes.

use std::{
    collections::{BTreeMap, HashMap},
    io::{Cursor, Read},
};

use crate::{
    classfile::{
        code::{
            CodeBody, CodeElement, ExceptionHandler, FrameDirective, Instruction, Label,
            LocalVariableEntry, VerificationType,
        },
        constant_pool::ConstantPool,
    },
    types::PrimitiveType,
};

use super::{BytecodeReader, ParseError, read_attribute};

/// Lazily assigns one [`Label`] per referenced bytecode offset.
#[derive(Debug, Default)]
struct LabelLifter {
    by_offset: HashMap<u32, Label>,
    next: u32,
}

impl LabelLifter {
    fn label_at(&mut self, offset: u32) -> Label {
        *self.by_offset.entry(offset).or_insert_with(|| {
            let label = Label(self.next);
            self.next += 1;
            label
        })
    }
}

pub(super) fn parse_code<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
) -> Result<CodeBody, ParseError> {
    let max_stack: u16 = reader.parse()?;
    let max_locals: u16 = reader.parse()?;
    let code_length: u32 = reader.parse()?;
    let mut code = vec![0u8; code_length as usize];
    reader.read_exact(&mut code)?;

    let mut lifter = LabelLifter::default();
    let instructions = decode_instructions(&code, pool, &mut lifter)?;

    let handler_count: u16 = reader.parse()?;
    let mut handlers = Vec::with_capacity(usize::from(handler_count));
    for _ in 0..handler_count {
        let start_pc: u16 = reader.parse()?;
        let end_pc: u16 = reader.parse()?;
        let handler_pc: u16 = reader.parse()?;
        let catch_index: u16 = reader.parse()?;
        handlers.push(ExceptionHandler {
            start: lifter.label_at(u32::from(start_pc)),
            end: lifter.label_at(u32::from(end_pc)),
            handler: lifter.label_at(u32::from(handler_pc)),
            catch_type: if catch_index == 0 {
                None
            } else {
                Some(pool.get_class_name(catch_index)?)
            },
        });
    }

    let mut frames: BTreeMap<u32, FrameDirective> = BTreeMap::new();
    let mut lines: BTreeMap<u32, Vec<u16>> = BTreeMap::new();
    let mut local_variables = Vec::new();
    let attribute_count: u16 = reader.parse()?;
    for _ in 0..attribute_count {
        let (name, contents) = read_attribute(reader, pool)?;
        let mut contents = contents.as_slice();
        let reader = &mut contents;
        match name.as_str() {
            "StackMapTable" => {
                parse_stack_map_table(reader, pool, &mut lifter, &mut frames)?;
            }
            "LineNumberTable" => {
                let count: u16 = reader.parse()?;
                for _ in 0..count {
                    let start_pc: u16 = reader.parse()?;
                    let line: u16 = reader.parse()?;
                    lines.entry(u32::from(start_pc)).or_default().push(line);
                }
            }
            "LocalVariableTable" => {
                let count: u16 = reader.parse()?;
                for _ in 0..count {
                    let start_pc: u16 = reader.parse()?;
                    let length: u16 = reader.parse()?;
                    let name_index: u16 = reader.parse()?;
                    let descriptor_index: u16 = reader.parse()?;
                    let index: u16 = reader.parse()?;
                    local_variables.push(LocalVariableEntry {
                        start: lifter.label_at(u32::from(start_pc)),
                        end: lifter.label_at(u32::from(start_pc) + u32::from(length)),
                        index,
                        name: pool.get_str(name_index)?.to_owned(),
                        descriptor: pool.get_str(descriptor_index)?.to_owned(),
                    });
                }
            }
            _ => {}
        }
    }

    assemble(
        max_stack,
        max_locals,
        code_length,
        instructions,
        handlers,
        local_variables,
        &lifter,
        frames,
        lines,
    )
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    max_stack: u16,
    max_locals: u16,
    code_length: u32,
    instructions: Vec<(u32, Instruction)>,
    handlers: Vec<ExceptionHandler>,
    local_variables: Vec<LocalVariableEntry>,
    lifter: &LabelLifter,
    mut frames: BTreeMap<u32, FrameDirective>,
    mut lines: BTreeMap<u32, Vec<u16>>,
) -> Result<CodeBody, ParseError> {
    let starts: std::collections::HashSet<u32> =
        instructions.iter().map(|(pc, _)| *pc).collect();
    for &offset in lifter.by_offset.keys() {
        if !starts.contains(&offset) && offset != code_length {
            return Err(ParseError::Malformed(format!(
                "offset {offset} is not an instruction boundary"
            )));
        }
    }

    let mut elements = Vec::new();
    for (pc, instruction) in instructions {
        if let Some(label) = lifter.by_offset.get(&pc) {
            elements.push(CodeElement::Label(*label));
        }
        if let Some(frame) = frames.remove(&pc) {
            elements.push(CodeElement::Frame(frame));
        }
        if let Some(entries) = lines.remove(&pc) {
            elements.extend(entries.into_iter().map(CodeElement::LineNumber));
        }
        elements.push(CodeElement::Instruction(instruction));
    }
    if let Some(label) = lifter.by_offset.get(&code_length) {
        elements.push(CodeElement::Label(*label));
    }
    if let Some((&offset, _)) = frames.iter().next() {
        return Err(ParseError::Malformed(format!(
            "stack map frame at offset {offset} beyond code"
        )));
    }

    Ok(CodeBody {
        max_stack,
        max_locals,
        elements,
        handlers,
        local_variables,
        label_count: lifter.next,
    })
}

fn branch_target(pc: u32, offset: i32) -> Result<u32, ParseError> {
    u32::try_from(i64::from(pc) + i64::from(offset))
        .map_err(|_| ParseError::Malformed(format!("branch from {pc} to a negative offset")))
}

/// Reads a 16-bit branch displacement relative to `pc` and lifts the target.
fn read_jump<R: Read + ?Sized>(
    pc: u32,
    reader: &mut R,
    lifter: &mut LabelLifter,
) -> Result<Label, ParseError> {
    let offset: i16 = reader.parse()?;
    Ok(lifter.label_at(branch_target(pc, i32::from(offset))?))
}

#[allow(clippy::too_many_lines)]
fn decode_instructions(
    code: &[u8],
    pool: &ConstantPool,
    lifter: &mut LabelLifter,
) -> Result<Vec<(u32, Instruction)>, ParseError> {
    use Instruction as I;

    let mut cursor = Cursor::new(code);
    let mut decoded = Vec::new();
    while (cursor.position() as usize) < code.len() {
        #[allow(clippy::cast_possible_truncation)]
        let pc = cursor.position() as u32;
        let reader = &mut cursor;
        let opcode: u8 = reader.parse()?;
        let instruction = match opcode {
            0x00 => I::Nop,
            0x01 => I::AConstNull,
            0x02..=0x08 => I::IConst(i32::from(opcode) - 0x03),
            0x09 | 0x0a => I::LConst(i64::from(opcode - 0x09)),
            0x0b..=0x0d => I::FConst(opcode - 0x0b),
            0x0e | 0x0f => I::DConst(opcode - 0x0e),
            0x10 => I::BiPush(reader.parse()?),
            0x11 => I::SiPush(reader.parse()?),
            0x12 => {
                let index: u8 = reader.parse()?;
                I::Ldc(pool.get_constant_value(u16::from(index))?)
            }
            0x13 | 0x14 => {
                let index: u16 = reader.parse()?;
                I::Ldc(pool.get_constant_value(index)?)
            }
            0x15 => I::ILoad(u16::from(reader.parse::<u8>()?)),
            0x16 => I::LLoad(u16::from(reader.parse::<u8>()?)),
            0x17 => I::FLoad(u16::from(reader.parse::<u8>()?)),
            0x18 => I::DLoad(u16::from(reader.parse::<u8>()?)),
            0x19 => I::ALoad(u16::from(reader.parse::<u8>()?)),
            0x1a..=0x1d => I::ILoad(u16::from(opcode - 0x1a)),
            0x1e..=0x21 => I::LLoad(u16::from(opcode - 0x1e)),
            0x22..=0x25 => I::FLoad(u16::from(opcode - 0x22)),
            0x26..=0x29 => I::DLoad(u16::from(opcode - 0x26)),
            0x2a..=0x2d => I::ALoad(u16::from(opcode - 0x2a)),
            0x2e => I::IALoad,
            0x2f => I::LALoad,
            0x30 => I::FALoad,
            0x31 => I::DALoad,
            0x32 => I::AALoad,
            0x33 => I::BALoad,
            0x34 => I::CALoad,
            0x35 => I::SALoad,
            0x36 => I::IStore(u16::from(reader.parse::<u8>()?)),
            0x37 => I::LStore(u16::from(reader.parse::<u8>()?)),
            0x38 => I::FStore(u16::from(reader.parse::<u8>()?)),
            0x39 => I::DStore(u16::from(reader.parse::<u8>()?)),
            0x3a => I::AStore(u16::from(reader.parse::<u8>()?)),
            0x3b..=0x3e => I::IStore(u16::from(opcode - 0x3b)),
            0x3f..=0x42 => I::LStore(u16::from(opcode - 0x3f)),
            0x43..=0x46 => I::FStore(u16::from(opcode - 0x43)),
            0x47..=0x4a => I::DStore(u16::from(opcode - 0x47)),
            0x4b..=0x4e => I::AStore(u16::from(opcode - 0x4b)),
            0x4f => I::IAStore,
            0x50 => I::LAStore,
            0x51 => I::FAStore,
            0x52 => I::DAStore,
            0x53 => I::AAStore,
            0x54 => I::BAStore,
            0x55 => I::CAStore,
            0x56 => I::SAStore,
            0x57 => I::Pop,
            0x58 => I::Pop2,
            0x59 => I::Dup,
            0x5a => I::DupX1,
            0x5b => I::DupX2,
            0x5c => I::Dup2,
            0x5d => I::Dup2X1,
            0x5e => I::Dup2X2,
            0x5f => I::Swap,
            0x60 => I::IAdd,
            0x61 => I::LAdd,
            0x62 => I::FAdd,
            0x63 => I::DAdd,
            0x64 => I::ISub,
            0x65 => I::LSub,
            0x66 => I::FSub,
            0x67 => I::DSub,
            0x68 => I::IMul,
            0x69 => I::LMul,
            0x6a => I::FMul,
            0x6b => I::DMul,
            0x6c => I::IDiv,
            0x6d => I::LDiv,
            0x6e => I::FDiv,
            0x6f => I::DDiv,
            0x70 => I::IRem,
            0x71 => I::LRem,
            0x72 => I::FRem,
            0x73 => I::DRem,
            0x74 => I::INeg,
            0x75 => I::LNeg,
            0x76 => I::FNeg,
            0x77 => I::DNeg,
            0x78 => I::IShl,
            0x79 => I::LShl,
            0x7a => I::IShr,
            0x7b => I::LShr,
            0x7c => I::IUShr,
            0x7d => I::LUShr,
            0x7e => I::IAnd,
            0x7f => I::LAnd,
            0x80 => I::IOr,
            0x81 => I::LOr,
            0x82 => I::IXor,
            0x83 => I::LXor,
            0x84 => {
                let index: u8 = reader.parse()?;
                let delta: i8 = reader.parse()?;
                I::IInc {
                    index: u16::from(index),
                    delta: i16::from(delta),
                }
            }
            0x85 => I::I2L,
            0x86 => I::I2F,
            0x87 => I::I2D,
            0x88 => I::L2I,
            0x89 => I::L2F,
            0x8a => I::L2D,
            0x8b => I::F2I,
            0x8c => I::F2L,
            0x8d => I::F2D,
            0x8e => I::D2I,
            0x8f => I::D2L,
            0x90 => I::D2F,
            0x91 => I::I2B,
            0x92 => I::I2C,
            0x93 => I::I2S,
            0x94 => I::LCmp,
            0x95 => I::FCmpL,
            0x96 => I::FCmpG,
            0x97 => I::DCmpL,
            0x98 => I::DCmpG,
            0x99 => I::IfEq(read_jump(pc, reader, lifter)?),
            0x9a => I::IfNe(read_jump(pc, reader, lifter)?),
            0x9b => I::IfLt(read_jump(pc, reader, lifter)?),
            0x9c => I::IfGe(read_jump(pc, reader, lifter)?),
            0x9d => I::IfGt(read_jump(pc, reader, lifter)?),
            0x9e => I::IfLe(read_jump(pc, reader, lifter)?),
            0x9f => I::IfICmpEq(read_jump(pc, reader, lifter)?),
            0xa0 => I::IfICmpNe(read_jump(pc, reader, lifter)?),
            0xa1 => I::IfICmpLt(read_jump(pc, reader, lifter)?),
            0xa2 => I::IfICmpGe(read_jump(pc, reader, lifter)?),
            0xa3 => I::IfICmpGt(read_jump(pc, reader, lifter)?),
            0xa4 => I::IfICmpLe(read_jump(pc, reader, lifter)?),
            0xa5 => I::IfACmpEq(read_jump(pc, reader, lifter)?),
            0xa6 => I::IfACmpNe(read_jump(pc, reader, lifter)?),
            0xa7 => I::Goto(read_jump(pc, reader, lifter)?),
            0xaa => {
                while cursor.position() % 4 != 0 {
                    let _padding: u8 = (&mut cursor).parse()?;
                }
                let reader = &mut cursor;
                let default_offset: i32 = reader.parse()?;
                let low: i32 = reader.parse()?;
                let high: i32 = reader.parse()?;
                if high < low {
                    return Err(ParseError::Malformed(format!(
                        "tableswitch with high {high} < low {low}"
                    )));
                }
                let count = (i64::from(high) - i64::from(low) + 1) as usize;
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    let offset: i32 = reader.parse()?;
                    targets.push(lifter.label_at(branch_target(pc, offset)?));
                }
                I::TableSwitch {
                    default: lifter.label_at(branch_target(pc, default_offset)?),
                    low,
                    targets,
                }
            }
            0xab => {
                while cursor.position() % 4 != 0 {
                    let _padding: u8 = (&mut cursor).parse()?;
                }
                let reader = &mut cursor;
                let default_offset: i32 = reader.parse()?;
                let pair_count: i32 = reader.parse()?;
                let mut pairs = Vec::with_capacity(pair_count.max(0) as usize);
                for _ in 0..pair_count {
                    let key: i32 = reader.parse()?;
                    let offset: i32 = reader.parse()?;
                    pairs.push((key, lifter.label_at(branch_target(pc, offset)?)));
                }
                I::LookupSwitch {
                    default: lifter.label_at(branch_target(pc, default_offset)?),
                    pairs,
                }
            }
            0xac => I::IReturn,
            0xad => I::LReturn,
            0xae => I::FReturn,
            0xaf => I::DReturn,
            0xb0 => I::AReturn,
            0xb1 => I::Return,
            0xb2 => {
                let index: u16 = reader.parse()?;
                I::GetStatic(pool.get_field_ref(index)?)
            }
            0xb3 => {
                let index: u16 = reader.parse()?;
                I::PutStatic(pool.get_field_ref(index)?)
            }
            0xb4 => {
                let index: u16 = reader.parse()?;
                I::GetField(pool.get_field_ref(index)?)
            }
            0xb5 => {
                let index: u16 = reader.parse()?;
                I::PutField(pool.get_field_ref(index)?)
            }
            0xb6 => {
                let index: u16 = reader.parse()?;
                I::InvokeVirtual(pool.get_method_ref(index)?.0)
            }
            0xb7 => {
                let index: u16 = reader.parse()?;
                let (method, interface) = pool.get_method_ref(index)?;
                I::InvokeSpecial { method, interface }
            }
            0xb8 => {
                let index: u16 = reader.parse()?;
                let (method, interface) = pool.get_method_ref(index)?;
                I::InvokeStatic { method, interface }
            }
            0xb9 => {
                let index: u16 = reader.parse()?;
                let _count: u8 = reader.parse()?;
                let _zero: u8 = reader.parse()?;
                I::InvokeInterface(pool.get_method_ref(index)?.0)
            }
            0xba => {
                let index: u16 = reader.parse()?;
                let _zero: u16 = reader.parse()?;
                let (bootstrap_index, name, descriptor) = pool.get_invoke_dynamic(index)?;
                I::InvokeDynamic {
                    bootstrap_index,
                    name,
                    descriptor,
                }
            }
            0xbb => {
                let index: u16 = reader.parse()?;
                I::New(pool.get_class_name(index)?)
            }
            0xbc => {
                let atype: u8 = reader.parse()?;
                let sort = match atype {
                    4 => PrimitiveType::Boolean,
                    5 => PrimitiveType::Char,
                    6 => PrimitiveType::Float,
                    7 => PrimitiveType::Double,
                    8 => PrimitiveType::Byte,
                    9 => PrimitiveType::Short,
                    10 => PrimitiveType::Int,
                    11 => PrimitiveType::Long,
                    other => {
                        return Err(ParseError::Malformed(format!(
                            "invalid newarray type {other}"
                        )));
                    }
                };
                I::NewArray(sort)
            }
            0xbd => {
                let index: u16 = reader.parse()?;
                I::ANewArray(pool.get_class_name(index)?)
            }
            0xbe => I::ArrayLength,
            0xbf => I::AThrow,
            0xc0 => {
                let index: u16 = reader.parse()?;
                I::CheckCast(pool.get_class_name(index)?)
            }
            0xc1 => {
                let index: u16 = reader.parse()?;
                I::InstanceOf(pool.get_class_name(index)?)
            }
            0xc2 => I::MonitorEnter,
            0xc3 => I::MonitorExit,
            0xc4 => {
                let wide_opcode: u8 = reader.parse()?;
                match wide_opcode {
                    0x15 => I::ILoad(reader.parse()?),
                    0x16 => I::LLoad(reader.parse()?),
                    0x17 => I::FLoad(reader.parse()?),
                    0x18 => I::DLoad(reader.parse()?),
                    0x19 => I::ALoad(reader.parse()?),
                    0x36 => I::IStore(reader.parse()?),
                    0x37 => I::LStore(reader.parse()?),
                    0x38 => I::FStore(reader.parse()?),
                    0x39 => I::DStore(reader.parse()?),
                    0x3a => I::AStore(reader.parse()?),
                    0x84 => I::IInc {
                        index: reader.parse()?,
                        delta: reader.parse()?,
                    },
                    other => return Err(ParseError::UnsupportedOpcode(other, pc)),
                }
            }
            0xc5 => {
                let index: u16 = reader.parse()?;
                let dimensions: u8 = reader.parse()?;
                I::MultiANewArray {
                    descriptor: pool.get_class_name(index)?,
                    dimensions,
                }
            }
            0xc6 => I::IfNull(read_jump(pc, reader, lifter)?),
            0xc7 => I::IfNonNull(read_jump(pc, reader, lifter)?),
            0xc8 => {
                let offset: i32 = reader.parse()?;
                I::Goto(lifter.label_at(branch_target(pc, offset)?))
            }
            other => return Err(ParseError::UnsupportedOpcode(other, pc)),
        };
        decoded.push((pc, instruction));
    }
    Ok(decoded)
}

fn parse_stack_map_table<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
    lifter: &mut LabelLifter,
    frames: &mut BTreeMap<u32, FrameDirective>,
) -> Result<(), ParseError> {
    let count: u16 = reader.parse()?;
    let mut offset: Option<u32> = None;
    for _ in 0..count {
        let frame_type: u8 = reader.parse()?;
        let (delta, directive) = match frame_type {
            0..=63 => (u16::from(frame_type), FrameDirective::Same),
            64..=127 => {
                let ty = parse_verification_type(reader, pool, lifter)?;
                (u16::from(frame_type - 64), FrameDirective::SameLocals1(ty))
            }
            247 => {
                let delta: u16 = reader.parse()?;
                let ty = parse_verification_type(reader, pool, lifter)?;
                (delta, FrameDirective::SameLocals1(ty))
            }
            248..=250 => {
                let delta: u16 = reader.parse()?;
                (delta, FrameDirective::Chop(251 - frame_type))
            }
            251 => {
                let delta: u16 = reader.parse()?;
                (delta, FrameDirective::Same)
            }
            252..=254 => {
                let delta: u16 = reader.parse()?;
                let locals = (0..frame_type - 251)
                    .map(|_| parse_verification_type(reader, pool, lifter))
                    .collect::<Result<_, _>>()?;
                (delta, FrameDirective::Append(locals))
            }
            255 => {
                let delta: u16 = reader.parse()?;
                let local_count: u16 = reader.parse()?;
                let locals = (0..local_count)
                    .map(|_| parse_verification_type(reader, pool, lifter))
                    .collect::<Result<_, _>>()?;
                let stack_count: u16 = reader.parse()?;
                let stack = (0..stack_count)
                    .map(|_| parse_verification_type(reader, pool, lifter))
                    .collect::<Result<_, _>>()?;
                (delta, FrameDirective::Full { locals, stack })
            }
            other => {
                return Err(ParseError::Malformed(format!(
                    "reserved stack map frame type {other}"
                )));
            }
        };
        let at = match offset {
            None => u32::from(delta),
            Some(previous) => previous + u32::from(delta) + 1,
        };
        offset = Some(at);
        lifter.label_at(at);
        frames.insert(at, directive);
    }
    Ok(())
}

fn parse_verification_type<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
    lifter: &mut LabelLifter,
) -> Result<VerificationType, ParseError> {
    let tag: u8 = reader.parse()?;
    let ty = match tag {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => {
            let index: u16 = reader.parse()?;
            VerificationType::Object(pool.get_class_name(index)?)
        }
        8 => {
            let offset: u16 = reader.parse()?;
            VerificationType::Uninitialized(lifter.label_at(u32::from(offset)))
        }
        other => {
            return Err(ParseError::Malformed(format!(
                "invalid verification type tag {other}"
            )));
        }
    };
    Ok(ty)
}
