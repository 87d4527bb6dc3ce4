//! The label-addressed method body IR.
//!
//! Parsed bodies lift every bytecode offset that anything points at (branch
//! targets, exception ranges, stack map frames, line numbers, local variable
//! scopes, `uninitialized` verification types) into a [`Label`] pinned into a
//! linear element stream. Positions, not offsets, are the source of truth:
//! the writer re-derives offsets, branch displacements, and stack-map deltas
//! from element order, which is what lets the transformer splice prologues
//! and whole method bodies without invalidating anything.

mod instruction;

pub use instruction::Instruction;

/// A position marker inside one [`CodeBody`].
///
/// Labels are meaningful only within the body (or assembler) that allocated
/// them; splicing code between bodies requires remapping via
/// [`CodeBody::shift_labels`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, derive_more::Display)]
#[display("L{_0}")]
pub struct Label(pub u32);

/// One element of the linear code stream.
#[derive(Debug, PartialEq, Clone)]
pub enum CodeElement {
    /// A position marker.
    Label(Label),
    /// An executable instruction.
    Instruction(Instruction),
    /// A stack map frame describing the state at this position. Applies to
    /// the offset of the next instruction.
    Frame(FrameDirective),
    /// A line number entry for the next instruction.
    LineNumber(u16),
}

/// A method body.
#[derive(Debug, Clone, Default)]
pub struct CodeBody {
    /// The maximum operand stack depth.
    pub max_stack: u16,
    /// The number of local variable slots.
    pub max_locals: u16,
    /// The code stream.
    pub elements: Vec<CodeElement>,
    /// The exception handler table, in order.
    pub handlers: Vec<ExceptionHandler>,
    /// The local variable debug table.
    pub local_variables: Vec<LocalVariableEntry>,
    /// Number of labels allocated for this body; label ids are `0..label_count`.
    pub label_count: u32,
}

impl CodeBody {
    /// Allocates a fresh label for this body.
    pub fn fresh_label(&mut self) -> Label {
        let label = Label(self.label_count);
        self.label_count += 1;
        label
    }

    /// Renumbers every label in the body by adding `offset`, so the body can
    /// be spliced into an assembler whose labels `0..offset` are taken.
    pub fn shift_labels(&mut self, offset: u32) {
        let shift = |label: &mut Label| label.0 += offset;
        for element in &mut self.elements {
            match element {
                CodeElement::Label(label) => shift(label),
                CodeElement::Instruction(instruction) => {
                    instruction.for_each_label(shift);
                }
                CodeElement::Frame(frame) => frame.for_each_label(shift),
                CodeElement::LineNumber(_) => {}
            }
        }
        for handler in &mut self.handlers {
            shift(&mut handler.start);
            shift(&mut handler.end);
            shift(&mut handler.handler);
        }
        for variable in &mut self.local_variables {
            shift(&mut variable.start);
            shift(&mut variable.end);
        }
        self.label_count += offset;
    }

    /// Iterates over the instructions of the body.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.elements.iter().filter_map(|element| match element {
            CodeElement::Instruction(it) => Some(it),
            _ => None,
        })
    }
}

/// An exception handler covering the half-open label range `[start, end)`.
#[derive(Debug, PartialEq, Clone)]
pub struct ExceptionHandler {
    /// First covered position.
    pub start: Label,
    /// First position no longer covered.
    pub end: Label,
    /// The handler entry point.
    pub handler: Label,
    /// The caught exception class; `None` catches everything (`finally`).
    pub catch_type: Option<String>,
}

/// A local variable debug entry scoped to `[start, end)`.
#[derive(Debug, PartialEq, Clone)]
pub struct LocalVariableEntry {
    /// Start of the scope.
    pub start: Label,
    /// End of the scope.
    pub end: Label,
    /// The local slot index.
    pub index: u16,
    /// The variable name.
    pub name: String,
    /// The field descriptor of the variable.
    pub descriptor: String,
}

/// A verification type in a stack map frame.
#[derive(Debug, PartialEq, Clone)]
pub enum VerificationType {
    /// The `top` type (also the second slot of category-2 values).
    Top,
    /// `int` and the smaller integral sorts.
    Integer,
    /// `float`.
    Float,
    /// `long`.
    Long,
    /// `double`.
    Double,
    /// The null type.
    Null,
    /// `this` before the constructor call.
    UninitializedThis,
    /// A reference to the named class (or array descriptor).
    Object(String),
    /// A freshly allocated object whose `new` instruction is at the label.
    Uninitialized(Label),
}

impl VerificationType {
    /// Rewrites the class name mentioned by the type, if any.
    #[must_use]
    pub fn map_class_name<F>(&self, rename: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Object(name) => match rename(name) {
                Some(renamed) => Self::Object(renamed),
                None => Self::Object(name.clone()),
            },
            other => other.clone(),
        }
    }
}

/// A stack map frame directive. Offset deltas are not stored; the writer
/// recomputes them from element positions.
#[derive(Debug, PartialEq, Clone)]
pub enum FrameDirective {
    /// Same locals as the previous frame, empty stack.
    Same,
    /// Same locals as the previous frame, one value on the stack.
    SameLocals1(VerificationType),
    /// The previous frame with the last `n` locals removed, empty stack.
    Chop(u8),
    /// The previous frame with additional locals appended, empty stack.
    Append(Vec<VerificationType>),
    /// A complete frame.
    Full {
        /// The local variable types.
        locals: Vec<VerificationType>,
        /// The operand stack types, bottom first.
        stack: Vec<VerificationType>,
    },
}

impl FrameDirective {
    fn for_each_label<F: FnMut(&mut Label)>(&mut self, mut apply: F) {
        let visit = |types: &mut Vec<VerificationType>, apply: &mut F| {
            for ty in types {
                if let VerificationType::Uninitialized(label) = ty {
                    apply(label);
                }
            }
        };
        match self {
            Self::Same | Self::Chop(_) => {}
            Self::SameLocals1(ty) => {
                if let VerificationType::Uninitialized(label) = ty {
                    apply(label);
                }
            }
            Self::Append(locals) => visit(locals, &mut apply),
            Self::Full { locals, stack } => {
                visit(locals, &mut apply);
                visit(stack, &mut apply);
            }
        }
    }

    /// Rewrites every class name mentioned by the frame through `rename`.
    #[must_use]
    pub fn map_class_names<F>(&self, rename: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let map_all = |types: &[VerificationType]| {
            types.iter().map(|it| it.map_class_name(rename)).collect()
        };
        match self {
            Self::Same => Self::Same,
            Self::SameLocals1(ty) => Self::SameLocals1(ty.map_class_name(rename)),
            Self::Chop(n) => Self::Chop(*n),
            Self::Append(locals) => Self::Append(map_all(locals)),
            Self::Full { locals, stack } => Self::Full {
                locals: map_all(locals),
                stack: map_all(stack),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_labels_renumbers_everything() {
        let mut body = CodeBody::default();
        let start = body.fresh_label();
        let end = body.fresh_label();
        body.elements = vec![
            CodeElement::Label(start),
            CodeElement::Instruction(Instruction::Goto(end)),
            CodeElement::Frame(FrameDirective::SameLocals1(VerificationType::Uninitialized(
                start,
            ))),
            CodeElement::Label(end),
        ];
        body.handlers.push(ExceptionHandler {
            start,
            end,
            handler: end,
            catch_type: None,
        });
        body.shift_labels(10);

        assert_eq!(body.label_count, 12);
        assert_eq!(body.elements[0], CodeElement::Label(Label(10)));
        assert_eq!(
            body.elements[1],
            CodeElement::Instruction(Instruction::Goto(Label(11)))
        );
        assert_eq!(
            body.elements[2],
            CodeElement::Frame(FrameDirective::SameLocals1(VerificationType::Uninitialized(
                Label(10)
            )))
        );
        assert_eq!(body.handlers[0].handler, Label(11));
    }
}
