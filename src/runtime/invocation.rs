//! Captured call contexts.

use crate::headers::MethodHeader;

use super::{
    Value,
    surface::{ExecutionRegistry, MethodKey, SurfaceError},
};

/// One frame of a captured stack trace.
#[derive(Debug, PartialEq, Eq, Clone, derive_more::Display)]
#[display("{class_name}.{method_name}")]
pub struct StackFrame {
    /// The internal name of the frame's class.
    pub class_name: String,
    /// The method name.
    pub method_name: String,
}

/// The captured context of one call into merged code.
///
/// Equality ignores the stack trace: two invocations are the same when the
/// same method was called on the same receiver with the same arguments. The
/// leading self frame of the trace is stripped on construction, so
/// `stack_trace()[0]` is the caller.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The internal name of the class declaring the called method.
    pub declaring_class: String,
    /// The header of the called method.
    pub method: MethodHeader,
    stack_trace: Vec<StackFrame>,
    /// The receiver; absent for static methods and constructors.
    pub receiver: Option<Value>,
    parameters: Vec<Value>,
}

impl Invocation {
    /// Captures a new invocation. `stack_trace` starts at the called method
    /// itself; the leading self frame is stripped.
    #[must_use]
    pub fn new(method: MethodHeader, stack_trace: Vec<StackFrame>) -> Self {
        Self {
            declaring_class: method.owner.clone(),
            method,
            stack_trace: stack_trace.into_iter().skip(1).collect(),
            receiver: None,
            parameters: Vec::new(),
        }
    }

    /// Captures a new invocation with a receiver.
    #[must_use]
    pub fn with_receiver(
        method: MethodHeader,
        receiver: Value,
        stack_trace: Vec<StackFrame>,
    ) -> Self {
        let mut invocation = Self::new(method, stack_trace);
        invocation.receiver = Some(receiver);
        invocation
    }

    /// Appends a parameter, in call order.
    pub fn add_parameter(&mut self, value: Value) {
        self.parameters.push(value);
    }

    /// The captured parameters, in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// The captured stack trace; index 0 is the caller of the method.
    #[must_use]
    pub fn stack_trace(&self) -> &[StackFrame] {
        &self.stack_trace
    }

    /// Invokes the computed method this invocation captured, bypassing its
    /// own substitution to avoid re-entry. `delegate` selects whether the
    /// reference body (`true`) or the student body (`false`) runs; both the
    /// substitution and the delegation state are restored on exit, also on
    /// panic.
    ///
    /// # Errors
    /// [`SurfaceError::MissingInvoker`] when no original-method invoker was
    /// registered for the method.
    pub fn call_original(
        &self,
        registry: &ExecutionRegistry,
        delegate: bool,
        parameters: Vec<Value>,
    ) -> Result<Value, SurfaceError> {
        let key = MethodKey::of(&self.method);
        let invoker = registry
            .original_invoker(&key)
            .ok_or_else(|| SurfaceError::MissingInvoker(key.clone()))?;

        let _restore = registry.suspend_for_call_original(&key, delegate);
        let mut replay = Invocation::new(self.method.clone(), Vec::new());
        replay.receiver = self.receiver.clone();
        replay.parameters = parameters;
        Ok(invoker(&replay))
    }
}

impl PartialEq for Invocation {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_class == other.declaring_class
            && self.method == other.method
            && self.receiver == other.receiver
            && self.parameters == other.parameters
    }
}

#[cfg(test)]
mod tests {
    use crate::classfile::MethodAccess;

    use super::*;

    fn header(name: &str) -> MethodHeader {
        MethodHeader {
            owner: "sub/Widget".into(),
            access: MethodAccess::PUBLIC,
            name: name.to_owned(),
            descriptor: "(I)I".into(),
            signature: None,
            exceptions: Vec::new(),
        }
    }

    fn frame(class_name: &str, method_name: &str) -> StackFrame {
        StackFrame {
            class_name: class_name.to_owned(),
            method_name: method_name.to_owned(),
        }
    }

    #[test]
    fn leading_self_frame_is_stripped() {
        let invocation = Invocation::new(
            header("count"),
            vec![frame("sub/Widget", "count"), frame("test/Caller", "run")],
        );
        assert_eq!(invocation.stack_trace(), &[frame("test/Caller", "run")]);
    }

    #[test]
    fn equality_ignores_stack_trace() {
        let mut a = Invocation::new(header("count"), vec![frame("sub/Widget", "count")]);
        let mut b = Invocation::new(
            header("count"),
            vec![frame("sub/Widget", "count"), frame("other/Class", "x")],
        );
        a.add_parameter(Value::Int(41));
        b.add_parameter(Value::Int(41));
        assert_eq!(a, b);

        b.add_parameter(Value::Int(42));
        assert_ne!(a, b);
    }
}
