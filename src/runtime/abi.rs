//! Names and descriptors of the support classes the dispatch prologue calls.
//!
//! These are the stable ABI between emitted bytecode and the runtime: the
//! emitter writes them into merged classes, and a JVM-side support library
//! must provide them under exactly these names.

/// A named member of the support ABI.
#[derive(Debug, Clone, Copy)]
pub struct AbiMethod {
    /// The internal name of the owning class.
    pub owner: &'static str,
    /// The method name.
    pub name: &'static str,
    /// The method descriptor.
    pub descriptor: &'static str,
}

/// The registry singleton the prologue queries.
pub const EXECUTION_REGISTRY: &str = "org/classweave/runtime/ExecutionRegistry";
/// The reified method header record.
pub const METHOD_HEADER: &str = "org/classweave/runtime/MethodHeader";
/// The reified class header record.
pub const CLASS_HEADER: &str = "org/classweave/runtime/ClassHeader";
/// The reified field header record.
pub const FIELD_HEADER: &str = "org/classweave/runtime/FieldHeader";
/// The captured call context.
pub const INVOCATION: &str = "org/classweave/runtime/Invocation";
/// The substitution functor interface.
pub const METHOD_SUBSTITUTION: &str = "org/classweave/runtime/MethodSubstitution";
/// The constructor-call description returned by a constructor substitute.
pub const CONSTRUCTOR_INVOCATION: &str = "org/classweave/runtime/ConstructorInvocation";
/// Thrown when a member was declared with a shape the bound reference cannot
/// accept.
pub const INCOMPATIBLE_HEADER_EXCEPTION: &str =
    "org/classweave/runtime/IncompatibleHeaderException";
/// The enum-constant capture sink.
pub const ENUM_CONSTANTS: &str = "org/classweave/runtime/EnumConstants";
/// The field descriptor of the annotation a student attaches to pin a
/// mapping.
pub const FORCE_SIGNATURE_DESCRIPTOR: &str = "Lorg/classweave/runtime/ForceSignature;";

/// `ExecutionRegistry.getInstance()`.
pub const GET_INSTANCE: AbiMethod = AbiMethod {
    owner: EXECUTION_REGISTRY,
    name: "getInstance",
    descriptor: "()Lorg/classweave/runtime/ExecutionRegistry;",
};
/// `ExecutionRegistry#logInvocation(MethodHeader)`.
pub const LOG_INVOCATION: AbiMethod = AbiMethod {
    owner: EXECUTION_REGISTRY,
    name: "logInvocation",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;)Z",
};
/// `ExecutionRegistry#addInvocation(MethodHeader, Invocation)`.
pub const ADD_INVOCATION: AbiMethod = AbiMethod {
    owner: EXECUTION_REGISTRY,
    name: "addInvocation",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;Lorg/classweave/runtime/Invocation;)V",
};
/// `ExecutionRegistry#useSubstitution(MethodHeader)`.
pub const USE_SUBSTITUTION: AbiMethod = AbiMethod {
    owner: EXECUTION_REGISTRY,
    name: "useSubstitution",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;)Z",
};
/// `ExecutionRegistry#getSubstitution(MethodHeader)`.
pub const GET_SUBSTITUTION: AbiMethod = AbiMethod {
    owner: EXECUTION_REGISTRY,
    name: "getSubstitution",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;)Lorg/classweave/runtime/MethodSubstitution;",
};
/// `ExecutionRegistry#useSubmissionImpl(MethodHeader)`.
pub const USE_SUBMISSION_IMPL: AbiMethod = AbiMethod {
    owner: EXECUTION_REGISTRY,
    name: "useSubmissionImpl",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;)Z",
};

/// `MethodHeader(owner, access, name, descriptor, signature, exceptions)`.
pub const METHOD_HEADER_INIT: AbiMethod = AbiMethod {
    owner: METHOD_HEADER,
    name: "<init>",
    descriptor: "(Ljava/lang/String;ILjava/lang/String;Ljava/lang/String;Ljava/lang/String;[Ljava/lang/String;)V",
};
/// `ClassHeader(access, name, signature, superName, interfaces)`.
pub const CLASS_HEADER_INIT: AbiMethod = AbiMethod {
    owner: CLASS_HEADER,
    name: "<init>",
    descriptor: "(ILjava/lang/String;Ljava/lang/String;Ljava/lang/String;[Ljava/lang/String;)V",
};
/// `FieldHeader(owner, access, name, descriptor, signature)`.
pub const FIELD_HEADER_INIT: AbiMethod = AbiMethod {
    owner: FIELD_HEADER,
    name: "<init>",
    descriptor: "(Ljava/lang/String;ILjava/lang/String;Ljava/lang/String;Ljava/lang/String;)V",
};
/// `Invocation(MethodHeader)`; the constructor snapshots the stack trace.
pub const INVOCATION_INIT: AbiMethod = AbiMethod {
    owner: INVOCATION,
    name: "<init>",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;)V",
};
/// `Invocation(MethodHeader, receiver)`.
pub const INVOCATION_INIT_RECEIVER: AbiMethod = AbiMethod {
    owner: INVOCATION,
    name: "<init>",
    descriptor: "(Lorg/classweave/runtime/MethodHeader;Ljava/lang/Object;)V",
};
/// `Invocation#addParameter(Object)`.
pub const ADD_PARAMETER: AbiMethod = AbiMethod {
    owner: INVOCATION,
    name: "addParameter",
    descriptor: "(Ljava/lang/Object;)V",
};

/// `MethodSubstitution#execute(Invocation)`.
pub const SUBSTITUTION_EXECUTE: AbiMethod = AbiMethod {
    owner: METHOD_SUBSTITUTION,
    name: "execute",
    descriptor: "(Lorg/classweave/runtime/Invocation;)Ljava/lang/Object;",
};
/// `MethodSubstitution#getConstructorInvocation(Invocation)`.
pub const SUBSTITUTION_CONSTRUCTOR_INVOCATION: AbiMethod = AbiMethod {
    owner: METHOD_SUBSTITUTION,
    name: "getConstructorInvocation",
    descriptor:
        "(Lorg/classweave/runtime/Invocation;)Lorg/classweave/runtime/ConstructorInvocation;",
};
/// `ConstructorInvocation#getOwner()`.
pub const CONSTRUCTOR_GET_OWNER: AbiMethod = AbiMethod {
    owner: CONSTRUCTOR_INVOCATION,
    name: "getOwner",
    descriptor: "()Ljava/lang/String;",
};
/// `ConstructorInvocation#getDescriptor()`.
pub const CONSTRUCTOR_GET_DESCRIPTOR: AbiMethod = AbiMethod {
    owner: CONSTRUCTOR_INVOCATION,
    name: "getDescriptor",
    descriptor: "()Ljava/lang/String;",
};
/// `ConstructorInvocation#getArgs()`.
pub const CONSTRUCTOR_GET_ARGS: AbiMethod = AbiMethod {
    owner: CONSTRUCTOR_INVOCATION,
    name: "getArgs",
    descriptor: "()[Ljava/lang/Object;",
};

/// `IncompatibleHeaderException(message, expected, actual)`.
pub const INCOMPATIBLE_HEADER_INIT: AbiMethod = AbiMethod {
    owner: INCOMPATIBLE_HEADER_EXCEPTION,
    name: "<init>",
    descriptor: "(Ljava/lang/String;Lorg/classweave/runtime/MethodHeader;Lorg/classweave/runtime/MethodHeader;)V",
};

/// `EnumConstants.record(className, constantName, ordinal, args)`.
pub const ENUM_RECORD: AbiMethod = AbiMethod {
    owner: ENUM_CONSTANTS,
    name: "record",
    descriptor: "(Ljava/lang/String;Ljava/lang/String;I[Ljava/lang/Object;)V",
};
/// `EnumConstants.forClass(className)`.
pub const ENUM_FOR_CLASS: AbiMethod = AbiMethod {
    owner: ENUM_CONSTANTS,
    name: "forClass",
    descriptor: "(Ljava/lang/String;)Ljava/util/List;",
};

/// Name of the injected accessor returning the original class header.
pub const ORIGINAL_CLASS_HEADER: &str = "originalClassHeader";
/// Name of the injected accessor returning the original field headers.
pub const ORIGINAL_FIELD_HEADERS: &str = "originalFieldHeaders";
/// Name of the injected accessor returning the original method headers.
pub const ORIGINAL_METHOD_HEADERS: &str = "originalMethodHeaders";
/// Name of the injected accessor returning captured static field values.
pub const ORIGINAL_STATIC_FIELD_VALUES: &str = "originalStaticFieldValues";
/// Name of the injected accessor returning captured enum constants.
pub const ORIGINAL_ENUM_CONSTANTS: &str = "originalEnumConstants";

/// The suffix under which a mismatching submission member is kept callable.
pub const SUBMISSION_SUFFIX: &str = "$submission";
/// The suffix appended to reference-side lambda helpers to keep them
/// disjoint from student helpers of the same shape.
pub const SOLUTION_SUFFIX: &str = "$solution";
/// The injected static field backing `originalStaticFieldValues`.
pub const STATIC_VALUES_FIELD: &str = "$originalStaticFieldValues";
