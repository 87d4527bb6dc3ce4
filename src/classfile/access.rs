//! Access flags of classes, fields, and methods.

use bitflags::bitflags;

bitflags! {
    /// The access flags of a class.
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct ClassAccess: u16 {
        /// Declared `public`.
        const PUBLIC = 0x0001;
        /// Declared `final`.
        const FINAL = 0x0010;
        /// Treat superclass methods specially in `invokespecial`.
        const SUPER = 0x0020;
        /// Is an interface.
        const INTERFACE = 0x0200;
        /// Declared `abstract`.
        const ABSTRACT = 0x0400;
        /// Synthesized by the compiler.
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface.
        const ANNOTATION = 0x2000;
        /// Declared as an enum class.
        const ENUM = 0x4000;
        /// Is a module descriptor.
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// The access flags of a field.
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct FieldAccess: u16 {
        /// Declared `public`.
        const PUBLIC = 0x0001;
        /// Declared `private`.
        const PRIVATE = 0x0002;
        /// Declared `protected`.
        const PROTECTED = 0x0004;
        /// Declared `static`.
        const STATIC = 0x0008;
        /// Declared `final`.
        const FINAL = 0x0010;
        /// Declared `volatile`.
        const VOLATILE = 0x0040;
        /// Declared `transient`.
        const TRANSIENT = 0x0080;
        /// Synthesized by the compiler.
        const SYNTHETIC = 0x1000;
        /// An element of an enum class.
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// The access flags of a method.
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct MethodAccess: u16 {
        /// Declared `public`.
        const PUBLIC = 0x0001;
        /// Declared `private`.
        const PRIVATE = 0x0002;
        /// Declared `protected`.
        const PROTECTED = 0x0004;
        /// Declared `static`.
        const STATIC = 0x0008;
        /// Declared `final`.
        const FINAL = 0x0010;
        /// Declared `synchronized`.
        const SYNCHRONIZED = 0x0020;
        /// A bridge method generated by the compiler.
        const BRIDGE = 0x0040;
        /// Declared with variable arity.
        const VARARGS = 0x0080;
        /// Declared `native`.
        const NATIVE = 0x0100;
        /// Declared `abstract`.
        const ABSTRACT = 0x0400;
        /// Declared `strictfp`.
        const STRICT = 0x0800;
        /// Synthesized by the compiler.
        const SYNTHETIC = 0x1000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_survive_raw_round_trip() {
        let access = ClassAccess::PUBLIC | ClassAccess::SUPER | ClassAccess::ENUM;
        assert_eq!(ClassAccess::from_bits(access.bits()), Some(access));

        let access = MethodAccess::PUBLIC | MethodAccess::STATIC | MethodAccess::VARARGS;
        assert_eq!(MethodAccess::from_bits(access.bits()), Some(access));
    }

    #[test]
    fn unknown_bits_are_rejected() {
        assert_eq!(FieldAccess::from_bits(0x0020), None);
    }
}
