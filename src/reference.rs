//! Loading reference ("solution") classes.
//!
//! Reference class files live in a read-only resource tree mirroring the
//! package structure, under the `.bin` extension so no ordinary class loader
//! picks them up. Each class is parsed once and retained whole: method
//! bodies stay replayable, with try/catch regions, frames, line numbers, and
//! local variable scopes intact, because the merger re-emits them verbatim
//! into merged classes.
//!
//! Synthetic `lambda$…` helpers are renamed on load by appending
//! `$solution`, and every call site inside the reference (direct
//! invocations as well as `invokedynamic` bootstrap handles) is rewritten to
//! the suffixed name. Student lambda helpers of the same shape can then
//! coexist with reference helpers in one merged class.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use log::debug;
use walkdir::WalkDir;

use crate::{
    classfile::{
        Class, ConstantValue, Field, Method, MethodRef,
        code::{CodeElement, Instruction},
    },
    errors::{ConfigError, TransformError},
    headers::ClassHeader,
    runtime::abi,
};

/// The resource extension of reference class files.
pub const REFERENCE_EXTENSION: &str = "bin";

/// A parsed reference class, ready for replay into merged classes.
#[derive(Debug, Clone)]
pub struct ReferenceClass {
    class: Class,
    header: ClassHeader,
}

impl ReferenceClass {
    /// Parses reference class bytes and applies the lambda-helper renaming.
    ///
    /// # Errors
    /// Parse errors from the underlying class file.
    pub fn parse(bytes: &[u8]) -> Result<Self, TransformError> {
        let mut class = Class::from_bytes(bytes)?;
        rename_lambda_helpers(&mut class);
        let header = ClassHeader::of(&class);
        Ok(Self { class, header })
    }

    /// The header of the reference class.
    #[must_use]
    pub fn header(&self) -> &ClassHeader {
        &self.header
    }

    /// The internal name of the reference class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// The underlying parsed class.
    #[must_use]
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Gets a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.class.get_field(name)
    }

    /// Gets a declared method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.class.get_method(name, descriptor)
    }

    /// The declared fields.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.class.fields
    }

    /// The declared methods.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.class.methods
    }
}

/// Renames `lambda$…` helpers with the solution suffix and retargets every
/// call site, including dynamic-invocation bootstrap handles.
fn rename_lambda_helpers(class: &mut Class) {
    let renamed: HashSet<String> = class
        .methods
        .iter()
        .filter(|method| method.is_lambda_helper())
        .map(|method| method.name.clone())
        .collect();
    if renamed.is_empty() {
        return;
    }
    debug!(
        "renaming {} lambda helper(s) in reference `{}`",
        renamed.len(),
        class.name
    );

    let owner = class.name.clone();
    let retarget = |method_ref: &mut MethodRef| {
        if method_ref.owner == owner && renamed.contains(&method_ref.name) {
            method_ref.name.push_str(abi::SOLUTION_SUFFIX);
        }
    };

    for method in &mut class.methods {
        if renamed.contains(&method.name) {
            method.name.push_str(abi::SOLUTION_SUFFIX);
        }
        let Some(body) = method.code.as_mut() else {
            continue;
        };
        for element in &mut body.elements {
            let CodeElement::Instruction(instruction) = element else {
                continue;
            };
            match instruction {
                Instruction::InvokeVirtual(m)
                | Instruction::InvokeSpecial { method: m, .. }
                | Instruction::InvokeStatic { method: m, .. }
                | Instruction::InvokeInterface(m) => retarget(m),
                Instruction::Ldc(ConstantValue::Handle(handle)) => {
                    if let Some(m) = handle.method_mut() {
                        retarget(m);
                    }
                }
                _ => {}
            }
        }
    }
    for bootstrap in &mut class.bootstrap_methods {
        if let Some(m) = bootstrap.handle.method_mut() {
            retarget(m);
        }
        for argument in &mut bootstrap.arguments {
            if let ConstantValue::Handle(handle) = argument {
                if let Some(m) = handle.method_mut() {
                    retarget(m);
                }
            }
        }
    }
}

/// Loads every `.bin` reference class under `root`, keyed by internal name.
///
/// # Errors
/// [`ConfigError::UnreadableReference`] for unreadable resources, parse
/// errors for malformed ones.
pub fn load_directory(root: &Path) -> Result<HashMap<String, ReferenceClass>, TransformError> {
    let mut classes = HashMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            TransformError::Config(ConfigError::UnreadableReference {
                path: root.display().to_string(),
                source: err.into(),
            })
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|it| it.to_str()) != Some(REFERENCE_EXTENSION) {
            continue;
        }
        let bytes = std::fs::read(path).map_err(|err| {
            TransformError::Config(ConfigError::UnreadableReference {
                path: path.display().to_string(),
                source: err,
            })
        })?;
        let reference = ReferenceClass::parse(&bytes)?;
        debug!("loaded reference class `{}` from {}", reference.name(), path.display());
        classes.insert(reference.name().to_owned(), reference);
    }
    Ok(classes)
}

/// Loads every `.bin` reference class from a jar archive, keyed by internal
/// name.
///
/// # Errors
/// [`ConfigError::UnreadableReference`] for unreadable archives, parse
/// errors for malformed entries.
#[cfg(feature = "jar")]
pub fn load_jar(path: &Path) -> Result<HashMap<String, ReferenceClass>, TransformError> {
    let unreadable = |err: std::io::Error| {
        TransformError::Config(ConfigError::UnreadableReference {
            path: path.display().to_string(),
            source: err,
        })
    };
    let file = std::fs::File::open(path).map_err(unreadable)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| unreadable(std::io::Error::other(err)))?;
    let mut classes = HashMap::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| unreadable(std::io::Error::other(err)))?;
        if !entry.name().ends_with(&format!(".{REFERENCE_EXTENSION}")) {
            continue;
        }
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut bytes).map_err(unreadable)?;
        let reference = ReferenceClass::parse(&bytes)?;
        classes.insert(reference.name().to_owned(), reference);
    }
    Ok(classes)
}
