//! Serializing the element model back into class-file bytes.
//!
//! Emission rebuilds the constant pool from scratch by interning everything
//! the class mentions, in traversal order. The traversal order is fixed, so
//! the same model always serializes to the same bytes.

mod code;

use std::{io::Write, num::TryFromIntError};

use num_traits::ToBytes;

use super::{
    Annotation, BootstrapMethod, Class, ElementValue, Field, Method,
    code::Label,
    constant_pool::{ConstantPool, ConstantValue},
};

/// An error produced while serializing a class.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GenerationError {
    /// The constant pool exceeded 65535 slots.
    #[error("constant pool overflow")]
    PoolOverflow,
    /// A method body exceeded 65535 bytes.
    #[error("method body of {0} bytes exceeds the class file limit")]
    CodeTooLarge(usize),
    /// A conditional branch displacement did not fit in 16 bits.
    #[error("branch displacement {0} does not fit in a {1} instruction")]
    BranchOverflow(i64, &'static str),
    /// An instruction referenced a label that never appears in the stream.
    #[error("unplaced label {0}")]
    UnplacedLabel(Label),
    /// An instruction operand outside its encodable range, or a structurally
    /// impossible element stream (e.g. two frames at one offset).
    #[error("cannot encode: {0}")]
    Unencodable(String),
    /// A table length exceeded its fixed-width count field.
    #[error(transparent)]
    LengthOverflow(#[from] TryFromIntError),
    /// The underlying writer failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Writes `length` as the fixed-width big-endian count type `Len`.
fn write_length<Len>(out: &mut impl Write, length: usize) -> Result<(), GenerationError>
where
    usize: TryInto<Len, Error = TryFromIntError>,
    Len: ToBytes,
{
    let length: Len = length.try_into()?;
    out.write_all(length.to_be_bytes().as_ref())?;
    Ok(())
}

const CLASS_MAGIC: u32 = 0xCAFE_BABE;

impl Class {
    /// Serializes the class into class-file bytes.
    ///
    /// # Errors
    /// See [`GenerationError`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, GenerationError> {
        let mut pool = ConstantPool::new();

        let this_index = pool.put_class(&self.name)?;
        let super_index = match &self.super_name {
            Some(name) => pool.put_class(name)?,
            None => 0,
        };
        let interface_indices = self
            .interfaces
            .iter()
            .map(|name| pool.put_class(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut field_bytes = Vec::new();
        for field in &self.fields {
            field.write(&mut field_bytes, &mut pool)?;
        }
        let mut method_bytes = Vec::new();
        for method in &self.methods {
            method.write(&mut method_bytes, &mut pool)?;
        }

        let mut attributes = AttributeWriter::new(&mut pool);
        if let Some(source_file) = &self.source_file {
            let index = attributes.pool.put_utf8(source_file.as_str())?;
            attributes.push("SourceFile", &index.to_be_bytes())?;
        }
        if !self.inner_classes.is_empty() {
            let mut contents = Vec::new();
            write_length::<u16>(&mut contents, self.inner_classes.len())?;
            for inner in &self.inner_classes {
                let inner_index = attributes.pool.put_class(&inner.inner)?;
                let outer_index = match &inner.outer {
                    Some(name) => attributes.pool.put_class(name)?,
                    None => 0,
                };
                let name_index = match &inner.inner_name {
                    Some(name) => attributes.pool.put_utf8(name.as_str())?,
                    None => 0,
                };
                contents.extend_from_slice(&inner_index.to_be_bytes());
                contents.extend_from_slice(&outer_index.to_be_bytes());
                contents.extend_from_slice(&name_index.to_be_bytes());
                contents.extend_from_slice(&inner.access.to_be_bytes());
            }
            attributes.push("InnerClasses", &contents)?;
        }
        if !self.bootstrap_methods.is_empty() {
            let contents = write_bootstrap_methods(&self.bootstrap_methods, attributes.pool)?;
            attributes.push("BootstrapMethods", &contents)?;
        }
        attributes.signature(self.signature.as_deref())?;
        attributes.markers(self.is_synthetic, self.is_deprecated)?;
        attributes.annotations(&self.annotations, &self.invisible_annotations)?;
        let (attribute_count, attribute_bytes) = attributes.finish();

        let mut out = Vec::new();
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        out.extend_from_slice(&self.version.minor.to_be_bytes());
        out.extend_from_slice(&self.version.major.to_be_bytes());
        pool.to_writer(&mut out)?;
        out.extend_from_slice(&self.access.bits().to_be_bytes());
        out.extend_from_slice(&this_index.to_be_bytes());
        out.extend_from_slice(&super_index.to_be_bytes());
        write_length::<u16>(&mut out, interface_indices.len())?;
        for index in interface_indices {
            out.extend_from_slice(&index.to_be_bytes());
        }
        write_length::<u16>(&mut out, self.fields.len())?;
        out.extend_from_slice(&field_bytes);
        write_length::<u16>(&mut out, self.methods.len())?;
        out.extend_from_slice(&method_bytes);
        out.extend_from_slice(&attribute_count.to_be_bytes());
        out.extend_from_slice(&attribute_bytes);
        Ok(out)
    }
}

/// Collects the attributes of one class, field, or method.
struct AttributeWriter<'p> {
    pool: &'p mut ConstantPool,
    count: u16,
    bytes: Vec<u8>,
}

impl<'p> AttributeWriter<'p> {
    fn new(pool: &'p mut ConstantPool) -> Self {
        Self {
            pool,
            count: 0,
            bytes: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, contents: &[u8]) -> Result<(), GenerationError> {
        let name_index = self.pool.put_utf8(name)?;
        self.bytes.extend_from_slice(&name_index.to_be_bytes());
        write_length::<u32>(&mut self.bytes, contents.len())?;
        self.bytes.extend_from_slice(contents);
        self.count += 1;
        Ok(())
    }

    fn signature(&mut self, signature: Option<&str>) -> Result<(), GenerationError> {
        if let Some(signature) = signature {
            let index = self.pool.put_utf8(signature)?;
            self.push("Signature", &index.to_be_bytes())?;
        }
        Ok(())
    }

    fn markers(&mut self, synthetic: bool, deprecated: bool) -> Result<(), GenerationError> {
        if synthetic {
            self.push("Synthetic", &[])?;
        }
        if deprecated {
            self.push("Deprecated", &[])?;
        }
        Ok(())
    }

    fn annotations(
        &mut self,
        visible: &[Annotation],
        invisible: &[Annotation],
    ) -> Result<(), GenerationError> {
        if !visible.is_empty() {
            let contents = write_annotations(visible, self.pool)?;
            self.push("RuntimeVisibleAnnotations", &contents)?;
        }
        if !invisible.is_empty() {
            let contents = write_annotations(invisible, self.pool)?;
            self.push("RuntimeInvisibleAnnotations", &contents)?;
        }
        Ok(())
    }

    fn finish(self) -> (u16, Vec<u8>) {
        (self.count, self.bytes)
    }
}

impl Field {
    fn write(&self, out: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<(), GenerationError> {
        out.extend_from_slice(&self.access.bits().to_be_bytes());
        let name_index = pool.put_utf8(self.name.as_str())?;
        out.extend_from_slice(&name_index.to_be_bytes());
        let descriptor_index = pool.put_utf8(self.descriptor.as_str())?;
        out.extend_from_slice(&descriptor_index.to_be_bytes());

        let mut attributes = AttributeWriter::new(pool);
        if let Some(value) = &self.constant_value {
            let index = attributes.pool.put_constant_value(value)?;
            attributes.push("ConstantValue", &index.to_be_bytes())?;
        }
        attributes.signature(self.signature.as_deref())?;
        attributes.markers(self.is_synthetic, self.is_deprecated)?;
        attributes.annotations(&self.annotations, &self.invisible_annotations)?;
        let (count, bytes) = attributes.finish();
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Method {
    fn write(&self, out: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<(), GenerationError> {
        out.extend_from_slice(&self.access.bits().to_be_bytes());
        let name_index = pool.put_utf8(self.name.as_str())?;
        out.extend_from_slice(&name_index.to_be_bytes());
        let descriptor_index = pool.put_utf8(self.descriptor.as_str())?;
        out.extend_from_slice(&descriptor_index.to_be_bytes());

        let mut attributes = AttributeWriter::new(pool);
        if let Some(body) = &self.code {
            let contents = code::write_code(body, attributes.pool)?;
            attributes.push("Code", &contents)?;
        }
        if !self.exceptions.is_empty() {
            let mut contents = Vec::new();
            write_length::<u16>(&mut contents, self.exceptions.len())?;
            for exception in &self.exceptions {
                let index = attributes.pool.put_class(exception)?;
                contents.extend_from_slice(&index.to_be_bytes());
            }
            attributes.push("Exceptions", &contents)?;
        }
        attributes.signature(self.signature.as_deref())?;
        attributes.markers(self.is_synthetic, self.is_deprecated)?;
        attributes.annotations(&self.annotations, &self.invisible_annotations)?;
        let (count, bytes) = attributes.finish();
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&bytes);
        Ok(())
    }
}

fn write_bootstrap_methods(
    methods: &[BootstrapMethod],
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, GenerationError> {
    let mut contents = Vec::new();
    write_length::<u16>(&mut contents, methods.len())?;
    for method in methods {
        let handle_index = pool.put_method_handle(&method.handle)?;
        contents.extend_from_slice(&handle_index.to_be_bytes());
        write_length::<u16>(&mut contents, method.arguments.len())?;
        for argument in &method.arguments {
            let index = pool.put_constant_value(argument)?;
            contents.extend_from_slice(&index.to_be_bytes());
        }
    }
    Ok(contents)
}

fn write_annotations(
    annotations: &[Annotation],
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, GenerationError> {
    let mut contents = Vec::new();
    write_length::<u16>(&mut contents, annotations.len())?;
    for annotation in annotations {
        write_annotation(annotation, &mut contents, pool)?;
    }
    Ok(contents)
}

fn write_annotation(
    annotation: &Annotation,
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
) -> Result<(), GenerationError> {
    let type_index = pool.put_utf8(annotation.type_descriptor.as_str())?;
    out.extend_from_slice(&type_index.to_be_bytes());
    write_length::<u16>(out, annotation.elements.len())?;
    for (name, value) in &annotation.elements {
        let name_index = pool.put_utf8(name.as_str())?;
        out.extend_from_slice(&name_index.to_be_bytes());
        write_element_value(value, out, pool)?;
    }
    Ok(())
}

fn write_element_value(
    value: &ElementValue,
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
) -> Result<(), GenerationError> {
    match value {
        ElementValue::Constant(tag, constant) => {
            out.push(u8::try_from(*tag).map_err(|_| {
                GenerationError::Unencodable(format!("element value tag {tag:?}"))
            })?);
            let index = match constant {
                ConstantValue::String(it) => {
                    pool.put_utf8(it.as_utf8().ok_or_else(|| {
                        GenerationError::Unencodable(
                            "string element value without UTF-8 reading".into(),
                        )
                    })?)?
                }
                other => pool.put_constant_value(other)?,
            };
            out.extend_from_slice(&index.to_be_bytes());
        }
        ElementValue::EnumConstant {
            type_descriptor,
            const_name,
        } => {
            out.push(b'e');
            let type_index = pool.put_utf8(type_descriptor.as_str())?;
            let const_index = pool.put_utf8(const_name.as_str())?;
            out.extend_from_slice(&type_index.to_be_bytes());
            out.extend_from_slice(&const_index.to_be_bytes());
        }
        ElementValue::Class { descriptor } => {
            out.push(b'c');
            let index = pool.put_utf8(descriptor.as_str())?;
            out.extend_from_slice(&index.to_be_bytes());
        }
        ElementValue::Nested(annotation) => {
            out.push(b'@');
            write_annotation(annotation, out, pool)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            write_length::<u16>(out, values.len())?;
            for value in values {
                write_element_value(value, out, pool)?;
            }
        }
    }
    Ok(())
}
