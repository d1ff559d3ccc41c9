//! Structural decoding of class files.
//!
//! Only what detection needs is kept: the constant pool and, per method, its
//! name and the bytecode of its `Code` attribute. Fields and every other
//! attribute are read past without interpretation.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::constant_pool::{self as cp, Constant, ConstantPool};
use crate::error::DecodeError;

pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub code: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub methods: Vec<MethodInfo>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        let magic = reader.u32("magic")?;
        if magic != CLASS_MAGIC {
            return Err(DecodeError::InvalidMagic(magic));
        }
        let minor_version = reader.u16("minor version")?;
        let major_version = reader.u16("major version")?;
        let constant_pool = read_constant_pool(&mut reader)?;

        let access_flags = reader.u16("access flags")?;
        let this_class = reader.u16("this class")?;
        let super_class = reader.u16("super class")?;

        let interfaces = reader.u16("interface count")?;
        reader.skip(usize::from(interfaces) * 2, "interfaces")?;

        let fields = reader.u16("field count")?;
        for _ in 0..fields {
            reader.skip(6, "field header")?;
            skip_attributes(&mut reader)?;
        }

        let method_count = reader.u16("method count")?;
        let mut methods = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            methods.push(read_method(&mut reader, &constant_pool)?);
        }

        skip_attributes(&mut reader)?;

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            methods,
        })
    }

    pub fn class_name(&self) -> Option<String> {
        match self.constant_pool.get(self.this_class)? {
            Constant::Class { name_index } => self.constant_pool.utf8(*name_index),
            _ => None,
        }
    }

    /// A method name that is not a Utf8 entry falls back to the resolver's
    /// placeholder text.
    pub fn method_name(&self, method: &MethodInfo) -> String {
        self.constant_pool
            .utf8(method.name_index)
            .unwrap_or_else(|| self.constant_pool.resolve(method.name_index).join(" "))
    }
}

fn read_constant_pool(reader: &mut Reader<'_>) -> Result<ConstantPool, DecodeError> {
    let count = reader.u16("constant pool count")?;
    let mut entries: Vec<Option<Constant>> = Vec::with_capacity(usize::from(count));
    entries.push(None);

    let mut index = 1u16;
    while index < count {
        let tag = reader.u8("constant tag")?;
        let constant = match tag {
            cp::TAG_UTF8 => {
                let len = reader.u16("utf8 length")?;
                Constant::Utf8(reader.bytes(usize::from(len), "utf8 bytes")?)
            }
            cp::TAG_INTEGER => Constant::Integer(reader.u32("integer")? as i32),
            cp::TAG_FLOAT => Constant::Float(reader.u32("float")?),
            cp::TAG_LONG => Constant::Long(reader.u64("long")? as i64),
            cp::TAG_DOUBLE => Constant::Double(reader.u64("double")?),
            cp::TAG_CLASS => Constant::Class {
                name_index: reader.u16("class name index")?,
            },
            cp::TAG_STRING => Constant::String {
                string_index: reader.u16("string index")?,
            },
            cp::TAG_FIELD_REF => Constant::FieldRef {
                class_index: reader.u16("field ref class")?,
                name_and_type_index: reader.u16("field ref name and type")?,
            },
            cp::TAG_METHOD_REF => Constant::MethodRef {
                class_index: reader.u16("method ref class")?,
                name_and_type_index: reader.u16("method ref name and type")?,
            },
            cp::TAG_INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
                class_index: reader.u16("interface method ref class")?,
                name_and_type_index: reader.u16("interface method ref name and type")?,
            },
            cp::TAG_NAME_AND_TYPE => Constant::NameAndType {
                name_index: reader.u16("name and type name")?,
                descriptor_index: reader.u16("name and type descriptor")?,
            },
            cp::TAG_METHOD_HANDLE => Constant::MethodHandle {
                reference_kind: reader.u8("method handle kind")?,
                reference_index: reader.u16("method handle reference")?,
            },
            cp::TAG_METHOD_TYPE => Constant::MethodType {
                descriptor_index: reader.u16("method type descriptor")?,
            },
            cp::TAG_DYNAMIC => Constant::Dynamic {
                bootstrap_method_attr_index: reader.u16("dynamic bootstrap index")?,
                name_and_type_index: reader.u16("dynamic name and type")?,
            },
            cp::TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap_method_attr_index: reader.u16("invokedynamic bootstrap index")?,
                name_and_type_index: reader.u16("invokedynamic name and type")?,
            },
            cp::TAG_MODULE => Constant::Module {
                name_index: reader.u16("module name")?,
            },
            cp::TAG_PACKAGE => Constant::Package {
                name_index: reader.u16("package name")?,
            },
            _ => return Err(DecodeError::UnknownConstantTag { tag, index }),
        };

        let width = constant.width();
        entries.push(Some(constant));
        if width == 2 {
            entries.push(None);
        }
        index = index.saturating_add(width);
    }

    Ok(ConstantPool::new(entries))
}

fn read_method(reader: &mut Reader<'_>, pool: &ConstantPool) -> Result<MethodInfo, DecodeError> {
    let access_flags = reader.u16("method access flags")?;
    let name_index = reader.u16("method name index")?;
    let descriptor_index = reader.u16("method descriptor index")?;

    let mut code = None;
    let attribute_count = reader.u16("method attribute count")?;
    for _ in 0..attribute_count {
        let attribute_name = reader.u16("attribute name index")?;
        let len = reader.u32("attribute length")? as usize;
        let data = reader.bytes(len, "attribute body")?;
        if code.is_none() && pool.utf8(attribute_name).as_deref() == Some("Code") {
            code = Some(read_code_attribute(&data)?);
        }
    }

    Ok(MethodInfo {
        access_flags,
        name_index,
        descriptor_index,
        code,
    })
}

fn read_code_attribute(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut reader = Reader::new(data);
    reader.skip(4, "max stack and locals")?;
    let code_length = reader.u32("code length")? as usize;
    reader.bytes(code_length, "code")
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<(), DecodeError> {
    let count = reader.u16("attribute count")?;
    for _ in 0..count {
        reader.skip(2, "attribute name index")?;
        let len = reader.u32("attribute length")? as usize;
        reader.skip(len, "attribute body")?;
    }
    Ok(())
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn eof(&self, context: &'static str) -> DecodeError {
        DecodeError::UnexpectedEof {
            offset: self.cursor.position(),
            context,
        }
    }

    fn u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let offset = self.cursor.position();
        self.cursor
            .read_u8()
            .map_err(|_| DecodeError::UnexpectedEof { offset, context })
    }

    fn u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        let offset = self.cursor.position();
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::UnexpectedEof { offset, context })
    }

    fn u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        let offset = self.cursor.position();
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::UnexpectedEof { offset, context })
    }

    fn u64(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let offset = self.cursor.position();
        self.cursor
            .read_u64::<BigEndian>()
            .map_err(|_| DecodeError::UnexpectedEof { offset, context })
    }

    fn slice(&self, len: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let bytes: &'a [u8] = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        start
            .checked_add(len)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| self.eof(context))
    }

    fn bytes(&mut self, len: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        let out = self.slice(len, context)?.to_vec();
        self.cursor.set_position(self.cursor.position() + len as u64);
        Ok(out)
    }

    fn skip(&mut self, len: usize, context: &'static str) -> Result<(), DecodeError> {
        self.slice(len, context)?;
        self.cursor.set_position(self.cursor.position() + len as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassFileBuilder;

    fn sample() -> Vec<u8> {
        let mut class = ClassFileBuilder::new("org/example/Sample");
        class.add_field("secret", "I");
        let mut code = Vec::new();
        class.emit_invoke(
            &mut code,
            crate::opcode::Opcode::INVOKESTATIC,
            "java/lang/Runtime",
            "getRuntime",
            "()Ljava/lang/Runtime;",
        );
        code.push(0x57); // pop
        code.push(0xb1); // return
        class.add_method("run", "()V", code);
        class.add_abstract_method("describe", "()Ljava/lang/String;");
        class.add_long_constant(7);
        class.build()
    }

    #[test]
    fn parses_methods_and_code() {
        let class = ClassFile::parse(&sample()).unwrap();
        assert_eq!(class.class_name().as_deref(), Some("org/example/Sample"));
        assert_eq!(class.methods.len(), 2);

        let run = &class.methods[0];
        assert_eq!(class.method_name(run), "run");
        assert_eq!(run.code.as_ref().map(Vec::len), Some(5));

        let describe = &class.methods[1];
        assert_eq!(class.method_name(describe), "describe");
        assert!(describe.code.is_none());
    }

    #[test]
    fn long_constants_take_two_slots() {
        let class = ClassFile::parse(&sample()).unwrap();
        let pool = &class.constant_pool;
        let long_index = (1..pool.len() as u16)
            .find(|i| matches!(pool.get(*i), Some(Constant::Long(7))))
            .unwrap();
        assert!(pool.get(long_index + 1).is_none());
    }

    #[test]
    fn truncated_header_is_an_error() {
        let bytes = sample();
        let err = ClassFile::parse(&bytes[..6]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { offset: 6, .. }));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn truncated_body_is_an_error() {
        let bytes = sample();
        let err = ClassFile::parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn wrong_magic_is_an_error() {
        let mut bytes = sample();
        bytes[0] = 0xCB;
        assert_eq!(
            ClassFile::parse(&bytes).unwrap_err(),
            DecodeError::InvalidMagic(0xCBFE_BABE)
        );
    }

    #[test]
    fn unknown_constant_tag_is_an_error() {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0, 2, 99];
        bytes.extend_from_slice(&[0; 8]);
        assert_eq!(
            ClassFile::parse(&bytes).unwrap_err(),
            DecodeError::UnknownConstantTag { tag: 99, index: 1 }
        );
    }
}
