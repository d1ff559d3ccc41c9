//! Constant pool entries and their resolution into comparable strings.
//!
//! Resolution flattens a symbolic reference into the string tuple a signature
//! is authored against: a method reference becomes `[owner, name, descriptor]`,
//! a class becomes `[name]`. It never fails; anything it cannot follow turns
//! into a single placeholder string so the surrounding scan keeps going.

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELD_REF: u8 = 9;
pub const TAG_METHOD_REF: u8 = 10;
pub const TAG_INTERFACE_METHOD_REF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

// Class -> Utf8 and MethodRef -> NameAndType -> Utf8 need at most three hops.
const MAX_RESOLVE_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => TAG_UTF8,
            Constant::Integer(_) => TAG_INTEGER,
            Constant::Float(_) => TAG_FLOAT,
            Constant::Long(_) => TAG_LONG,
            Constant::Double(_) => TAG_DOUBLE,
            Constant::Class { .. } => TAG_CLASS,
            Constant::String { .. } => TAG_STRING,
            Constant::FieldRef { .. } => TAG_FIELD_REF,
            Constant::MethodRef { .. } => TAG_METHOD_REF,
            Constant::InterfaceMethodRef { .. } => TAG_INTERFACE_METHOD_REF,
            Constant::NameAndType { .. } => TAG_NAME_AND_TYPE,
            Constant::MethodHandle { .. } => TAG_METHOD_HANDLE,
            Constant::MethodType { .. } => TAG_METHOD_TYPE,
            Constant::Dynamic { .. } => TAG_DYNAMIC,
            Constant::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            Constant::Module { .. } => TAG_MODULE,
            Constant::Package { .. } => TAG_PACKAGE,
        }
    }

    /// Long and Double entries occupy two pool slots.
    pub fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// The constant pool of one class file, indexed the way the class file
/// indexes it: slot 0 and the upper half of two-slot entries are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    pub fn new(entries: Vec<Option<Constant>>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    /// Text of a Utf8 entry, decoded lossily.
    pub fn utf8(&self, index: u16) -> Option<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn resolve(&self, index: u16) -> Vec<String> {
        let mut out = Vec::new();
        self.resolve_into(index, 0, &mut out);
        out
    }

    fn resolve_into(&self, index: u16, depth: usize, out: &mut Vec<String>) {
        if depth > MAX_RESOLVE_DEPTH {
            out.push(format!("Constant reference too deep at index {index}"));
            return;
        }

        match self.get(index) {
            None => out.push(format!("No constant at index {index}")),
            Some(Constant::Utf8(bytes)) => out.push(String::from_utf8_lossy(bytes).into_owned()),
            Some(Constant::Class { name_index }) => self.resolve_into(*name_index, depth + 1, out),
            Some(
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                },
            ) => {
                self.resolve_into(*class_index, depth + 1, out);
                self.resolve_into(*name_and_type_index, depth + 1, out);
            }
            Some(Constant::NameAndType {
                name_index,
                descriptor_index,
            }) => {
                self.resolve_into(*name_index, depth + 1, out);
                self.resolve_into(*descriptor_index, depth + 1, out);
            }
            Some(other) => out.push(format!("No resolver for constant {}", other.tag())),
        }
    }
}
