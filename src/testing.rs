//! Helpers for assembling class files and jars in tests.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::instruction::{InlineInstruction, Operand};
use crate::opcode::Opcode;
use crate::signature::{Signature, catalog};

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "jar_sentry_test_{}_{}_{}_{}",
        std::process::id(),
        nanos,
        n,
        name
    ))
}

pub(crate) fn jar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    jar_bytes_with(entries, CompressionMethod::Deflated)
}

pub(crate) fn jar_bytes_with(entries: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(method);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub(crate) fn signature_named(name: &str) -> &'static Signature {
    catalog().iter().find(|s| s.name == name).unwrap()
}

/// A class whose `payload` method contains `pattern`, framed by an unresolved
/// `aload_0` in front and a repeat of the pattern's first instruction behind
/// so that the signature's view is strictly longer than the pattern.
pub(crate) fn class_with_pattern(pattern: &[InlineInstruction], name: Option<&str>) -> Vec<u8> {
    let mut class = ClassFileBuilder::new(name.unwrap_or("org/example/Payload"));
    let mut code = vec![0x2a];
    for instruction in pattern {
        class.emit(&mut code, instruction);
    }
    class.emit(&mut code, &pattern[0]);
    code.push(0xb1);
    class.add_method("payload", "()V", code);
    class.build()
}

pub(crate) struct ClassFileBuilder {
    pool: Vec<u8>,
    next_index: u16,
    utf8s: HashMap<String, u16>,
    this_class: u16,
    fields: Vec<u8>,
    field_count: u16,
    methods: Vec<u8>,
    method_count: u16,
}

impl ClassFileBuilder {
    pub(crate) fn new(class_name: &str) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            next_index: 1,
            utf8s: HashMap::new(),
            this_class: 0,
            fields: Vec::new(),
            field_count: 0,
            methods: Vec::new(),
            method_count: 0,
        };
        builder.this_class = builder.class(class_name);
        builder
    }

    fn push(&mut self, bytes: &[u8], width: u16) -> u16 {
        let index = self.next_index;
        self.pool.extend_from_slice(bytes);
        self.next_index += width;
        index
    }

    pub(crate) fn utf8(&mut self, text: &str) -> u16 {
        if let Some(&index) = self.utf8s.get(text) {
            return index;
        }
        let mut bytes = vec![1];
        bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
        bytes.extend_from_slice(text.as_bytes());
        let index = self.push(&bytes, 1);
        self.utf8s.insert(text.to_string(), index);
        index
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        let [hi, lo] = name.to_be_bytes();
        self.push(&[7, hi, lo], 1)
    }

    pub(crate) fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut name_and_type = vec![12];
        name_and_type.extend_from_slice(&name.to_be_bytes());
        name_and_type.extend_from_slice(&descriptor.to_be_bytes());
        let name_and_type = self.push(&name_and_type, 1);

        let mut method_ref = vec![10];
        method_ref.extend_from_slice(&class.to_be_bytes());
        method_ref.extend_from_slice(&name_and_type.to_be_bytes());
        self.push(&method_ref, 1)
    }

    pub(crate) fn add_long_constant(&mut self, value: i64) -> u16 {
        let mut bytes = vec![5];
        bytes.extend_from_slice(&value.to_be_bytes());
        self.push(&bytes, 2)
    }

    pub(crate) fn emit_new(&mut self, code: &mut Vec<u8>, class: &str) {
        let index = self.class(class);
        code.push(Opcode::NEW.0);
        code.extend_from_slice(&index.to_be_bytes());
    }

    pub(crate) fn emit_invoke(
        &mut self,
        code: &mut Vec<u8>,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) {
        let index = self.method_ref(owner, name, descriptor);
        code.push(opcode.0);
        code.extend_from_slice(&index.to_be_bytes());
    }

    /// Assemble bytecode that resolves back to `instruction`.
    pub(crate) fn emit(&mut self, code: &mut Vec<u8>, instruction: &InlineInstruction) {
        let InlineInstruction::Resolved { opcode, operands } = instruction else {
            panic!("cannot emit {instruction}");
        };
        let text = |i: usize| match &operands[i] {
            Operand::Str(s) => s.clone(),
            Operand::Num(n) => n.to_string(),
        };
        match *opcode {
            Opcode::NEW => self.emit_new(code, &text(0)),
            Opcode::INVOKESTATIC | Opcode::INVOKEVIRTUAL | Opcode::INVOKESPECIAL => {
                self.emit_invoke(code, *opcode, &text(0), &text(1), &text(2))
            }
            Opcode::BIPUSH => match operands[..] {
                [Operand::Num(value)] => code.extend_from_slice(&[Opcode::BIPUSH.0, value as u8]),
                _ => panic!("cannot emit {instruction}"),
            },
            other => code.push(other.0),
        }
    }

    pub(crate) fn add_field(&mut self, name: &str, descriptor: &str) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let synthetic = self.utf8("Synthetic");
        self.fields.extend_from_slice(&0x0002u16.to_be_bytes());
        self.fields.extend_from_slice(&name.to_be_bytes());
        self.fields.extend_from_slice(&descriptor.to_be_bytes());
        self.fields.extend_from_slice(&1u16.to_be_bytes());
        self.fields.extend_from_slice(&synthetic.to_be_bytes());
        self.fields.extend_from_slice(&0u32.to_be_bytes());
        self.field_count += 1;
    }

    pub(crate) fn add_method(&mut self, name: &str, descriptor: &str, code: Vec<u8>) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let code_name = self.utf8("Code");
        let attribute_len = (2 + 2 + 4 + code.len() + 2 + 2) as u32;

        let m = &mut self.methods;
        m.extend_from_slice(&0x0009u16.to_be_bytes());
        m.extend_from_slice(&name.to_be_bytes());
        m.extend_from_slice(&descriptor.to_be_bytes());
        m.extend_from_slice(&1u16.to_be_bytes());
        m.extend_from_slice(&code_name.to_be_bytes());
        m.extend_from_slice(&attribute_len.to_be_bytes());
        m.extend_from_slice(&8u16.to_be_bytes()); // max stack
        m.extend_from_slice(&8u16.to_be_bytes()); // max locals
        m.extend_from_slice(&(code.len() as u32).to_be_bytes());
        m.extend_from_slice(&code);
        m.extend_from_slice(&0u16.to_be_bytes()); // exception table
        m.extend_from_slice(&0u16.to_be_bytes()); // attributes
        self.method_count += 1;
    }

    pub(crate) fn add_abstract_method(&mut self, name: &str, descriptor: &str) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.methods.extend_from_slice(&0x0401u16.to_be_bytes());
        self.methods.extend_from_slice(&name.to_be_bytes());
        self.methods.extend_from_slice(&descriptor.to_be_bytes());
        self.methods.extend_from_slice(&0u16.to_be_bytes());
        self.method_count += 1;
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        let super_class = self.class("java/lang/Object");

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&self.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool);
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&super_class.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&self.field_count.to_be_bytes());
        out.extend_from_slice(&self.fields);
        out.extend_from_slice(&self.method_count.to_be_bytes());
        out.extend_from_slice(&self.methods);
        out.extend_from_slice(&0u16.to_be_bytes()); // attributes
        out
    }
}
