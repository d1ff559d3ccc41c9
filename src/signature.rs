//! The built-in signature catalog.
//!
//! Patterns follow the nekodetector signatures: two call chains matched on a
//! view restricted to the opcodes they use, and one byte-array assembly
//! matched on the full resolved stream.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::instruction::{InlineInstruction, Operand};
use crate::opcode::Opcode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpcodeRestriction {
    Restricted(BTreeSet<Opcode>),
    Unrestricted,
}

impl OpcodeRestriction {
    pub fn admits(&self, instruction: &InlineInstruction) -> bool {
        match (self, instruction.opcode()) {
            (_, None) => false,
            (OpcodeRestriction::Unrestricted, Some(_)) => true,
            (OpcodeRestriction::Restricted(set), Some(opcode)) => set.contains(&opcode),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub name: String,
    pub description: String,
    pub pattern: Vec<InlineInstruction>,
    pub restriction: OpcodeRestriction,
}

impl Signature {
    /// Signature matched against the stream filtered to the pattern's own opcodes.
    pub fn restricted(name: &str, description: &str, pattern: Vec<InlineInstruction>) -> Self {
        let opcodes = pattern.iter().filter_map(InlineInstruction::opcode).collect();
        Self::build(name, description, pattern, OpcodeRestriction::Restricted(opcodes))
    }

    /// Signature matched against the full resolved stream.
    pub fn unrestricted(name: &str, description: &str, pattern: Vec<InlineInstruction>) -> Self {
        Self::build(name, description, pattern, OpcodeRestriction::Unrestricted)
    }

    fn build(
        name: &str,
        description: &str,
        pattern: Vec<InlineInstruction>,
        restriction: OpcodeRestriction,
    ) -> Self {
        debug_assert!(!pattern.is_empty(), "signature `{name}` has an empty pattern");
        Self {
            name: name.to_string(),
            description: description.to_string(),
            pattern,
            restriction,
        }
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }
}

pub fn catalog() -> &'static [Signature] {
    static CATALOG: OnceLock<Vec<Signature>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

fn op(opcode: Opcode) -> InlineInstruction {
    InlineInstruction::bare(opcode)
}

fn with<const N: usize>(opcode: Opcode, operands: [&str; N]) -> InlineInstruction {
    InlineInstruction::new(opcode, operands.into_iter().map(Operand::from).collect())
}

fn bipush(value: i32) -> InlineInstruction {
    InlineInstruction::new(Opcode::BIPUSH, vec![Operand::Num(value)])
}

const STRING_FROM_BYTES: [&str; 3] = ["java/lang/String", "<init>", "([B)V"];

#[rustfmt::skip]
fn build_catalog() -> Vec<Signature> {
    use Opcode as O;

    let reflective_loader = vec![
        with(O::NEW, ["java/lang/String"]),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::NEW, ["java/lang/String"]),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::INVOKESTATIC, ["java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;"]),
        with(O::INVOKEVIRTUAL, ["java/lang/Class", "getConstructor", "([Ljava/lang/Class;)Ljava/lang/reflect/Constructor;"]),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::INVOKESPECIAL, ["java/net/URL", "<init>", "(Ljava/lang/String;Ljava/lang/String;ILjava/lang/String;)V"]),
        with(O::INVOKEVIRTUAL, ["java/lang/reflect/Constructor", "newInstance", "([Ljava/lang/Object;)Ljava/lang/Object;"]),
        with(O::INVOKESTATIC, ["java/lang/Class", "forName", "(Ljava/lang/String;ZLjava/lang/ClassLoader;)Ljava/lang/Class;"]),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::INVOKEVIRTUAL, ["java/lang/Class", "getMethod", "(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;"]),
        with(O::INVOKEVIRTUAL, ["java/lang/reflect/Method", "invoke", "(Ljava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;"]),
    ];

    let base64_exec = vec![
        with(O::INVOKESTATIC, ["java/lang/Runtime", "getRuntime", "()Ljava/lang/Runtime;"]),
        with(O::INVOKESTATIC, ["java/util/Base64", "getDecoder", "()Ljava/util/Base64$Decoder;"]),
        // not present in every sample; the default tolerance absorbs its absence
        with(O::INVOKEVIRTUAL, ["java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;"]),
        with(O::INVOKEVIRTUAL, ["java/util/Base64$Decoder", "decode", "(Ljava/lang/String;)[B"]),
        with(O::INVOKESPECIAL, STRING_FROM_BYTES),
        with(O::INVOKEVIRTUAL, ["java/io/File", "getPath", "()Ljava/lang/String;"]),
        with(O::INVOKEVIRTUAL, ["java/lang/Runtime", "exec", "([Ljava/lang/String;)Ljava/lang/Process;"]),
    ];

    // "85.217.144.130" written into a byte[] one element at a time
    let mut embedded_ip = vec![bipush(56), op(O::BASTORE)];
    let index_pushes = [
        op(O::ICONST_1),
        op(O::ICONST_2),
        op(O::ICONST_3),
        op(O::ICONST_4),
        op(O::ICONST_5),
    ];
    let tail = [53, 46, 50, 49, 55];
    for (index, value) in index_pushes.into_iter().zip(tail) {
        embedded_ip.extend([op(O::DUP), index, bipush(value), op(O::BASTORE)]);
    }
    for (index, value) in (6..).zip([46, 49, 52, 52, 46, 49, 51]) {
        embedded_ip.extend([op(O::DUP), bipush(index), bipush(value), op(O::BASTORE)]);
    }
    embedded_ip.extend([op(O::DUP), bipush(13), bipush(48)]);

    vec![
        Signature::restricted(
            "sig1",
            "reflective class loading from a URL built out of byte-array strings",
            reflective_loader,
        ),
        Signature::restricted(
            "sig2",
            "Runtime.exec of a Base64-decoded command",
            base64_exec,
        ),
        Signature::unrestricted(
            "sig3-ip",
            "hard-coded IP address assembled byte by byte",
            embedded_ip,
        ),
    ]
}
