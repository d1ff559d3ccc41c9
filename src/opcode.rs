use serde::{Serialize, Serializer};
use std::fmt;

/// A JVM instruction opcode.
///
/// Only the opcodes the resolver and the signature catalog refer to get named
/// constants; every other defined opcode is still representable and carries a
/// mnemonic for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(pub u8);

impl Opcode {
    pub const ICONST_1: Opcode = Opcode(0x04);
    pub const ICONST_2: Opcode = Opcode(0x05);
    pub const ICONST_3: Opcode = Opcode(0x06);
    pub const ICONST_4: Opcode = Opcode(0x07);
    pub const ICONST_5: Opcode = Opcode(0x08);
    pub const BIPUSH: Opcode = Opcode(0x10);
    pub const BASTORE: Opcode = Opcode(0x54);
    pub const DUP: Opcode = Opcode(0x59);
    pub const IINC: Opcode = Opcode(0x84);
    pub const TABLESWITCH: Opcode = Opcode(0xaa);
    pub const GETSTATIC: Opcode = Opcode(0xb2);
    pub const INVOKEVIRTUAL: Opcode = Opcode(0xb6);
    pub const INVOKESPECIAL: Opcode = Opcode(0xb7);
    pub const INVOKESTATIC: Opcode = Opcode(0xb8);
    pub const NEW: Opcode = Opcode(0xbb);
    pub const WIDE: Opcode = Opcode(0xc4);

    /// Mnemonic of a defined opcode, `None` for reserved or unassigned bytes.
    pub fn mnemonic(self) -> Option<&'static str> {
        MNEMONICS.get(self.0 as usize).copied()
    }

    pub fn is_defined(self) -> bool {
        self.mnemonic().is_some()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnemonic() {
            Some(name) => f.write_str(&name.to_ascii_uppercase()),
            None => write!(f, "0x{:02x}", self.0),
        }
    }
}

impl Serialize for Opcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[rustfmt::skip]
const MNEMONICS: [&str; 202] = [
    // 0x00
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    // 0x10
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload",
    "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1",
    // 0x20
    "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1",
    "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload",
    // 0x30
    "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
    "fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
    // 0x40
    "lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0",
    "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2", "astore_3", "iastore",
    // 0x50
    "lastore", "fastore", "dastore", "aastore", "bastore", "castore", "sastore", "pop",
    "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap",
    // 0x60
    "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub",
    "imul", "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv",
    // 0x70
    "irem", "lrem", "frem", "drem", "ineg", "lneg", "fneg", "dneg",
    "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land",
    // 0x80
    "ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d",
    "l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l",
    // 0x90
    "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl",
    "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq",
    // 0xa0
    "if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto",
    "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
    // 0xb0
    "areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial",
    "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow",
    // 0xc0
    "checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull",
    "goto_w", "jsr_w",
];
