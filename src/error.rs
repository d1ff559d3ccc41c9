use thiserror::Error;

use crate::status::StatusKind;

/// Failure to decode a class file or one of its method bodies.
///
/// Any of these settles the owning unit as `error`; none of them aborts
/// sibling scans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of data at byte {offset} while reading {context}")]
    UnexpectedEof { offset: u64, context: &'static str },

    #[error("invalid magic number 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("undefined opcode 0x{opcode:02x} at bytecode offset {pc}")]
    UndefinedOpcode { opcode: u8, pc: usize },

    #[error("malformed {opcode} instruction at bytecode offset {pc}")]
    MalformedInstruction { opcode: &'static str, pc: usize },
}

/// An event was applied to a unit in a state that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unit `{name}` already settled as {status}")]
    AlreadySettled { name: String, status: StatusKind },

    #[error("unit `{name}` cannot go from {from} to {to}")]
    Illegal {
        name: String,
        from: StatusKind,
        to: StatusKind,
    },

    #[error("archive `{name}` cannot settle while `{child}` is still in progress")]
    UnsettledChild { name: String, child: String },
}
