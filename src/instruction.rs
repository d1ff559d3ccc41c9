//! Inline instructions: an opcode plus its operands resolved into values that
//! can be compared directly against a signature.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;

use crate::bytecode::Instruction;
use crate::constant_pool::ConstantPool;
use crate::opcode::Opcode;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum Operand {
    Num(i32),
    Str(String),
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Num(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Str(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Str(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Num(n) => write!(f, "{n}"),
            Operand::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineInstruction {
    Resolved {
        opcode: Opcode,
        operands: Vec<Operand>,
    },
    /// No resolver is registered for the opcode. Kept in the method stream so
    /// positions stay stable, never compared against a signature.
    Unresolved(String),
}

impl InlineInstruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        InlineInstruction::Resolved { opcode, operands }
    }

    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            InlineInstruction::Resolved { opcode, .. } => Some(*opcode),
            InlineInstruction::Unresolved(_) => None,
        }
    }

    pub fn operands(&self) -> &[Operand] {
        match self {
            InlineInstruction::Resolved { operands, .. } => operands,
            InlineInstruction::Unresolved(_) => &[],
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.opcode().is_some()
    }

    /// Opcode plus operands.
    pub fn len(&self) -> usize {
        match self {
            InlineInstruction::Resolved { operands, .. } => 1 + operands.len(),
            InlineInstruction::Unresolved(_) => 2,
        }
    }
}

impl fmt::Display for InlineInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineInstruction::Resolved { opcode, operands } => {
                write!(f, "{opcode}")?;
                for operand in operands {
                    write!(f, " {operand}")?;
                }
                Ok(())
            }
            InlineInstruction::Unresolved(reason) => write!(f, "<{reason}>"),
        }
    }
}

impl Serialize for InlineInstruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        match self {
            InlineInstruction::Resolved { opcode, operands } => {
                seq.serialize_element(opcode)?;
                for operand in operands {
                    seq.serialize_element(operand)?;
                }
            }
            InlineInstruction::Unresolved(reason) => {
                seq.serialize_element("UNRESOLVED")?;
                seq.serialize_element(reason)?;
            }
        }
        seq.end()
    }
}

enum Resolver {
    PassThrough,
    Immediate,
    PoolReference,
    Unregistered,
}

fn resolver_for(opcode: Opcode) -> Resolver {
    match opcode {
        Opcode::NEW | Opcode::INVOKESPECIAL | Opcode::INVOKESTATIC | Opcode::INVOKEVIRTUAL => {
            Resolver::PoolReference
        }
        Opcode::BIPUSH => Resolver::Immediate,
        Opcode::BASTORE
        | Opcode::DUP
        | Opcode::ICONST_1
        | Opcode::ICONST_2
        | Opcode::ICONST_3
        | Opcode::ICONST_4
        | Opcode::ICONST_5 => Resolver::PassThrough,
        _ => Resolver::Unregistered,
    }
}

pub fn resolve(instruction: &Instruction, pool: &ConstantPool) -> InlineInstruction {
    let opcode = instruction.opcode;
    match resolver_for(opcode) {
        Resolver::PassThrough => InlineInstruction::bare(opcode),
        Resolver::Immediate => match instruction.operands.first() {
            Some(&value) => InlineInstruction::new(opcode, vec![Operand::Num(i32::from(value))]),
            None => InlineInstruction::bare(opcode),
        },
        Resolver::PoolReference => match instruction.operands[..] {
            [hi, lo, ..] => {
                let index = u16::from_be_bytes([hi, lo]);
                let operands = pool.resolve(index).into_iter().map(Operand::Str).collect();
                InlineInstruction::new(opcode, operands)
            }
            _ => InlineInstruction::bare(opcode),
        },
        Resolver::Unregistered => {
            InlineInstruction::Unresolved(format!("No resolver for opcode {opcode}"))
        }
    }
}

pub fn resolve_all(instructions: &[Instruction], pool: &ConstantPool) -> Vec<InlineInstruction> {
    instructions
        .iter()
        .map(|instruction| resolve(instruction, pool))
        .collect()
}
