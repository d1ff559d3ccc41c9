use byteorder::{BigEndian, ByteOrder};

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// One decoded instruction: its opcode and the raw operand bytes that follow
/// it in the method body (switch padding included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub opcode: Opcode,
    pub operands: Vec<u8>,
}

/// Split a method body into instructions, covering every byte of `code`.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut pc = 0usize;

    while let Some(&byte) = code.get(pc) {
        let opcode = Opcode(byte);
        let mnemonic = opcode
            .mnemonic()
            .ok_or(DecodeError::UndefinedOpcode { opcode: byte, pc })?;
        let malformed = DecodeError::MalformedInstruction {
            opcode: mnemonic,
            pc,
        };

        let width = operand_width(code, pc, opcode).ok_or_else(|| malformed.clone())?;
        let start = pc + 1;
        let end = start.checked_add(width).ok_or_else(|| malformed.clone())?;
        let operands = code.get(start..end).ok_or(malformed)?.to_vec();

        instructions.push(Instruction {
            pc,
            opcode,
            operands,
        });
        pc = end;
    }

    Ok(instructions)
}

fn operand_width(code: &[u8], pc: usize, opcode: Opcode) -> Option<usize> {
    let width = match opcode.0 {
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 1,
        0x11 | 0x13 | 0x14 | 0x84 | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 2,
        0xc5 => 3,
        0xb9 | 0xba | 0xc8 | 0xc9 => 4,
        0xc4 => match Opcode(*code.get(pc + 1)?) {
            Opcode::IINC => 5,
            _ => 3,
        },
        0xaa => {
            let pad = switch_padding(pc);
            let base = pc + 1 + pad;
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return None;
            }
            let count = usize::try_from(i64::from(high) - i64::from(low) + 1).ok()?;
            pad + 12 + count.checked_mul(4)?
        }
        0xab => {
            let pad = switch_padding(pc);
            let base = pc + 1 + pad;
            let pairs = usize::try_from(read_i32(code, base + 4)?).ok()?;
            pad + 8 + pairs.checked_mul(8)?
        }
        _ => 0,
    };
    Some(width)
}

// Switch operands start at the next multiple of four counted from the method start.
fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    code.get(at..at.checked_add(4)?).map(BigEndian::read_i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcodes(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().map(|i| i.opcode.0).collect()
    }

    #[test]
    fn decodes_fixed_width_operands() {
        // new #2; dup; invokespecial #3; bipush 56; astore_1; return
        let code = [
            0xbb, 0x00, 0x02, 0x59, 0xb7, 0x00, 0x03, 0x10, 0x38, 0x4c, 0xb1,
        ];
        let decoded = decode(&code).unwrap();
        assert_eq!(opcodes(&decoded), vec![0xbb, 0x59, 0xb7, 0x10, 0x4c, 0xb1]);
        assert_eq!(decoded[0].operands, vec![0x00, 0x02]);
        assert_eq!(decoded[3].operands, vec![0x38]);
        assert_eq!(decoded[3].pc, 7);
        assert!(decoded[5].operands.is_empty());
    }

    #[test]
    fn decodes_wide_forms() {
        // wide iload 0x0100; wide iinc 0x0001 by 5; return
        let code = [0xc4, 0x15, 0x01, 0x00, 0xc4, 0x84, 0x00, 0x01, 0x00, 0x05, 0xb1];
        let decoded = decode(&code).unwrap();
        assert_eq!(opcodes(&decoded), vec![0xc4, 0xc4, 0xb1]);
        assert_eq!(decoded[0].operands.len(), 3);
        assert_eq!(decoded[1].operands.len(), 5);
    }

    #[test]
    fn decodes_padded_tableswitch() {
        // iconst_0 at pc 0, tableswitch at pc 1 -> two padding bytes
        let mut code = vec![0x03, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&20i32.to_be_bytes()); // default
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&16i32.to_be_bytes());
        code.extend_from_slice(&18i32.to_be_bytes());
        code.push(0xb1);

        let decoded = decode(&code).unwrap();
        assert_eq!(opcodes(&decoded), vec![0x03, 0xaa, 0xb1]);
        assert_eq!(decoded[1].operands.len(), 2 + 12 + 8);
        assert_eq!(decoded[2].pc, code.len() - 1);
    }

    #[test]
    fn decodes_lookupswitch() {
        // lookupswitch at pc 0 -> three padding bytes, one pair
        let mut code = vec![0xab, 0x00, 0x00, 0x00];
        code.extend_from_slice(&12i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&7i32.to_be_bytes());
        code.extend_from_slice(&10i32.to_be_bytes());
        code.push(0xb1);

        let decoded = decode(&code).unwrap();
        assert_eq!(opcodes(&decoded), vec![0xab, 0xb1]);
        assert_eq!(decoded[0].operands.len(), 3 + 8 + 8);
    }

    #[test]
    fn rejects_truncated_operands() {
        let err = decode(&[0xb8, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedInstruction {
                opcode: "invokestatic",
                pc: 0
            }
        );
    }

    #[test]
    fn rejects_undefined_opcodes() {
        let err = decode(&[0x00, 0xcb]).unwrap_err();
        assert_eq!(err, DecodeError::UndefinedOpcode { opcode: 0xcb, pc: 1 });
    }

    #[test]
    fn rejects_inverted_tableswitch_bounds() {
        let mut code = vec![0xaa, 0x00, 0x00, 0x00];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        assert!(matches!(
            decode(&code),
            Err(DecodeError::MalformedInstruction { .. })
        ));
    }

    #[test]
    fn empty_body_decodes_to_nothing() {
        assert!(decode(&[]).unwrap().is_empty());
    }
}
