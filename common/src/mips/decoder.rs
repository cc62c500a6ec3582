//! Instruction decoding.
//!
//! Decoding is a search over [`Opcode::ALL`] for the first pattern matching
//! the word. Every pattern fixes the six primary opcode bits, so the table is
//! bucketed by primary opcode once and each decode only scans its bucket, in
//! table order.

use std::sync::OnceLock;

use super::{instruction::Instruction, opcode::Opcode};

struct DecodeTable {
    buckets: Vec<Vec<Opcode>>,
}

impl DecodeTable {
    fn build() -> Self {
        let mut buckets = vec![Vec::new(); 64];
        for &opcode in Opcode::ALL {
            buckets[opcode.primary() as usize].push(opcode);
        }
        Self { buckets }
    }

    fn lookup(&self, word: u32) -> Opcode {
        self.buckets[(word >> 26) as usize]
            .iter()
            .copied()
            .find(|opcode| opcode.matches(word))
            .unwrap_or(Opcode::UNKNOWN)
    }
}

fn table() -> &'static DecodeTable {
    static TABLE: OnceLock<DecodeTable> = OnceLock::new();
    TABLE.get_or_init(DecodeTable::build)
}

/// Decodes one instruction word. Words matching no definition decode to
/// [`Opcode::UNKNOWN`].
pub fn decode_instruction(word: u32) -> Instruction {
    Instruction::new(word, table().lookup(word))
}

/// Decodes a sequence of big-endian instruction words.
pub fn decode_instructions(bytes: &[u8]) -> Vec<Instruction> {
    bytes
        .chunks_exact(4)
        .map(|chunk| decode_instruction(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect()
}
