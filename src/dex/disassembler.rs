//! Linear sweep over an instruction stream.

use std::sync::Arc;

use log::error;

use crate::dex::instructions::{decode_one, Instruction};
use crate::dex::opcodes::OpcodeTable;

/// Decodes instructions back to back from `bytes[start..end]`.
///
/// Payload pseudo-instructions are yielded in place and skipped over by their
/// full length. The first decode failure is logged and ends the sweep; the
/// instructions seen so far stay valid.
pub struct LinearSweep<'a> {
    table: Arc<OpcodeTable>,
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    failed: bool,
}

impl<'a> LinearSweep<'a> {
    pub fn new(table: Arc<OpcodeTable>, bytes: &'a [u8], start: usize, size: usize) -> Self {
        let end = start.saturating_add(size).min(bytes.len());
        LinearSweep { table, bytes, pos: start, end, failed: false }
    }

    /// Whether the sweep stopped on an undecodable instruction.
    pub fn failed(&self) -> bool {
        self.failed
    }
}

impl Iterator for LinearSweep<'_> {
    /// Byte offset of the instruction within the swept buffer, and the
    /// instruction itself.
    type Item = (usize, Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.end {
            return None;
        }
        match decode_one(&self.table, &self.bytes[..self.end], self.pos) {
            Ok(ins) => {
                let at = self.pos;
                self.pos += ins.get_length().max(2);
                Some((at, ins))
            }
            Err(e) => {
                error!("linear sweep stopped at 0x{:x}: {}", self.pos, e);
                self.failed = true;
                None
            }
        }
    }
}

/// Decodes a whole `insns` array, returning `(offset, instruction)` pairs with
/// offsets in bytes from the start of the array.
pub fn disassemble_insns(table: Arc<OpcodeTable>, insns: &[u8]) -> Vec<(usize, Instruction)> {
    LinearSweep::new(table, insns, 0, insns.len()).collect()
}
