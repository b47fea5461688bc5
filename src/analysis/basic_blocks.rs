//! Basic-block decomposition of a method body.
//!
//! Offsets are byte offsets inside the method's `insns` array. A block is
//! closed after every branching instruction (`if-*`, `goto*`, switches,
//! `return*`, `throw`) and before every instruction that is a branch target,
//! a try start or a handler start.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use log::{debug, warn};

use crate::dex::class_manager::ClassManager;
use crate::dex::code::CodeItem;
use crate::dex::disassembler::disassemble_insns;
use crate::dex::instructions::{decode_one, Instruction, Payload};
use crate::dex::opcodes::OpcodeTable;

/// Position of a block inside its [`BasicBlocks`].
pub type BlockId = usize;

/// A control-flow edge between two blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Offset of the last instruction of the source block.
    pub ins_offset: usize,
    /// Offset the edge lands on.
    pub target: usize,
    /// The block on the other end: the successor for `get_next`, the
    /// predecessor for `get_prev`.
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchTarget {
    /// Caught type descriptor, `"any"` for a catch-all.
    pub exception_type: String,
    pub addr: usize,
    pub block: Option<BlockId>,
    block_name: Option<String>,
}

/// One try range with its handlers. `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionAnalysis {
    pub start: usize,
    pub end: usize,
    pub handlers: Vec<CatchTarget>,
}

impl ExceptionAnalysis {
    pub fn new(start: usize, end: usize, handlers: Vec<(String, usize)>) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|(exception_type, addr)| CatchTarget { exception_type, addr, block: None, block_name: None })
            .collect();
        ExceptionAnalysis { start, end, handlers }
    }

    fn intersects(&self, start: usize, end: usize) -> bool {
        self.start <= end && start <= self.end
    }

    pub fn show_buff(&self) -> String {
        let mut buff = format!("{:x}:{:x}\n", self.start, self.end);
        for h in &self.handlers {
            let target = h.block_name.as_deref().unwrap_or("None");
            let _ = writeln!(buff, "\t({} -> {:x} {})", h.exception_type, h.addr, target);
        }
        buff.pop();
        buff
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    name: String,
    start: usize,
    end: usize,
    last_length: usize,
    instructions: Vec<(usize, Instruction)>,
    special_ins: BTreeMap<usize, Instruction>,
    childs: Vec<Edge>,
    fathers: Vec<Edge>,
    exception: Option<usize>,
    notes: Vec<String>,
}

impl BasicBlock {
    fn new(method_name: &str, start: usize) -> Self {
        BasicBlock {
            name: format!("{}-BB@0x{:x}", method_name, start),
            start,
            end: start,
            last_length: 0,
            instructions: Vec::new(),
            special_ins: BTreeMap::new(),
            childs: Vec::new(),
            fathers: Vec::new(),
            exception: None,
            notes: Vec::new(),
        }
    }

    fn push(&mut self, idx: usize, ins: Instruction, insns: &[u8], table: &OpcodeTable) {
        self.last_length = ins.get_length();
        self.end += self.last_length;
        if matches!(ins.get_op_value(), 0x26 | 0x2b | 0x2c) {
            if let Some(payload) = payload_for(&ins, idx, insns, table) {
                self.special_ins.insert(idx, payload);
            }
        }
        self.instructions.push((idx, ins));
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_start(&self) -> usize {
        self.start
    }

    /// One past the last byte of the block.
    pub fn get_end(&self) -> usize {
        self.end
    }

    pub fn get_instructions(&self) -> &[(usize, Instruction)] {
        &self.instructions
    }

    pub fn get_nb_instructions(&self) -> usize {
        self.instructions.len()
    }

    pub fn get_last(&self) -> Option<&Instruction> {
        self.instructions.last().map(|(_, ins)| ins)
    }

    pub fn get_last_length(&self) -> usize {
        self.last_length
    }

    pub fn get_next(&self) -> &[Edge] {
        &self.childs
    }

    pub fn get_prev(&self) -> &[Edge] {
        &self.fathers
    }

    /// Payload of the `fill-array-data` or switch instruction at `idx`.
    pub fn get_special_ins(&self, idx: usize) -> Option<&Instruction> {
        self.special_ins.get(&idx)
    }

    /// Index of the covering try range in [`BasicBlocks::get_exceptions`].
    pub fn exception_index(&self) -> Option<usize> {
        self.exception
    }

    pub fn get_notes(&self) -> &[String] {
        &self.notes
    }

    pub fn set_notes(&mut self, value: &str) {
        self.notes = vec![value.to_string()];
    }

    pub fn add_note(&mut self, note: &str) {
        self.notes.push(note.to_string());
    }

    pub fn clear_notes(&mut self) {
        self.notes.clear();
    }

    pub fn show(&self) -> String {
        let mut s = format!("{}: {:04x} - {:04x}\n", self.name, self.start, self.end);
        for note in &self.notes {
            s.push_str(note);
            s.push('\n');
        }
        s.push_str(&"=".repeat(20));
        s
    }
}

/// The blocks of one method, in offset order.
#[derive(Debug, Clone, Default)]
pub struct BasicBlocks {
    blocks: Vec<BasicBlock>,
    exceptions: Vec<ExceptionAnalysis>,
}

impl BasicBlocks {
    pub fn build(method_name: &str, code: &CodeItem, table: &Arc<OpcodeTable>, cm: &ClassManager) -> BasicBlocks {
        let ranges = exception_ranges(code, |idx| cm.get_type(idx));
        BasicBlocks::from_parts(method_name, &code.insns, table, ranges)
    }

    pub(crate) fn from_parts(
        method_name: &str,
        insns: &[u8],
        table: &Arc<OpcodeTable>,
        mut exceptions: Vec<ExceptionAnalysis>,
    ) -> BasicBlocks {
        let instructions = disassemble_insns(table.clone(), insns);

        let mut leaders: BTreeSet<usize> = BTreeSet::new();
        let mut branches: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, ins) in &instructions {
            if let Some(next) = successors(ins, *idx, insns, table) {
                leaders.extend(next.iter().copied());
                branches.insert(*idx, next);
            }
        }
        for e in &exceptions {
            leaders.insert(e.start);
            leaders.extend(e.handlers.iter().map(|h| h.addr));
        }

        let mut blocks = vec![BasicBlock::new(method_name, 0)];
        for (idx, ins) in instructions {
            let mut current = blocks.len() - 1;
            if leaders.contains(&idx) && !blocks[current].instructions.is_empty() {
                let start = blocks[current].end;
                blocks.push(BasicBlock::new(method_name, start));
                current += 1;
            }
            blocks[current].push(idx, ins, insns, table);
            if branches.contains_key(&idx) {
                let start = blocks[current].end;
                blocks.push(BasicBlock::new(method_name, start));
            }
        }
        if blocks.last().map_or(false, |b| b.instructions.is_empty()) {
            blocks.pop();
        }

        let mut bbs = BasicBlocks { blocks, exceptions: Vec::new() };

        for id in 0..bbs.blocks.len() {
            let block = &bbs.blocks[id];
            let last = block.end - block.last_length;
            let childs: Vec<Edge> = match branches.get(&last) {
                Some(targets) => targets
                    .iter()
                    .filter_map(|t| match bbs.block_id_at(*t) {
                        Some(b) => Some(Edge { ins_offset: last, target: *t, block: b }),
                        None => {
                            debug!("[basicblocks] no block at 0x{:x} for branch at 0x{:x}", t, last);
                            None
                        }
                    })
                    .collect(),
                None => bbs
                    .block_id_at(block.end)
                    .map(|b| Edge { ins_offset: last, target: block.end, block: b })
                    .into_iter()
                    .collect(),
            };
            for c in &childs {
                bbs.blocks[c.block].fathers.push(Edge { ins_offset: c.ins_offset, target: c.target, block: id });
            }
            bbs.blocks[id].childs = childs;
        }

        for e in exceptions.iter_mut() {
            for h in e.handlers.iter_mut() {
                h.block = bbs.block_id_at(h.addr);
                h.block_name = h.block.map(|b| bbs.blocks[b].name.clone());
            }
        }
        for block in bbs.blocks.iter_mut() {
            if block.end > block.start {
                block.exception = exceptions.iter().position(|e| e.intersects(block.start, block.end - 1));
            }
        }
        bbs.exceptions = exceptions;
        bbs
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id)
    }

    pub fn gets(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn iter(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    fn block_id_at(&self, idx: usize) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.start <= idx && idx < b.end)
    }

    /// The block containing byte offset `idx`.
    pub fn get_basic_block(&self, idx: usize) -> Option<&BasicBlock> {
        self.block_id_at(idx).map(|id| &self.blocks[id])
    }

    pub fn get_exceptions(&self) -> &[ExceptionAnalysis] {
        &self.exceptions
    }

    pub fn get_exception_analysis(&self, block: &BasicBlock) -> Option<&ExceptionAnalysis> {
        block.exception.and_then(|i| self.exceptions.get(i))
    }
}

/// Try ranges of `code` in byte offsets, catch-all first.
pub(crate) fn exception_ranges<F>(code: &CodeItem, type_name: F) -> Vec<ExceptionAnalysis>
where
    F: Fn(u32) -> String,
{
    let mut ranges = Vec::with_capacity(code.tries.len());
    for t in &code.tries {
        let handler = match code.handler_for(t) {
            Some(h) => h,
            None => {
                warn!("[basicblocks] try at 0x{:x} has no handler at +0x{:x}", t.start_addr * 2, t.handler_off);
                continue;
            }
        };
        let start = t.start_addr as usize * 2;
        let end = (start + t.insn_count as usize * 2).saturating_sub(1);
        let mut handlers = Vec::with_capacity(handler.handlers.len() + 1);
        if handler.size <= 0 {
            if let Some(addr) = handler.catch_all_addr {
                handlers.push(("any".to_string(), addr as usize * 2));
            }
        }
        for pair in &handler.handlers {
            handlers.push((type_name(pair.type_idx), pair.addr as usize * 2));
        }
        ranges.push(ExceptionAnalysis::new(start, end, handlers));
    }
    ranges
}

/// Successor offsets of a branching instruction at `idx`, `None` for an
/// instruction that does not end a block. Returns and throws end a block
/// without successors.
fn successors(ins: &Instruction, idx: usize, insns: &[u8], table: &OpcodeTable) -> Option<Vec<usize>> {
    let name = ins.get_name();
    let here = idx as i64;
    let fallthrough = here + ins.get_length() as i64;
    let target = here + ins.get_ref_off().unwrap_or(0) as i64 * 2;

    let raw = if name.starts_with("return") || name.starts_with("throw") {
        Vec::new()
    } else if name.starts_with("goto") {
        vec![target]
    } else if name.starts_with("if-") {
        vec![fallthrough, target]
    } else if name == "packed-switch" || name == "sparse-switch" {
        let mut v = vec![fallthrough];
        if let Some(payload) = payload_for(ins, idx, insns, table) {
            v.extend(payload.get_targets().iter().map(|t| here + *t as i64 * 2));
        }
        v
    } else {
        return None;
    };

    Some(
        raw.into_iter()
            .filter_map(|t| {
                if t >= 0 && (t as usize) < insns.len() {
                    Some(t as usize)
                } else {
                    debug!("[basicblocks] dropping successor {} of 0x{:x}", t, idx);
                    None
                }
            })
            .collect(),
    )
}

/// Decodes the payload a switch or `fill-array-data` at `idx` points to. A
/// misaligned payload offset is rounded up to the next 4-byte boundary.
fn payload_for(ins: &Instruction, idx: usize, insns: &[u8], table: &OpcodeTable) -> Option<Instruction> {
    let off = idx as i64 + ins.get_ref_off()? as i64 * 2;
    if off < 0 {
        warn!("[basicblocks] {} at 0x{:x} points before the code", ins.get_name(), idx);
        return None;
    }
    let mut at = off as usize;
    if at % 4 != 0 {
        let aligned = (at + 3) & !3;
        warn!("[basicblocks] misaligned payload 0x{:x} for {} at 0x{:x}, reading 0x{:x}", at, ins.get_name(), idx, aligned);
        at = aligned;
    }
    match decode_one(table, insns, at) {
        Ok(p) => {
            let fits = matches!(
                (ins.get_op_value(), p.get_payload()),
                (0x2b, Some(Payload::PackedSwitch { .. }))
                    | (0x2c, Some(Payload::SparseSwitch { .. }))
                    | (0x26, Some(Payload::FillArrayData { .. }))
            );
            if fits {
                Some(p)
            } else {
                warn!("[basicblocks] expected a payload for {} at 0x{:x}, found {}", ins.get_name(), at, p.get_name());
                None
            }
        }
        Err(e) => {
            warn!("[basicblocks] no payload for {} at 0x{:x}: {}", ins.get_name(), at, e);
            None
        }
    }
}
