use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::{debug, instrument, trace};

use crate::candidate::Repr;
use crate::error::Error;
use crate::labels;
use crate::romaddr::{self, Mapping};
use crate::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
	Text,
	Data,
	Zero,
	Bss,
}

impl Segment {
	pub const ALL: [Segment; 4] = [Self::Text, Self::Data, Self::Zero, Self::Bss];

	fn index(self) -> usize {
		self as usize
	}

	/// TEXT and DATA live in ROM, ZERO and BSS in RAM.
	pub fn is_rom(self) -> bool {
		matches!(self, Self::Text | Self::Data)
	}
}

impl fmt::Display for Segment {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Text => write!(f, ".text"),
			Self::Data => write!(f, ".data"),
			Self::Zero => write!(f, ".zero"),
			Self::Bss => write!(f, ".bss"),
		}
	}
}

/// A defined label: a position inside a segment, or a plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
	pub segment: Option<Segment>,
	pub value: u32,
}

/// The symbol table and segment storage the assembler core writes into.
pub trait Object {
	/// Bind `name` to the current position of the current segment.
	fn define_label(&mut self, name: &str);
	fn define_label_value(&mut self, name: &str, value: u32);
	fn undefine_label(&mut self, name: &str);
	fn find_label(&self, name: &str) -> Option<Symbol>;

	fn generate_byte(&mut self, byte: u8);
	fn set_pos(&mut self, pos: u32);
	fn pos(&self) -> u32;

	fn start_scope(&mut self);
	fn end_scope(&mut self);

	fn select(&mut self, segment: Segment);
	fn segment(&self) -> Segment;
	fn set_mapping(&mut self, mapping: Mapping);

	/// Register a deferred relocation for the bytes about to be generated.
	fn add_extern(&mut self, repr: Repr, label: &str, offset: i64);

	/// Called once per selected statement; true when the short branch
	/// emitted by this statement must be relaxed.
	fn should_flip_here(&mut self) -> bool;

	fn set_linkage_group(&mut self, group: u32);
	fn set_linkage_page(&mut self, page: u32);
}

/// Deferred relocation left for the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
	pub repr: Repr,
	pub label: Label,
	pub offset: i64,
	pub segment: Segment,
	pub pos: u32,
}

impl fmt::Display for Relocation {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let Relocation { repr, label, offset, segment, pos } = self;
		write!(f, "{segment} ${pos:06X} {repr:?} {label}")?;
		if *offset != 0 {
			write!(f, "{offset:+}")?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone)]
struct Fixup {
	reloc: Relocation,
	statement: usize,
	depth: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Linkage {
	pub group: Option<u32>,
	pub page: Option<u32>,
}

#[derive(Debug, Default)]
struct SegmentData {
	bytes: BTreeMap<u32, u8>,
	pos: u32,
}

/// In-memory object: sparse segments, scoped labels and pending fixups.
#[derive(Debug)]
pub struct ObjectFile {
	segments: [SegmentData; 4],
	current: Segment,
	scopes: Vec<HashMap<Label, Symbol>>,
	pending: Vec<Fixup>,
	relocations: Vec<Relocation>,
	linkage: Linkage,
	mapping: Mapping,
	fix_jumps: bool,

	/// Ordinal of the statement currently being emitted.
	statement: usize,
	/// Statements whose short branch must be relaxed; survives `clear_most`.
	flips: BTreeSet<usize>,
	needs_flipping: bool,
	errors: Vec<Error>,
}

impl Default for ObjectFile {
	fn default() -> Self {
		Self::new(true)
	}
}

impl ObjectFile {
	pub fn new(fix_jumps: bool) -> Self {
		Self {
			segments: Default::default(),
			current: Segment::Text,
			scopes: vec![HashMap::new()],
			pending: Vec::new(),
			relocations: Vec::new(),
			linkage: Linkage::default(),
			mapping: Mapping::default(),
			fix_jumps,
			statement: 0,
			flips: BTreeSet::new(),
			needs_flipping: false,
			errors: Vec::new(),
		}
	}

	/// Reset for another pass. Only the flip set is kept.
	pub fn clear_most(&mut self) {
		let flips = std::mem::take(&mut self.flips);
		*self = Self::new(self.fix_jumps);
		self.flips = flips;
	}

	pub fn needs_flipping(&self) -> bool {
		self.needs_flipping
	}

	/// Resolve what can still be resolved; the rest becomes relocations.
	/// Anonymous and nop labels never leave their translation unit, so an
	/// unresolved reference to one is an error instead.
	#[instrument(skip(self))]
	pub fn close_segments(&mut self) {
		for fixup in std::mem::take(&mut self.pending) {
			match self.find_label(&fixup.reloc.label) {
				Some(sym) if self.patch(&fixup, sym) => {}
				_ if labels::is_minted(&fixup.reloc.label) => {
					let label = fixup.reloc.label.to_string();
					self.errors.push(Error::UndefinedLabel { expr: label.clone(), label });
				}
				_ => {
					trace!("leaving relocation {}", fixup.reloc);
					self.relocations.push(fixup.reloc);
				}
			}
		}
	}

	pub fn take_errors(&mut self) -> Vec<Error> {
		std::mem::take(&mut self.errors)
	}

	pub fn relocations(&self) -> &[Relocation] {
		&self.relocations
	}

	pub fn linkage(&self) -> Linkage {
		self.linkage
	}

	/// Every byte of `segment`, in address order.
	pub fn bytes(&self, segment: Segment) -> Vec<u8> {
		self.segments[segment.index()].bytes.values().copied().collect()
	}

	/// Contiguous `(start, bytes)` runs of `segment`.
	pub fn runs(&self, segment: Segment) -> Vec<(u32, Vec<u8>)> {
		let mut runs: Vec<(u32, Vec<u8>)> = Vec::new();
		for (&addr, &byte) in &self.segments[segment.index()].bytes {
			match runs.last_mut() {
				Some((start, run)) if start.wrapping_add(run.len() as u32) == addr => run.push(byte),
				_ => runs.push((addr, vec![byte])),
			}
		}
		runs
	}

	fn seg(&mut self) -> &mut SegmentData {
		&mut self.segments[self.current.index()]
	}

	fn address(&self, sym: Symbol) -> i64 {
		match sym.segment {
			Some(seg) if seg.is_rom() => romaddr::rom_to_snes(sym.value, self.mapping) as i64,
			_ => sym.value as i64,
		}
	}

	fn write(&mut self, segment: Segment, pos: u32, value: i64, len: u32) {
		let bytes = &mut self.segments[segment.index()].bytes;
		for n in 0..len {
			bytes.insert(pos.wrapping_add(n), (value >> (8 * n)) as u8);
		}
	}

	/// Patch a fixup against its symbol. False when it has to stay a relocation.
	fn patch(&mut self, fixup: &Fixup, sym: Symbol) -> bool {
		let Relocation { repr, ref label, offset, segment, pos } = fixup.reloc;
		match repr {
			Repr::Rel8 | Repr::Rel16 => {
				if sym.segment != Some(segment) {
					return false;
				}
				let len: u32 = if repr == Repr::Rel8 { 1 } else { 2 };
				let distance = sym.value as i64 + offset - (pos as i64 + len as i64);
				if repr == Repr::Rel8 && !(-128..=127).contains(&distance) {
					if !self.fix_jumps {
						self.errors.push(Error::BranchOutOfRange {
							label: label.to_string(),
							distance,
						});
					} else if self.flips.insert(fixup.statement) {
						debug!("statement {} branch to '{label}' needs relaxing ({distance})", fixup.statement);
						self.needs_flipping = true;
					}
				}
				self.write(segment, pos, distance, len);
			}
			Repr::LowByte => self.write(segment, pos, self.address(sym) + offset, 1),
			Repr::HighByte => self.write(segment, pos, (self.address(sym) + offset) >> 8, 1),
			Repr::SegByte => self.write(segment, pos, (self.address(sym) + offset) >> 16, 1),
			Repr::AbsWord => self.write(segment, pos, self.address(sym) + offset, 2),
			Repr::Long => self.write(segment, pos, self.address(sym) + offset, 3),
		}
		true
	}
}

impl Object for ObjectFile {
	fn define_label(&mut self, name: &str) {
		let sym = Symbol {
			segment: Some(self.current),
			value: self.pos(),
		};
		trace!("label '{name}' = {}:${:06X}", self.current, sym.value);
		if let Some(scope) = self.scopes.last_mut() {
			scope.insert(name.into(), sym);
		}
	}

	fn define_label_value(&mut self, name: &str, value: u32) {
		trace!("label '{name}' = ${value:X}");
		if let Some(scope) = self.scopes.last_mut() {
			scope.insert(name.into(), Symbol { segment: None, value });
		}
	}

	fn undefine_label(&mut self, name: &str) {
		for scope in &mut self.scopes {
			scope.remove(name);
		}
	}

	fn find_label(&self, name: &str) -> Option<Symbol> {
		self.scopes
			.iter()
			.rev()
			.find_map(|scope| scope.get(name).copied())
	}

	fn generate_byte(&mut self, byte: u8) {
		let seg = self.seg();
		seg.bytes.insert(seg.pos, byte);
		seg.pos = seg.pos.wrapping_add(1);
	}

	fn set_pos(&mut self, pos: u32) {
		self.seg().pos = pos;
	}

	fn pos(&self) -> u32 {
		self.segments[self.current.index()].pos
	}

	fn start_scope(&mut self) {
		self.scopes.push(HashMap::new());
	}

	fn end_scope(&mut self) {
		if self.scopes.len() <= 1 {
			return;
		}
		let depth = self.scopes.len();
		let Some(scope) = self.scopes.pop() else { return };

		for mut fixup in std::mem::take(&mut self.pending) {
			if fixup.depth >= depth {
				if let Some(&sym) = scope.get(&fixup.reloc.label) {
					if self.patch(&fixup, sym) {
						continue;
					}
				}
				fixup.depth = depth - 1;
			}
			self.pending.push(fixup);
		}
	}

	fn select(&mut self, segment: Segment) {
		self.current = segment;
	}

	fn segment(&self) -> Segment {
		self.current
	}

	fn set_mapping(&mut self, mapping: Mapping) {
		self.mapping = mapping;
	}

	fn add_extern(&mut self, repr: Repr, label: &str, offset: i64) {
		let reloc = Relocation {
			repr,
			label: label.into(),
			offset,
			segment: self.current,
			pos: self.pos(),
		};
		trace!("extern {reloc}");
		self.pending.push(Fixup {
			reloc,
			statement: self.statement,
			depth: self.scopes.len(),
		});
	}

	fn should_flip_here(&mut self) -> bool {
		self.statement += 1;
		self.flips.contains(&self.statement)
	}

	fn set_linkage_group(&mut self, group: u32) {
		self.linkage.group = Some(group);
	}

	fn set_linkage_page(&mut self, page: u32) {
		self.linkage.page = Some(page);
	}
}
