//! 65816 (SNES) assembler core.
//!
//! Every statement is matched against all addressing-mode rows of its
//! mnemonic, one encoding is selected, and its bytes are written into an
//! [`Object`]. Short branches that turn out to be out of range are relaxed
//! on a second pass.

use std::rc::Rc;

use tracing::{info, instrument};

mod candidate;
mod driver;
mod emit;
mod error;
mod expr;
mod labels;
mod object;
mod relax;
mod romaddr;
mod select;
mod table;

pub use candidate::Repr;
pub use driver::{split_statements, AsmState, Assembler};
pub use error::{Diagnostics, Error};
pub use object::{Linkage, Object, ObjectFile, Relocation, Segment, Symbol};
pub use romaddr::{rom_to_snes, snes_to_rom, Mapping};

/// Interned label name.
pub type Label = Rc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
	/// Relax out-of-range short branches instead of reporting them.
	pub fix_jumps: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self { fix_jumps: true }
	}
}

#[derive(Debug)]
pub struct Output {
	pub object: ObjectFile,
	pub errors: Vec<Error>,
}

impl Output {
	pub fn failed(&self) -> bool {
		!self.errors.is_empty()
	}
}

/// Assemble `sources` as consecutive translation units into one object.
///
/// When the first pass finds short branches that cannot reach, everything
/// is thrown away and assembled once more with those branches relaxed. A
/// pass after that is not attempted.
#[instrument(skip_all, fields(sources = sources.len()))]
pub fn assemble(sources: &[&str], options: Options) -> Output {
	let mut obj = ObjectFile::new(options.fix_jumps);
	let mut asm = Assembler::new();
	let mut reprocessed = false;

	loop {
		obj.clear_most();
		asm.begin_pass();
		for source in sources {
			asm.assemble_source(&mut obj, source);
		}
		obj.close_segments();
		for err in obj.take_errors() {
			asm.report(err);
		}

		if !obj.needs_flipping() {
			break;
		}
		if reprocessed {
			asm.report(Error::ThreePass);
			break;
		}
		info!("short branches out of range, assembling again");
		reprocessed = true;
	}

	Output {
		object: obj,
		errors: asm.into_diagnostics().into_errors(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn text(source: &str) -> Output {
		assemble(&[source], Options::default())
	}

	macro_rules! test_output {
		($name:ident, $source:expr, $bytes:expr) => {
			#[test_log::test]
			fn $name() {
				let output = text($source);
				assert!(output.errors.is_empty(), "{:?}", output.errors);
				assert_eq!(output.object.bytes(Segment::Text), $bytes);
			}
		};
	}

	test_output!(implied, "nop\nrts", [0xEA, 0x60]);
	test_output!(byte_list, ".byt 1, 2, \"AB\", 3", [0x01, 0x02, 0x41, 0x42, 0x03]);
	test_output!(word_list, ".word $1234", [0x34, 0x12]);
	test_output!(long_list, ".long $010203", [0x03, 0x02, 0x01]);
	test_output!(accumulator_width, ".as\nlda #$12\n.al\nlda #$12", [0xA9, 0x12, 0xA9, 0x12, 0x00]);
	test_output!(index_width, ".xs\nldx #1\nldy #2", [0xA2, 0x01, 0xA0, 0x02]);
	test_output!(direct_page_constant, "lda $12,x", [0xB5, 0x12]);
	test_output!(absolute_constant, "lda $1234,y", [0xB9, 0x34, 0x12]);
	test_output!(long_constant, "lda $7E1234", [0xAF, 0x34, 0x12, 0x7E]);
	test_output!(indirect_long, "lda [$10],y", [0xB7, 0x10]);
	test_output!(stack_relative, "cmp ($03,s),y", [0xD3, 0x03]);
	test_output!(block_move, "mvn $7E,$7F", [0x54, 0x7E, 0x7F]);
	test_output!(forced_long, "lda @$12", [0xAF, 0x12, 0x00, 0x00]);
	test_output!(backward_branch, "-\nnop\nbne -", [0xEA, 0xD0, 0xFD]);
	test_output!(forward_branch, "beq +\nnop\n+ rts", [0xF0, 0x01, 0xEA, 0x60]);
	test_output!(nested_anonymous, "-- dex\n- dey\nbne -\nbne --", [0xCA, 0x88, 0xD0, 0xFD, 0xD0, 0xFA]);
	test_output!(statements_on_one_line, "loop: dex : bne loop ; count down", [0xCA, 0xD0, 0xFD]);
	test_output!(gcc_line_markers, "# 1 \"file.s\"\nnop", [0xEA]);
	test_output!(jump_highrom, "jmp there\nthere: rts", [0x4C, 0x03, 0x00, 0x60]);
	test_output!(jump_long_highrom, "jml there\nthere: rts", [0x5C, 0x04, 0x00, 0xC0, 0x60]);
	test_output!(
		jump_lowrom,
		".lowrom\n*= $008000\njsr there\nthere: rts",
		[0x20, 0x03, 0x80, 0x60]
	);
	test_output!(spaced_negation, ".as\nlda #- 1", [0xA9, 0xFF]);
	test_output!(nop_short_run, ".nop 5", [0x80, 0x03, 0xEA, 0xEA, 0xEA]);
	test_output!(scoped_labels, ".(\nx: nop\nbra x\n.)\n.(\nx: bra x\n.)", [0xEA, 0x80, 0xFD, 0x80, 0xFE]);

	#[test_log::test]
	fn long_nop_run() {
		let output = text(".nop 200");
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		let bytes = output.object.bytes(Segment::Text);
		assert_eq!(bytes.len(), 200);
		assert_eq!(bytes[..3], [0x82, 0xC5, 0x00]);
		assert!(bytes[3..].iter().all(|&b| b == 0xEA));
	}

	#[test_log::test]
	fn out_of_range_branch_is_relaxed() {
		let output = text("beq far\n.nop 200\nfar: rts");
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		let bytes = output.object.bytes(Segment::Text);
		assert_eq!(bytes[..8], [0xD0, 0x03, 0x82, 0xC8, 0x00, 0x82, 0xC5, 0x00]);
		assert_eq!(bytes.len(), 5 + 200 + 1);
		assert_eq!(bytes.last(), Some(&0x60));
	}

	#[test_log::test]
	fn relaxed_bra_becomes_brl() {
		let output = text("bra far\n.nop 300\nfar: rts");
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		let bytes = output.object.bytes(Segment::Text);
		assert_eq!(bytes[..3], [0x82, 0x2C, 0x01]);
	}

	#[test_log::test]
	fn without_jump_fixing_range_is_an_error() {
		let output = assemble(&["beq far\n.nop 200\nfar: rts"], Options { fix_jumps: false });
		assert_eq!(
			output.errors,
			[Error::BranchOutOfRange { label: "far".into(), distance: 200 }]
		);
	}

	#[test_log::test]
	fn third_pass_is_refused() {
		let source = ["-", " beq far", " .nop 123", " bne -", " .nop 200", "far: rts"].join("\n");
		let output = text(&source);
		assert_eq!(output.errors.last(), Some(&Error::ThreePass));
	}

	#[test_log::test]
	fn anonymous_labels_do_not_leak() {
		let output = assemble(&["- nop\nbra -", "+ nop"], Options::default());
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		assert!(output.object.find_label("$PrevBranch1$1").is_none());
		assert!(output.object.relocations().is_empty());
	}

	macro_rules! test_unbound {
		($name:ident, $source:expr, $label:literal, $bytes:expr) => {
			#[test_log::test]
			fn $name() {
				let output = text($source);
				assert_eq!(
					output.errors,
					[Error::UndefinedLabel { label: $label.into(), expr: $label.into() }]
				);
				assert!(output.object.relocations().is_empty());
				assert_eq!(output.object.bytes(Segment::Text), $bytes);
			}
		};
	}

	test_unbound!(forward_label_hidden_in_scope, "beq +\n.(\n+ rts\n.)", "$NextBranch1$1", [0xF0, 0x00, 0x60]);
	test_unbound!(backward_label_never_declared, "bne -\nrts", "$PrevBranch1$1", [0xD0, 0x00, 0x60]);

	#[test_log::test]
	fn positions_wrap_around() {
		let output = text(".bss\n*= -1\n.byt 1, 2");
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		assert_eq!(output.object.runs(Segment::Bss), [(0, vec![2]), (u32::MAX, vec![1])]);
	}

	#[test_log::test]
	fn unknown_labels_are_left_to_the_linker() {
		let output = text("jsl elsewhere\nlda table+2,x");
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		let relocs: Vec<_> = output.object.relocations().iter().map(ToString::to_string).collect();
		assert_eq!(relocs, [".text $000001 Long elsewhere", ".text $000005 AbsWord table+2"]);
	}

	#[test_log::test]
	fn segments_and_linkage() {
		let output = text(".data\n.byt 1\n.text\n.byt 2\n.link group 3\n.link page $FF");
		assert!(output.errors.is_empty(), "{:?}", output.errors);
		assert_eq!(output.object.bytes(Segment::Data), [1]);
		assert_eq!(output.object.bytes(Segment::Text), [2]);
		assert_eq!(output.object.linkage(), Linkage { group: Some(3), page: Some(0xFF) });
	}

	#[test_log::test]
	fn errors_do_not_stop_assembly() {
		let output = text("lda #1,q\nlda ($12\nrts");
		assert_eq!(output.errors.len(), 2);
		assert!(output.failed());
		assert_eq!(output.object.bytes(Segment::Text), [0x60]);
	}

	#[test_log::test]
	fn unsupported_operand_shape() {
		let output = text("lda a+b");
		assert_eq!(
			output.errors,
			[Error::UnsupportedExpression { reason: "more than one label", expr: "a+b".into() }]
		);
		assert_eq!(output.object.bytes(Segment::Text), [0xAD]);
	}
}
