use tracing::{instrument, trace};

use crate::candidate::{Candidate, Cursor};
use crate::emit::emit;
use crate::error::{Diagnostics, Error};
use crate::expr;
use crate::labels::AnonLabels;
use crate::object::{Object, Segment};
use crate::relax::relax;
use crate::romaddr::{self, Mapping};
use crate::select::select;
use crate::table;

/// Register widths as set by `.as`/`.al`/`.xs`/`.xl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsmState {
	pub a_16bit: bool,
	pub x_16bit: bool,
}

impl Default for AsmState {
	fn default() -> Self {
		Self {
			a_16bit: true,
			x_16bit: true,
		}
	}
}

/// Statement-level assembler. Holds everything that lives longer than one
/// statement except the object itself.
#[derive(Debug, Default)]
pub struct Assembler {
	pub(crate) state: AsmState,
	pub(crate) labels: AnonLabels,
	pub(crate) diag: Diagnostics,
}

fn is_delimiter(c: char) -> bool {
	matches!(c, ':' | '\n' | '\r')
}

/// Split a line into statements. Delimiters and `;` inside double quotes do
/// not count; a backslash inside quotes escapes the next character.
pub fn split_statements(line: &str) -> Vec<&str> {
	fn push<'a>(statements: &mut Vec<&'a str>, text: &'a str) {
		if !text.trim().is_empty() {
			statements.push(text);
		}
	}

	let mut statements = Vec::new();

	let mut start = 0;
	let mut quote = false;
	let mut chars = line.char_indices().peekable();
	while let Some((i, c)) = chars.next() {
		match c {
			'\\' if quote => {
				chars.next();
			}
			'"' => quote = !quote,
			'\'' if !quote => {
				// character literal, e.g. ';'
				if let Some(&(_, lit)) = chars.peek() {
					let mut ahead = chars.clone();
					ahead.next();
					if lit != '\'' && matches!(ahead.peek(), Some((_, '\''))) {
						chars.next();
						chars.next();
					}
				}
			}
			';' if !quote => {
				push(&mut statements, &line[start..i]);
				return statements;
			}
			c if !quote && is_delimiter(c) => {
				push(&mut statements, &line[start..i]);
				start = i + c.len_utf8();
			}
			_ => {}
		}
	}
	push(&mut statements, &line[start..]);
	statements
}

/// Label, mnemonic or directive at the start of `cursor`.
fn read_token<'a>(cursor: &mut Cursor<'a>) -> &'a str {
	cursor.skip_space();
	let rest = cursor.rest();
	let word = |c: char| c.is_ascii_alphanumeric() || c == '_';

	let len = match rest.chars().next() {
		Some(sigil @ ('+' | '-')) => rest.len() - rest.trim_start_matches(sigil).len(),
		Some('*') => 1,
		Some('.') => {
			let tail = &rest[1..];
			1 + tail
				.find(|c: char| !(word(c) || c.is_ascii_punctuation()))
				.unwrap_or(tail.len())
		}
		Some(c) if c.is_ascii_alphabetic() || c == '_' => rest.find(|c: char| !word(c)).unwrap_or(rest.len()),
		_ => 0,
	};
	cursor.advance(len);
	&rest[..len]
}

impl Assembler {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> AsmState {
		self.state
	}

	pub fn diagnostics(&self) -> &Diagnostics {
		&self.diag
	}

	pub fn into_diagnostics(self) -> Diagnostics {
		self.diag
	}

	pub fn report(&mut self, err: Error) {
		self.diag.report(err);
	}

	/// Fresh register widths and diagnostics; anonymous label counters
	/// keep running so names stay unique across passes.
	pub fn begin_pass(&mut self) {
		self.state = AsmState::default();
		self.diag = Diagnostics::default();
	}

	/// One translation unit: its own label scope, TEXT selected, anonymous
	/// labels purged at the end. Lines starting with `#` are skipped.
	#[instrument(skip_all)]
	pub fn assemble_source(&mut self, obj: &mut dyn Object, source: &str) {
		obj.start_scope();
		obj.select(Segment::Text);
		for line in source.lines() {
			if line.starts_with('#') {
				continue;
			}
			self.assemble_line(obj, line);
		}
		obj.end_scope();
		self.labels.purge_run(obj);
	}

	pub fn assemble_line(&mut self, obj: &mut dyn Object, line: &str) {
		for statement in split_statements(line) {
			self.assemble_statement(obj, statement);
		}
	}

	#[instrument(skip(self, obj))]
	fn assemble_statement(&mut self, obj: &mut dyn Object, text: &str) {
		let mut cursor = Cursor::new(text);

		loop {
			let token = read_token(&mut cursor);
			cursor.skip_space();

			if token.starts_with('+') {
				self.labels.declare_next(token.len(), obj);
				continue;
			}
			if token.starts_with('-') {
				self.labels.declare_previous(token.len(), obj);
				continue;
			}

			let lower = token.to_ascii_lowercase();
			if let Some(mnemonic) = table::lookup(&lower) {
				let candidates = self.candidates(obj, mnemonic, cursor.rest());
				self.finish(obj, candidates);
				return;
			}

			match lower.as_str() {
				".lowrom" => obj.set_mapping(Mapping::LowRom),
				".lowrom2" => obj.set_mapping(Mapping::LowRomFast),
				".highrom" => obj.set_mapping(Mapping::HighRom),
				".incbin" => self.diag.report(Error::Unsupported("incbin")),
				".byt" | ".word" | ".long" => {
					let width = match lower.as_str() {
						".byt" => 1,
						".word" => 2,
						_ => 3,
					};
					if let Some(candidate) = self.data(&*obj, width, cursor.rest()) {
						self.finish(obj, vec![candidate]);
					}
				}
				_ if !token.is_empty() && !token.starts_with('.') => {
					if cursor.peek() == Some('=') {
						cursor.next_char();
						if !self.assign(obj, token, &mut cursor) {
							return;
						}
					} else {
						if token == "*" {
							self.diag.report(Error::StarLabel);
						}
						obj.define_label(token);
					}
					continue;
				}
				_ => {
					if !cursor.at_end() {
						self.diag.report(Error::UnknownStatement {
							rest: cursor.rest().to_owned(),
							previous: token.to_owned(),
						});
					}
				}
			}
			return;
		}
	}

	/// `name = expr`, or `*= expr` to move the position. The right side
	/// must be constant now.
	fn assign(&mut self, obj: &mut dyn Object, name: &str, cursor: &mut Cursor) -> bool {
		cursor.skip_space();
		let Some((param, consumed)) = expr::parse_operand(cursor.rest(), &mut self.labels, obj.pos()) else {
			self.diag.report(Error::Syntax(cursor.rest().to_owned()));
			return false;
		};
		cursor.advance(consumed);
		let value = param.expr.resolve(&*obj, &mut self.diag) as u32;

		if name == "*" {
			let pos = if obj.segment().is_rom() {
				romaddr::snes_to_rom(value)
			} else {
				value
			};
			trace!("*= ${value:06X} -> {} ${pos:06X}", obj.segment());
			obj.set_pos(pos);
		} else {
			obj.define_label_value(name, value);
		}
		true
	}

	/// Select, relax if the object asks for it, emit.
	fn finish(&mut self, obj: &mut dyn Object, mut candidates: Vec<Candidate>) {
		if candidates.is_empty() {
			return;
		}
		let mut chosen = match select(&candidates) {
			Ok(index) => candidates.swap_remove(index),
			Err(err) => {
				self.diag.report(err);
				return;
			}
		};

		if obj.should_flip_here() {
			if let Err(err) = relax(&mut chosen) {
				self.diag.report(err);
			}
		}
		emit(obj, &chosen, &mut self.diag);
	}
}
