use std::fmt;

use tracing::{instrument, trace};

use crate::driver::Assembler;
use crate::error::Error;
use crate::expr::{self, Expr};
use crate::object::Object;
use crate::table::{Mnemonic, Mode, Piece, Row, Special};

/// How a parameter's value is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
	LowByte,
	HighByte,
	SegByte,
	AbsWord,
	Long,
	Rel8,
	Rel16,
}

impl Repr {
	/// Number of bytes written.
	pub fn size(self) -> u8 {
		match self {
			Self::LowByte | Self::HighByte | Self::SegByte | Self::Rel8 => 1,
			Self::AbsWord | Self::Rel16 => 2,
			Self::Long => 3,
		}
	}

	fn prefix(self) -> &'static str {
		match self {
			Self::LowByte => "<",
			Self::HighByte => ">",
			Self::SegByte => "^",
			Self::AbsWord => "!",
			Self::Long => "@",
			Self::Rel8 | Self::Rel16 => "",
		}
	}
}

/// Tri-state answer of "can this be encoded like that".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
	Yes,
	Maybe,
	No,
}

impl Fit {
	pub fn and(self, other: Fit) -> Fit {
		match (self, other) {
			(Self::No, _) | (_, Self::No) => Self::No,
			(Self::Maybe, _) | (_, Self::Maybe) => Self::Maybe,
			_ => Self::Yes,
		}
	}
}

impl From<bool> for Fit {
	fn from(value: bool) -> Self {
		if value { Self::Yes } else { Self::No }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
	pub expr: Expr,
	repr: Option<Repr>,
}

impl Param {
	pub fn new(expr: Expr) -> Self {
		Self { expr, repr: None }
	}

	pub fn forced(expr: Expr, repr: Repr) -> Self {
		Self { expr, repr: Some(repr) }
	}

	pub fn repr(&self) -> Option<Repr> {
		self.repr
	}

	/// Set the representation unless one is already set.
	pub fn force(&mut self, repr: Repr) {
		self.repr.get_or_insert(repr);
	}

	/// Whether the value can be written in `width` bytes.
	pub fn fits(&self, width: u8) -> Fit {
		match self.repr {
			Some(Repr::Rel8 | Repr::Rel16) => Fit::Yes,
			Some(repr) => Fit::from(repr.size() == width),
			None => match self.expr.as_const() {
				Some(value) => Fit::from(match width {
					1 => (-0x80..=0xFF).contains(&value),
					2 => (-0x8000..=0xFFFF).contains(&value),
					3 => (0..=0xFF_FFFF).contains(&value),
					_ => false,
				}),
				None => Fit::Maybe,
			},
		}
	}
}

impl fmt::Display for Param {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let prefix = self.repr.map_or("", Repr::prefix);
		write!(f, "{prefix}{}", self.expr)
	}
}

/// One possible encoding of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub params: Vec<(u8, Param)>,
	pub certain: bool,
}

impl Candidate {
	pub fn new(certain: bool) -> Self {
		Self { params: Vec::new(), certain }
	}

	pub fn push(&mut self, width: u8, param: Param) {
		self.params.push((width, param));
	}

	pub fn push_const(&mut self, byte: u8) {
		self.push(1, Param::new(Expr::Number(byte as i64)));
	}

	/// Encoded size in bytes.
	pub fn width(&self) -> usize {
		self.params.iter().map(|(width, _)| *width as usize).sum()
	}
}

impl fmt::Display for Candidate {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (width, param) in &self.params {
			write!(f, " ({width}){param}")?;
		}
		Ok(())
	}
}

/// Position over operand text with checkpoint/rollback.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
	text: &'a str,
	pos: usize,
}

impl<'a> Cursor<'a> {
	pub fn new(text: &'a str) -> Self {
		Self { text, pos: 0 }
	}

	pub fn rest(&self) -> &'a str {
		&self.text[self.pos..]
	}

	pub fn checkpoint(&self) -> usize {
		self.pos
	}

	pub fn rollback(&mut self, checkpoint: usize) {
		self.pos = checkpoint;
	}

	pub fn advance(&mut self, len: usize) {
		self.pos = (self.pos + len).min(self.text.len());
	}

	pub fn skip_space(&mut self) {
		let rest = self.rest();
		self.pos += rest.len() - rest.trim_start().len();
	}

	pub fn at_end(&mut self) -> bool {
		self.skip_space();
		self.rest().is_empty()
	}

	pub fn peek(&self) -> Option<char> {
		self.rest().chars().next()
	}

	pub fn next_char(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.pos += c.len_utf8();
		Some(c)
	}

	pub fn eat(&mut self, c: char) -> bool {
		self.skip_space();
		if self.rest().starts_with(c) {
			self.pos += c.len_utf8();
			true
		} else {
			false
		}
	}

	/// Case-insensitive whole word.
	pub fn eat_word(&mut self, word: &str) -> bool {
		self.skip_space();
		let rest = self.rest();
		let Some(head) = rest.get(..word.len()) else {
			return false;
		};
		let joined = rest[word.len()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_');
		if head.eq_ignore_ascii_case(word) && !joined {
			self.pos += word.len();
			true
		} else {
			false
		}
	}
}

impl Assembler {
	/// Try every row of `mnemonic` against `operand`.
	///
	/// Directive rows apply their effect on the spot; opcode rows each add a
	/// candidate. Reports a syntax error when no row accepts the operand.
	#[instrument(skip(self, obj, mnemonic), fields(token = mnemonic.token))]
	pub(crate) fn candidates(&mut self, obj: &mut dyn Object, mnemonic: &Mnemonic, operand: &str) -> Vec<Candidate> {
		let mut cursor = Cursor::new(operand);
		let mut candidates = Vec::new();
		let mut something_ok = false;

		for row in mnemonic.rows {
			let checkpoint = cursor.checkpoint();
			let attempt = self.match_row(&*obj, row, &mut cursor);
			cursor.rollback(checkpoint);

			let Some((params, fit)) = attempt else { continue };
			if fit == Fit::No {
				continue;
			}
			something_ok = true;

			let candidate = match row.special {
				Special::Opcode(op) => {
					let mut candidate = Candidate::new(fit == Fit::Yes);
					candidate.push_const(op);
					let sizes = row.mode.operand_sizes(self.state.a_16bit, self.state.x_16bit);
					for (param, &width) in params.into_iter().zip(sizes) {
						candidate.push(width, param);
					}
					candidate
				}
				special => match self.directive(obj, row.mode, special, params, fit) {
					Some(candidate) => candidate,
					None => continue,
				},
			};

			trace!(
				"{} {:?} ({} bytes):{candidate}",
				if candidate.certain { "Is" } else { "Could be" },
				row.mode,
				candidate.width(),
			);
			candidates.push(candidate);
		}

		if !something_ok {
			self.diag.report(Error::NoMatchingMode {
				mnemonic: mnemonic.token.to_owned(),
				operand: operand.trim().to_owned(),
			});
		}
		candidates
	}

	/// Parse `row`'s syntax. None when the text does not have that shape.
	fn match_row(&mut self, obj: &dyn Object, row: &Row, cursor: &mut Cursor) -> Option<(Vec<Param>, Fit)> {
		let sizes = row.mode.operand_sizes(self.state.a_16bit, self.state.x_16bit);
		let mut params = Vec::new();
		let mut fit = Fit::Yes;

		if row.mode == Mode::Implied && matches!(row.special, Special::Opcode(_)) {
			cursor.eat_word("a");
		}

		for piece in row.mode.syntax() {
			match *piece {
				Piece::Sym(c) => {
					if !cursor.eat(c) {
						return None;
					}
				}
				Piece::Reg(reg) => {
					let mut buf = [0; 4];
					if !cursor.eat_word(reg.encode_utf8(&mut buf)) {
						return None;
					}
				}
				Piece::Keyword(word) => {
					if !cursor.eat_word(word) {
						return None;
					}
				}
				Piece::Expr => {
					cursor.skip_space();
					let (mut param, consumed) = expr::parse_operand(cursor.rest(), &mut self.labels, obj.pos())?;
					cursor.advance(consumed);
					param.expr = param.expr.with_values(obj);

					let rel = match row.mode {
						Mode::Rel8 => Some(Repr::Rel8),
						Mode::Rel16 => Some(Repr::Rel16),
						_ => None,
					};
					if let Some(rel) = rel {
						param.force(rel);
						if param.repr() != Some(rel) {
							fit = Fit::No;
						}
					}

					let width = sizes.get(params.len()).copied().unwrap_or(0);
					fit = fit.and(param.fits(width));
					params.push(param);
				}
			}
		}

		if !cursor.at_end() {
			return None;
		}
		Some((params, fit))
	}

	fn directive(
		&mut self,
		obj: &mut dyn Object,
		mode: Mode,
		special: Special,
		params: Vec<Param>,
		fit: Fit,
	) -> Option<Candidate> {
		match special {
			Special::BeginScope => obj.start_scope(),
			Special::EndScope => obj.end_scope(),
			Special::ShortA => self.state.a_16bit = false,
			Special::LongA => self.state.a_16bit = true,
			Special::ShortX => self.state.x_16bit = false,
			Special::LongX => self.state.x_16bit = true,
			Special::Select(segment) => obj.select(segment),
			Special::Linkage => {
				let value = params.first()?.expr.resolve(&*obj, &mut self.diag) as u32;
				match mode {
					Mode::LinkGroup => obj.set_linkage_group(value),
					_ => obj.set_linkage_page(value),
				}
			}
			Special::ExpandNops => return Some(self.nop_run(obj, params.first()?, fit == Fit::Yes)),
			Special::Opcode(op) => {
				self.diag.report(Error::Internal(format!("opcode ${op:02X} handled as directive")));
			}
		}
		None
	}

	/// `.nop N`: exactly N bytes, jumping over the run when that is shorter.
	fn nop_run(&mut self, obj: &mut dyn Object, count: &Param, certain: bool) -> Candidate {
		let count = count.expr.resolve(&*obj, &mut self.diag).clamp(0, u32::MAX as i64) as u32;
		let mut candidate = Candidate::new(certain);
		let mut fill = count;

		if count > 2 {
			let label = self.labels.new_nop_label();
			let here = obj.pos();
			obj.set_pos(here.wrapping_add(count));
			obj.define_label(&label);
			obj.set_pos(here);

			if count > 127 + 2 {
				candidate.push_const(0x82);
				candidate.push(2, Param::forced(Expr::Label(label), Repr::Rel16));
				fill -= 3;
			} else {
				candidate.push_const(0x80);
				candidate.push(1, Param::forced(Expr::Label(label), Repr::Rel8));
				fill -= 2;
			}
		}

		for _ in 0..fill {
			candidate.push_const(0xEA);
		}
		candidate
	}

	/// `.byt`, `.word` and `.long` lists. None after a syntax error.
	#[instrument(skip(self, obj))]
	pub(crate) fn data(&mut self, obj: &dyn Object, width: u8, operand: &str) -> Option<Candidate> {
		let mut cursor = Cursor::new(operand);
		let mut candidate = Candidate::new(true);
		let mut first = true;

		while !cursor.at_end() {
			if !first {
				cursor.eat(',');
				cursor.skip_space();
			}
			first = false;

			if width == 1 && cursor.eat('"') {
				while let Some(c) = cursor.next_char() {
					let c = match c {
						'"' => break,
						'\\' => match cursor.next_char() {
							Some('n') => '\n',
							Some('r') => '\r',
							Some(c) => c,
							None => break,
						},
						c => c,
					};
					candidate.push(1, Param::new(Expr::Number(c as i64)));
				}
				continue;
			}

			let here = obj.pos().wrapping_add(candidate.width() as u32);
			let parsed = expr::parse_operand(cursor.rest(), &mut self.labels, here);
			let Some((mut param, consumed)) = parsed else {
				self.diag.report(Error::Syntax(cursor.rest().to_owned()));
				return None;
			};
			param.expr = param.expr.with_values(obj);
			if param.fits(width) == Fit::No {
				self.diag.report(Error::Syntax(cursor.rest().to_owned()));
				return None;
			}
			cursor.advance(consumed);
			candidate.push(width, param);
		}
		Some(candidate)
	}
}
