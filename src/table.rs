use crate::object::Segment;

/// 65816 addressing modes, followed by the directive operand forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	/// `nop`, `asl a`
	Implied,
	/// `#imm`, width follows the A flag
	ImmA,
	/// `#imm`, width follows the X flag
	ImmX,
	/// `#imm8`
	Imm8,
	Rel8,
	Rel16,
	/// `dp`
	Dp,
	/// `dp,x`
	DpX,
	/// `dp,y`
	DpY,
	/// `(dp)`
	DpInd,
	/// `(dp,x)`
	DpXInd,
	/// `(dp),y`
	DpIndY,
	/// `[dp]`
	DpIndLong,
	/// `[dp],y`
	DpIndLongY,
	Abs,
	AbsX,
	AbsY,
	Long,
	LongX,
	/// `sr,s`
	Sr,
	/// `(sr,s),y`
	SrIndY,
	/// `(abs)`
	AbsInd,
	/// `[abs]`
	AbsIndLong,
	/// `(abs,x)`
	AbsXInd,
	/// `srcbank,dstbank`
	Move,

	/// `group n`
	LinkGroup,
	/// `page n`
	LinkPage,
	/// `n`
	NopRun,
}

/// One element of an addressing-mode syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece {
	Sym(char),
	/// Register name, matched case-insensitively as a whole word.
	Reg(char),
	Keyword(&'static str),
	Expr,
}

impl Mode {
	pub fn syntax(self) -> &'static [Piece] {
		use Piece::*;

		match self {
			Self::Implied => &[],
			Self::ImmA | Self::ImmX | Self::Imm8 => &[Sym('#'), Expr],
			Self::Rel8 | Self::Rel16 | Self::Dp | Self::Abs | Self::Long | Self::NopRun => &[Expr],
			Self::DpX | Self::AbsX | Self::LongX => &[Expr, Sym(','), Reg('x')],
			Self::DpY | Self::AbsY => &[Expr, Sym(','), Reg('y')],
			Self::DpInd | Self::AbsInd => &[Sym('('), Expr, Sym(')')],
			Self::DpXInd | Self::AbsXInd => &[Sym('('), Expr, Sym(','), Reg('x'), Sym(')')],
			Self::DpIndY => &[Sym('('), Expr, Sym(')'), Sym(','), Reg('y')],
			Self::DpIndLong | Self::AbsIndLong => &[Sym('['), Expr, Sym(']')],
			Self::DpIndLongY => &[Sym('['), Expr, Sym(']'), Sym(','), Reg('y')],
			Self::Sr => &[Expr, Sym(','), Reg('s')],
			Self::SrIndY => &[Sym('('), Expr, Sym(','), Reg('s'), Sym(')'), Sym(','), Reg('y')],
			Self::Move => &[Expr, Sym(','), Expr],
			Self::LinkGroup => &[Keyword("group"), Expr],
			Self::LinkPage => &[Keyword("page"), Expr],
		}
	}

	/// Byte widths of the operands, in syntax order.
	pub fn operand_sizes(self, a_16bit: bool, x_16bit: bool) -> &'static [u8] {
		let wide = |flag: bool| -> &'static [u8] { if flag { &[2] } else { &[1] } };

		match self {
			Self::Implied => &[],
			Self::ImmA => wide(a_16bit),
			Self::ImmX => wide(x_16bit),
			Self::Rel16 | Self::Abs | Self::AbsX | Self::AbsY => &[2],
			Self::AbsInd | Self::AbsIndLong | Self::AbsXInd | Self::NopRun => &[2],
			Self::Long | Self::LongX => &[3],
			Self::Move => &[1, 1],
			Self::LinkGroup | Self::LinkPage => &[3],
			Self::Imm8 | Self::Rel8 | Self::Dp | Self::DpX | Self::DpY => &[1],
			Self::DpInd | Self::DpXInd | Self::DpIndY | Self::DpIndLong | Self::DpIndLongY => &[1],
			Self::Sr | Self::SrIndY => &[1],
		}
	}
}

/// What a matching row does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
	Opcode(u8),
	BeginScope,
	EndScope,
	ShortA,
	LongA,
	ShortX,
	LongX,
	Select(Segment),
	Linkage,
	ExpandNops,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
	pub mode: Mode,
	pub special: Special,
}

#[derive(Debug)]
pub struct Mnemonic {
	pub token: &'static str,
	pub rows: &'static [Row],
}

macro_rules! ops {
	($($mode:ident = $op:literal),* $(,)?) => {
		&[$(Row { mode: Mode::$mode, special: Special::Opcode($op) }),*]
	};
}

macro_rules! dir {
	($($mode:ident => $special:expr),* $(,)?) => {
		&[$(Row { mode: Mode::$mode, special: $special }),*]
	};
}

macro_rules! mnemonics {
	($($token:literal : $rows:expr,)*) => {
		&[$(Mnemonic { token: $token, rows: $rows }),*]
	};
}

#[rustfmt::skip]
static TABLE: &[Mnemonic] = mnemonics! {
	"adc": ops![ImmA = 0x69, Dp = 0x65, DpX = 0x75, DpInd = 0x72, DpXInd = 0x61, DpIndY = 0x71, DpIndLong = 0x67, DpIndLongY = 0x77, Abs = 0x6D, AbsX = 0x7D, AbsY = 0x79, Long = 0x6F, LongX = 0x7F, Sr = 0x63, SrIndY = 0x73],
	"and": ops![ImmA = 0x29, Dp = 0x25, DpX = 0x35, DpInd = 0x32, DpXInd = 0x21, DpIndY = 0x31, DpIndLong = 0x27, DpIndLongY = 0x37, Abs = 0x2D, AbsX = 0x3D, AbsY = 0x39, Long = 0x2F, LongX = 0x3F, Sr = 0x23, SrIndY = 0x33],
	"asl": ops![Implied = 0x0A, Dp = 0x06, DpX = 0x16, Abs = 0x0E, AbsX = 0x1E],
	"bcc": ops![Rel8 = 0x90],
	"bcs": ops![Rel8 = 0xB0],
	"beq": ops![Rel8 = 0xF0],
	"bit": ops![ImmA = 0x89, Dp = 0x24, DpX = 0x34, Abs = 0x2C, AbsX = 0x3C],
	"bmi": ops![Rel8 = 0x30],
	"bne": ops![Rel8 = 0xD0],
	"bpl": ops![Rel8 = 0x10],
	"bra": ops![Rel8 = 0x80],
	"brk": ops![Imm8 = 0x00],
	"brl": ops![Rel16 = 0x82],
	"bvc": ops![Rel8 = 0x50],
	"bvs": ops![Rel8 = 0x70],
	"clc": ops![Implied = 0x18],
	"cld": ops![Implied = 0xD8],
	"cli": ops![Implied = 0x58],
	"clv": ops![Implied = 0xB8],
	"cmp": ops![ImmA = 0xC9, Dp = 0xC5, DpX = 0xD5, DpInd = 0xD2, DpXInd = 0xC1, DpIndY = 0xD1, DpIndLong = 0xC7, DpIndLongY = 0xD7, Abs = 0xCD, AbsX = 0xDD, AbsY = 0xD9, Long = 0xCF, LongX = 0xDF, Sr = 0xC3, SrIndY = 0xD3],
	"cop": ops![Imm8 = 0x02],
	"cpx": ops![ImmX = 0xE0, Dp = 0xE4, Abs = 0xEC],
	"cpy": ops![ImmX = 0xC0, Dp = 0xC4, Abs = 0xCC],
	"dec": ops![Implied = 0x3A, Dp = 0xC6, DpX = 0xD6, Abs = 0xCE, AbsX = 0xDE],
	"dex": ops![Implied = 0xCA],
	"dey": ops![Implied = 0x88],
	"eor": ops![ImmA = 0x49, Dp = 0x45, DpX = 0x55, DpInd = 0x52, DpXInd = 0x41, DpIndY = 0x51, DpIndLong = 0x47, DpIndLongY = 0x57, Abs = 0x4D, AbsX = 0x5D, AbsY = 0x59, Long = 0x4F, LongX = 0x5F, Sr = 0x43, SrIndY = 0x53],
	"inc": ops![Implied = 0x1A, Dp = 0xE6, DpX = 0xF6, Abs = 0xEE, AbsX = 0xFE],
	"inx": ops![Implied = 0xE8],
	"iny": ops![Implied = 0xC8],
	"jml": ops![Long = 0x5C, AbsIndLong = 0xDC],
	"jmp": ops![Abs = 0x4C, Long = 0x5C, AbsInd = 0x6C, AbsXInd = 0x7C],
	"jsl": ops![Long = 0x22],
	"jsr": ops![Abs = 0x20, AbsXInd = 0xFC],
	"lda": ops![ImmA = 0xA9, Dp = 0xA5, DpX = 0xB5, DpInd = 0xB2, DpXInd = 0xA1, DpIndY = 0xB1, DpIndLong = 0xA7, DpIndLongY = 0xB7, Abs = 0xAD, AbsX = 0xBD, AbsY = 0xB9, Long = 0xAF, LongX = 0xBF, Sr = 0xA3, SrIndY = 0xB3],
	"ldx": ops![ImmX = 0xA2, Dp = 0xA6, DpY = 0xB6, Abs = 0xAE, AbsY = 0xBE],
	"ldy": ops![ImmX = 0xA0, Dp = 0xA4, DpX = 0xB4, Abs = 0xAC, AbsX = 0xBC],
	"lsr": ops![Implied = 0x4A, Dp = 0x46, DpX = 0x56, Abs = 0x4E, AbsX = 0x5E],
	"mvn": ops![Move = 0x54],
	"mvp": ops![Move = 0x44],
	"nop": ops![Implied = 0xEA],
	"ora": ops![ImmA = 0x09, Dp = 0x05, DpX = 0x15, DpInd = 0x12, DpXInd = 0x01, DpIndY = 0x11, DpIndLong = 0x07, DpIndLongY = 0x17, Abs = 0x0D, AbsX = 0x1D, AbsY = 0x19, Long = 0x0F, LongX = 0x1F, Sr = 0x03, SrIndY = 0x13],
	"pea": ops![Abs = 0xF4],
	"pei": ops![DpInd = 0xD4],
	"per": ops![Rel16 = 0x62],
	"pha": ops![Implied = 0x48],
	"phb": ops![Implied = 0x8B],
	"phd": ops![Implied = 0x0B],
	"phk": ops![Implied = 0x4B],
	"php": ops![Implied = 0x08],
	"phx": ops![Implied = 0xDA],
	"phy": ops![Implied = 0x5A],
	"pla": ops![Implied = 0x68],
	"plb": ops![Implied = 0xAB],
	"pld": ops![Implied = 0x2B],
	"plp": ops![Implied = 0x28],
	"plx": ops![Implied = 0xFA],
	"ply": ops![Implied = 0x7A],
	"rep": ops![Imm8 = 0xC2],
	"rol": ops![Implied = 0x2A, Dp = 0x26, DpX = 0x36, Abs = 0x2E, AbsX = 0x3E],
	"ror": ops![Implied = 0x6A, Dp = 0x66, DpX = 0x76, Abs = 0x6E, AbsX = 0x7E],
	"rti": ops![Implied = 0x40],
	"rtl": ops![Implied = 0x6B],
	"rts": ops![Implied = 0x60],
	"sbc": ops![ImmA = 0xE9, Dp = 0xE5, DpX = 0xF5, DpInd = 0xF2, DpXInd = 0xE1, DpIndY = 0xF1, DpIndLong = 0xE7, DpIndLongY = 0xF7, Abs = 0xED, AbsX = 0xFD, AbsY = 0xF9, Long = 0xEF, LongX = 0xFF, Sr = 0xE3, SrIndY = 0xF3],
	"sec": ops![Implied = 0x38],
	"sed": ops![Implied = 0xF8],
	"sei": ops![Implied = 0x78],
	"sep": ops![Imm8 = 0xE2],
	"sta": ops![Dp = 0x85, DpX = 0x95, DpInd = 0x92, DpXInd = 0x81, DpIndY = 0x91, DpIndLong = 0x87, DpIndLongY = 0x97, Abs = 0x8D, AbsX = 0x9D, AbsY = 0x99, Long = 0x8F, LongX = 0x9F, Sr = 0x83, SrIndY = 0x93],
	"stp": ops![Implied = 0xDB],
	"stx": ops![Dp = 0x86, DpY = 0x96, Abs = 0x8E],
	"sty": ops![Dp = 0x84, DpX = 0x94, Abs = 0x8C],
	"stz": ops![Dp = 0x64, DpX = 0x74, Abs = 0x9C, AbsX = 0x9E],
	"tax": ops![Implied = 0xAA],
	"tay": ops![Implied = 0xA8],
	"tcd": ops![Implied = 0x5B],
	"tcs": ops![Implied = 0x1B],
	"tdc": ops![Implied = 0x7B],
	"trb": ops![Dp = 0x14, Abs = 0x1C],
	"tsb": ops![Dp = 0x04, Abs = 0x0C],
	"tsc": ops![Implied = 0x3B],
	"tsx": ops![Implied = 0xBA],
	"txa": ops![Implied = 0x8A],
	"txs": ops![Implied = 0x9A],
	"txy": ops![Implied = 0x9B],
	"tya": ops![Implied = 0x98],
	"tyx": ops![Implied = 0xBB],
	"wai": ops![Implied = 0xCB],
	"wdm": ops![Imm8 = 0x42],
	"xba": ops![Implied = 0xEB],
	"xce": ops![Implied = 0xFB],

	".(": dir![Implied => Special::BeginScope],
	".)": dir![Implied => Special::EndScope],
	".as": dir![Implied => Special::ShortA],
	".al": dir![Implied => Special::LongA],
	".xs": dir![Implied => Special::ShortX],
	".xl": dir![Implied => Special::LongX],
	".text": dir![Implied => Special::Select(Segment::Text)],
	".data": dir![Implied => Special::Select(Segment::Data)],
	".zero": dir![Implied => Special::Select(Segment::Zero)],
	".bss": dir![Implied => Special::Select(Segment::Bss)],
	".link": dir![LinkGroup => Special::Linkage, LinkPage => Special::Linkage],
	".nop": dir![NopRun => Special::ExpandNops],
};

/// Rows for a lowercase mnemonic or table directive.
pub fn lookup(token: &str) -> Option<&'static Mnemonic> {
	TABLE.iter().find(|m| m.token == token)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_opcode_appears_once() {
		let mut seen = [0u8; 256];
		for mnemonic in TABLE {
			for row in mnemonic.rows {
				if let Special::Opcode(op) = row.special {
					seen[op as usize] += 1;
				}
			}
		}
		// $5C is listed under both jmp and jml
		seen[0x5C] -= 1;
		assert!(seen.iter().all(|&n| n == 1), "{seen:?}");
	}

	#[test]
	fn widths_follow_flags() {
		assert_eq!(Mode::ImmA.operand_sizes(true, true), [2]);
		assert_eq!(Mode::ImmA.operand_sizes(false, true), [1]);
		assert_eq!(Mode::ImmX.operand_sizes(false, true), [2]);
		assert_eq!(Mode::Move.operand_sizes(false, false), [1, 1]);
		assert_eq!(Mode::LongX.operand_sizes(false, false), [3]);
	}

	#[test]
	fn directives_are_in_the_table() {
		let link = lookup(".link").unwrap();
		assert_eq!(link.rows.len(), 2);
		assert!(link.rows.iter().all(|r| r.special == Special::Linkage));
		assert!(lookup("LDA").is_none());
	}
}
