use std::collections::BTreeSet;
use std::fmt;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use tracing::trace;

use crate::candidate::{Param, Repr};
use crate::error::{Diagnostics, Error};
use crate::labels::AnonLabels;
use crate::object::Object;
use crate::Label;

#[derive(Parser)]
#[grammar = "expr.pest"]
struct ExprParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
	Mul,
	Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
	pub expr: Expr,
	pub negated: bool,
}

/// Operand expression, folded as it is built: constant terms of a sum end
/// up in one trailing [`Expr::Number`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
	Number(i64),
	Label(Label),
	Negate(Box<Expr>),
	Sum(Vec<Term>),
	Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// What the emitter can do with an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape<'a> {
	Constant(i64),
	LabelRef(&'a Label),
	LabelPlusOffset(&'a Label, i64),
	Other(&'static str),
}

impl Expr {
	pub fn label(name: &str) -> Self {
		Self::Label(name.into())
	}

	pub fn sum(terms: Vec<Term>) -> Self {
		fn push(out: &mut Vec<Term>, constant: &mut i64, expr: Expr, negated: bool) {
			match expr {
				Expr::Number(n) if negated => *constant = constant.wrapping_sub(n),
				Expr::Number(n) => *constant = constant.wrapping_add(n),
				Expr::Negate(inner) => push(out, constant, *inner, !negated),
				Expr::Sum(terms) => {
					for term in terms {
						push(out, constant, term.expr, term.negated != negated);
					}
				}
				expr => out.push(Term { expr, negated }),
			}
		}

		let mut out = Vec::new();
		let mut constant = 0;
		for term in terms {
			push(&mut out, &mut constant, term.expr, term.negated);
		}

		if out.is_empty() {
			return Self::Number(constant);
		}
		if constant != 0 {
			out.push(Term { expr: Self::Number(constant), negated: false });
		}
		if out.len() == 1 && !out[0].negated {
			return out.swap_remove(0).expr;
		}
		Self::Sum(out)
	}

	pub fn negate(expr: Expr) -> Self {
		match expr {
			Self::Number(n) => Self::Number(n.wrapping_neg()),
			Self::Negate(inner) => *inner,
			Self::Sum(terms) => Self::sum(
				terms
					.into_iter()
					.map(|term| Term { expr: term.expr, negated: !term.negated })
					.collect(),
			),
			expr => Self::Negate(Box::new(expr)),
		}
	}

	pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
		match (op, &lhs, &rhs) {
			(BinOp::Mul, Self::Number(a), Self::Number(b)) => Self::Number(a.wrapping_mul(*b)),
			(BinOp::Div, Self::Number(a), Self::Number(b)) if *b != 0 => Self::Number(a.wrapping_div(*b)),
			_ => Self::Binary(op, Box::new(lhs), Box::new(rhs)),
		}
	}

	pub fn as_const(&self) -> Option<i64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn shape(&self) -> Shape<'_> {
		match self {
			Self::Number(n) => Shape::Constant(*n),
			Self::Label(label) => Shape::LabelRef(label),
			Self::Sum(terms) => match terms.as_slice() {
				[Term { expr: Self::Label(label), negated: false }, Term { expr: Self::Number(n), negated: false }] => {
					if *n >= 0 {
						Shape::LabelPlusOffset(label, *n)
					} else {
						Shape::Other("negative offset")
					}
				}
				_ => Shape::Other("more than one label"),
			},
			Self::Negate(_) => Shape::Other("negated label"),
			Self::Binary(..) => Shape::Other("label in product"),
		}
	}

	/// Every label name referenced.
	pub fn labels(&self) -> BTreeSet<Label> {
		fn walk(expr: &Expr, out: &mut BTreeSet<Label>) {
			match expr {
				Expr::Number(_) => {}
				Expr::Label(label) => {
					out.insert(label.clone());
				}
				Expr::Negate(inner) => walk(inner, out),
				Expr::Sum(terms) => terms.iter().for_each(|term| walk(&term.expr, out)),
				Expr::Binary(_, lhs, rhs) => {
					walk(lhs, out);
					walk(rhs, out);
				}
			}
		}

		let mut out = BTreeSet::new();
		walk(self, &mut out);
		out
	}

	/// Replace `name` by `value` and fold again.
	pub fn substitute(&self, name: &str, value: i64) -> Self {
		match self {
			Self::Number(n) => Self::Number(*n),
			Self::Label(label) if &**label == name => Self::Number(value),
			Self::Label(label) => Self::Label(label.clone()),
			Self::Negate(inner) => Self::negate(inner.substitute(name, value)),
			Self::Sum(terms) => Self::sum(
				terms
					.iter()
					.map(|term| Term {
						expr: term.expr.substitute(name, value),
						negated: term.negated,
					})
					.collect(),
			),
			Self::Binary(op, lhs, rhs) => {
				Self::binary(*op, lhs.substitute(name, value), rhs.substitute(name, value))
			}
		}
	}

	/// Substitute every label that is a plain value in `obj`. Positions are
	/// left for the object to fix up.
	pub fn with_values(&self, obj: &dyn Object) -> Self {
		let mut expr = self.clone();
		for label in self.labels() {
			if let Some(sym) = obj.find_label(&label).filter(|sym| sym.segment.is_none()) {
				expr = expr.substitute(&label, sym.value as i64);
			}
		}
		expr
	}

	/// Evaluate to a constant right now. Undefined labels count as zero and
	/// anything that stays symbolic yields zero; both are reported.
	pub fn resolve(&self, obj: &dyn Object, diag: &mut Diagnostics) -> i64 {
		let mut expr = self.clone();
		for label in self.labels() {
			let value = match obj.find_label(&label) {
				Some(sym) => sym.value as i64,
				None => {
					diag.report(Error::UndefinedLabel {
						label: label.to_string(),
						expr: self.to_string(),
					});
					0
				}
			};
			expr = expr.substitute(&label, value);
		}

		match expr.as_const() {
			Some(value) => value,
			None => {
				diag.report(Error::NotConstant(self.to_string()));
				0
			}
		}
	}
}

impl From<i64> for Expr {
	fn from(value: i64) -> Self {
		Self::Number(value)
	}
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Number(n) if *n < 0 => write!(f, "-${:X}", n.unsigned_abs()),
			Self::Number(n) => write!(f, "${n:X}"),
			Self::Label(label) => write!(f, "{label}"),
			Self::Negate(inner) => write!(f, "-({inner})"),
			Self::Sum(terms) => {
				for (i, term) in terms.iter().enumerate() {
					match (i, term.negated) {
						(0, false) => {}
						(0, true) => write!(f, "-")?,
						(_, false) => write!(f, "+")?,
						(_, true) => write!(f, "-")?,
					}
					write!(f, "{}", term.expr)?;
				}
				Ok(())
			}
			Self::Binary(op, lhs, rhs) => {
				let op = match op {
					BinOp::Mul => '*',
					BinOp::Div => '/',
				};
				write!(f, "({lhs}{op}{rhs})")
			}
		}
	}
}

struct Builder<'a> {
	labels: &'a mut AnonLabels,
	here: u32,
}

impl Builder<'_> {
	fn sum(&mut self, pair: Pair<Rule>) -> Option<Expr> {
		let mut terms = Vec::new();
		let mut negated = false;
		for pair in pair.into_inner() {
			match pair.as_rule() {
				Rule::add_op => negated = pair.as_str() == "-",
				Rule::product => terms.push(Term { expr: self.product(pair)?, negated }),
				rule => {
					trace!("unexpected {rule:?} in sum");
					return None;
				}
			}
		}
		Some(Expr::sum(terms))
	}

	fn product(&mut self, pair: Pair<Rule>) -> Option<Expr> {
		let mut inner = pair.into_inner();
		let mut expr = self.unary(inner.next()?)?;
		while let Some(op) = inner.next() {
			let op = match op.as_str() {
				"*" => BinOp::Mul,
				_ => BinOp::Div,
			};
			let rhs = self.unary(inner.next()?)?;
			expr = Expr::binary(op, expr, rhs);
		}
		Some(expr)
	}

	fn unary(&mut self, pair: Pair<Rule>) -> Option<Expr> {
		let pair = pair.into_inner().next()?;
		let text = pair.as_str();
		let expr = match pair.as_rule() {
			Rule::anon_prev => Expr::Label(self.labels.previous(text.len())),
			Rule::anon_next => Expr::Label(self.labels.next(text.len())),
			Rule::negate => Expr::negate(self.unary(pair.into_inner().next()?)?),
			Rule::hex => Expr::Number(i64::from_str_radix(&text[1..], 16).ok()?),
			Rule::bin => Expr::Number(i64::from_str_radix(&text[1..], 2).ok()?),
			Rule::dec => Expr::Number(text.parse().ok()?),
			Rule::char_lit => Expr::Number(text[1..].chars().next()? as i64),
			Rule::here => Expr::Number(self.here as i64),
			Rule::ident => Expr::label(text),
			rule => {
				trace!("unexpected {rule:?} in unary");
				return None;
			}
		};
		Some(expr)
	}
}

fn force_repr(prefix: &str) -> Option<Repr> {
	match prefix {
		"<" => Some(Repr::LowByte),
		">" => Some(Repr::HighByte),
		"^" => Some(Repr::SegByte),
		"!" => Some(Repr::AbsWord),
		"@" => Some(Repr::Long),
		_ => None,
	}
}

/// Parse the longest operand expression at the start of `text`.
///
/// Returns the parameter and the number of bytes consumed. `here` is the
/// value of `*`.
pub fn parse_operand(text: &str, labels: &mut AnonLabels, here: u32) -> Option<(Param, usize)> {
	let operand = ExprParser::parse(Rule::operand, text).ok()?.next()?;
	let consumed = operand.as_span().end();

	let mut builder = Builder { labels, here };
	let mut force = None;
	let mut expr = None;
	for pair in operand.into_inner() {
		match pair.as_rule() {
			Rule::force => force = force_repr(pair.as_str()),
			Rule::sum => expr = builder.sum(pair),
			_ => {}
		}
	}

	let mut param = Param::new(expr?);
	if let Some(repr) = force {
		param.force(repr);
	}
	trace!("operand '{}' -> {param}", &text[..consumed]);
	Some((param, consumed))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::ObjectFile;

	fn parse(text: &str) -> (Param, usize) {
		parse_operand(text, &mut AnonLabels::default(), 0x100).unwrap()
	}

	macro_rules! test_value {
		($name:ident, $text:literal, $value:expr) => {
			#[test]
			fn $name() {
				let (param, consumed) = parse($text);
				assert_eq!(consumed, $text.len());
				assert_eq!(param.expr, Expr::Number($value));
			}
		};
	}

	test_value!(hex, "$1F", 0x1F);
	test_value!(binary, "%1010", 10);
	test_value!(decimal, "42", 42);
	test_value!(character, "'A'", 0x41);
	test_value!(here, "*+2", 0x102);
	test_value!(precedence, "2+3*4", 14);
	test_value!(negative, "-1", -1);
	test_value!(spaced_negative, "- 1", -1);
	test_value!(division, "$100/2-1", 0x7F);

	#[test]
	fn stops_before_index() {
		let (param, consumed) = parse("table+2,x");
		assert_eq!(consumed, "table+2".len());
		assert_eq!(param.expr.shape(), Shape::LabelPlusOffset(&"table".into(), 2));
	}

	#[test]
	fn constants_fold_behind_label() {
		let (param, _) = parse("1+table+2");
		assert_eq!(param.expr.shape(), Shape::LabelPlusOffset(&"table".into(), 3));
		assert_eq!(param.expr.to_string(), "table+$3");
	}

	#[test]
	fn unsupported_shapes() {
		assert_eq!(parse("table-2").0.expr.shape(), Shape::Other("negative offset"));
		assert_eq!(parse("a+b").0.expr.shape(), Shape::Other("more than one label"));
		assert_eq!(parse("-a").0.expr.shape(), Shape::Other("negated label"));
		assert_eq!(parse("a*2").0.expr.shape(), Shape::Other("label in product"));
	}

	#[test]
	fn force_prefix() {
		let (param, consumed) = parse("<label");
		assert_eq!(consumed, 6);
		assert_eq!(param.repr(), Some(Repr::LowByte));
		assert_eq!(parse("@$12").0.repr(), Some(Repr::Long));
	}

	#[test]
	fn anonymous_references() {
		let mut labels = AnonLabels::default();
		let (back, _) = parse_operand("--", &mut labels, 0).unwrap();
		let (fwd, _) = parse_operand("+", &mut labels, 0).unwrap();
		assert_eq!(back.expr, Expr::Label(labels.previous(2)));
		assert_eq!(fwd.expr, Expr::Label(labels.next(1)));
	}

	#[test]
	fn resolve_reports_undefined() {
		let mut obj = ObjectFile::default();
		obj.define_label_value("known", 5);
		let mut diag = Diagnostics::default();

		let (param, _) = parse("known+missing+1");
		assert_eq!(param.expr.resolve(&obj, &mut diag), 6);
		assert_eq!(
			diag.errors(),
			&[Error::UndefinedLabel {
				label: "missing".into(),
				expr: "known+missing+$1".into(),
			}]
		);
	}

	#[test]
	fn values_substitute_but_positions_stay() {
		let mut obj = ObjectFile::default();
		obj.define_label_value("port", 0x2100);
		obj.define_label("here");
		let (param, _) = parse("port+1");
		assert_eq!(param.expr.with_values(&obj), Expr::Number(0x2101));
		let (param, _) = parse("here");
		assert_eq!(param.expr.with_values(&obj), Expr::label("here"));
	}

	#[test]
	fn rejects_garbage() {
		assert!(parse_operand(",x", &mut AnonLabels::default(), 0).is_none());
	}
}
