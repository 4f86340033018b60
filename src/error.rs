use std::fmt;

use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, miette::Diagnostic)]
pub enum Error {
	/// No addressing-mode row of the mnemonic accepted the operand text.
	#[diagnostic(code(snes_as::no_matching_mode))]
	NoMatchingMode {
		mnemonic: String,
		operand: String,
	},
	/// Statement is neither a mnemonic, a directive, nor a label.
	#[diagnostic(code(snes_as::unknown_statement))]
	UnknownStatement {
		rest: String,
		previous: String,
	},
	#[diagnostic(code(snes_as::syntax))]
	Syntax(String),
	#[diagnostic(code(snes_as::undefined_label))]
	UndefinedLabel {
		label: String,
		expr: String,
	},
	#[diagnostic(code(snes_as::not_constant))]
	NotConstant(String),
	#[diagnostic(
		code(snes_as::unsupported_expression),
		help("operands must be a constant, a label, or a label plus a non-negative constant")
	)]
	UnsupportedExpression {
		reason: &'static str,
		expr: String,
	},
	#[diagnostic(code(snes_as::relative_constant))]
	RelativeConstant(String),
	#[diagnostic(code(snes_as::relax))]
	RelaxFailed {
		reasons: Vec<String>,
		candidate: String,
	},
	#[diagnostic(
		code(snes_as::branch_range),
		help("enable jump fixing to rewrite out-of-range branches")
	)]
	BranchOutOfRange {
		label: String,
		distance: i64,
	},
	#[diagnostic(code(snes_as::star_label), help("perhaps you meant '*= <value>'?"))]
	StarLabel,
	#[diagnostic(code(snes_as::unsupported_directive))]
	Unsupported(&'static str),
	#[diagnostic(code(snes_as::three_pass))]
	ThreePass,
	#[diagnostic(code(snes_as::internal))]
	Internal(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
	fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::NoMatchingMode { mnemonic, operand } => {
				write!(fmt, "'{operand}' is invalid parameter for '{mnemonic}' in current context")
			}
			Self::UnknownStatement { rest, previous } => {
				write!(fmt, "what is '{rest}' - previous token: '{previous}'?")
			}
			Self::Syntax(rest) => write!(fmt, "syntax error at '{rest}'"),
			Self::UndefinedLabel { label, expr } => {
				write!(fmt, "undefined label \"{label}\" in expression - got \"{expr}\"")
			}
			Self::NotConstant(expr) => write!(fmt, "expression must be const - got \"{expr}\""),
			Self::UnsupportedExpression { reason, expr } => {
				write!(fmt, "invalid pointer arithmetic ({reason}): '{expr}'")
			}
			Self::RelativeConstant(expr) => {
				write!(fmt, "relative target must not be a constant - got '{expr}'")
			}
			Self::RelaxFailed { reasons, candidate } => {
				writeln!(fmt, "REL8-fixing when")?;
				for reason in reasons {
					writeln!(fmt, "- {reason}")?;
				}
				write!(fmt, "- Opcode:{candidate}")
			}
			Self::BranchOutOfRange { label, distance } => {
				write!(fmt, "branch to '{label}' out of range ({distance} bytes)")
			}
			Self::StarLabel => write!(fmt, "cannot define label '*'"),
			Self::Unsupported(what) => write!(fmt, "{what} not supported yet"),
			Self::ThreePass => write!(fmt, "three-pass jump fixing not supported, sorry"),
			Self::Internal(msg) => write!(fmt, "internal error - {msg}"),
		}
	}
}

/// Run-scoped diagnostic sink. Nothing reported here stops assembly.
#[derive(Debug, Default)]
pub struct Diagnostics {
	errors: Vec<Error>,
}

impl Diagnostics {
	pub fn report(&mut self, err: Error) {
		error!("{err}");
		self.errors.push(err);
	}

	pub fn failed(&self) -> bool {
		!self.errors.is_empty()
	}

	pub fn errors(&self) -> &[Error] {
		&self.errors
	}

	pub fn into_errors(self) -> Vec<Error> {
		self.errors
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn relax_failure_lists_every_reason() {
		let err = Error::RelaxFailed {
			reasons: vec![
				"Parameter count (3) is not 2".into(),
				"Parameter 2 is not REL8".into(),
			],
			candidate: " (1)$EA (1)$EA (1)$EA".into(),
		};
		assert_eq!(
			err.to_string(),
			"REL8-fixing when\n- Parameter count (3) is not 2\n- Parameter 2 is not REL8\n- Opcode: (1)$EA (1)$EA (1)$EA"
		);
	}

	#[test]
	fn sink_tracks_failure() {
		let mut diag = Diagnostics::default();
		assert!(!diag.failed());
		diag.report(Error::ThreePass);
		assert!(diag.failed());
		assert_eq!(diag.errors(), &[Error::ThreePass]);
	}
}
