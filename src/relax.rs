use tracing::debug;

use crate::candidate::{Candidate, Param, Repr};
use crate::error::Error;

const BRA: u8 = 0x80;
const BRL: u8 = 0x82;

/// Rewrite a short branch into one that always reaches:
/// `Bcc target` becomes `B!cc +3 ; BRL target`, `BRA target` becomes
/// `BRL target`.
///
/// On failure the candidate is left untouched.
pub fn relax(candidate: &mut Candidate) -> Result<(), Error> {
	let mut reasons = Vec::new();
	let params = &candidate.params;

	if params.len() != 2 {
		reasons.push(format!("Parameter count ({}) is not 2", params.len()));
	}
	let mut opcode = None;
	if let Some((width, param)) = params.first() {
		if *width != 1 {
			reasons.push(format!("Parameter 1 is not byte (size is {width} bytes)"));
		}
		match param.expr.as_const().map(u8::try_from) {
			Some(Ok(op)) => opcode = Some(op),
			Some(Err(_)) => reasons.push(format!("Parameter 1 ({}) is not an opcode", param.expr)),
			None => reasons.push("Parameter 1 is not const".into()),
		}
	}
	if let Some((width, param)) = params.get(1) {
		if *width != 1 {
			reasons.push(format!("Parameter 2 is not byte (size is {width} bytes)"));
		}
		if param.repr() != Some(Repr::Rel8) {
			reasons.push("Parameter 2 is not REL8".into());
		}
	}

	let (Some(opcode), true) = (opcode, reasons.is_empty()) else {
		return Err(Error::RelaxFailed {
			reasons,
			candidate: candidate.to_string(),
		});
	};

	let Some((_, branch)) = candidate.params.pop() else {
		return Err(Error::Internal("branch target vanished".into()));
	};
	candidate.params.clear();
	if opcode != BRA {
		candidate.push_const(opcode ^ 0x20);
		candidate.push_const(3);
	}
	candidate.push_const(BRL);
	candidate.push(2, Param::forced(branch.expr, Repr::Rel16));

	debug!("relaxed ${opcode:02X} into{candidate}");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::Expr;

	fn branch(opcode: u8) -> Candidate {
		let mut c = Candidate::new(true);
		c.push_const(opcode);
		c.push(1, Param::forced(Expr::label("target"), Repr::Rel8));
		c
	}

	#[test]
	fn conditional_branch() {
		let mut c = branch(0xF0);
		relax(&mut c).unwrap();
		assert_eq!(c.to_string(), " (1)$D0 (1)$3 (1)$82 (2)target");
		assert_eq!(c.params[3].1.repr(), Some(Repr::Rel16));
		assert_eq!(c.width(), 5);
	}

	#[test]
	fn unconditional_branch() {
		let mut c = branch(0x80);
		relax(&mut c).unwrap();
		assert_eq!(c.to_string(), " (1)$82 (2)target");
	}

	#[test]
	fn rejects_non_branches() {
		let mut c = Candidate::new(true);
		for _ in 0..3 {
			c.push_const(0xEA);
		}
		let before = c.clone();
		assert_eq!(
			relax(&mut c),
			Err(Error::RelaxFailed {
				reasons: vec!["Parameter count (3) is not 2".into(), "Parameter 2 is not REL8".into()],
				candidate: " (1)$EA (1)$EA (1)$EA".into(),
			})
		);
		assert_eq!(c, before);
	}

	#[test]
	fn rejects_symbolic_opcode() {
		let mut c = Candidate::new(true);
		c.push(1, Param::new(Expr::label("op")));
		c.push(1, Param::forced(Expr::label("target"), Repr::Rel8));
		let Err(Error::RelaxFailed { reasons, .. }) = relax(&mut c) else {
			panic!("relaxed a symbolic opcode");
		};
		assert_eq!(reasons, ["Parameter 1 is not const"]);
	}
}
