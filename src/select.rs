use tracing::trace;

use crate::candidate::Candidate;
use crate::error::Error;

/// Pick one candidate.
///
/// The smallest certain one wins. Without certain candidates, widths are a
/// guess, so prefer the one closest to two bytes per parameter. Ties go to
/// the earliest.
pub fn select(candidates: &[Candidate]) -> Result<usize, Error> {
	if candidates.is_empty() {
		return Err(Error::Internal("no candidates to choose from".into()));
	}

	let certain = candidates
		.iter()
		.enumerate()
		.filter(|(_, c)| c.certain)
		.min_by_key(|(_, c)| c.width());
	if let Some((index, candidate)) = certain {
		trace!("Chose certain #{index}:{candidate}");
		return Ok(index);
	}

	let (index, candidate) = candidates
		.iter()
		.enumerate()
		.min_by_key(|(_, c)| distance_from_word(c))
		.ok_or_else(|| Error::Internal("no candidates to choose from".into()))?;
	trace!("Guessed #{index}:{candidate}");
	Ok(index)
}

fn distance_from_word(candidate: &Candidate) -> u32 {
	candidate
		.params
		.iter()
		.map(|(width, _)| (*width as i32 - 2).unsigned_abs())
		.sum()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::candidate::Param;
	use crate::expr::Expr;

	fn candidate(certain: bool, widths: &[u8]) -> Candidate {
		let mut c = Candidate::new(certain);
		for &width in widths {
			c.push(width, Param::new(Expr::label("x")));
		}
		c
	}

	macro_rules! test_select {
		($name:ident, [$(($certain:expr, $widths:expr)),* $(,)?], $expected:expr) => {
			#[test]
			fn $name() {
				let list = [$(candidate($certain, &$widths)),*];
				assert_eq!(select(&list), $expected);
				assert_eq!(select(&list), select(&list));
			}
		};
	}

	test_select!(smallest_certain, [(false, [1, 1]), (true, [1, 2]), (true, [1, 1])], Ok(2));
	test_select!(certain_tie_goes_first, [(true, [1, 2]), (true, [1, 2])], Ok(0));
	test_select!(guess_prefers_word, [(false, [1, 1]), (false, [1, 2]), (false, [1, 3])], Ok(1));
	test_select!(guess_tie_goes_first, [(false, [1, 1]), (false, [1, 3])], Ok(0));
	test_select!(certain_beats_better_guess, [(false, [1, 2]), (true, [1, 3])], Ok(1));
	test_select!(nothing_to_choose, [], Err(Error::Internal("no candidates to choose from".into())));
}
