use tracing::instrument;

use crate::candidate::{Candidate, Repr};
use crate::error::{Diagnostics, Error};
use crate::expr::Shape;
use crate::object::Object;

/// Write the selected candidate out, parameter by parameter.
///
/// Label references become relocations and are emitted as zero. A parameter
/// whose expression has no supported shape is reported and emits nothing.
#[instrument(skip_all, fields(candidate = %candidate))]
pub fn emit(obj: &mut dyn Object, candidate: &Candidate, diag: &mut Diagnostics) {
	for (width, param) in &candidate.params {
		let (label, mut value) = match param.expr.shape() {
			Shape::Constant(value) => (None, value),
			Shape::LabelRef(label) => (Some(label), 0),
			Shape::LabelPlusOffset(label, offset) => (Some(label), offset),
			Shape::Other(reason) => {
				diag.report(Error::UnsupportedExpression {
					reason,
					expr: param.expr.to_string(),
				});
				continue;
			}
		};

		let repr = match (param.repr(), *width) {
			(Some(repr), _) => repr,
			(None, 1) => Repr::LowByte,
			(None, 2) => Repr::AbsWord,
			(None, 3) => Repr::Long,
			(None, width) => {
				diag.report(Error::Internal(format!("unknown size: {width}")));
				continue;
			}
		};

		if let Some(label) = label {
			obj.add_extern(repr, label, value);
			value = 0;
		} else if matches!(repr, Repr::Rel8 | Repr::Rel16) && value != 0 {
			diag.report(Error::RelativeConstant(param.expr.to_string()));
		}

		match repr {
			Repr::SegByte => obj.generate_byte((value >> 16) as u8),
			Repr::Long => {
				obj.generate_byte(value as u8);
				obj.generate_byte((value >> 8) as u8);
				obj.generate_byte((value >> 16) as u8);
			}
			Repr::AbsWord => {
				obj.generate_byte(value as u8);
				obj.generate_byte((value >> 8) as u8);
			}
			Repr::HighByte => obj.generate_byte((value >> 8) as u8),
			Repr::LowByte => obj.generate_byte(value as u8),
			Repr::Rel16 => {
				obj.generate_byte(0);
				obj.generate_byte(0);
			}
			Repr::Rel8 => obj.generate_byte(0),
		}
	}
}
