use std::collections::HashMap;

use tracing::trace;

use crate::object::Object;
use crate::Label;

/// Whether `name` was minted here. Identifiers in source cannot start
/// with `$`, so no user label collides.
pub fn is_minted(name: &str) -> bool {
	name.starts_with('$')
}

/// Names for `+`/`-` branch labels and nop-run targets.
///
/// Names are minted from per-category counters that are never reset, so a
/// name is unique for the whole process run. Every minted name is remembered
/// until [`AnonLabels::purge_run`] undefines it in the object.
#[derive(Debug, Default)]
pub struct AnonLabels {
	prev: HashMap<usize, Label>,
	next: HashMap<usize, Label>,
	prev_count: u32,
	next_count: u32,
	nop_count: u32,
	minted: Vec<Label>,
}

impl AnonLabels {
	fn mint(&mut self, name: String) -> Label {
		let label: Label = name.into();
		trace!("minted '{label}'");
		self.minted.push(label.clone());
		label
	}

	/// A `-`-run of `length` at the current position.
	pub fn declare_previous(&mut self, length: usize, obj: &mut dyn Object) {
		self.prev_count += 1;
		let label = self.mint(format!("$PrevBranch{length}${}", self.prev_count));
		obj.define_label(&label);
		self.prev.insert(length, label);
	}

	/// What a `-`-run of `length` refers to right now.
	pub fn previous(&mut self, length: usize) -> Label {
		if let Some(label) = self.prev.get(&length) {
			return label.clone();
		}
		self.prev_count += 1;
		let label = self.mint(format!("$PrevBranch{length}${}", self.prev_count));
		self.prev.insert(length, label.clone());
		label
	}

	/// Mint the name the next `+`-run of `length` will define.
	pub fn reserve_next(&mut self, length: usize) -> Label {
		self.next_count += 1;
		let label = self.mint(format!("$NextBranch{length}${}", self.next_count));
		self.next.insert(length, label.clone());
		label
	}

	/// What a `+`-run of `length` refers to right now.
	pub fn next(&mut self, length: usize) -> Label {
		match self.next.get(&length) {
			Some(label) => label.clone(),
			None => self.reserve_next(length),
		}
	}

	/// A `+`-run of `length` at the current position: bind the pending name
	/// here and reserve the following one.
	pub fn declare_next(&mut self, length: usize, obj: &mut dyn Object) {
		let label = self.next(length);
		obj.define_label(&label);
		self.reserve_next(length);
	}

	pub fn new_nop_label(&mut self) -> Label {
		self.nop_count += 1;
		self.mint(format!("$NopLabel${}", self.nop_count))
	}

	/// Undefine every name minted so far and forget the current bindings.
	/// The counters keep running.
	pub fn purge_run(&mut self, obj: &mut dyn Object) {
		for label in self.minted.drain(..) {
			obj.undefine_label(&label);
		}
		self.prev.clear();
		self.next.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::ObjectFile;

	#[test]
	fn next_reservations_never_repeat() {
		let mut labels = AnonLabels::default();
		let first = labels.reserve_next(1);
		let second = labels.reserve_next(1);
		let longer = labels.reserve_next(2);
		assert_ne!(first, second);
		assert_ne!(second, longer);
		assert_eq!(labels.next(1), second);
	}

	#[test]
	fn previous_follows_latest_declaration() {
		let mut obj = ObjectFile::default();
		let mut labels = AnonLabels::default();
		labels.declare_previous(1, &mut obj);
		let first = labels.previous(1);
		obj.generate_byte(0xEA);
		labels.declare_previous(1, &mut obj);
		let second = labels.previous(1);
		assert_ne!(first, second);
		assert_eq!(obj.find_label(&second).map(|sym| sym.value), Some(1));
	}

	#[test]
	fn declare_next_binds_reserved_name() {
		let mut obj = ObjectFile::default();
		let mut labels = AnonLabels::default();
		let forward = labels.next(1);
		obj.generate_byte(0xEA);
		labels.declare_next(1, &mut obj);
		assert_eq!(obj.find_label(&forward).map(|sym| sym.value), Some(1));
		assert_ne!(labels.next(1), forward);
	}

	#[test]
	fn purge_undefines_everything_minted() {
		let mut obj = ObjectFile::default();
		let mut labels = AnonLabels::default();
		labels.declare_previous(1, &mut obj);
		labels.declare_next(2, &mut obj);
		let nop = labels.new_nop_label();
		obj.define_label(&nop);
		let names = [labels.previous(1), labels.next(2), nop];

		labels.purge_run(&mut obj);
		for name in &names {
			assert!(obj.find_label(name).is_none(), "{name} still defined");
		}
	}

	#[test]
	fn names_stay_unique_after_purge() {
		let mut obj = ObjectFile::default();
		let mut labels = AnonLabels::default();
		let first = labels.next(1);
		labels.purge_run(&mut obj);
		assert_ne!(labels.next(1), first);
		assert_eq!(labels.new_nop_label().as_ref(), "$NopLabel$1");
	}
}
