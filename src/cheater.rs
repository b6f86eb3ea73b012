//! The cheater ledger (component I): a bounded, append-only log of typed
//! protocol violations, each carrying the step it was detected at and the
//! accused party's index so that Testable Scenarios referencing a literal
//! `step: 18` adjudication record can be checked directly against it.

use crate::error::CheaterCode;

/// Upper bound on ledger entries. Chosen generously relative to the
/// worst case (every one of 255 peers accused at every one of 23 steps)
/// while still bounding memory for a misbehaving TP or peer that would
/// otherwise try to exhaust it with spurious records.
pub const MAX_ENTRIES: usize = 255 * 23;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheaterRecord {
	pub step: u8,
	pub party: u8,
	pub code: CheaterCode,
}

impl std::fmt::Display for CheaterRecord {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "step {} party {}: {}", self.step, self.party, self.code)
	}
}

#[derive(Clone, Debug, Default)]
pub struct Ledger {
	entries: Vec<CheaterRecord>,
}

impl Ledger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a violation. Once [`MAX_ENTRIES`] is reached, further
	/// records are silently dropped rather than growing without bound —
	/// by that point the protocol has already failed catastrophically and
	/// the existing entries are sufficient for adjudication.
	pub fn record(&mut self, step: u8, party: u8, code: CheaterCode) {
		if self.entries.len() < MAX_ENTRIES {
			tracing::warn!(step, party, %code, "recording cheater violation");
			self.entries.push(CheaterRecord { step, party, code });
		}
	}

	pub fn entries(&self) -> &[CheaterRecord] {
		&self.entries
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn accused_parties(&self) -> std::collections::BTreeSet<u8> {
		self.entries.iter().map(|e| e.party).collect()
	}

	/// The adjudication-step records, i.e. the ones produced while the TP
	/// state engine was at step 18.
	pub fn adjudication_entries(&self) -> impl Iterator<Item = &CheaterRecord> {
		self.entries.iter().filter(|e| e.step == 18)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn records_accumulate_in_order() {
		let mut ledger = Ledger::new();
		ledger.record(3, 2, CheaterCode::MissingCommitment);
		ledger.record(18, 4, CheaterCode::InvalidShare { rc: 4 });

		assert_eq!(ledger.entries().len(), 2);
		assert_eq!(ledger.adjudication_entries().count(), 1);
		assert_eq!(ledger.accused_parties(), std::collections::BTreeSet::from([2, 4]));
	}

	#[test]
	fn ledger_is_bounded() {
		let mut ledger = Ledger::new();
		for _ in 0..MAX_ENTRIES + 10 {
			ledger.record(18, 1, CheaterCode::EchoMismatch);
		}
		assert_eq!(ledger.entries().len(), MAX_ENTRIES);
	}
}
