//! UTXO table - still-unspent outputs keyed by transaction

use crate::blocks::{Address, TxId};
use crate::error::UnresolvedReason;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Output index → addresses paid by that output
pub type OutputSlots = BTreeMap<u32, Vec<Address>>;

/// Unspent outputs of every observed transaction
///
/// This is the largest structure of a run, so entries are dropped as soon as
/// their last slot is spent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoTable {
    entries: HashMap<TxId, OutputSlots>,
    #[serde(skip)]
    outputs: usize,
}

impl UtxoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the outputs of a newly observed transaction
    ///
    /// Transactions without outputs leave no entry behind.
    pub fn record_outputs(&mut self, tx_id: &str, outputs: OutputSlots) -> Result<()> {
        if self.entries.contains_key(tx_id) {
            return Err(Error::DuplicateTransaction(tx_id.to_string()));
        }
        if outputs.is_empty() {
            return Ok(());
        }
        self.outputs += outputs.len();
        self.entries.insert(tx_id.to_string(), outputs);
        Ok(())
    }

    /// Remove and return the addresses of one output slot
    pub fn take_output(&mut self, tx_id: &str, index: u32) -> Result<Vec<Address>> {
        let unresolved = |reason| Error::UnresolvedInput {
            tx_id: tx_id.to_string(),
            index,
            reason,
        };

        let slots = self
            .entries
            .get_mut(tx_id)
            .ok_or_else(|| unresolved(UnresolvedReason::UnknownTransaction))?;
        let addresses = slots
            .remove(&index)
            .ok_or_else(|| unresolved(UnresolvedReason::OutputNotFound))?;

        if slots.is_empty() {
            self.entries.remove(tx_id);
        }
        self.outputs -= 1;
        Ok(addresses)
    }

    pub fn get(&self, tx_id: &str) -> Option<&OutputSlots> {
        self.entries.get(tx_id)
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.entries.contains_key(tx_id)
    }

    /// Number of transactions with unspent outputs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of unspent output slots across all transactions
    pub fn output_count(&self) -> usize {
        self.outputs
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TxId, &OutputSlots)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (TxId, OutputSlots)> {
        self.entries.into_iter()
    }

    /// Recount output slots after deserialization
    pub(crate) fn recount(&mut self) {
        self.outputs = self.entries.values().map(BTreeMap::len).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(entries: Vec<(u32, Vec<&str>)>) -> OutputSlots {
        entries
            .into_iter()
            .map(|(i, addrs)| (i, addrs.into_iter().map(String::from).collect()))
            .collect()
    }

    #[test]
    fn test_record_and_take() {
        let mut table = UtxoTable::new();
        table.record_outputs("t1", slots(vec![(0, vec!["A"]), (1, vec!["B", "C"])])).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.output_count(), 2);

        assert_eq!(table.take_output("t1", 1).unwrap(), vec!["B", "C"]);
        assert_eq!(table.output_count(), 1);
        assert!(table.contains("t1"));

        assert_eq!(table.take_output("t1", 0).unwrap(), vec!["A"]);
        assert!(!table.contains("t1"));
        assert!(table.is_empty());
        assert_eq!(table.output_count(), 0);
    }

    #[test]
    fn test_double_spend_is_unresolved() {
        let mut table = UtxoTable::new();
        table.record_outputs("t1", slots(vec![(0, vec!["A"]), (1, vec!["B"])])).unwrap();
        table.take_output("t1", 0).unwrap();

        match table.take_output("t1", 0) {
            Err(Error::UnresolvedInput { reason, .. }) => {
                assert_eq!(reason, UnresolvedReason::OutputNotFound)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_transaction() {
        let mut table = UtxoTable::new();
        match table.take_output("missing", 3) {
            Err(Error::UnresolvedInput { tx_id, index, reason }) => {
                assert_eq!(tx_id, "missing");
                assert_eq!(index, 3);
                assert_eq!(reason, UnresolvedReason::UnknownTransaction);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_transaction() {
        let mut table = UtxoTable::new();
        table.record_outputs("t1", slots(vec![(0, vec!["A"])])).unwrap();
        let err = table.record_outputs("t1", slots(vec![(0, vec!["B"])])).unwrap_err();
        assert!(matches!(err, Error::DuplicateTransaction(id) if id == "t1"));
        assert_eq!(table.get("t1").unwrap(), &slots(vec![(0, vec!["A"])]));
    }

    #[test]
    fn test_spent_transaction_can_reappear() {
        let mut table = UtxoTable::new();
        table.record_outputs("t1", slots(vec![(0, vec!["A"])])).unwrap();
        table.take_output("t1", 0).unwrap();
        assert!(table.record_outputs("t1", slots(vec![(0, vec!["A"])])).is_ok());
    }

    #[test]
    fn test_no_outputs_no_entry() {
        let mut table = UtxoTable::new();
        table.record_outputs("t1", OutputSlots::new()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_recount() {
        let mut table = UtxoTable::new();
        table.record_outputs("t1", slots(vec![(0, vec!["A"]), (4, vec![])])).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let mut restored: UtxoTable = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.output_count(), 0);
        restored.recount();
        assert_eq!(restored.output_count(), 2);
        assert_eq!(restored, table);
    }
}
