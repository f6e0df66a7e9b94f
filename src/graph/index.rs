//! Address index - dense vertex identifiers for addresses

use super::VertexId;
use crate::blocks::Address;
use crate::{Error, Result};
use std::collections::HashMap;

/// Bidirectional mapping between addresses and vertex identifiers
///
/// Identifiers are handed out in insertion order starting at zero and are
/// never reused, so the reverse direction is a plain vector.
#[derive(Debug, Clone, Default)]
pub struct AddressIndex {
    ids: HashMap<Address, VertexId>,
    addresses: Vec<Address>,
}

impl AddressIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from addresses listed in identifier order
    pub fn from_addresses(addresses: Vec<Address>) -> Result<Self> {
        let mut ids = HashMap::with_capacity(addresses.len());
        for (id, address) in addresses.iter().enumerate() {
            if ids.insert(address.clone(), id as VertexId).is_some() {
                return Err(Error::snapshot(format!(
                    "address {} listed twice in index",
                    address
                )));
            }
        }
        Ok(Self { ids, addresses })
    }

    /// Identifier of `address`, allocating the next one on first sight
    pub fn index_of(&mut self, address: &str) -> VertexId {
        if let Some(&id) = self.ids.get(address) {
            return id;
        }
        let id = self.addresses.len() as VertexId;
        self.addresses.push(address.to_string());
        self.ids.insert(address.to_string(), id);
        id
    }

    /// Identifier of `address` without allocating
    pub fn get(&self, address: &str) -> Option<VertexId> {
        self.ids.get(address).copied()
    }

    /// Reverse lookup
    pub fn address_of(&self, id: VertexId) -> Result<&Address> {
        self.addresses.get(id as usize).ok_or(Error::Lookup(id))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Addresses in identifier order
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &Address)> {
        self.addresses
            .iter()
            .enumerate()
            .map(|(id, a)| (id as VertexId, a))
    }
}

impl PartialEq for AddressIndex {
    fn eq(&self, other: &Self) -> bool {
        self.addresses == other.addresses
    }
}

impl Eq for AddressIndex {}
