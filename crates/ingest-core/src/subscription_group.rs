//! Subscription group: the unit of work handed to one upstream session.

use crate::market::{MarketCategory, SymbolId};

/// A bounded set of symbols served by one upstream streaming session.
///
/// Owned by the Symbol Manager (C5); destroyed and recreated atomically on
/// reconfiguration (e.g. a capability-profile change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGroup {
    pub id: String,
    pub category: MarketCategory,
    pub symbols: Vec<SymbolId>,
}

impl SubscriptionGroup {
    pub fn new(id: impl Into<String>, category: MarketCategory, symbols: Vec<SymbolId>) -> Self {
        Self {
            id: id.into(),
            category,
            symbols,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &SymbolId) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

/// Partition `symbols` into groups of at most `max_per_group`, preserving order.
pub fn partition_into_groups(
    category: MarketCategory,
    id_prefix: &str,
    symbols: &[SymbolId],
    max_per_group: usize,
) -> Vec<SubscriptionGroup> {
    if max_per_group == 0 || symbols.is_empty() {
        return Vec::new();
    }
    symbols
        .chunks(max_per_group)
        .enumerate()
        .map(|(i, chunk)| {
            SubscriptionGroup::new(
                format!("{id_prefix}-{}-{i}", category.slug()),
                category,
                chunk.to_vec(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_respect_max_size() {
        let symbols: Vec<SymbolId> = (0..25).map(|i| SymbolId::new(format!("S{i}"))).collect();
        let groups = partition_into_groups(MarketCategory::Spot, "g", &symbols, 10);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 10);
        assert_eq!(groups[2].len(), 5);
    }

    #[test]
    fn empty_symbols_yield_no_groups() {
        let groups = partition_into_groups(MarketCategory::Spot, "g", &[], 10);
        assert!(groups.is_empty());
    }
}
