//! Static routing rules: operation kind to ordered fallback chain.

use std::collections::BTreeMap;

use switchyard_types::operation::OperationKind;

/// Read-only table of fallback chains, built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: BTreeMap<OperationKind, Vec<String>>,
}

impl RoutingTable {
    pub fn new(rules: BTreeMap<OperationKind, Vec<String>>) -> Self {
        Self { rules }
    }

    /// Fallback chain for `operation`, earliest entry first.
    pub fn chain(&self, operation: &OperationKind) -> Option<&[String]> {
        self.rules.get(operation).map(Vec::as_slice)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationKind> {
        self.rules.keys()
    }

    /// Operations whose chain includes `provider`.
    pub fn operations_for(&self, provider: &str) -> Vec<&OperationKind> {
        self.rules
            .iter()
            .filter(|(_, chain)| chain.iter().any(|p| p == provider))
            .map(|(op, _)| op)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_lookup_preserves_order() {
        let mut rules = BTreeMap::new();
        rules.insert(
            OperationKind::GetMarketData,
            vec!["a".to_string(), "b".to_string()],
        );
        rules.insert(OperationKind::PlaceOrder, vec!["b".to_string()]);
        let table = RoutingTable::new(rules);

        assert_eq!(
            table.chain(&OperationKind::GetMarketData).unwrap(),
            &["a".to_string(), "b".to_string()]
        );
        assert!(table.chain(&OperationKind::GetPortfolio).is_none());
        assert_eq!(table.operations_for("b").len(), 2);
        assert_eq!(table.operations_for("a"), vec![&OperationKind::GetMarketData]);
    }
}
