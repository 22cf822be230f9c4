use std::{
    collections::HashMap,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    sync::{Arc, RwLock},
};

use lazy_static::lazy_static;

lazy_static! {
    static ref INTERNED_RULES: RwLock<HashMap<String, RuleName>> = RwLock::new(HashMap::new());
}

/// The rule part of an AP class, interned.
///
/// Graphs carry a handful of distinct rules over thousands of APs, so every AP
/// shares one allocation per rule.
#[allow(clippy::derived_hash_with_manual_eq, clippy::derive_ord_xor_partial_ord)]
#[derive(Clone, Hash, Eq, Ord)]
pub struct RuleName(Arc<str>);

impl RuleName {
    pub fn new(rule: &str) -> Self {
        if let Some(found) = INTERNED_RULES
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(rule)
        {
            return found.clone();
        }

        let mut rules = INTERNED_RULES
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rules
            .entry(rule.to_string())
            .or_insert_with(|| RuleName(Arc::from(rule)))
            .clone()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every rule interned so far, sorted.
    pub fn all_rules() -> Vec<RuleName> {
        let mut all: Vec<RuleName> = INTERNED_RULES
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort();
        all
    }
}

impl From<&str> for RuleName {
    fn from(s: &str) -> Self {
        RuleName::new(s)
    }
}

impl PartialEq for RuleName {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for RuleName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Some(std::cmp::Ordering::Equal);
        }
        self.0.partial_cmp(&other.0)
    }
}

impl Debug for RuleName {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl Display for RuleName {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_rules_share_storage() {
        let a = RuleName::new("amide");
        let b = RuleName::from("amide");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
        assert!(RuleName::all_rules().contains(&a));
    }

    #[test]
    fn test_rule_ordering_is_lexicographic() {
        assert!(RuleName::new("alpha") < RuleName::new("beta"));
    }
}
