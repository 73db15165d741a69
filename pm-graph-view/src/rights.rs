// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Set of access rights granted by an association, for example `{read, write}`.
///
/// Rights are opaque strings defined by the remote policy; the set keeps them ordered so the
/// formatted label is stable across fetches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessRightSet(BTreeSet<String>);

impl AccessRightSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, right: impl Into<String>) -> bool {
        self.0.insert(right.into())
    }

    pub fn contains(&self, right: &str) -> bool {
        self.0.contains(right)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Display for AccessRightSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rights: Vec<&str> = self.iter().collect();
        write!(f, "{}", rights.join(", "))
    }
}

impl<S> FromIterator<S> for AccessRightSet
where
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for AccessRightSet {
    fn from(value: Vec<String>) -> Self {
        value.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::AccessRightSet;

    #[test]
    fn label_is_sorted_and_deduplicated() {
        let rights: AccessRightSet = ["write", "read", "write"].into_iter().collect();

        assert_eq!(rights.len(), 2);
        assert!(rights.contains("read"));
        assert!(!rights.contains("delete"));
        assert_eq!(rights.to_string(), "read, write");
    }

    #[test]
    fn empty_label() {
        assert_eq!(AccessRightSet::new().to_string(), "");
    }

    #[test]
    fn serializes_as_list() {
        let rights: AccessRightSet = ["read", "write"].into_iter().collect();
        let json = serde_json::to_string(&rights).unwrap();
        assert_eq!(json, r#"["read","write"]"#);
    }
}
