use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// An immutable, cheaply-cloned set of workload labels.
#[derive(Clone, Debug, Eq, Default, Deserialize, Serialize)]
#[serde(from = "Map", into = "Map")]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

/// A disjunction of label sets.
///
/// An empty collection selects everything; otherwise an instance is selected
/// when any member's labels are a subset of the instance's labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collection(Vec<Labels>);

// === impl Labels ===

impl Labels {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if every label in `self` is present, with the same value,
    /// in `other`.
    pub fn is_subset_of(&self, other: &Labels) -> bool {
        self.0.iter().all(|(k, v)| other.0.get(k) == Some(v))
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Labels> for Map {
    fn from(Labels(labels): Labels) -> Self {
        Arc::try_unwrap(labels).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === impl Collection ===

impl Collection {
    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.is_empty() || self.0.iter().any(|selector| selector.is_subset_of(labels))
    }
}

impl From<Labels> for Collection {
    fn from(labels: Labels) -> Self {
        Self(vec![labels])
    }
}

impl std::iter::FromIterator<Labels> for Collection {
    fn from_iter<T: IntoIterator<Item = Labels>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
