//! Optional-path lookup over raw telemetry
//!
//! Distinguishes "the path does not exist" from "the path exists and holds an
//! empty container", which a chain of `get(..).unwrap_or_default()` calls
//! cannot.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Present(&'a Value),
    Absent,
}

impl<'a> Lookup<'a> {
    /// Walk `path` from `root`, one object key per segment
    pub fn at(root: &'a Value, path: &[&str]) -> Self {
        let mut current = root;
        for segment in path {
            match current.get(*segment) {
                Some(next) => current = next,
                None => return Lookup::Absent,
            }
        }
        Lookup::Present(current)
    }

    /// First path that resolves, in order of preference
    pub fn first_of(root: &'a Value, paths: &[&[&str]]) -> Self {
        paths
            .iter()
            .map(|path| Self::at(root, path))
            .find(Lookup::is_present)
            .unwrap_or(Lookup::Absent)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Lookup::Present(_))
    }

    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Lookup::Present(v) => Some(v),
            Lookup::Absent => None,
        }
    }

    /// The value as an object, `None` when absent or not an object
    pub fn object(&self) -> Option<&'a Map<String, Value>> {
        self.value().and_then(Value::as_object)
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.value().and_then(Value::as_str)
    }

    /// Continue the walk below this node
    pub fn get(&self, path: &[&str]) -> Lookup<'a> {
        match self {
            Lookup::Present(v) => Lookup::at(v, path),
            Lookup::Absent => Lookup::Absent,
        }
    }

    /// Use `other` when this lookup is absent
    pub fn or(self, other: Lookup<'a>) -> Lookup<'a> {
        if self.is_present() {
            self
        } else {
            other
        }
    }
}
