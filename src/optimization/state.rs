use std::collections::{BTreeMap, btree_map::Entry};

use serde::{Serialize, de::DeserializeOwned};

use crate::{error::Result, param::ParamId};

/// The per-parameter states of an optimizer, keyed by the parameter's stable handle.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMap<S> {
    states: BTreeMap<ParamId, S>,
}

impl<S> StateMap<S> {
    pub fn new() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: ParamId) -> Option<&S> {
        self.states.get(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &S)> {
        self.states.iter().map(|(&id, state)| (id, state))
    }

    /// Gets the state of a parameter, creating it on its first encounter.
    ///
    /// # Arguments
    /// * `id` - The parameter's handle.
    /// * `init` - Builds the initial state.
    ///
    /// # Returns
    /// The state or the error returned by `init`.
    pub fn get_or_try_insert_with<F>(&mut self, id: ParamId, init: F) -> Result<&mut S>
    where
        F: FnOnce() -> Result<S>,
    {
        match self.states.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(init()?)),
        }
    }
}

impl<S> Default for StateMap<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Serialize> StateMap<S> {
    /// Serializes every state, as a list of `[id, state]` pairs.
    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<_> = self.states.iter().collect();
        Ok(serde_json::to_string(&entries)?)
    }
}

impl<S: DeserializeOwned> StateMap<S> {
    /// Deserializes a state map written by `to_json`.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<(ParamId, S)> = serde_json::from_str(json)?;
        Ok(Self {
            states: entries.into_iter().collect(),
        })
    }
}
