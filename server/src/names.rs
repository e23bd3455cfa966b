use std::collections::HashMap;

use crate::server_types::ConnId;

/// Display names currently in use, each mapped to the connection holding it.
///
/// A name that is already taken gets a counter appended, e.g. a second
/// "anna" becomes "anna_2", a third "anna_3".
#[derive(Debug, Default)]
pub struct Names {
    unique: HashMap<String, ConnId>,
    duplicates: HashMap<String, usize>,
}

impl Names {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `requested` for `id`, returning the name actually assigned.
    pub fn insert(&mut self, requested: &str, id: ConnId) -> String {
        let base = base_name(requested);

        if !self.unique.contains_key(base) {
            self.unique.insert(base.to_owned(), id);
            return base.to_owned();
        }

        let counter = self.duplicates.entry(base.to_owned()).or_insert(1);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if !self.unique.contains_key(&candidate) {
                self.unique.insert(candidate.clone(), id);
                return candidate;
            }
        }
    }

    /// Look up a name as a client would type it, e.g. "anna_" finds "anna".
    pub fn get(&self, name: &str) -> Option<ConnId> {
        self.unique.get(base_name(name)).copied()
    }

    // duplicate counters survive removal
    pub fn remove(&mut self, name: &str, id: ConnId) -> bool {
        match self.unique.get(name) {
            Some(owner) if *owner == id => self.unique.remove(name).is_some(),
            _ => false,
        }
    }

    pub fn to_list(&self) -> Vec<String> {
        let mut list: Vec<String> = self.unique.keys().cloned().collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.unique.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unique.is_empty()
    }

    pub fn clear(&mut self) {
        self.unique.clear();
    }
}

/// Requested names lose trailing underscores, which would clash with the
/// collision suffix. A name made only of underscores is kept as is.
pub fn base_name(requested: &str) -> &str {
    match requested.trim_end_matches('_') {
        "" => requested,
        trimmed => trimmed,
    }
}
