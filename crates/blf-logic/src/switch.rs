//! Named virtual switches

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::listeners::{Listeners, Subscription};

/// Index of a switch within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchId(pub usize);

/// Switch definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchSpec {
    /// Unique name (case-insensitive)
    pub name: String,
    /// State before anything assigns one
    #[serde(default)]
    pub initial: bool,
}

impl SwitchSpec {
    /// Switch that starts off
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: false,
        }
    }

    /// Switch with an explicit initial state
    pub fn with_initial(name: impl Into<String>, initial: bool) -> Self {
        Self {
            name: name.into(),
            initial,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SwitchCell {
    on: bool,
    dirty: bool,
}

/// A named on/off value
///
/// `dirty` is set by the first assignment after construction and never
/// cleared. It marks the local value as authoritative over whatever the PBX
/// remembers.
#[derive(Debug)]
pub struct Switch {
    id: SwitchId,
    name: String,
    cell: Mutex<SwitchCell>,
}

impl Switch {
    fn new(id: SwitchId, name: String, initial: bool) -> Self {
        Self {
            id,
            name,
            cell: Mutex::new(SwitchCell {
                on: initial,
                dirty: false,
            }),
        }
    }

    /// Registry index
    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// Name as configured
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn is_on(&self) -> bool {
        self.cell().on
    }

    /// Whether a value has been assigned since construction
    pub fn is_dirty(&self) -> bool {
        self.cell().dirty
    }

    /// Assign a state, returning whether it changed
    pub(crate) fn assign(&self, on: bool) -> bool {
        self.update(|_| on).0
    }

    /// Atomically replace the state with `f(current)`
    ///
    /// Returns `(changed, new_state)`.
    pub(crate) fn update(&self, f: impl FnOnce(bool) -> bool) -> (bool, bool) {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        let on = f(cell.on);
        let changed = on != cell.on;
        cell.on = on;
        cell.dirty = true;
        (changed, on)
    }

    fn cell(&self) -> SwitchCell {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All configured switches
#[derive(Debug)]
pub struct SwitchRegistry {
    switches: Vec<Switch>,
    index: HashMap<String, SwitchId>,
    listeners: Listeners<SwitchId>,
}

impl SwitchRegistry {
    /// Build the registry, rejecting empty and duplicate names
    pub fn new(specs: &[SwitchSpec]) -> Result<Self, ModelError> {
        let mut switches = Vec::with_capacity(specs.len());
        let mut index = HashMap::with_capacity(specs.len());

        for spec in specs {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(ModelError::EmptySwitchName);
            }
            let id = SwitchId(switches.len());
            if index.insert(name.to_lowercase(), id).is_some() {
                return Err(ModelError::DuplicateSwitch(name.to_string()));
            }
            switches.push(Switch::new(id, name.to_string(), spec.initial));
        }

        Ok(Self {
            switches,
            index,
            listeners: Listeners::new(),
        })
    }

    /// Look up a switch by name, ignoring case
    pub fn find(&self, name: &str) -> Option<SwitchId> {
        self.index.get(&name.trim().to_lowercase()).copied()
    }

    /// Access a switch by id
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this registry.
    pub fn get(&self, id: SwitchId) -> &Switch {
        &self.switches[id.0]
    }

    /// Iterate over all switches in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Switch> {
        self.switches.iter()
    }

    /// Number of switches
    pub fn len(&self) -> usize {
        self.switches.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Be told whenever any switch changes state
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(SwitchId) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub(crate) fn notify(&self, id: SwitchId) {
        self.listeners.notify(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let registry = SwitchRegistry::new(&[SwitchSpec::new("West"), SwitchSpec::new("East")])
            .unwrap();
        assert_eq!(registry.find("WEST"), Some(SwitchId(0)));
        assert_eq!(registry.find("east"), Some(SwitchId(1)));
        assert_eq!(registry.find("North"), None);
        assert_eq!(registry.get(SwitchId(0)).name(), "West");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = SwitchRegistry::new(&[SwitchSpec::new("Door"), SwitchSpec::new("DOOR")])
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateSwitch("DOOR".to_string()));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = SwitchRegistry::new(&[SwitchSpec::new("  ")]).unwrap_err();
        assert_eq!(err, ModelError::EmptySwitchName);
    }

    #[test]
    fn test_dirty_set_by_first_assignment() {
        let registry = SwitchRegistry::new(&[SwitchSpec::with_initial("Hall", true)]).unwrap();
        let hall = registry.get(SwitchId(0));
        assert!(hall.is_on());
        assert!(!hall.is_dirty());

        // Assigning the same value still marks it
        assert!(!hall.assign(true));
        assert!(hall.is_dirty());

        assert!(hall.assign(false));
        assert!(!hall.is_on());
    }

    #[test]
    fn test_update_flips_atomically() {
        let registry = SwitchRegistry::new(&[SwitchSpec::new("Hall")]).unwrap();
        let hall = registry.get(SwitchId(0));
        assert_eq!(hall.update(|on| !on), (true, true));
        assert_eq!(hall.update(|on| !on), (true, false));
    }
}
