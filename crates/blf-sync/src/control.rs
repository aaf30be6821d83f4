//! Switch control surface
//!
//! The operations a control endpoint exposes: list switches, read one, set
//! or toggle one. Changes go through [`Model`] like any PBX event, so boards
//! and managers see them the same way.

use std::sync::Arc;

use blf_logic::{Model, SwitchId};
use thiserror::Error;
use tracing::info;

/// Faults reported to control callers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlFault {
    /// No switch name given (empty or blank)
    #[error("switch name required")]
    NameRequired,

    /// No switch with this name is configured
    #[error("switch not found: {0}")]
    NotFound(String),
}

/// Reads and writes switches by name
#[derive(Clone)]
pub struct Controller {
    model: Arc<Model>,
}

impl Controller {
    pub fn new(model: Arc<Model>) -> Self {
        Self { model }
    }

    /// Names of all switches in configuration order
    pub fn switch_names(&self) -> Vec<String> {
        self.model
            .switches()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// All switches with their current state
    pub fn switches(&self) -> Vec<(String, bool)> {
        self.model
            .switches()
            .iter()
            .map(|s| (s.name().to_string(), s.is_on()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<bool, ControlFault> {
        let id = self.resolve(name)?;
        Ok(self.model.switches().get(id).is_on())
    }

    /// Set a switch, returning whether its state changed
    pub fn set(&self, name: &str, on: bool) -> Result<bool, ControlFault> {
        let id = self.resolve(name)?;
        let changed = self.model.set_switch(id, on);
        if changed {
            info!(
                "{} turned {} by control request",
                self.model.switches().get(id).name(),
                if on { "on" } else { "off" }
            );
        }
        Ok(changed)
    }

    /// Flip a switch, returning its new state
    pub fn toggle(&self, name: &str) -> Result<bool, ControlFault> {
        let id = self.resolve(name)?;
        let on = self.model.toggle_switch(id);
        info!(
            "{} toggled {} by control request",
            self.model.switches().get(id).name(),
            if on { "on" } else { "off" }
        );
        Ok(on)
    }

    fn resolve(&self, name: &str) -> Result<SwitchId, ControlFault> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlFault::NameRequired);
        }
        self.model
            .switches()
            .find(name)
            .ok_or_else(|| ControlFault::NotFound(name.to_string()))
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("switches", &self.model.switches().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blf_logic::{ModelSpec, SwitchSpec};

    fn controller() -> Controller {
        let spec = ModelSpec {
            switches: vec![SwitchSpec::new("West"), SwitchSpec::with_initial("East", true)],
            ..ModelSpec::default()
        };
        Controller::new(Arc::new(Model::build(&spec).unwrap()))
    }

    #[test]
    fn test_get_set_toggle() {
        let control = controller();
        assert_eq!(control.get("west"), Ok(false));
        assert_eq!(control.set("WEST", true), Ok(true));
        assert_eq!(control.set("West", true), Ok(false));
        assert_eq!(control.toggle("East"), Ok(false));
        assert_eq!(
            control.switches(),
            vec![("West".to_string(), true), ("East".to_string(), false)]
        );
    }

    #[test]
    fn test_faults() {
        let control = controller();
        assert_eq!(control.get(""), Err(ControlFault::NameRequired));
        assert_eq!(control.set("  ", true), Err(ControlFault::NameRequired));
        assert_eq!(
            control.get("North"),
            Err(ControlFault::NotFound("North".to_string()))
        );
        assert_eq!(control.switch_names(), vec!["West", "East"]);
    }
}
