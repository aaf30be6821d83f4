//! Device-state variables and relay user events

use std::str::FromStr;

/// Device state meaning "switch on"
pub const ON_STATE: &str = "INUSE";
/// Device state meaning "switch off"
pub const OFF_STATE: &str = "NOT_INUSE";

/// Placeholder replaced by the switch name in a device format
pub const NAME_PLACEHOLDER: &str = "{0}";

/// `UserEvent` value of relay control events
pub const RELAY_USER_EVENT: &str = "Relay";

/// Name of the device-state variable mirroring `switch`
///
/// ```rust
/// use blf_manager::device_variable;
///
/// assert_eq!(device_variable("Custom:{0}", "West"), "DEVICE_STATE(Custom:West)");
/// ```
pub fn device_variable(format: &str, switch: &str) -> String {
    format!("DEVICE_STATE({})", format.replace(NAME_PLACEHOLDER, switch))
}

/// Device-state value for a switch state
pub fn device_state(on: bool) -> &'static str {
    if on {
        ON_STATE
    } else {
        OFF_STATE
    }
}

/// Interpret a device-state value; anything but the two sentinels is `None`
pub fn parse_device_state(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(ON_STATE) {
        Some(true)
    } else if value.eq_ignore_ascii_case(OFF_STATE) {
        Some(false)
    } else {
        None
    }
}

/// Requested change carried by a relay user event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayAction {
    TurnOn,
    TurnOff,
    Toggle,
}

impl RelayAction {
    /// State after applying this action to `current`
    pub fn apply(self, current: bool) -> bool {
        match self {
            RelayAction::TurnOn => true,
            RelayAction::TurnOff => false,
            RelayAction::Toggle => !current,
        }
    }
}

impl FromStr for RelayAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("TurnOn") {
            Ok(Self::TurnOn)
        } else if s.eq_ignore_ascii_case("TurnOff") {
            Ok(Self::TurnOff)
        } else if s.eq_ignore_ascii_case("Toggle") {
            Ok(Self::Toggle)
        } else {
            Err(format!("unknown relay action: {s}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_variable_replaces_every_placeholder() {
        assert_eq!(
            device_variable("Custom:{0}-{0}", "Hall"),
            "DEVICE_STATE(Custom:Hall-Hall)"
        );
        assert_eq!(device_variable("Custom:lamp", "Hall"), "DEVICE_STATE(Custom:lamp)");
    }

    #[test]
    fn test_parse_device_state() {
        assert_eq!(parse_device_state("INUSE"), Some(true));
        assert_eq!(parse_device_state("not_inuse"), Some(false));
        assert_eq!(parse_device_state("UNKNOWN"), None);
        assert_eq!(parse_device_state(""), None);
    }

    #[test]
    fn test_relay_action_parse_and_apply() {
        assert_eq!("toggle".parse::<RelayAction>(), Ok(RelayAction::Toggle));
        assert_eq!("TURNON".parse::<RelayAction>(), Ok(RelayAction::TurnOn));
        assert!("Blink".parse::<RelayAction>().is_err());

        assert!(RelayAction::Toggle.apply(false));
        assert!(!RelayAction::Toggle.apply(true));
        assert!(!RelayAction::TurnOff.apply(true));
    }
}
