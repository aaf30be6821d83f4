//! Manager actions

/// A named manager action with ordered parameters
///
/// Parameter keys are case-insensitive: setting a key that already exists
/// (in any case) replaces its value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    params: Vec<(String, String)>,
}

impl Action {
    /// Create an action without parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Builder-style [`set`](Self::set)
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a parameter
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .params
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Action name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter value by key, ignoring case
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Parameters in insertion order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Query pairs for the request, starting with `action`
    pub fn query(&self) -> Vec<(&str, &str)> {
        std::iter::once(("action", self.name.as_str()))
            .chain(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_keep_order() {
        let action = Action::new("Login")
            .param("Username", "relay")
            .param("Secret", "pw");
        assert_eq!(
            action.query(),
            vec![("action", "Login"), ("Username", "relay"), ("Secret", "pw")]
        );
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let action = Action::new("SetVar")
            .param("Variable", "A")
            .param("Value", "1")
            .param("VARIABLE", "B");
        assert_eq!(action.get("variable"), Some("B"));
        assert_eq!(action.params().len(), 2);
        assert_eq!(action.params()[0].0, "Variable");
    }
}
