//! Prompt templates with `{{variable}}` substitution.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A required variable was not provided at render time.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },
}

/// A prompt template with `{{variable}}` placeholders.
///
/// Unknown placeholders render as empty text unless declared required, so
/// an operator-supplied template with a typo degrades instead of failing
/// the whole dispatch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptTemplate {
    template: String,
    #[serde(default)]
    required_variables: Vec<String>,
}

impl PromptTemplate {
    /// Creates a template from raw text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            required_variables: Vec::new(),
        }
    }

    /// Declares a variable that must be supplied at render time.
    #[must_use]
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required_variables.push(name.into());
        self
    }

    /// Renders the template with the supplied variables.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a declared required
    /// variable has no value.
    pub fn render(&self, vars: &HashMap<String, String>) -> TemplateResult<String> {
        let mut result = self.template.clone();
        for name in placeholder_names(&self.template) {
            let value = match vars.get(&name) {
                Some(value) => value.as_str(),
                None if self.required_variables.contains(&name) => {
                    return Err(TemplateError::MissingVariable { name });
                }
                None => "",
            };
            let placeholder = format!("{{{{{name}}}}}");
            result = result.replace(&placeholder, value);
        }
        Ok(result)
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Collects the distinct `{{name}}` placeholders in a template.
fn placeholder_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let name = after[..close].trim();
        if !name.is_empty() && !names.iter().any(|existing| existing == name) {
            names.push(name.to_owned());
        }
        rest = &after[close + 2..];
    }
    names
}
