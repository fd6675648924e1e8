use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    EmptyFieldName,
    NamedParamsDisabled,
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFieldName => write!(f, "Field name not specified"),
            Self::NamedParamsDisabled => write!(f, "Named parameters are not enabled"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// The set of properties associated with a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProps {
    /// Whether the field may be used in a query. When false and an
    ///  expression references the field, the code generator raises an error.
    pub filterable: bool,
    /// Maps the field to the column name of the underlying database. Empty
    ///  means "same as the field name" and is resolved on insertion.
    pub native_name: String,
}

impl FieldProps {
    pub fn new(filterable: bool, native_name: impl Into<String>) -> Self {
        Self {
            filterable,
            native_name: native_name.into(),
        }
    }
}

/// The options a [crate::interpreter::CodeGenerator] consults while
///  rendering.
///
/// The field table is built once and then treated as read-only; it is held
///  behind an [Arc] so that [Clone] shares it. The named-parameter state is
///  the mutable part and is deep-copied, which makes "clone per concurrent
///  generation" the supported sharing pattern.
#[derive(Debug, Clone, Default)]
pub struct RenderingOptions {
    fields: Arc<HashMap<String, FieldProps>>,
    param_prefix: Option<String>,
    named_params: Option<NamedParams>,
}

#[derive(Debug, Clone, Default)]
struct NamedParams {
    values: HashMap<String, String>,
}

pub const DEFAULT_PARAM_PREFIX: &str = "P";

impl RenderingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole field configuration with [m]. An empty native name
    ///  defaults to the field's own name.
    pub fn fields(&mut self, m: HashMap<String, FieldProps>) -> &mut Self {
        let mut fields = HashMap::with_capacity(m.len());
        for (name, mut props) in m {
            if props.native_name.is_empty() {
                props.native_name = name.clone();
            }
            fields.insert(name, props);
        }
        self.fields = Arc::new(fields);
        self
    }

    /// Replaces the whole field configuration with a name → native-name map,
    ///  marking every field filterable.
    pub fn fields_with_default(&mut self, m: HashMap<String, String>) -> &mut Self {
        let fields = m
            .into_iter()
            .map(|(name, native)| {
                let native = if native.is_empty() {
                    name.clone()
                } else {
                    native
                };
                (name, FieldProps::new(true, native))
            })
            .collect();
        self.fields = Arc::new(fields);
        self
    }

    pub fn add_field_props(
        &mut self,
        field_name: &str,
        mut props: FieldProps,
    ) -> Result<(), ConfigurationError> {
        if field_name.is_empty() {
            return Err(ConfigurationError::EmptyFieldName);
        }
        if props.native_name.is_empty() {
            props.native_name = field_name.to_string();
        }
        Arc::make_mut(&mut self.fields).insert(field_name.to_string(), props);
        Ok(())
    }

    pub fn remove_field_props(&mut self, field_name: &str) -> Option<FieldProps> {
        Arc::make_mut(&mut self.fields).remove(field_name)
    }

    pub fn get_field_props(&self, field_name: &str) -> Option<&FieldProps> {
        self.fields.get(field_name)
    }

    /// Turns parameter externalization on. Any previously collected values
    ///  are dropped and numbering restarts at 1.
    pub fn enable_named_params(&mut self) -> &mut Self {
        self.named_params = Some(NamedParams::default());
        self
    }

    /// Turns parameter externalization off, discarding the collected values.
    pub fn disable_named_params(&mut self) -> &mut Self {
        self.named_params = None;
        self
    }

    pub fn named_params_enabled(&self) -> bool {
        self.named_params.is_some()
    }

    /// The parameter-name → literal-text map collected by the last
    ///  generation run(s) since named parameters were enabled.
    pub fn get_named_param_values(&self) -> Result<&HashMap<String, String>, ConfigurationError> {
        self.named_params
            .as_ref()
            .map(|np| &np.values)
            .ok_or(ConfigurationError::NamedParamsDisabled)
    }

    pub fn set_named_params_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.param_prefix = Some(prefix.into());
        self
    }

    pub fn named_params_prefix(&self) -> &str {
        self.param_prefix.as_deref().unwrap_or(DEFAULT_PARAM_PREFIX)
    }

    /// Registers the rendered text of one literal and hands back the
    ///  placeholder that replaces it, or None when externalization is off.
    /// Numbering continues across generation passes until the next
    ///  [enable_named_params](Self::enable_named_params).
    pub(crate) fn externalize(&mut self, rendered: &str) -> Option<String> {
        let prefix = self.named_params_prefix().to_string();
        let np = self.named_params.as_mut()?;
        let key = format!("{}{}", prefix, np.values.len() + 1);
        let placeholder = format!(":{key}");
        np.values.insert(key, rendered.to_string());
        Some(placeholder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_name_defaults_to_field_name() {
        let mut options = RenderingOptions::new();
        options.fields(HashMap::from([
            ("age".to_string(), FieldProps::new(true, "")),
            ("name".to_string(), FieldProps::new(true, "last_name")),
        ]));

        assert_eq!(options.get_field_props("age").unwrap().native_name, "age");
        assert_eq!(
            options.get_field_props("name").unwrap().native_name,
            "last_name"
        );
    }

    #[test]
    fn fields_with_default_marks_everything_filterable() {
        let mut options = RenderingOptions::new();
        options.fields_with_default(HashMap::from([
            ("age".to_string(), "years".to_string()),
            ("name".to_string(), String::new()),
        ]));

        let age = options.get_field_props("age").unwrap();
        assert!(age.filterable);
        assert_eq!(age.native_name, "years");
        assert_eq!(options.get_field_props("name").unwrap().native_name, "name");
    }

    #[test]
    fn add_remove_get_field_props() {
        let mut options = RenderingOptions::new();
        assert_eq!(
            options.add_field_props("", FieldProps::new(true, "")),
            Err(ConfigurationError::EmptyFieldName)
        );

        options
            .add_field_props("ssn", FieldProps::new(false, ""))
            .unwrap();
        assert_eq!(
            options.get_field_props("ssn"),
            Some(&FieldProps::new(false, "ssn"))
        );

        let removed = options.remove_field_props("ssn").unwrap();
        assert_eq!(removed.native_name, "ssn");
        assert_eq!(options.get_field_props("ssn"), None);
    }

    #[test]
    fn named_params_lifecycle() {
        let mut options = RenderingOptions::new();
        assert!(!options.named_params_enabled());
        assert_eq!(
            options.get_named_param_values(),
            Err(ConfigurationError::NamedParamsDisabled)
        );

        options.enable_named_params();
        assert_eq!(options.externalize("30"), Some(":P1".to_string()));
        assert_eq!(options.externalize("'J'"), Some(":P2".to_string()));
        let values = options.get_named_param_values().unwrap();
        assert_eq!(values.get("P1"), Some(&"30".to_string()));
        assert_eq!(values.get("P2"), Some(&"'J'".to_string()));

        // Re-enabling resets numbering, disabling discards the state
        options.enable_named_params();
        assert_eq!(options.externalize("1"), Some(":P1".to_string()));
        options.disable_named_params();
        assert_eq!(options.externalize("1"), None);
        assert!(options.get_named_param_values().is_err());
    }

    #[test]
    fn custom_prefix() {
        let mut options = RenderingOptions::new();
        assert_eq!(options.named_params_prefix(), "P");
        options.set_named_params_prefix("arg");
        options.enable_named_params();
        assert_eq!(
            options.externalize("42"),
            Some(":arg1".to_string())
        );
        assert_eq!(options.named_params_prefix(), "arg");
    }

    #[test]
    fn clone_shares_fields_and_isolates_params() {
        let mut original = RenderingOptions::new();
        original.fields_with_default(HashMap::from([("age".to_string(), String::new())]));
        original.enable_named_params();
        original.externalize("30");

        let mut clone = original.clone();
        clone.set_named_params_prefix("Q");
        clone.externalize("40");

        // The clone diverged...
        assert_eq!(clone.named_params_prefix(), "Q");
        assert_eq!(clone.get_named_param_values().unwrap().len(), 2);
        // ...the original did not
        assert_eq!(original.named_params_prefix(), "P");
        let values = original.get_named_param_values().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("P1"), Some(&"30".to_string()));

        // The field table itself is shared, not copied
        assert!(Arc::ptr_eq(&original.fields, &clone.fields));
    }
}
