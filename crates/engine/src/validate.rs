//! Structural trigger validation with aggregated, structured errors.
//!
//! One validator serves both the intake surface (reject a payload with a
//! 400 listing every problem) and the pre-dispatch check in the selector.
//! All problems found in a trigger are reported together rather than
//! stopping at the first.

use serde::Serialize;

use cadence_core::model::{TriggerAction, TriggerFields};

/// Required trigger fields, in reporting order.
const REQUIRED_FIELDS: [&str; 4] = ["name", "type", "time", "action"];

/// A trigger failed structural validation. Carries every problem found,
/// so callers can surface them all in one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Name of the offending trigger, when it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Required fields that were absent or empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    /// The action value, when it was not CREATE_OR_UPDATE or DELETE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_action: Option<String>,
    /// Exactly one of `import_name`/`import_content` was supplied.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub incomplete_import_pair: bool,
}

impl ValidationError {
    fn is_clean(&self) -> bool {
        self.missing_fields.is_empty() && self.invalid_action.is_none() && !self.incomplete_import_pair
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.trigger.as_deref().unwrap_or("(unnamed)");
        write!(f, "trigger '{}' is invalid:", name)?;
        if !self.missing_fields.is_empty() {
            write!(f, " missing required fields: {};", self.missing_fields.join(", "))?;
        }
        if let Some(action) = &self.invalid_action {
            write!(
                f,
                " action must be either CREATE_OR_UPDATE or DELETE, got '{}';",
                action
            )?;
        }
        if self.incomplete_import_pair {
            write!(
                f,
                " both 'import_name' and 'import_content' are required to import a template;"
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validate the structural invariants of a trigger:
///
/// - `name`, `type`, `time`, `action` present and non-empty
/// - `action` is exactly `CREATE_OR_UPDATE` or `DELETE`
/// - `import_name` and `import_content` both present or both absent
///
/// `config` is not required here even for CREATE_OR_UPDATE; its absence
/// surfaces at dispatch time.
pub fn validate_trigger(fields: &TriggerFields<'_>) -> Result<(), ValidationError> {
    let mut err = ValidationError {
        trigger: fields.name.map(String::from),
        ..ValidationError::default()
    };

    let present = [fields.name, fields.kind, fields.time, fields.action];
    for (field, value) in REQUIRED_FIELDS.iter().zip(present) {
        if value.is_none() {
            err.missing_fields.push((*field).to_string());
        }
    }

    if let Some(action) = fields.action {
        if action.parse::<TriggerAction>().is_err() {
            err.invalid_action = Some(action.to_string());
        }
    }

    if fields.import_name.is_some() != fields.import_content.is_some() {
        err.incomplete_import_pair = true;
    }

    if err.is_clean() {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use cadence_core::model::TriggerSpec;

    use super::*;

    fn spec(name: &str, kind: &str, time: &str, action: &str) -> TriggerSpec {
        TriggerSpec {
            name: Some(name.into()),
            kind: Some(kind.into()),
            time: Some(time.into()),
            action: Some(action.into()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_well_formed_triggers() {
        let create = spec("create-trigger", "timer", "30 10 * * *", "CREATE_OR_UPDATE");
        assert!(validate_trigger(&create.fields()).is_ok());
        let delete = spec("delete-trigger", "timer", "30 12 * * *", "DELETE");
        assert!(validate_trigger(&delete.fields()).is_ok());
    }

    #[test]
    fn reports_every_missing_field_at_once() {
        let s = TriggerSpec {
            action: Some("DELETE".into()),
            ..Default::default()
        };
        let err = validate_trigger(&s.fields()).unwrap_err();
        assert_eq!(err.missing_fields, vec!["name", "type", "time"]);
        assert!(err.invalid_action.is_none());
    }

    #[test]
    fn missing_time_only() {
        let mut s = spec("t", "timer", "", "DELETE");
        s.time = None;
        let err = validate_trigger(&s.fields()).unwrap_err();
        assert_eq!(err.missing_fields, vec!["time"]);
    }

    #[test]
    fn rejects_unknown_actions() {
        let s = spec("t", "timer", "* * * * *", "THIS_IS_NOT_AN_ACTION");
        let err = validate_trigger(&s.fields()).unwrap_err();
        assert_eq!(err.invalid_action.as_deref(), Some("THIS_IS_NOT_AN_ACTION"));
        assert!(err.missing_fields.is_empty());
    }

    #[test]
    fn rejects_half_an_import_pair() {
        let mut s = spec("t", "timer", "* * * * *", "CREATE_OR_UPDATE");
        s.import_name = Some("network.jinja".into());
        let err = validate_trigger(&s.fields()).unwrap_err();
        assert!(err.incomplete_import_pair);

        s.import_content = Some("resources: []".into());
        assert!(validate_trigger(&s.fields()).is_ok());
    }

    #[test]
    fn config_not_required_for_create_or_update() {
        // Observed lenience: config is a dispatch-time concern, not a
        // structural one.
        let s = spec("t", "timer", "* * * * *", "CREATE_OR_UPDATE");
        assert!(s.config.is_none());
        assert!(validate_trigger(&s.fields()).is_ok());
    }

    #[test]
    fn empty_string_fields_count_as_missing() {
        let s = spec("", "timer", "* * * * *", "DELETE");
        let err = validate_trigger(&s.fields()).unwrap_err();
        assert_eq!(err.missing_fields, vec!["name"]);
        assert!(err.trigger.is_none());
    }
}
