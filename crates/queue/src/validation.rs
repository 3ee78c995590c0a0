//! Input validation at submission time (spec.md §4.7: "required fields
//! present, type check ..., and constraints").

use serde_json::Value;

use crate::models::{ActionDefinition, FieldConstraint, InputFieldSpec};

pub fn validate(definition: &ActionDefinition, input: &Value) -> Result<(), String> {
    let Value::Object(fields) = input else {
        return Err("input must be a JSON object".into());
    };

    for spec in &definition.input_schema {
        match fields.get(&spec.name) {
            Some(value) => validate_field(spec, value)?,
            None if spec.required => return Err(format!("missing required field '{}'", spec.name)),
            None => {}
        }
    }

    Ok(())
}

fn validate_field(spec: &InputFieldSpec, value: &Value) -> Result<(), String> {
    if !spec.field_type.matches(value) {
        return Err(format!("field '{}' expected type {:?}", spec.name, spec.field_type));
    }
    check_constraint(&spec.name, &spec.constraint, value)
}

fn check_constraint(name: &str, constraint: &FieldConstraint, value: &Value) -> Result<(), String> {
    if let (Some(pattern), Some(s)) = (&constraint.pattern, value.as_str()) {
        let re = regex::Regex::new(pattern).map_err(|e| format!("field '{name}' has an invalid pattern: {e}"))?;
        if !re.is_match(s) {
            return Err(format!("field '{name}' does not match pattern '{pattern}'"));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = constraint.min {
            if n < min {
                return Err(format!("field '{name}' is below minimum {min}"));
            }
        }
        if let Some(max) = constraint.max {
            if n > max {
                return Err(format!("field '{name}' exceeds maximum {max}"));
            }
        }
    }

    if let Some(allowed) = &constraint.enum_values {
        if !allowed.contains(value) {
            return Err(format!("field '{name}' is not one of the allowed values"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionDefinition, FieldType, RateLimitConfig};
    use automation_errors::RetryPolicy;

    fn definition(schema: Vec<InputFieldSpec>) -> ActionDefinition {
        ActionDefinition {
            id: uuid::Uuid::new_v4(),
            name: "test-action".into(),
            handler_key: "noop".into(),
            timeout: std::time::Duration::from_secs(5),
            rate_limit: None::<RateLimitConfig>,
            retry_policy: RetryPolicy::default(),
            input_schema: schema,
        }
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let def = definition(vec![InputFieldSpec { name: "email".into(), field_type: FieldType::String, required: true, constraint: FieldConstraint::default() }]);
        let err = validate(&def, &serde_json::json!({})).unwrap_err();
        assert!(err.contains("email"));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let def = definition(vec![InputFieldSpec { name: "count".into(), field_type: FieldType::Number, required: true, constraint: FieldConstraint::default() }]);
        let err = validate(&def, &serde_json::json!({"count": "five"})).unwrap_err();
        assert!(err.contains("count"));
    }

    #[test]
    fn pattern_and_range_constraints_are_enforced() {
        let def = definition(vec![InputFieldSpec {
            name: "code".into(),
            field_type: FieldType::String,
            required: true,
            constraint: FieldConstraint { pattern: Some("^[A-Z]{3}$".into()), ..Default::default() },
        }]);
        assert!(validate(&def, &serde_json::json!({"code": "ABC"})).is_ok());
        assert!(validate(&def, &serde_json::json!({"code": "abc"})).is_err());
    }

    #[test]
    fn enum_constraint_restricts_values() {
        let def = definition(vec![InputFieldSpec {
            name: "tier".into(),
            field_type: FieldType::String,
            required: true,
            constraint: FieldConstraint { enum_values: Some(vec![serde_json::json!("gold"), serde_json::json!("silver")]), ..Default::default() },
        }]);
        assert!(validate(&def, &serde_json::json!({"tier": "gold"})).is_ok());
        assert!(validate(&def, &serde_json::json!({"tier": "bronze"})).is_err());
    }
}
