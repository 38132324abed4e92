use serde_json::{Map, Value};

use shared_config::{FieldMapping, FieldType};

use crate::models::FieldError;

/// Walk the untyped payload tree with the configured field mappings and
/// assemble the canonical payload object. Paths are dot-separated; a
/// missing optional field is simply omitted.
pub fn extract_fields(raw: &Value, mappings: &[FieldMapping]) -> Result<Value, Vec<FieldError>> {
    let mut extracted = Map::new();
    let mut errors = Vec::new();

    for mapping in mappings {
        let value = lookup_path(raw, &mapping.path);

        let Some(value) = value else {
            if mapping.required {
                errors.push(FieldError::new(&mapping.name, "is required"));
            }
            continue;
        };

        if value.is_null() {
            if mapping.required {
                errors.push(FieldError::new(&mapping.name, "is required"));
            }
            continue;
        }

        match check_shape(value, mapping) {
            Ok(()) => {
                extracted.insert(mapping.name.clone(), value.clone());
            }
            Err(message) => errors.push(FieldError::new(&mapping.name, message)),
        }
    }

    if errors.is_empty() {
        Ok(Value::Object(extracted))
    } else {
        Err(errors)
    }
}

fn lookup_path<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = raw;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn check_shape(value: &Value, mapping: &FieldMapping) -> Result<(), String> {
    match mapping.field_type {
        FieldType::Object => {
            if !value.is_object() {
                return Err("must be an object".to_string());
            }
        }
        FieldType::String | FieldType::Email | FieldType::Phone | FieldType::Date => {
            let Some(text) = value.as_str() else {
                return Err("must be a string".to_string());
            };
            if text.trim().is_empty() && mapping.required {
                return Err("is required".to_string());
            }
            if let Some(max) = mapping.max_length {
                if text.len() > max {
                    return Err(format!("must be at most {max} characters"));
                }
            }
        }
    }
    Ok(())
}
