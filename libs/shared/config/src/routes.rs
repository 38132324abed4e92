use serde::Deserialize;

/// Route and field-mapping configuration, overridable through the `ROUTES`
/// env var. Field mappings drive the payload extractor: each entry names a
/// dot-separated path into the submitted JSON tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutesConfig {
    pub submissions_path: String,
    pub fields: Vec<FieldMapping>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            submissions_path: "/submissions".to_string(),
            fields: default_field_mappings(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub name: String,
    pub path: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Email,
    Phone,
    Date,
    Object,
}

fn default_field_mappings() -> Vec<FieldMapping> {
    let field = |name: &str, path: &str, field_type, required, max_length| FieldMapping {
        name: name.to_string(),
        path: path.to_string(),
        field_type,
        required,
        max_length,
    };
    vec![
        field("firstName", "firstName", FieldType::String, true, Some(50)),
        field("lastName", "lastName", FieldType::String, true, Some(50)),
        field("email", "email", FieldType::Email, true, Some(100)),
        field("phone", "phone", FieldType::Phone, false, Some(20)),
        field("address", "address", FieldType::Object, false, None),
        field("dateOfBirth", "dateOfBirth", FieldType::Date, false, Some(10)),
        field("turnstileToken", "turnstileToken", FieldType::String, true, Some(4096)),
    ]
}
