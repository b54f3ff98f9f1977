use serde::Deserialize;

/// Deserialize an optional string, treating the empty string as absent.
///
/// Environment variables are often exported with empty values in CI scripts,
/// and an empty endpoint should behave as if it was never configured.
pub fn deserialize_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

/// Deserialize a boolean flag that may also be given as a string such as `"False"` or `"1"`.
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Boolean(bool),
        Integer(i64),
        String(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Boolean(value) => Ok(value),
        Flag::Integer(value) => Ok(value != 0),
        Flag::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid flag: {other}"))),
        },
    }
}
