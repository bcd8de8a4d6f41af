//! Request body types for the script-tile endpoints.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use tile_common::{ScriptTileError, ScriptTileResult};

/// A script rendering request: named raster inputs plus the pixel script.
///
/// `inputs` keeps the JSON object's document order because the first
/// declared input fixes the reference CRS; a plain map would lose that, so
/// deserialization is hand-written.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomScriptRequest {
    /// `(name, source identifier)` pairs in declaration order.
    pub inputs: Vec<(String, String)>,
    pub script: String,
}

impl CustomScriptRequest {
    /// Declared input names, in order, for the compiler.
    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Structural validation that serde cannot express: non-empty names
    /// and no duplicate input names.
    pub fn validate(&self) -> ScriptTileResult<()> {
        for (i, (name, _)) in self.inputs.iter().enumerate() {
            if name.is_empty() {
                return Err(ScriptTileError::InvalidParameter {
                    param: "inputs".to_string(),
                    message: "input names must be non-empty".to_string(),
                });
            }
            if self.inputs[..i].iter().any(|(seen, _)| seen == name) {
                return Err(ScriptTileError::InvalidParameter {
                    param: "inputs".to_string(),
                    message: format!("duplicate input name '{}'", name),
                });
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for CustomScriptRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RequestVisitor)
    }
}

struct RequestVisitor;

impl<'de> Visitor<'de> for RequestVisitor {
    type Value = CustomScriptRequest;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object with 'inputs' and 'script'")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut inputs: Option<Vec<(String, String)>> = None;
        let mut script: Option<String> = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "inputs" => {
                    if inputs.is_some() {
                        return Err(de::Error::duplicate_field("inputs"));
                    }
                    inputs = Some(map.next_value::<OrderedInputs>()?.0);
                }
                "script" => {
                    if script.is_some() {
                        return Err(de::Error::duplicate_field("script"));
                    }
                    script = Some(map.next_value()?);
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(CustomScriptRequest {
            inputs: inputs.ok_or_else(|| de::Error::missing_field("inputs"))?,
            script: script.ok_or_else(|| de::Error::missing_field("script"))?,
        })
    }
}

/// JSON object deserialized as pairs in document order.
struct OrderedInputs(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedInputs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct InputsVisitor;

        impl<'de> Visitor<'de> for InputsVisitor {
            type Value = OrderedInputs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping input names to source identifiers")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, identifier)) = map.next_entry::<String, String>()? {
                    pairs.push((name, identifier));
                }
                Ok(OrderedInputs(pairs))
            }
        }

        deserializer.deserialize_map(InputsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_preserve_document_order() {
        let request: CustomScriptRequest = serde_json::from_str(
            r#"{"inputs": {"zulu": "file:z.grid", "alpha": "file:a.grid", "mid": "file:m.grid"},
                "script": "return [0, 0, 0, 255]"}"#,
        )
        .unwrap();
        let names = request.input_names();
        assert_eq!(names, vec!["zulu", "alpha", "mid"]);
    }

    #[test]
    fn test_missing_script_rejected() {
        let err = serde_json::from_str::<CustomScriptRequest>(r#"{"inputs": {}}"#).unwrap_err();
        assert!(err.to_string().contains("script"));
    }

    #[test]
    fn test_duplicate_name_rejected_by_validate() {
        // serde_json collapses duplicate keys, so validate() guards the
        // post-parse shape
        let request = CustomScriptRequest {
            inputs: vec![
                ("a".to_string(), "file:x.grid".to_string()),
                ("a".to_string(), "file:y.grid".to_string()),
            ],
            script: "return [0, 0, 0, 255]".to_string(),
        };
        assert!(matches!(
            request.validate().unwrap_err(),
            ScriptTileError::InvalidParameter { .. }
        ));
    }
}
