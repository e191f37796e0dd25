// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document (de)serialization of attributes.
//!
//! Reading is lenient: a missing or malformed field is logged and the field
//! keeps its current value, so one bad attribute never aborts a load.

use super::{
    Attribute, AttributeData, AttributeType, ColorGradientAttribute, GradientStop,
};
use crate::serialization::{insert_field, FieldSerialize};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Read `obj[key]` into `target`, keeping `target` untouched on failure
fn read<'a, T: Deserialize<'a>>(obj: &'a Map<String, Value>, key: &str, target: &mut T) -> bool {
    match obj.get(key) {
        Some(value) => match T::deserialize(value) {
            Ok(parsed) => {
                *target = parsed;
                true
            }
            Err(e) => {
                tracing::error!("Malformed attribute field '{}': {}", key, e);
                false
            }
        },
        None => {
            tracing::error!("Missing attribute field '{}'", key);
            false
        }
    }
}

/// Like [`read`] but silent when the key is absent
fn read_optional<'a, T: Deserialize<'a>>(
    obj: &'a Map<String, Value>,
    key: &str,
    target: &mut T,
) -> bool {
    if obj.contains_key(key) {
        read(obj, key, target)
    } else {
        true
    }
}

/// Clamp a value read from a document into its (also read) bounds
fn clamp_loaded<T: PartialOrd + Copy + std::fmt::Debug>(value: &mut T, vmin: T, vmax: T) {
    let clamped = if *value < vmin {
        vmin
    } else if *value > vmax {
        vmax
    } else {
        return;
    };
    tracing::warn!(
        "Loaded value {:?} outside [{:?}, {:?}], clamped to {:?}",
        value,
        vmin,
        vmax,
        clamped
    );
    *value = clamped;
}

fn clamp_all<T: PartialOrd + Copy + std::fmt::Debug>(values: &mut [T], vmin: T, vmax: T) {
    for v in values {
        clamp_loaded(v, vmin, vmax);
    }
}

fn gradient_to_json(attr: &ColorGradientAttribute) -> Value {
    let stops: Vec<[f32; 5]> = attr
        .value
        .iter()
        .map(|s| [s.position, s.color[0], s.color[1], s.color[2], s.color[3]])
        .collect();
    json!(stops)
}

impl Attribute {
    /// Serialize the current state to a document object
    pub fn json_to(&self) -> Value {
        let mut json = match &self.data {
            AttributeData::Bool(a) => json!({ "value": a.value }),
            AttributeData::Cloud(a) => json!({ "value": a.value }),
            AttributeData::Color(a) => json!({ "value": a.value }),
            AttributeData::ColorGradient(a) => json!({ "value": gradient_to_json(a) }),
            AttributeData::Filename(a) => json!({
                "value": a.value.to_string_lossy(),
                "filter": a.filter,
            }),
            AttributeData::Float(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
                "fmt": a.fmt,
            }),
            AttributeData::Int(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
            }),
            AttributeData::MapEnum(a) => json!({
                "value": a.choices,
                "choice": a.choice,
            }),
            AttributeData::Matrix(a) => json!({ "value": a.value }),
            AttributeData::Path(a) => json!({ "value": a.value }),
            AttributeData::Range(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
                "fmt": a.fmt,
            }),
            AttributeData::Seed(a) => json!({ "value": a.value }),
            AttributeData::Shape(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
            }),
            AttributeData::String(a) => json!({ "value": a.value }),
            AttributeData::VecFloat(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
                "fmt": a.fmt,
            }),
            AttributeData::VecInt(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
            }),
            AttributeData::WaveNb(a) => json!({
                "value": a.value,
                "vmin": a.vmin,
                "vmax": a.vmax,
                "link_xy": a.link_xy,
                "fmt": a.fmt,
            }),
        };

        json["type"] = json!(self.attribute_type().key());
        json
    }

    /// Update the current state from a document object.
    ///
    /// Returns `false` if anything had to be skipped; skipped fields keep
    /// their previous value.
    pub fn json_from(&mut self, json: &Value) -> bool {
        let Some(obj) = json.as_object() else {
            tracing::error!("Attribute is not an object: {}", json);
            return false;
        };

        if let Some(key) = obj.get("type").and_then(Value::as_str) {
            let expected = self.attribute_type();
            if AttributeType::from_key(key) != Some(expected) {
                tracing::error!(
                    "Attribute type mismatch: document has '{}', expected '{}'",
                    key,
                    expected.key()
                );
                return false;
            }
        }

        match &mut self.data {
            AttributeData::Bool(a) => read(obj, "value", &mut a.value),
            AttributeData::Cloud(a) => read(obj, "value", &mut a.value),
            AttributeData::Color(a) => {
                let ok = read(obj, "value", &mut a.value);
                clamp_all(&mut a.value, 0.0, 1.0);
                ok
            }
            AttributeData::ColorGradient(a) => {
                let mut stops: Vec<[f32; 5]> = Vec::new();
                if !read(obj, "value", &mut stops) {
                    return false;
                }
                a.value = stops
                    .into_iter()
                    .map(|s| GradientStop {
                        position: s[0],
                        color: [s[1], s[2], s[3], s[4]],
                    })
                    .collect();
                a.value.sort_by(|x, y| x.position.total_cmp(&y.position));
                true
            }
            AttributeData::Filename(a) => {
                let mut value = a.value.to_string_lossy().into_owned();
                let ok = read(obj, "value", &mut value) & read_optional(obj, "filter", &mut a.filter);
                a.value = PathBuf::from(value);
                ok
            }
            AttributeData::Float(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax)
                    & read_optional(obj, "fmt", &mut a.fmt);
                clamp_loaded(&mut a.value, a.vmin, a.vmax);
                ok
            }
            AttributeData::Int(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax);
                clamp_loaded(&mut a.value, a.vmin, a.vmax);
                ok
            }
            AttributeData::MapEnum(a) => {
                let ok = read_optional(obj, "value", &mut a.choices);
                let mut choice = a.choice.clone();
                if !read(obj, "choice", &mut choice) {
                    return false;
                }
                if a.choices.contains_key(&choice) {
                    a.choice = choice;
                    ok
                } else {
                    tracing::error!("Unknown enumeration choice '{}', keeping '{}'", choice, a.choice);
                    false
                }
            }
            AttributeData::Matrix(a) => read(obj, "value", &mut a.value),
            AttributeData::Path(a) => read(obj, "value", &mut a.value),
            AttributeData::Range(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax)
                    & read_optional(obj, "fmt", &mut a.fmt);
                clamp_all(&mut a.value, a.vmin, a.vmax);
                ok
            }
            AttributeData::Seed(a) => read(obj, "value", &mut a.value),
            AttributeData::Shape(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax);
                clamp_all(&mut a.value, a.vmin, a.vmax);
                ok
            }
            AttributeData::String(a) => read(obj, "value", &mut a.value),
            AttributeData::VecFloat(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax)
                    & read_optional(obj, "fmt", &mut a.fmt);
                clamp_all(&mut a.value, a.vmin, a.vmax);
                ok
            }
            AttributeData::VecInt(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax);
                clamp_all(&mut a.value, a.vmin, a.vmax);
                ok
            }
            AttributeData::WaveNb(a) => {
                let ok = read(obj, "value", &mut a.value)
                    & read(obj, "vmin", &mut a.vmin)
                    & read(obj, "vmax", &mut a.vmax)
                    & read_optional(obj, "link_xy", &mut a.link_xy)
                    & read_optional(obj, "fmt", &mut a.fmt);
                clamp_all(&mut a.value, a.vmin, a.vmax);
                ok
            }
        }
    }
}

impl FieldSerialize for Attribute {
    fn serialize_field(&self, field: &str, doc: &mut Value) -> bool {
        insert_field(doc, field, self.json_to())
    }

    fn deserialize_field(&mut self, field: &str, doc: &Value) -> bool {
        match doc.get(field) {
            Some(json) => self.json_from(json),
            None => {
                tracing::warn!("Attribute '{}' missing from document, keeping default", field);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::data::{Cloud, Point};
    use serde_json::json;

    #[test]
    fn test_float_round_trip() {
        let mut attr = Attribute::new(FloatAttribute::new(0.25, 0.0, 2.0));
        attr.set::<FloatAttribute>(1.75).unwrap();
        let json = attr.json_to();
        assert_eq!(json["type"], "float");

        let mut loaded = Attribute::new(FloatAttribute::new(0.25, 0.0, 2.0));
        assert!(loaded.json_from(&json));
        assert_eq!(loaded, attr);
    }

    #[test]
    fn test_missing_field_keeps_default() {
        let mut attr = Attribute::new(IntAttribute::new(3, 0, 10));
        assert!(!attr.json_from(&json!({ "vmin": 0, "vmax": 10 })));
        assert_eq!(attr.get::<IntAttribute>(), Ok(3));
    }

    #[test]
    fn test_malformed_field_keeps_default() {
        let mut attr = Attribute::new(BoolAttribute::new(true));
        assert!(!attr.json_from(&json!({ "value": "yes" })));
        assert_eq!(attr.get::<BoolAttribute>(), Ok(true));
    }

    #[test]
    fn test_type_mismatch_is_skipped() {
        let mut attr = Attribute::new(SeedAttribute::new(5));
        assert!(!attr.json_from(&json!({ "type": "float", "value": 0.5 })));
        assert_eq!(attr.get::<SeedAttribute>(), Ok(5));
    }

    #[test]
    fn test_out_of_range_value_is_clamped_on_load() {
        let mut attr = Attribute::new(FloatAttribute::new(0.5, 0.0, 1.0));
        assert!(attr.json_from(&json!({ "value": 4.0, "vmin": 0.0, "vmax": 1.0 })));
        assert_eq!(attr.get::<FloatAttribute>(), Ok(1.0));
    }

    #[test]
    fn test_unknown_choice_is_rejected() {
        let mut attr = Attribute::new(MapEnumAttribute::new([("a", 0), ("b", 1)]));
        assert!(!attr.json_from(&json!({ "choice": "z" })));
        assert_eq!(attr.get::<MapEnumAttribute>().unwrap(), "a");
    }

    #[test]
    fn test_cloud_and_gradient_round_trip() {
        let mut cloud = Attribute::new(CloudAttribute::default());
        cloud
            .set::<CloudAttribute>(Cloud::new(vec![Point::new(0.1, 0.2, 0.3)]))
            .unwrap();
        let mut loaded = Attribute::new(CloudAttribute::default());
        assert!(loaded.json_from(&cloud.json_to()));
        assert_eq!(loaded, cloud);

        let gradient = Attribute::new(ColorGradientAttribute::default());
        let json = gradient.json_to();
        assert_eq!(json["value"][1], json!([1.0, 1.0, 1.0, 1.0, 1.0]));
        let mut loaded = Attribute::new(ColorGradientAttribute { value: Vec::new() });
        assert!(loaded.json_from(&json));
        assert_eq!(loaded.data(), gradient.data());
    }
}
