// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded, typed node parameters.
//!
//! Every attribute kind is a plain struct holding its current value and, where
//! it makes sense, its bounds. [`AttributeData`] is the closed sum over all
//! kinds and [`Attribute`] wraps it together with a label and the
//! construction-time default.
//!
//! Node implementations access attributes through the [`AttributeKind`]
//! trait, which turns a kind mismatch into an [`AttributeError::WrongType`]
//! instead of a panic:
//!
//! ```
//! use strata_graph::attribute::{Attribute, FloatAttribute, IntAttribute};
//!
//! let mut gain = Attribute::new(FloatAttribute::new(2.0, 0.01, 10.0));
//! assert_eq!(gain.get::<FloatAttribute>().unwrap(), 2.0);
//! assert!(gain.get::<IntAttribute>().is_err());
//! assert!(gain.set::<FloatAttribute>(20.0).is_err());
//! ```
//!
//! Writes outside `[vmin, vmax]` are rejected and leave the value unchanged.

mod json;

use crate::data::{Cloud, Path};
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;

/// Seed used by seed attributes when none is given
pub const DEFAULT_SEED: u32 = 1;

/// Default wavenumber for noise-like primitives
pub const DEFAULT_WAVENUMBER: f32 = 2.0;

/// Discriminator of attribute kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// Boolean flag
    Bool,
    /// Point cloud
    Cloud,
    /// RGBA color
    Color,
    /// Color gradient
    ColorGradient,
    /// File name
    Filename,
    /// Bounded float
    Float,
    /// Bounded integer
    Int,
    /// Named choice among integer values
    MapEnum,
    /// Float matrix
    Matrix,
    /// Polyline
    Path,
    /// Bounded float interval
    Range,
    /// Random seed
    Seed,
    /// Bounded 2D integer shape
    Shape,
    /// Free text
    String,
    /// Bounded float vector
    VecFloat,
    /// Bounded integer vector
    VecInt,
    /// Bounded 2D wavenumber
    WaveNb,
}

impl AttributeType {
    /// Every attribute type
    pub const ALL: [AttributeType; 17] = [
        Self::Bool,
        Self::Cloud,
        Self::Color,
        Self::ColorGradient,
        Self::Filename,
        Self::Float,
        Self::Int,
        Self::MapEnum,
        Self::Matrix,
        Self::Path,
        Self::Range,
        Self::Seed,
        Self::Shape,
        Self::String,
        Self::VecFloat,
        Self::VecInt,
        Self::WaveNb,
    ];

    /// Stable key written to documents
    pub fn key(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Cloud => "cloud",
            Self::Color => "color",
            Self::ColorGradient => "color_gradient",
            Self::Filename => "filename",
            Self::Float => "float",
            Self::Int => "int",
            Self::MapEnum => "map_enum",
            Self::Matrix => "matrix",
            Self::Path => "path",
            Self::Range => "range",
            Self::Seed => "seed",
            Self::Shape => "shape",
            Self::String => "string",
            Self::VecFloat => "vec_float",
            Self::VecInt => "vec_int",
            Self::WaveNb => "wave_nb",
        }
    }

    /// Parse a document key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Cloud => "Cloud",
            Self::Color => "Color",
            Self::ColorGradient => "Color gradient",
            Self::Filename => "Filename",
            Self::Float => "Float",
            Self::Int => "Integer",
            Self::MapEnum => "Enumeration",
            Self::Matrix => "Matrix",
            Self::Path => "Path",
            Self::Range => "Value range",
            Self::Seed => "Random seed",
            Self::Shape => "Shape",
            Self::String => "String",
            Self::VecFloat => "Float vector",
            Self::VecInt => "Integer vector",
            Self::WaveNb => "Wavenumber",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Error when reading or writing an attribute
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributeError {
    /// Accessor kind does not match the stored kind
    #[error("wrong attribute type: expected {expected}, found {found}")]
    WrongType {
        /// Kind requested by the caller
        expected: AttributeType,
        /// Kind actually stored
        found: AttributeType,
    },

    /// Value outside the declared bounds
    #[error("value {value} out of range [{vmin}, {vmax}]")]
    OutOfRange {
        /// Rejected value
        value: String,
        /// Lower bound
        vmin: String,
        /// Upper bound
        vmax: String,
    },

    /// Enumeration choice not declared
    #[error("unknown choice: {0}")]
    InvalidChoice(String),

    /// No attribute under this key
    #[error("attribute not found: {0}")]
    NotFound(String),
}

fn check_bounds<T: PartialOrd + fmt::Display>(
    value: T,
    vmin: T,
    vmax: T,
) -> Result<(), AttributeError> {
    // NaN fails both comparisons and is rejected too
    if value >= vmin && value <= vmax {
        Ok(())
    } else {
        Err(AttributeError::OutOfRange {
            value: value.to_string(),
            vmin: vmin.to_string(),
            vmax: vmax.to_string(),
        })
    }
}

fn check_all<T: PartialOrd + fmt::Display + Copy>(
    values: &[T],
    vmin: T,
    vmax: T,
) -> Result<(), AttributeError> {
    values.iter().try_for_each(|&v| check_bounds(v, vmin, vmax))
}

/// Boolean flag
#[derive(Debug, Clone, PartialEq)]
pub struct BoolAttribute {
    /// Current value
    pub value: bool,
}

impl BoolAttribute {
    /// Create a boolean attribute
    pub fn new(value: bool) -> Self {
        Self { value }
    }
}

/// Point cloud parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudAttribute {
    /// Current value
    pub value: Cloud,
}

/// RGBA color, channels in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttribute {
    /// Current value
    pub value: [f32; 4],
}

impl Default for ColorAttribute {
    fn default() -> Self {
        Self {
            value: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// One stop of a color gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Position in `[0, 1]`
    pub position: f32,
    /// RGBA color
    pub color: [f32; 4],
}

/// Color gradient, stops kept sorted by position
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGradientAttribute {
    /// Current stops
    pub value: Vec<GradientStop>,
}

impl Default for ColorGradientAttribute {
    fn default() -> Self {
        Self {
            value: vec![
                GradientStop {
                    position: 0.0,
                    color: [0.0, 0.0, 0.0, 1.0],
                },
                GradientStop {
                    position: 1.0,
                    color: [1.0, 1.0, 1.0, 1.0],
                },
            ],
        }
    }
}

/// File name with an optional dialog filter (`"Images (*.png *.raw)"`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilenameAttribute {
    /// Current value
    pub value: PathBuf,
    /// File dialog filter
    pub filter: String,
}

impl FilenameAttribute {
    /// Create a filename attribute
    pub fn new(value: impl Into<PathBuf>, filter: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            filter: filter.into(),
        }
    }
}

/// Bounded float
#[derive(Debug, Clone, PartialEq)]
pub struct FloatAttribute {
    /// Current value
    pub value: f32,
    /// Lower bound
    pub vmin: f32,
    /// Upper bound
    pub vmax: f32,
    /// Display format
    pub fmt: String,
}

impl FloatAttribute {
    /// Create a bounded float
    pub fn new(value: f32, vmin: f32, vmax: f32) -> Self {
        debug_assert!(vmin <= value && value <= vmax, "default outside bounds");
        Self {
            value,
            vmin,
            vmax,
            fmt: "%.2f".to_string(),
        }
    }

    /// Set the display format
    pub fn with_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.fmt = fmt.into();
        self
    }
}

/// Bounded integer
#[derive(Debug, Clone, PartialEq)]
pub struct IntAttribute {
    /// Current value
    pub value: i32,
    /// Lower bound
    pub vmin: i32,
    /// Upper bound
    pub vmax: i32,
}

impl IntAttribute {
    /// Create a bounded integer
    pub fn new(value: i32, vmin: i32, vmax: i32) -> Self {
        debug_assert!(vmin <= value && value <= vmax, "default outside bounds");
        Self { value, vmin, vmax }
    }
}

/// Named choice among integer values
#[derive(Debug, Clone, PartialEq)]
pub struct MapEnumAttribute {
    /// Available choices, in display order
    pub choices: IndexMap<String, i32>,
    /// Current choice
    pub choice: String,
}

impl MapEnumAttribute {
    /// Create an enumeration, selecting the first choice
    pub fn new<K: Into<String>>(choices: impl IntoIterator<Item = (K, i32)>) -> Self {
        let choices: IndexMap<String, i32> =
            choices.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let choice = choices.keys().next().cloned().unwrap_or_default();
        Self { choices, choice }
    }

    /// Select an initial choice
    pub fn with_choice(mut self, choice: impl Into<String>) -> Self {
        self.choice = choice.into();
        debug_assert!(self.choices.contains_key(&self.choice), "unknown choice");
        self
    }

    /// Integer value of the current choice
    pub fn value(&self) -> Option<i32> {
        self.choices.get(&self.choice).copied()
    }
}

/// Float matrix, row-major
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixAttribute {
    /// Rows
    pub value: Vec<Vec<f32>>,
}

/// Polyline parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathAttribute {
    /// Current value
    pub value: Path,
}

/// Bounded float interval
#[derive(Debug, Clone, PartialEq)]
pub struct RangeAttribute {
    /// Current interval
    pub value: [f32; 2],
    /// Lower bound for both ends
    pub vmin: f32,
    /// Upper bound for both ends
    pub vmax: f32,
    /// Display format
    pub fmt: String,
}

impl RangeAttribute {
    /// Create a bounded interval
    pub fn new(value: [f32; 2], vmin: f32, vmax: f32) -> Self {
        Self {
            value,
            vmin,
            vmax,
            fmt: "%.2f".to_string(),
        }
    }
}

impl Default for RangeAttribute {
    fn default() -> Self {
        Self::new([0.0, 1.0], -0.5, 1.5)
    }
}

/// Random seed
#[derive(Debug, Clone, PartialEq)]
pub struct SeedAttribute {
    /// Current seed
    pub value: u32,
}

impl SeedAttribute {
    /// Create a seed attribute
    pub fn new(value: u32) -> Self {
        Self { value }
    }
}

impl Default for SeedAttribute {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

/// Bounded 2D integer shape
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeAttribute {
    /// Width and height
    pub value: [u32; 2],
    /// Lower bound per component
    pub vmin: u32,
    /// Upper bound per component
    pub vmax: u32,
}

impl ShapeAttribute {
    /// Create a bounded shape
    pub fn new(value: [u32; 2], vmin: u32, vmax: u32) -> Self {
        Self { value, vmin, vmax }
    }
}

/// Free text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringAttribute {
    /// Current value
    pub value: String,
}

impl StringAttribute {
    /// Create a string attribute
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Bounded float vector
#[derive(Debug, Clone, PartialEq)]
pub struct VecFloatAttribute {
    /// Current values
    pub value: Vec<f32>,
    /// Lower bound per element
    pub vmin: f32,
    /// Upper bound per element
    pub vmax: f32,
    /// Display format
    pub fmt: String,
}

impl VecFloatAttribute {
    /// Create a bounded float vector
    pub fn new(value: Vec<f32>, vmin: f32, vmax: f32) -> Self {
        Self {
            value,
            vmin,
            vmax,
            fmt: "%.2f".to_string(),
        }
    }
}

/// Bounded integer vector
#[derive(Debug, Clone, PartialEq)]
pub struct VecIntAttribute {
    /// Current values
    pub value: Vec<i32>,
    /// Lower bound per element
    pub vmin: i32,
    /// Upper bound per element
    pub vmax: i32,
}

impl VecIntAttribute {
    /// Create a bounded integer vector
    pub fn new(value: Vec<i32>, vmin: i32, vmax: i32) -> Self {
        Self { value, vmin, vmax }
    }
}

/// Bounded 2D wavenumber
#[derive(Debug, Clone, PartialEq)]
pub struct WaveNbAttribute {
    /// Wavenumber along x and y
    pub value: [f32; 2],
    /// Lower bound per component
    pub vmin: f32,
    /// Upper bound per component
    pub vmax: f32,
    /// Whether editors should keep both components equal
    pub link_xy: bool,
    /// Display format
    pub fmt: String,
}

impl WaveNbAttribute {
    /// Create a bounded wavenumber
    pub fn new(value: [f32; 2], vmin: f32, vmax: f32) -> Self {
        Self {
            value,
            vmin,
            vmax,
            link_xy: value[0] == value[1],
            fmt: "%.1f".to_string(),
        }
    }
}

impl Default for WaveNbAttribute {
    fn default() -> Self {
        Self::new([DEFAULT_WAVENUMBER, DEFAULT_WAVENUMBER], 0.1, 64.0)
    }
}

/// Closed sum over every attribute kind
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    /// Boolean flag
    Bool(BoolAttribute),
    /// Point cloud
    Cloud(CloudAttribute),
    /// RGBA color
    Color(ColorAttribute),
    /// Color gradient
    ColorGradient(ColorGradientAttribute),
    /// File name
    Filename(FilenameAttribute),
    /// Bounded float
    Float(FloatAttribute),
    /// Bounded integer
    Int(IntAttribute),
    /// Named choice
    MapEnum(MapEnumAttribute),
    /// Float matrix
    Matrix(MatrixAttribute),
    /// Polyline
    Path(PathAttribute),
    /// Bounded interval
    Range(RangeAttribute),
    /// Random seed
    Seed(SeedAttribute),
    /// Bounded shape
    Shape(ShapeAttribute),
    /// Free text
    String(StringAttribute),
    /// Bounded float vector
    VecFloat(VecFloatAttribute),
    /// Bounded integer vector
    VecInt(VecIntAttribute),
    /// Bounded wavenumber
    WaveNb(WaveNbAttribute),
}

impl AttributeData {
    /// Kind of the held attribute
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Cloud(_) => AttributeType::Cloud,
            Self::Color(_) => AttributeType::Color,
            Self::ColorGradient(_) => AttributeType::ColorGradient,
            Self::Filename(_) => AttributeType::Filename,
            Self::Float(_) => AttributeType::Float,
            Self::Int(_) => AttributeType::Int,
            Self::MapEnum(_) => AttributeType::MapEnum,
            Self::Matrix(_) => AttributeType::Matrix,
            Self::Path(_) => AttributeType::Path,
            Self::Range(_) => AttributeType::Range,
            Self::Seed(_) => AttributeType::Seed,
            Self::Shape(_) => AttributeType::Shape,
            Self::String(_) => AttributeType::String,
            Self::VecFloat(_) => AttributeType::VecFloat,
            Self::VecInt(_) => AttributeType::VecInt,
            Self::WaveNb(_) => AttributeType::WaveNb,
        }
    }
}

/// Typed access to one attribute kind
pub trait AttributeKind: Sized + Into<AttributeData> {
    /// Value returned by [`Attribute::get`] and accepted by [`Attribute::set`]
    type Value;

    /// Kind discriminator
    const TYPE: AttributeType;

    /// Borrow this kind out of the sum type
    fn from_data(data: &AttributeData) -> Option<&Self>;

    /// Mutably borrow this kind out of the sum type
    fn from_data_mut(data: &mut AttributeData) -> Option<&mut Self>;

    /// Current value
    fn get(&self) -> Self::Value;

    /// Validate then store a new value
    fn set(&mut self, value: Self::Value) -> Result<(), AttributeError>;
}

macro_rules! data_variant {
    ($variant:ident) => {
        const TYPE: AttributeType = AttributeType::$variant;

        fn from_data(data: &AttributeData) -> Option<&Self> {
            match data {
                AttributeData::$variant(inner) => Some(inner),
                _ => None,
            }
        }

        fn from_data_mut(data: &mut AttributeData) -> Option<&mut Self> {
            match data {
                AttributeData::$variant(inner) => Some(inner),
                _ => None,
            }
        }
    };
}

macro_rules! impl_into_data {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AttributeData {
                fn from(inner: $ty) -> Self {
                    AttributeData::$variant(inner)
                }
            }
        )*
    };
}

impl_into_data!(
    BoolAttribute => Bool,
    CloudAttribute => Cloud,
    ColorAttribute => Color,
    ColorGradientAttribute => ColorGradient,
    FilenameAttribute => Filename,
    FloatAttribute => Float,
    IntAttribute => Int,
    MapEnumAttribute => MapEnum,
    MatrixAttribute => Matrix,
    PathAttribute => Path,
    RangeAttribute => Range,
    SeedAttribute => Seed,
    ShapeAttribute => Shape,
    StringAttribute => String,
    VecFloatAttribute => VecFloat,
    VecIntAttribute => VecInt,
    WaveNbAttribute => WaveNb,
);

impl AttributeKind for BoolAttribute {
    type Value = bool;
    data_variant!(Bool);

    fn get(&self) -> bool {
        self.value
    }

    fn set(&mut self, value: bool) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for CloudAttribute {
    type Value = Cloud;
    data_variant!(Cloud);

    fn get(&self) -> Cloud {
        self.value.clone()
    }

    fn set(&mut self, value: Cloud) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for ColorAttribute {
    type Value = [f32; 4];
    data_variant!(Color);

    fn get(&self) -> [f32; 4] {
        self.value
    }

    fn set(&mut self, value: [f32; 4]) -> Result<(), AttributeError> {
        check_all(&value, 0.0, 1.0)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for ColorGradientAttribute {
    type Value = Vec<GradientStop>;
    data_variant!(ColorGradient);

    fn get(&self) -> Vec<GradientStop> {
        self.value.clone()
    }

    fn set(&mut self, mut value: Vec<GradientStop>) -> Result<(), AttributeError> {
        for stop in &value {
            check_bounds(stop.position, 0.0, 1.0)?;
            check_all(&stop.color, 0.0, 1.0)?;
        }
        value.sort_by(|a, b| a.position.total_cmp(&b.position));
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for FilenameAttribute {
    type Value = PathBuf;
    data_variant!(Filename);

    fn get(&self) -> PathBuf {
        self.value.clone()
    }

    fn set(&mut self, value: PathBuf) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for FloatAttribute {
    type Value = f32;
    data_variant!(Float);

    fn get(&self) -> f32 {
        self.value
    }

    fn set(&mut self, value: f32) -> Result<(), AttributeError> {
        check_bounds(value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for IntAttribute {
    type Value = i32;
    data_variant!(Int);

    fn get(&self) -> i32 {
        self.value
    }

    fn set(&mut self, value: i32) -> Result<(), AttributeError> {
        check_bounds(value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for MapEnumAttribute {
    // Choice name; the mapped integer is `MapEnumAttribute::value`
    type Value = String;
    data_variant!(MapEnum);

    fn get(&self) -> String {
        self.choice.clone()
    }

    fn set(&mut self, value: String) -> Result<(), AttributeError> {
        if !self.choices.contains_key(&value) {
            return Err(AttributeError::InvalidChoice(value));
        }
        self.choice = value;
        Ok(())
    }
}

impl AttributeKind for MatrixAttribute {
    type Value = Vec<Vec<f32>>;
    data_variant!(Matrix);

    fn get(&self) -> Vec<Vec<f32>> {
        self.value.clone()
    }

    fn set(&mut self, value: Vec<Vec<f32>>) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for PathAttribute {
    type Value = Path;
    data_variant!(Path);

    fn get(&self) -> Path {
        self.value.clone()
    }

    fn set(&mut self, value: Path) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for RangeAttribute {
    type Value = [f32; 2];
    data_variant!(Range);

    fn get(&self) -> [f32; 2] {
        self.value
    }

    fn set(&mut self, value: [f32; 2]) -> Result<(), AttributeError> {
        check_all(&value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for SeedAttribute {
    type Value = u32;
    data_variant!(Seed);

    fn get(&self) -> u32 {
        self.value
    }

    fn set(&mut self, value: u32) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for ShapeAttribute {
    type Value = [u32; 2];
    data_variant!(Shape);

    fn get(&self) -> [u32; 2] {
        self.value
    }

    fn set(&mut self, value: [u32; 2]) -> Result<(), AttributeError> {
        check_all(&value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for StringAttribute {
    type Value = String;
    data_variant!(String);

    fn get(&self) -> String {
        self.value.clone()
    }

    fn set(&mut self, value: String) -> Result<(), AttributeError> {
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for VecFloatAttribute {
    type Value = Vec<f32>;
    data_variant!(VecFloat);

    fn get(&self) -> Vec<f32> {
        self.value.clone()
    }

    fn set(&mut self, value: Vec<f32>) -> Result<(), AttributeError> {
        check_all(&value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for VecIntAttribute {
    type Value = Vec<i32>;
    data_variant!(VecInt);

    fn get(&self) -> Vec<i32> {
        self.value.clone()
    }

    fn set(&mut self, value: Vec<i32>) -> Result<(), AttributeError> {
        check_all(&value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

impl AttributeKind for WaveNbAttribute {
    type Value = [f32; 2];
    data_variant!(WaveNb);

    fn get(&self) -> [f32; 2] {
        self.value
    }

    fn set(&mut self, value: [f32; 2]) -> Result<(), AttributeError> {
        check_all(&value, self.vmin, self.vmax)?;
        self.value = value;
        Ok(())
    }
}

/// A labelled attribute remembering its construction-time default
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Display label
    pub label: String,
    data: AttributeData,
    default: AttributeData,
}

impl Attribute {
    /// Create an attribute; its initial state becomes the default
    pub fn new(data: impl Into<AttributeData>) -> Self {
        let data = data.into();
        Self {
            label: String::new(),
            default: data.clone(),
            data,
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Kind of this attribute
    pub fn attribute_type(&self) -> AttributeType {
        self.data.attribute_type()
    }

    /// Current state
    pub fn data(&self) -> &AttributeData {
        &self.data
    }

    /// Construction-time state
    pub fn default_data(&self) -> &AttributeData {
        &self.default
    }

    /// Borrow the typed attribute
    pub fn get_ref<T: AttributeKind>(&self) -> Result<&T, AttributeError> {
        let found = self.attribute_type();
        T::from_data(&self.data).ok_or(AttributeError::WrongType {
            expected: T::TYPE,
            found,
        })
    }

    /// Mutably borrow the typed attribute; bounds are not checked
    pub fn get_mut<T: AttributeKind>(&mut self) -> Result<&mut T, AttributeError> {
        let found = self.attribute_type();
        T::from_data_mut(&mut self.data).ok_or(AttributeError::WrongType {
            expected: T::TYPE,
            found,
        })
    }

    /// Current value
    pub fn get<T: AttributeKind>(&self) -> Result<T::Value, AttributeError> {
        self.get_ref::<T>().map(T::get)
    }

    /// Store a new value after bounds validation
    pub fn set<T: AttributeKind>(&mut self, value: T::Value) -> Result<(), AttributeError> {
        self.get_mut::<T>()?.set(value)
    }

    /// Restore the construction-time default
    pub fn reset(&mut self) {
        self.data = self.default.clone();
    }

    /// Whether the current state differs from the default
    pub fn is_modified(&self) -> bool {
        self.data != self.default
    }
}

/// Attributes of a node, in declaration order
pub type AttributeMap = IndexMap<String, Attribute>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let attr = Attribute::new(IntAttribute::new(4, 1, 8));
        assert_eq!(attr.get::<IntAttribute>(), Ok(4));
        assert_eq!(
            attr.get::<FloatAttribute>(),
            Err(AttributeError::WrongType {
                expected: AttributeType::Float,
                found: AttributeType::Int,
            })
        );
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let mut attr = Attribute::new(FloatAttribute::new(0.5, 0.0, 1.0));
        assert!(matches!(
            attr.set::<FloatAttribute>(1.5),
            Err(AttributeError::OutOfRange { .. })
        ));
        assert!(attr.set::<FloatAttribute>(f32::NAN).is_err());
        assert_eq!(attr.get::<FloatAttribute>(), Ok(0.5));

        attr.set::<FloatAttribute>(1.0).unwrap();
        assert_eq!(attr.get::<FloatAttribute>(), Ok(1.0));
    }

    #[test]
    fn test_vector_bounds_apply_per_element() {
        let mut attr = Attribute::new(VecIntAttribute::new(vec![1, 2], 0, 10));
        assert!(attr.set::<VecIntAttribute>(vec![3, 11]).is_err());
        assert_eq!(attr.get::<VecIntAttribute>().unwrap(), vec![1, 2]);
        attr.set::<VecIntAttribute>(vec![0, 10, 5]).unwrap();
    }

    #[test]
    fn test_map_enum_choice() {
        let mut attr = Attribute::new(MapEnumAttribute::new([("add", 0), ("max", 1)]));
        assert_eq!(attr.get::<MapEnumAttribute>().unwrap(), "add");
        assert_eq!(
            attr.set::<MapEnumAttribute>("nope".to_string()),
            Err(AttributeError::InvalidChoice("nope".to_string()))
        );
        attr.set::<MapEnumAttribute>("max".to_string()).unwrap();
        assert_eq!(attr.get_ref::<MapEnumAttribute>().unwrap().value(), Some(1));
    }

    #[test]
    fn test_gradient_stops_are_sorted() {
        let mut attr = Attribute::new(ColorGradientAttribute::default());
        attr.set::<ColorGradientAttribute>(vec![
            GradientStop {
                position: 0.8,
                color: [1.0, 0.0, 0.0, 1.0],
            },
            GradientStop {
                position: 0.2,
                color: [0.0, 1.0, 0.0, 1.0],
            },
        ])
        .unwrap();
        let stops = attr.get::<ColorGradientAttribute>().unwrap();
        assert_eq!(stops[0].position, 0.2);
    }

    #[test]
    fn test_reset_restores_default() {
        let mut attr = Attribute::new(SeedAttribute::new(7));
        attr.set::<SeedAttribute>(42).unwrap();
        assert!(attr.is_modified());
        attr.reset();
        assert_eq!(attr.get::<SeedAttribute>(), Ok(7));
        assert!(!attr.is_modified());
    }

    #[test]
    fn test_type_keys_round_trip() {
        for t in AttributeType::ALL {
            assert_eq!(AttributeType::from_key(t.key()), Some(t));
        }
    }
}
