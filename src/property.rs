use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::{CameraError, CameraResult};

/// Camera property keys.
///
/// The named variants cover the features the crate reads or writes itself.
/// Anything else the device exposes is reachable through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    Width,
    Height,
    WidthMax,
    HeightMax,
    OffsetX,
    OffsetY,
    ExposureTime,
    Gain,
    PixelFormat,
    PixelSize,
    PayloadSize,
    TriggerMode,
    TriggerSource,
    TriggerSelector,
    TriggerSoftware,
    DeviceVendorName,
    DeviceModelName,
    DeviceSerialNumber,
    DeviceLinkThroughputLimitMode,
    Custom(String),
}

impl Property {
    const KNOWN: [Property; 19] = [
        Property::Width,
        Property::Height,
        Property::WidthMax,
        Property::HeightMax,
        Property::OffsetX,
        Property::OffsetY,
        Property::ExposureTime,
        Property::Gain,
        Property::PixelFormat,
        Property::PixelSize,
        Property::PayloadSize,
        Property::TriggerMode,
        Property::TriggerSource,
        Property::TriggerSelector,
        Property::TriggerSoftware,
        Property::DeviceVendorName,
        Property::DeviceModelName,
        Property::DeviceSerialNumber,
        Property::DeviceLinkThroughputLimitMode,
    ];

    /// GenICam feature name
    pub fn as_str(&self) -> &str {
        match self {
            Property::Width => "Width",
            Property::Height => "Height",
            Property::WidthMax => "WidthMax",
            Property::HeightMax => "HeightMax",
            Property::OffsetX => "OffsetX",
            Property::OffsetY => "OffsetY",
            Property::ExposureTime => "ExposureTime",
            Property::Gain => "Gain",
            Property::PixelFormat => "PixelFormat",
            Property::PixelSize => "PixelSize",
            Property::PayloadSize => "PayloadSize",
            Property::TriggerMode => "TriggerMode",
            Property::TriggerSource => "TriggerSource",
            Property::TriggerSelector => "TriggerSelector",
            Property::TriggerSoftware => "TriggerSoftware",
            Property::DeviceVendorName => "DeviceVendorName",
            Property::DeviceModelName => "DeviceModelName",
            Property::DeviceSerialNumber => "DeviceSerialNumber",
            Property::DeviceLinkThroughputLimitMode => "DeviceLinkThroughputLimitMode",
            Property::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Property::Custom(_))
    }
}

impl From<&str> for Property {
    fn from(name: &str) -> Self {
        Property::KNOWN
            .iter()
            .find(|known| known.as_str() == name)
            .cloned()
            .unwrap_or_else(|| Property::Custom(name.to_string()))
    }
}

impl FromStr for Property {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Property::from(s))
    }
}

impl AsRef<str> for Property {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime-typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PropertyValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "boolean",
            PropertyValue::Int(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Integer,
    Float,
    Enumeration,
    String,
    Boolean,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
    NotAvailable,
}

impl Access {
    pub fn is_readable(&self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadOnly)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

/// Numeric limits reported by the device for its current configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Range {
    Int { min: i64, max: i64, inc: i64 },
    Float { min: f64, max: f64 },
}

/// Metadata describing one device property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub description: String,
    pub kind: PropertyKind,
    pub access: Access,
    pub range: Option<Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<String>,
}

impl PropertyInfo {
    fn new(name: &str, description: &str, kind: PropertyKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            access: Access::ReadWrite,
            range: None,
            entries: Vec::new(),
        }
    }

    pub fn integer(name: &str, description: &str, min: i64, max: i64, inc: i64) -> Self {
        let mut info = Self::new(name, description, PropertyKind::Integer);
        info.range = Some(Range::Int {
            min,
            max,
            inc: inc.max(1),
        });
        info
    }

    pub fn float(name: &str, description: &str, min: f64, max: f64) -> Self {
        let mut info = Self::new(name, description, PropertyKind::Float);
        info.range = Some(Range::Float { min, max });
        info
    }

    pub fn enumeration<S: AsRef<str>>(name: &str, description: &str, entries: &[S]) -> Self {
        let mut info = Self::new(name, description, PropertyKind::Enumeration);
        info.entries = entries.iter().map(|e| e.as_ref().to_string()).collect();
        info
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, description, PropertyKind::String)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, description, PropertyKind::Boolean)
    }

    pub fn command(name: &str, description: &str) -> Self {
        let mut info = Self::new(name, description, PropertyKind::Command);
        info.access = Access::WriteOnly;
        info
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn read_only(self) -> Self {
        self.with_access(Access::ReadOnly)
    }

    /// Check `value` against the reported kind and limits.
    ///
    /// Returns the value coerced to the property's native representation.
    pub fn validate(&self, value: &PropertyValue) -> CameraResult<PropertyValue> {
        let mismatch = || {
            CameraError::invalid_value(
                &self.name,
                format!("expected {:?}, got {} value {}", self.kind, value.type_name(), value),
            )
        };

        match self.kind {
            PropertyKind::Integer => {
                let v = value.as_i64().ok_or_else(mismatch)?;
                if let Some(Range::Int { min, max, inc }) = self.range {
                    if v < min || v > max {
                        return Err(CameraError::invalid_value(
                            &self.name,
                            format!("{} outside [{}, {}]", v, min, max),
                        ));
                    }
                    if (v - min) % inc != 0 {
                        return Err(CameraError::invalid_value(
                            &self.name,
                            format!("{} is not a multiple of increment {} from {}", v, inc, min),
                        ));
                    }
                }
                Ok(PropertyValue::Int(v))
            }
            PropertyKind::Float => {
                let v = value.as_f64().ok_or_else(mismatch)?;
                if let Some(Range::Float { min, max }) = self.range {
                    if !(min..=max).contains(&v) {
                        return Err(CameraError::invalid_value(
                            &self.name,
                            format!("{} outside [{}, {}]", v, min, max),
                        ));
                    }
                }
                Ok(PropertyValue::Float(v))
            }
            PropertyKind::Enumeration => {
                let v = value.as_str().ok_or_else(mismatch)?;
                if !self.entries.iter().any(|entry| entry == v) {
                    return Err(CameraError::invalid_value(
                        &self.name,
                        format!("'{}' is not one of [{}]", v, self.entries.join(", ")),
                    ));
                }
                Ok(PropertyValue::Str(v.to_string()))
            }
            PropertyKind::String => value
                .as_str()
                .map(|v| PropertyValue::Str(v.to_string()))
                .ok_or_else(mismatch),
            PropertyKind::Boolean => value.as_bool().map(PropertyValue::Bool).ok_or_else(mismatch),
            PropertyKind::Command => Err(CameraError::write(
                &self.name,
                "command properties are executed, not written",
            )),
        }
    }

    /// Parse textual input (CLI, environment) into a value of this property's kind.
    pub fn parse_value(&self, raw: &str) -> CameraResult<PropertyValue> {
        let raw = raw.trim();
        let invalid = |e: &dyn fmt::Display| CameraError::invalid_value(&self.name, format!("'{}': {}", raw, e));

        let value = match self.kind {
            PropertyKind::Integer => PropertyValue::Int(raw.parse::<i64>().map_err(|e| invalid(&e))?),
            PropertyKind::Float => PropertyValue::Float(raw.parse::<f64>().map_err(|e| invalid(&e))?),
            PropertyKind::Boolean => PropertyValue::Bool(raw.parse::<bool>().map_err(|e| invalid(&e))?),
            PropertyKind::Enumeration | PropertyKind::String | PropertyKind::Command => {
                PropertyValue::Str(raw.to_string())
            }
        };

        self.validate(&value)
    }
}

/// One line of a property dump. `value` is `None` when the device denied the read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyEntry {
    pub name: String,
    pub description: String,
    pub value: Option<PropertyValue>,
}

impl fmt::Display for PropertyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} ({}):\t{}", self.name, self.description, value),
            None => write!(f, "{} ({}):\t<NOT READABLE>", self.name, self.description),
        }
    }
}
