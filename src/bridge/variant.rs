/*
 *  bridge/variant.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Late-bound values, invocation kinds and exception records
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;

/// Dispatch identifier a device object hands out for a member name
pub type DispId = i32;

/// Named-argument marker that flags an invocation as a property assignment.
/// A put without it is rejected by conforming device objects.
pub const DISPID_PROPERTYPUT: DispId = -3;

/// Exception code a device raises for an optional member it does not implement
pub const SCODE_NOT_IMPLEMENTED: i32 = 0x8004_0400_u32 as i32;
/// Invalid value passed to a property or method
pub const SCODE_INVALID_VALUE: i32 = 0x8004_0401_u32 as i32;
/// Device is not connected
pub const SCODE_NOT_CONNECTED: i32 = 0x8004_0407_u32 as i32;
/// Operation is not valid in the current device state (parked, slewing...)
pub const SCODE_INVALID_OPERATION: i32 = 0x8004_040B_u32 as i32;
/// A property put arrived without the property-put marker
pub const SCODE_PARAM_NOT_OPTIONAL: i32 = 0x8002_000F_u32 as i32;
/// Wrong number or type of arguments
pub const SCODE_BAD_PARAM_COUNT: i32 = 0x8002_000E_u32 as i32;
/// Unspecified failure
pub const SCODE_FAIL: i32 = 0x8000_4005_u32 as i32;

/// A dynamically typed value exchanged with a late-bound device object
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Bool(bool),
    Int(i32),
    Double(f64),
    /// Automation date: days since 1899-12-30 UTC
    Date(f64),
    Str(String),
}

impl Variant {
    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Empty => "empty",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Double(_) => "double",
            Variant::Date(_) => "date",
            Variant::Str(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to double, the same coercion automation servers apply
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Variant::Double(d) => Some(*d),
            Variant::Int(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<f64> {
        match self {
            Variant::Date(d) | Variant::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Str(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::Str(value)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "<empty>"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Double(d) => write!(f, "{}", d),
            Variant::Date(d) => write!(f, "date({})", d),
            Variant::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// How a member is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    PropertyGet,
    PropertyPut,
    Method,
}

impl InvokeKind {
    /// Verb used in "Internal error {verb} the X member" messages
    pub fn action(&self) -> &'static str {
        match self {
            InvokeKind::PropertyGet => "reading from",
            InvokeKind::PropertyPut => "writing to",
            InvokeKind::Method => "calling",
        }
    }
}

/// Arguments of one invocation.
///
/// Positional arguments are in call order: `SlewToCoordinates(dec, ra)` is
/// `args = [dec, ra]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchParams {
    pub args: Vec<Variant>,
    pub named_args: Vec<DispId>,
}

impl DispatchParams {
    /// No arguments (property reads, parameterless methods)
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional(args: Vec<Variant>) -> Self {
        Self { args, named_args: Vec::new() }
    }

    /// Single value tagged with the property-put marker
    pub fn property_put(value: Variant) -> Self {
        Self {
            args: vec![value],
            named_args: vec![DISPID_PROPERTYPUT],
        }
    }

    /// True when this is a well-formed property assignment
    pub fn is_property_put(&self) -> bool {
        self.args.len() == 1 && self.named_args.first() == Some(&DISPID_PROPERTYPUT)
    }
}

/// Exception detail raised by a device object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExcepInfo {
    pub scode: i32,
    pub source: String,
    pub description: String,
}

impl ExcepInfo {
    pub fn new(scode: i32, description: impl Into<String>) -> Self {
        Self {
            scode,
            source: String::new(),
            description: description.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn not_implemented(member: &str) -> Self {
        Self::new(SCODE_NOT_IMPLEMENTED, format!("{} is not implemented", member))
    }

    pub fn is_not_implemented(&self) -> bool {
        self.scode == SCODE_NOT_IMPLEMENTED
    }
}

impl fmt::Display for ExcepInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "{} (0x{:08X})", self.description, self.scode as u32)
        } else {
            write!(f, "{}: {} (0x{:08X})", self.source, self.description, self.scode as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_put_marker() {
        let params = DispatchParams::property_put(Variant::Bool(true));
        assert!(params.is_property_put());
        assert_eq!(params.named_args, vec![DISPID_PROPERTYPUT]);

        let plain = DispatchParams::positional(vec![Variant::Bool(true)]);
        assert!(!plain.is_property_put());
    }

    #[test]
    fn test_int_widens_to_double() {
        assert_eq!(Variant::Int(3).as_double(), Some(3.0));
        assert_eq!(Variant::Double(3.5).as_int(), None);
        assert_eq!(Variant::Str("x".into()).as_bool(), None);
    }

    #[test]
    fn test_not_implemented_sentinel() {
        assert!(ExcepInfo::not_implemented("Azimuth").is_not_implemented());
        assert!(!ExcepInfo::new(SCODE_INVALID_VALUE, "bad").is_not_implemented());
        let shown = ExcepInfo::new(SCODE_NOT_CONNECTED, "not connected").to_string();
        assert!(shown.contains("80040407"));
    }
}
