/*
 *  bridge/dispatch.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Dynamic invocation layer - get/set/call by symbolic member name
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

use log::{debug, trace};

use crate::bridge::broker::ReferenceBroker;
use crate::bridge::error::DispatchError;
use crate::bridge::variant::{DispatchParams, InvokeKind, Variant};

/// Whether a device is required to expose a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Missing member is fatal (`UnsupportedMember`)
    Mandatory,
    /// Missing member reads as `NotImplemented`
    Optional,
}

/// Typed access to the current device reference.
///
/// Holds no state beyond the borrowed broker, so every call goes to the
/// device; nothing is cached here.
#[derive(Clone, Copy)]
pub struct DispatchClient<'a> {
    broker: &'a ReferenceBroker,
}

impl<'a> DispatchClient<'a> {
    pub fn new(broker: &'a ReferenceBroker) -> Self {
        Self { broker }
    }

    /// General invocation: resolve `name`, invoke, classify the failure
    pub fn invoke(
        &self,
        name: &str,
        kind: InvokeKind,
        params: DispatchParams,
        presence: Presence,
    ) -> Result<Variant, DispatchError> {
        let object = self.broker.current()?;

        let Some(id) = object.id_of_name(name) else {
            return Err(match presence {
                Presence::Mandatory => DispatchError::UnsupportedMember { member: name.to_string() },
                Presence::Optional => {
                    debug!("Optional member {} absent, treating as not implemented", name);
                    DispatchError::NotImplemented { member: name.to_string() }
                }
            });
        };

        trace!("{:?} {} ({}) {:?}", kind, name, id, params.args);

        object.invoke(id, kind, &params).map_err(|excep| {
            if excep.is_not_implemented() {
                DispatchError::NotImplemented { member: name.to_string() }
            } else {
                DispatchError::Invocation {
                    member: name.to_string(),
                    action: kind.action(),
                    excep,
                }
            }
        })
    }

    /// Read a mandatory property
    pub fn get(&self, name: &str) -> Result<Variant, DispatchError> {
        self.get_with(name, Presence::Mandatory)
    }

    pub fn get_with(&self, name: &str, presence: Presence) -> Result<Variant, DispatchError> {
        self.invoke(name, InvokeKind::PropertyGet, DispatchParams::none(), presence)
    }

    /// Write a mandatory property using the property-put convention
    pub fn put(&self, name: &str, value: Variant) -> Result<(), DispatchError> {
        self.invoke(
            name,
            InvokeKind::PropertyPut,
            DispatchParams::property_put(value),
            Presence::Mandatory,
        )
        .map(|_| ())
    }

    /// Call a mandatory method with positional arguments
    pub fn call_method(&self, name: &str, args: Vec<Variant>) -> Result<Variant, DispatchError> {
        self.invoke(
            name,
            InvokeKind::Method,
            DispatchParams::positional(args),
            Presence::Mandatory,
        )
    }

    pub fn get_int(&self, name: &str) -> Result<i32, DispatchError> {
        let value = self.get(name)?;
        typed(name, &value, "int", Variant::as_int)
    }

    pub fn get_double(&self, name: &str) -> Result<f64, DispatchError> {
        self.get_double_with(name, Presence::Mandatory)
    }

    pub fn get_double_with(&self, name: &str, presence: Presence) -> Result<f64, DispatchError> {
        let value = self.get_with(name, presence)?;
        typed(name, &value, "double", Variant::as_double)
    }

    pub fn set_double(&self, name: &str, value: f64) -> Result<(), DispatchError> {
        self.put(name, Variant::Double(value))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, DispatchError> {
        self.get_bool_with(name, Presence::Mandatory)
    }

    pub fn get_bool_with(&self, name: &str, presence: Presence) -> Result<bool, DispatchError> {
        let value = self.get_with(name, presence)?;
        typed(name, &value, "bool", Variant::as_bool)
    }

    pub fn set_bool(&self, name: &str, value: bool) -> Result<(), DispatchError> {
        self.put(name, Variant::Bool(value))
    }

    pub fn get_string(&self, name: &str) -> Result<String, DispatchError> {
        let value = self.get(name)?;
        typed(name, &value, "string", |v| v.as_str().map(str::to_string))
    }

    /// Read an automation-date property (days since 1899-12-30)
    pub fn get_date(&self, name: &str) -> Result<f64, DispatchError> {
        let value = self.get(name)?;
        typed(name, &value, "date", Variant::as_date)
    }
}

fn typed<T>(
    name: &str,
    value: &Variant,
    expected: &'static str,
    convert: impl FnOnce(&Variant) -> Option<T>,
) -> Result<T, DispatchError> {
    convert(value).ok_or_else(|| DispatchError::TypeMismatch {
        member: name.to_string(),
        expected,
        found: value.type_name(),
    })
}
