/*
 *  drivers/mock.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock mount for testing without a device
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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::bridge::traits::{DeviceClass, Dispatch};
use crate::bridge::variant::{
    DispId, DispatchParams, ExcepInfo, InvokeKind, Variant, SCODE_BAD_PARAM_COUNT,
    SCODE_INVALID_OPERATION, SCODE_PARAM_NOT_OPTIONAL,
};
use crate::constants::member;
use crate::drivers::MemberTable;

/// One invocation seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub member: String,
    pub kind: InvokeKind,
    pub params: DispatchParams,
}

type Observer = Arc<dyn Fn(&RecordedCall) + Send + Sync>;

/// Mock mount driver for testing
///
/// Every protocol member exists and every capability is on by default. The
/// builder methods take members away, make them raise "not implemented" or
/// make them fail, and every resolved invocation is recorded for
/// inspection.
#[derive(Clone)]
pub struct MockMount {
    state: Arc<Mutex<MockMountState>>,
}

/// Internal state for the mock mount (shared for inspection in tests)
pub struct MockMountState {
    pub table: MemberTable,
    pub properties: HashMap<String, Variant>,
    pub calls: Vec<RecordedCall>,

    /// Number of name lookups
    pub lookups: usize,

    pub not_implemented: HashSet<String>,
    pub failing: HashSet<String>,

    /// `Slewing` reads that report true after a slew starts
    pub slew_polls: u32,
    slewing_left: u32,

    /// Called with each invocation before it is executed
    observer: Option<Observer>,
}

fn default_properties() -> HashMap<String, Variant> {
    let mut props = HashMap::new();
    let mut set = |name: &str, value: Variant| {
        props.insert(name.to_string(), value);
    };

    set(member::CONNECTED, Variant::Bool(false));
    set(member::NAME, Variant::Str("Mock Mount".into()));
    for flag in [
        member::CAN_SYNC,
        member::CAN_SLEW,
        member::CAN_SLEW_ASYNC,
        member::CAN_SLEW_ALTAZ,
        member::CAN_SET_TRACKING,
        member::CAN_SET_RA_RATE,
        member::CAN_SET_DEC_RATE,
        member::CAN_PARK,
        member::CAN_UNPARK,
        member::CAN_SET_PARK,
    ] {
        set(flag, Variant::Bool(true));
    }
    set(member::DOES_REFRACTION, Variant::Bool(false));
    set(member::ALIGNMENT_MODE, Variant::Int(2));
    set(member::RIGHT_ASCENSION, Variant::Double(0.0));
    set(member::DECLINATION, Variant::Double(0.0));
    set(member::AZIMUTH, Variant::Double(180.0));
    set(member::ALTITUDE, Variant::Double(45.0));
    set(member::SITE_LATITUDE, Variant::Double(51.5));
    set(member::SITE_LONGITUDE, Variant::Double(-0.1));
    set(member::UTC_DATE, Variant::Date(45_000.5));
    set(member::AT_PARK, Variant::Bool(false));
    set(member::TRACKING, Variant::Bool(false));
    set(member::RA_RATE, Variant::Double(0.0));
    set(member::DEC_RATE, Variant::Double(0.0));
    props
}

impl MockMount {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockMountState {
                table: MemberTable::telescope(),
                properties: default_properties(),
                calls: Vec::new(),
                lookups: 0,
                not_implemented: HashSet::new(),
                failing: HashSet::new(),
                slew_polls: 0,
                slewing_left: 0,
                observer: None,
            })),
        }
    }

    /// Preset a property value
    pub fn with(self, name: &str, value: impl Into<Variant>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Remove a member entirely; name resolution fails for it
    pub fn without(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.table = state.table.without(&[name]);
        }
        self
    }

    /// Member raises the "not implemented" exception
    pub fn not_implemented(self, name: &str) -> Self {
        self.state.lock().unwrap().not_implemented.insert(name.to_string());
        self
    }

    /// Member raises a generic exception
    pub fn failing(self, name: &str) -> Self {
        self.state.lock().unwrap().failing.insert(name.to_string());
        self
    }

    pub fn with_slew_polls(self, polls: u32) -> Self {
        self.state.lock().unwrap().slew_polls = polls;
        self
    }

    pub fn observe(&self, observer: impl Fn(&RecordedCall) + Send + Sync + 'static) {
        self.state.lock().unwrap().observer = Some(Arc::new(observer));
    }

    pub fn set_property(&self, name: &str, value: impl Into<Variant>) {
        self.state
            .lock()
            .unwrap()
            .properties
            .insert(name.to_string(), value.into());
    }

    pub fn property(&self, name: &str) -> Option<Variant> {
        self.state.lock().unwrap().properties.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Member names of the recorded calls, in order
    pub fn call_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|c| c.member.clone())
            .collect()
    }

    pub fn calls_to(&self, name: &str) -> Vec<RecordedCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.member == name)
            .cloned()
            .collect()
    }

    /// Lookups plus invocations
    pub fn remote_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.lookups + state.calls.len()
    }

    /// Forget recorded traffic, keep the configuration
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.clear();
        state.lookups = 0;
    }

    pub fn state(&self) -> Arc<Mutex<MockMountState>> {
        Arc::clone(&self.state)
    }
}

impl Default for MockMount {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for MockMount {
    fn id_of_name(&self, name: &str) -> Option<DispId> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        state.table.id_of(name)
    }

    fn invoke(
        &self,
        id: DispId,
        kind: InvokeKind,
        params: &DispatchParams,
    ) -> Result<Variant, ExcepInfo> {
        let (call, observer) = {
            let state = self.state.lock().unwrap();
            let name = state
                .table
                .name_of(id)
                .ok_or_else(|| ExcepInfo::new(SCODE_BAD_PARAM_COUNT, "unknown dispatch id"))?;
            let call = RecordedCall {
                member: name.to_string(),
                kind,
                params: params.clone(),
            };
            (call, state.observer.clone())
        };

        if let Some(observer) = observer {
            observer(&call);
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        let name = call.member.as_str();

        if state.not_implemented.contains(name) {
            return Err(ExcepInfo::not_implemented(name).with_source("MockMount"));
        }
        if state.failing.contains(name) {
            return Err(ExcepInfo::new(SCODE_INVALID_OPERATION, format!("{} failed", name))
                .with_source("MockMount"));
        }

        match kind {
            InvokeKind::PropertyGet => {
                if name == member::SLEWING {
                    let slewing = state.slewing_left > 0;
                    state.slewing_left = state.slewing_left.saturating_sub(1);
                    return Ok(Variant::Bool(slewing));
                }
                state
                    .properties
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ExcepInfo::new(SCODE_BAD_PARAM_COUNT, format!("{} is a method", name)))
            }
            InvokeKind::PropertyPut => {
                if !params.is_property_put() {
                    return Err(ExcepInfo::new(SCODE_PARAM_NOT_OPTIONAL, "missing property-put marker"));
                }
                state.properties.insert(name.to_string(), params.args[0].clone());
                Ok(Variant::Empty)
            }
            InvokeKind::Method => {
                match name {
                    member::SLEW_TO_COORDINATES
                    | member::SLEW_TO_COORDINATES_ASYNC
                    | member::SYNC_TO_COORDINATES => {
                        let (dec, ra) = match params.args.as_slice() {
                            [dec, ra] => (dec.clone(), ra.clone()),
                            _ => return Err(ExcepInfo::new(SCODE_BAD_PARAM_COUNT, "expected (dec, ra)")),
                        };
                        state.properties.insert(member::DECLINATION.to_string(), dec);
                        state.properties.insert(member::RIGHT_ASCENSION.to_string(), ra);
                        if name == member::SLEW_TO_COORDINATES_ASYNC {
                            state.slewing_left = state.slew_polls;
                        }
                    }
                    member::ABORT_SLEW => state.slewing_left = 0,
                    member::PARK => {
                        state.properties.insert(member::AT_PARK.to_string(), Variant::Bool(true));
                    }
                    member::UNPARK => {
                        state.properties.insert(member::AT_PARK.to_string(), Variant::Bool(false));
                    }
                    _ => {}
                }
                Ok(Variant::Empty)
            }
        }
    }
}

/// Device class handing out the same mock instance on every create
pub struct MockClass {
    pub prog_id: String,
    pub mount: MockMount,
    pub fail_create: bool,
}

impl MockClass {
    pub fn new(prog_id: &str, mount: MockMount) -> Self {
        Self {
            prog_id: prog_id.to_string(),
            mount,
            fail_create: false,
        }
    }
}

impl DeviceClass for MockClass {
    fn prog_id(&self) -> &str {
        &self.prog_id
    }

    fn create_instance(&self) -> Result<Arc<dyn Dispatch>, String> {
        if self.fail_create {
            return Err("class not registered".to_string());
        }
        Ok(Arc::new(self.mount.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(mock: &MockMount, name: &str, kind: InvokeKind, params: DispatchParams) -> Result<Variant, ExcepInfo> {
        let id = mock.id_of_name(name).unwrap();
        mock.invoke(id, kind, &params)
    }

    #[test]
    fn test_mock_mount_defaults() {
        let mock = MockMount::new();
        let v = invoke(&mock, member::CAN_PARK, InvokeKind::PropertyGet, DispatchParams::none()).unwrap();
        assert_eq!(v, Variant::Bool(true));
        assert_eq!(mock.remote_calls(), 2);
    }

    #[test]
    fn test_mock_mount_rejects_put_without_marker() {
        let mock = MockMount::new();
        let err = invoke(
            &mock,
            member::TRACKING,
            InvokeKind::PropertyPut,
            DispatchParams::positional(vec![Variant::Bool(true)]),
        )
        .unwrap_err();
        assert_eq!(err.scode, SCODE_PARAM_NOT_OPTIONAL);
        assert_eq!(mock.property(member::TRACKING), Some(Variant::Bool(false)));
    }

    #[test]
    fn test_mock_mount_async_slew_polls() {
        let mock = MockMount::new().with_slew_polls(2);
        invoke(
            &mock,
            member::SLEW_TO_COORDINATES_ASYNC,
            InvokeKind::Method,
            DispatchParams::positional(vec![Variant::Double(20.0), Variant::Double(10.0)]),
        )
        .unwrap();

        let slewing = |m: &MockMount| {
            invoke(m, member::SLEWING, InvokeKind::PropertyGet, DispatchParams::none()).unwrap()
        };
        assert_eq!(slewing(&mock), Variant::Bool(true));
        assert_eq!(slewing(&mock), Variant::Bool(true));
        assert_eq!(slewing(&mock), Variant::Bool(false));
        assert_eq!(mock.property(member::RIGHT_ASCENSION), Some(Variant::Double(10.0)));
    }

    #[test]
    fn test_mock_mount_missing_member() {
        let mock = MockMount::new().without(member::RIGHT_ASCENSION);
        assert!(mock.id_of_name(member::RIGHT_ASCENSION).is_none());
        assert!(mock.id_of_name(member::AZIMUTH).is_some());
    }
}
