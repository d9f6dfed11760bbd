/*
 *  bridge/error.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for the protocol bridge
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

use thiserror::Error;

use crate::bridge::broker::Cookie;
use crate::bridge::variant::ExcepInfo;
use crate::config::ConfigError;

/// Outcome of a failed dynamic invocation.
///
/// `NotImplemented` is the recoverable signal callers use to skip optional
/// features; `UnsupportedMember` and `Broker` are fatal for the session.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The device has no member by this name
    #[error("The selected telescope driver is missing the {member} member.")]
    UnsupportedMember { member: String },

    /// The device raised the "not implemented" exception
    #[error("{member} is not implemented by the selected telescope driver.")]
    NotImplemented { member: String },

    /// Any other exception raised by the device
    #[error("Internal error {action} the {member} member: {excep}")]
    Invocation {
        member: String,
        action: &'static str,
        excep: ExcepInfo,
    },

    /// The device answered with a value of the wrong type
    #[error("The {member} member returned {found}, expected {expected}.")]
    TypeMismatch {
        member: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The reference could not be made usable on the calling thread
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl DispatchError {
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, DispatchError::NotImplemented { .. })
    }

    /// Errors after which the session cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::UnsupportedMember { .. } | DispatchError::Broker(_))
    }

    /// Member the error refers to, if any
    pub fn member(&self) -> Option<&str> {
        match self {
            DispatchError::UnsupportedMember { member }
            | DispatchError::NotImplemented { member }
            | DispatchError::Invocation { member, .. }
            | DispatchError::TypeMismatch { member, .. } => Some(member),
            DispatchError::Broker(_) => None,
        }
    }
}

/// Tri-state view of an invocation result: value, unsupported, or error.
pub trait Optional<T> {
    /// Map `NotImplemented` to `Ok(None)`, leaving every other error intact
    fn optional(self) -> Result<Option<T>, DispatchError>;
}

impl<T> Optional<T> for Result<T, DispatchError> {
    fn optional(self) -> Result<Option<T>, DispatchError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(DispatchError::NotImplemented { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Errors from the cross-thread reference broker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Failed to register driver interface in the interface table")]
    RegisterFailed,

    #[error("Failed to get interface {cookie} from the interface table on thread {thread}")]
    DeriveFailed { cookie: Cookie, thread: String },

    #[error("Interface cookie {0} is not registered")]
    UnknownCookie(Cookie),

    #[error("The driver interface has already been revoked")]
    Revoked,
}

/// Fatal conditions while bringing a device session up
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("You have not yet configured your telescope type and settings.")]
    NotConfigured,

    #[error("Failed to find scope driver {0}.")]
    DriverNotFound(String),

    #[error("Failed to create an instance of the scope driver {prog_id}: {reason}")]
    CreateFailed { prog_id: String, reason: String },

    #[error("The selected telescope does not support either RA/Dec or Alt/Az readout. Cannot continue.")]
    NoCoordinateSystem,

    #[error("Failed to read the driver ID from configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
