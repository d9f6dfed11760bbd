/*
 *  mount/error.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host-facing error taxonomy and return codes
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

use crate::constants::{ERR_ACTIVATION, ERR_COMMNOLINK, ERR_NOT_IMPL, HOST_OK};

/// Error returned to the driver host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HostError {
    /// No usable device link
    #[error("not linked")]
    NoLink,

    /// The device lacks the capability
    #[error("not implemented")]
    NotImplemented,

    /// The device is missing a mandatory member
    #[error("unsupported member")]
    UnsupportedMember,

    /// The link could not be established
    #[error("activation failed")]
    ActivationFailure,
}

impl HostError {
    /// Numeric code handed back across the host ABI
    pub fn code(&self) -> i32 {
        match self {
            HostError::NoLink | HostError::UnsupportedMember => ERR_COMMNOLINK,
            HostError::NotImplemented => ERR_NOT_IMPL,
            HostError::ActivationFailure => ERR_ACTIVATION,
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Collapse a host result into its numeric code
pub fn host_code<T>(result: &HostResult<T>) -> i32 {
    match result {
        Ok(_) => HOST_OK,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(host_code(&Ok::<(), HostError>(())), HOST_OK);
        assert_eq!(host_code::<()>(&Err(HostError::NoLink)), ERR_COMMNOLINK);
        assert_eq!(HostError::NotImplemented.code(), ERR_NOT_IMPL);
        assert_eq!(HostError::ActivationFailure.code(), ERR_ACTIVATION);
    }
}
