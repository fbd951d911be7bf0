/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use core::{array::TryFromSliceError, fmt, str::Utf8Error};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    AttributeNotFound,
    ClusterNotFound,
    EndpointNotFound,
    EventNotFound,
    InvalidAction,
    InvalidDataType,
    UnsupportedAccess,
    UnsupportedRead,
    ResourceExhausted,
    PathsExhausted,
    Busy,
    DataVersionMismatch,
    ConstraintError,
    Failure,
    NoExchange,
    NoHandler,
    NoSession,
    NoSpace,
    NotFound,
    Invalid,
    InvalidData,
    InvalidOpcode,
    InvalidState,
    InvalidArgument,
    SendFailed,
    Timeout,
    TLVNotFound,
    TLVTypeMismatch,
    TruncatedPacket,
    Utf8Fail,
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

pub struct Error {
    code: ErrorCode,
}

impl Error {
    pub const fn new(code: ErrorCode) -> Self {
        Self { code }
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn remap<F>(self, matcher: F, to: Self) -> Self
    where
        F: FnOnce(&Self) -> bool,
    {
        if matcher(&self) {
            to
        } else {
            self
        }
    }

    /// Map any TLV decoding failure to `InvalidAction`, which is what the
    /// Interaction Model reports for malformed requests.
    pub fn map_invalid_action(self) -> Self {
        self.remap(
            |e| {
                matches!(
                    e.code(),
                    ErrorCode::Invalid
                        | ErrorCode::InvalidData
                        | ErrorCode::TLVNotFound
                        | ErrorCode::TLVTypeMismatch
                        | ErrorCode::TruncatedPacket
                        | ErrorCode::Utf8Fail
                )
            },
            Error::new(ErrorCode::InvalidAction),
        )
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_e: TryFromSliceError) -> Self {
        Self::new(ErrorCode::Invalid)
    }
}

impl From<Utf8Error> for Error {
    fn from(_e: Utf8Error) -> Self {
        Self::new(ErrorCode::Utf8Fail)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error::{}", self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "Error::{}", self.code)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorCode};

    #[test]
    fn test_map_invalid_action() {
        let err: Error = ErrorCode::TLVTypeMismatch.into();
        assert_eq!(err.map_invalid_action().code(), ErrorCode::InvalidAction);

        let err: Error = ErrorCode::NoSpace.into();
        assert_eq!(err.map_invalid_action().code(), ErrorCode::NoSpace);
    }
}
