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

//! This module defines the `Status` and `StatusResp` structures used in the Interaction Model.

use crate::error::Error;
use crate::tlv::{FromTLV, TLVTag, ToTLV};
use crate::utils::writebuf::WriteBuf;

use super::{ClusterStatus, IMStatusCode, InteractionModelRevision};

/// An IM status structure that contains an `IMStatusCode` and an optional cluster status code.
///
/// Corresponds to the `StatusIB` block in the Matter Interaction Model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub status: IMStatusCode,
    pub cluster_status: Option<ClusterStatus>,
}

impl Status {
    pub const fn new(status: IMStatusCode, cluster_status: Option<ClusterStatus>) -> Status {
        Status {
            status,
            cluster_status,
        }
    }
}

/// An IM status response used for acknowledging report chunks and for rejecting requests.
///
/// Corresponds to the `StatusResponseMessage` struct in the Matter Interaction Model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusResp {
    pub status: IMStatusCode,
    #[tagval(0xFF)]
    pub revision: Option<InteractionModelRevision>,
}

impl StatusResp {
    pub const fn new(status: IMStatusCode, revision: InteractionModelRevision) -> Self {
        Self {
            status,
            revision: Some(revision),
        }
    }

    /// Serialize a complete `StatusResponseMessage` into `wb`.
    pub fn write(
        wb: &mut WriteBuf,
        status: IMStatusCode,
        revision: InteractionModelRevision,
    ) -> Result<(), Error> {
        Self::new(status, revision).to_tlv(&TLVTag::Anonymous, wb)
    }
}

#[cfg(test)]
mod tests {
    use super::{Status, StatusResp};
    use crate::im::IMStatusCode;
    use crate::tlv::{FromTLV, TLVElement, TLVTag, ToTLV};
    use crate::utils::writebuf::WriteBuf;

    #[test]
    fn test_status_resp_wire() {
        let mut buf = [0; 16];
        let mut wb = WriteBuf::new(&mut buf);

        StatusResp::write(&mut wb, IMStatusCode::ResourceExhausted, 11).unwrap();

        assert_eq!(
            wb.as_slice(),
            &[0x15, 0x24, 0x00, 0x89, 0x24, 0xff, 0x0b, 0x18]
        );

        let resp = StatusResp::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        assert_eq!(resp, StatusResp::new(IMStatusCode::ResourceExhausted, 11));
    }

    #[test]
    fn test_status_resp_without_revision() {
        // {0: 0}
        let b = [0x15, 0x24, 0x00, 0x00, 0x18];
        let resp = StatusResp::from_tlv(&TLVElement::new(&b)).unwrap();

        assert_eq!(resp.status, IMStatusCode::Success);
        assert_eq!(resp.revision, None);
    }

    #[test]
    fn test_cluster_status() {
        let mut buf = [0; 16];
        let mut wb = WriteBuf::new(&mut buf);

        Status::new(IMStatusCode::Failure, Some(3))
            .to_tlv(&TLVTag::Anonymous, &mut wb)
            .unwrap();

        let status = Status::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        assert_eq!(status, Status::new(IMStatusCode::Failure, Some(3)));
    }
}
