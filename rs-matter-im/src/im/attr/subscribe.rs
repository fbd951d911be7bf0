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

use core::fmt;

use crate::error::Error;
use crate::im::{
    AttrPath, DataVersionFilter, EventFilter, EventPath, InteractionModelRevision, SubscriptionId,
};
use crate::tlv::{FromTLV, TLVArray, TLVElement, TLVTag, ToTLV};
use crate::utils::writebuf::WriteBuf;

/// A request to subscribe to attributes and events from a Matter device.
///
/// Corresponds to the `SubscribeRequestMessage` TLV structure in the Interaction Model.
#[derive(Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[tlvargs(lifetime = "'a")]
pub struct SubscribeReq<'a>(TLVElement<'a>);

impl<'a> SubscribeReq<'a> {
    pub const fn new(element: TLVElement<'a>) -> Self {
        Self(element)
    }

    /// Return `Ok(true)` if the peer's existing subscriptions should survive this request.
    pub fn keep_subs(&self) -> Result<bool, Error> {
        self.0
            .r#struct()?
            .ctx(SubscribeReqTag::KeepSubs as _)?
            .bool()
    }

    pub fn min_int_floor(&self) -> Result<u16, Error> {
        self.0
            .r#struct()?
            .ctx(SubscribeReqTag::MinIntFloor as _)?
            .u16()
    }

    pub fn max_int_ceil(&self) -> Result<u16, Error> {
        self.0
            .r#struct()?
            .ctx(SubscribeReqTag::MaxIntCeil as _)?
            .u16()
    }

    pub fn attr_requests(&self) -> Result<Option<TLVArray<'a, AttrPath>>, Error> {
        Option::from_tlv(
            &self
                .0
                .r#struct()?
                .find_ctx(SubscribeReqTag::AttrRequests as _)?,
        )
    }

    pub fn event_requests(&self) -> Result<Option<TLVArray<'a, EventPath>>, Error> {
        Option::from_tlv(
            &self
                .0
                .r#struct()?
                .find_ctx(SubscribeReqTag::EventRequests as _)?,
        )
    }

    pub fn event_filters(&self) -> Result<Option<TLVArray<'a, EventFilter>>, Error> {
        Option::from_tlv(
            &self
                .0
                .r#struct()?
                .find_ctx(SubscribeReqTag::EventFilters as _)?,
        )
    }

    pub fn fabric_filtered(&self) -> Result<bool, Error> {
        self.0
            .r#struct()?
            .ctx(SubscribeReqTag::FabricFiltered as _)?
            .bool()
    }

    pub fn dataver_filters(&self) -> Result<Option<TLVArray<'a, DataVersionFilter>>, Error> {
        Option::from_tlv(
            &self
                .0
                .r#struct()?
                .find_ctx(SubscribeReqTag::DataVersionFilters as _)?,
        )
    }
}

impl fmt::Debug for SubscribeReq<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeReq")
            .field("keep_subs", &self.keep_subs())
            .field("min_int_floor", &self.min_int_floor())
            .field("max_int_ceil", &self.max_int_ceil())
            .field("attr_requests", &self.attr_requests())
            .field("event_requests", &self.event_requests())
            .field("event_filters", &self.event_filters())
            .field("fabric_filtered", &self.fabric_filtered())
            .field("dataver_filters", &self.dataver_filters())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SubscribeReq<'_> {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::Debug2Format(self).format(f)
    }
}

/// Tags corresponding to the fields in the `SubscribeRequestMessage` TLV structure.
///
/// Tag 6 is unused by the Interaction Model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SubscribeReqTag {
    KeepSubs = 0,
    MinIntFloor = 1,
    MaxIntCeil = 2,
    AttrRequests = 3,
    EventRequests = 4,
    EventFilters = 5,
    FabricFiltered = 7,
    DataVersionFilters = 8,
}

/// A response to a subscription request.
///
/// Corresponds to the `SubscribeResponseMessage` TLV structure in the Interaction Model.
/// Context tag 1 is unused.
#[derive(Debug, Default, Clone, PartialEq, Eq, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscribeResp {
    pub subs_id: SubscriptionId,
    #[tagval(2)]
    pub max_int: u16,
    #[tagval(0xFF)]
    pub revision: Option<InteractionModelRevision>,
}

impl SubscribeResp {
    pub const fn new(subs_id: SubscriptionId, max_int: u16) -> Self {
        Self {
            subs_id,
            max_int,
            revision: None,
        }
    }

    /// Serialize a complete `SubscribeResponseMessage` into `wb`.
    pub fn write(
        wb: &mut WriteBuf,
        subs_id: SubscriptionId,
        max_int: u16,
        revision: InteractionModelRevision,
    ) -> Result<(), Error> {
        Self {
            subs_id,
            max_int,
            revision: Some(revision),
        }
        .to_tlv(&TLVTag::Anonymous, wb)
    }
}

#[cfg(test)]
mod tests {
    use super::{SubscribeReq, SubscribeResp};
    use crate::error::ErrorCode;
    use crate::tlv::{FromTLV, TLVElement};
    use crate::utils::writebuf::WriteBuf;

    #[test]
    fn test_subscribe_req_fields() {
        // {0: false, 1: 1, 2: 60, 3: [[2: 1, 3: 6, 4: 0]], 7: true}
        let b = [
            0x15, 0x28, 0x00, 0x24, 0x01, 0x01, 0x24, 0x02, 0x3c, 0x36, 0x03, 0x17, 0x24, 0x02,
            0x01, 0x24, 0x03, 0x06, 0x24, 0x04, 0x00, 0x18, 0x18, 0x29, 0x07, 0x18,
        ];
        let req = SubscribeReq::new(TLVElement::new(&b));

        assert!(!req.keep_subs().unwrap());
        assert_eq!(req.min_int_floor().unwrap(), 1);
        assert_eq!(req.max_int_ceil().unwrap(), 60);
        assert!(req.fabric_filtered().unwrap());
        assert!(req.event_requests().unwrap().is_none());

        let paths = req.attr_requests().unwrap().unwrap();
        let first = paths.iter().next().unwrap().unwrap();
        assert_eq!(first.to_gp().not_wildcard().unwrap(), (1, 6, 0));
    }

    #[test]
    fn test_missing_required_field() {
        // {0: true}
        let b = [0x15, 0x29, 0x00, 0x18];
        let req = SubscribeReq::new(TLVElement::new(&b));

        assert_eq!(
            req.min_int_floor().map_err(|e| e.code()),
            Err(ErrorCode::TLVNotFound)
        );
    }

    #[test]
    fn test_subscribe_resp_wire() {
        let mut buf = [0; 16];
        let mut wb = WriteBuf::new(&mut buf);

        SubscribeResp::write(&mut wb, 7, 60, 11).unwrap();

        assert_eq!(
            wb.as_slice(),
            &[
                0x15, 0x26, 0x00, 0x07, 0x00, 0x00, 0x00, 0x25, 0x02, 0x3c, 0x00, 0x24, 0xff, 0x0b,
                0x18
            ]
        );

        let resp = SubscribeResp::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        assert_eq!(resp.subs_id, 7);
        assert_eq!(resp.max_int, 60);
        assert_eq!(resp.revision, Some(11));
    }

    #[test]
    fn test_subscribe_resp_compact_ints() {
        // {0: 7, 2: 60}, as sent by peers that pick the narrowest width
        let b = [0x15, 0x24, 0x00, 0x07, 0x24, 0x02, 0x3c, 0x18];

        assert_eq!(
            SubscribeResp::from_tlv(&TLVElement::new(&b)).unwrap(),
            SubscribeResp::new(7, 60)
        );
    }
}
