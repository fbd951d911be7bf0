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

use core::ops::{Deref, DerefMut};

use crate::error::Error;
use crate::im::{
    AttrDataTag, AttrPath, AttrRespTag, DataVersion, EventDataTag, EventDataTimestamp,
    EventNumber, EventPath, EventRespTag, FabricIndex,
};
use crate::tlv::{TLVTag, TLVWrite, ToTLV};
use crate::utils::writebuf::WriteBuf;

use super::{AttrDetails, EventDetails};

/// A list entry owned by one fabric.
pub trait FabricScoped {
    fn fabric_index(&self) -> FabricIndex;
}

/// Hands a `DataHandler` the means to encode one attribute value as an
/// `AttributeReportIB`.
pub struct AttrDataEncoder<'a, 'b> {
    dataver_filter: Option<DataVersion>,
    path: AttrPath,
    fab_idx: FabricIndex,
    fab_filter: bool,
    wb: &'a mut WriteBuf<'b>,
}

impl<'a, 'b> AttrDataEncoder<'a, 'b> {
    pub fn new(attr: &AttrDetails, wb: &'a mut WriteBuf<'b>) -> Self {
        Self {
            dataver_filter: attr.dataver,
            path: attr.path(),
            fab_idx: attr.fab_idx,
            fab_filter: attr.fab_filter,
            wb,
        }
    }

    /// Open the report item for a cluster whose data version is `dataver`.
    ///
    /// Returns `None` when the requester already has this data version, in
    /// which case the attribute is not reported.
    pub fn with_dataver(self, dataver: DataVersion) -> Result<Option<AttrDataWriter<'a, 'b>>, Error> {
        if self
            .dataver_filter
            .map(|dataver_filter| dataver_filter != dataver)
            .unwrap_or(true)
        {
            let mut writer = AttrDataWriter::new(self.wb, self.fab_idx, self.fab_filter);

            writer.start_struct(&TLVTag::Anonymous)?;
            writer.start_struct(&TLVTag::Context(AttrRespTag::Data as _))?;
            writer.u32(&TLVTag::Context(AttrDataTag::DataVer as _), dataver)?;
            self.path
                .to_tlv(&TLVTag::Context(AttrDataTag::Path as _), &mut *writer)?;

            Ok(Some(writer))
        } else {
            Ok(None)
        }
    }
}

/// Writes the value of one attribute.
///
/// Dropping the writer without completing it rewinds everything written for
/// the attribute, so a failed or oversized value never leaves a partial item behind.
pub struct AttrDataWriter<'a, 'b> {
    wb: &'a mut WriteBuf<'b>,
    anchor: usize,
    fab_idx: FabricIndex,
    fab_filter: bool,
    completed: bool,
}

impl<'a, 'b> AttrDataWriter<'a, 'b> {
    pub const TAG: TLVTag = TLVTag::Context(AttrDataTag::Data as _);

    fn new(wb: &'a mut WriteBuf<'b>, fab_idx: FabricIndex, fab_filter: bool) -> Self {
        let anchor = wb.get_tail();

        Self {
            wb,
            anchor,
            fab_idx,
            fab_filter,
            completed: false,
        }
    }

    pub fn set<T: ToTLV>(self, value: T) -> Result<(), Error> {
        value.to_tlv(&Self::TAG, &mut *self.wb)?;
        self.complete()
    }

    /// Encode a list of fabric-scoped entries.
    ///
    /// With fabric filtering on, entries of other fabrics are left out.
    pub fn fabric_scoped_list<I, T>(self, entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: FabricScoped + ToTLV,
    {
        self.wb.start_array(&Self::TAG)?;

        for entry in entries {
            if !self.fab_filter || entry.fabric_index() == self.fab_idx {
                entry.to_tlv(&TLVTag::Anonymous, &mut *self.wb)?;
            }
        }

        self.wb.end_container()?;
        self.complete()
    }

    pub fn complete(mut self) -> Result<(), Error> {
        self.wb.end_container()?;
        self.wb.end_container()?;

        self.completed = true;

        Ok(())
    }

    pub fn writer(&mut self) -> &mut WriteBuf<'b> {
        self.wb
    }

    fn reset(&mut self) {
        self.wb.rewind_tail_to(self.anchor);
    }
}

impl Drop for AttrDataWriter<'_, '_> {
    fn drop(&mut self) {
        if !self.completed {
            self.reset();
        }
    }
}

impl<'b> Deref for AttrDataWriter<'_, 'b> {
    type Target = WriteBuf<'b>;

    fn deref(&self) -> &Self::Target {
        self.wb
    }
}

impl DerefMut for AttrDataWriter<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.wb
    }
}

/// Per-path progress of event encoding, kept across chunks.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventDataTracker {
    floor: EventNumber,
    last: Option<EventNumber>,
    attempted: Option<EventNumber>,
    written: usize,
}

impl EventDataTracker {
    /// Events numbered below `floor` are skipped.
    pub const fn new(floor: EventNumber) -> Self {
        Self {
            floor,
            last: None,
            attempted: None,
            written: 0,
        }
    }

    /// The lowest event number still to be delivered.
    pub const fn floor(&self) -> EventNumber {
        self.floor
    }

    /// The highest event number consumed so far.
    pub const fn last(&self) -> Option<EventNumber> {
        self.last
    }

    pub const fn written(&self) -> usize {
        self.written
    }

    /// Give up on the event whose encoding failed last, so that the next
    /// attempt starts after it. Returns its number.
    pub fn skip_attempted(&mut self) -> Option<EventNumber> {
        let attempted = self.attempted.take()?;

        self.consume(attempted);

        Some(attempted)
    }

    fn consume(&mut self, event_number: EventNumber) {
        self.floor = self.floor.max(event_number.saturating_add(1));
        self.last = self.last.max(Some(event_number));
    }
}

/// Hands a `DataHandler` the means to encode the events of one concrete
/// event path as `EventReportIB`s.
pub struct EventDataEncoder<'a, 'b> {
    tracker: &'a mut EventDataTracker,
    path: EventPath,
    fab_idx: FabricIndex,
    fab_filter: bool,
    wb: &'a mut WriteBuf<'b>,
}

impl<'a, 'b> EventDataEncoder<'a, 'b> {
    pub fn new(
        event: &EventDetails,
        tracker: &'a mut EventDataTracker,
        wb: &'a mut WriteBuf<'b>,
    ) -> Self {
        Self {
            tracker,
            path: event.path(),
            fab_idx: event.fab_idx,
            fab_filter: event.fab_filter,
            wb,
        }
    }

    /// Return `true` if an event owned by `fab_idx` may be reported to the requester.
    pub fn is_visible(&self, fab_idx: FabricIndex) -> bool {
        !self.fab_filter || self.fab_idx == fab_idx
    }

    /// The lowest event number the requester is still interested in.
    pub fn floor(&self) -> EventNumber {
        self.tracker.floor()
    }

    /// Encode one event; events below the floor are silently skipped.
    ///
    /// On error nothing of the event remains in the buffer.
    pub fn push<T: ToTLV>(
        &mut self,
        event_number: EventNumber,
        priority: u8,
        timestamp: EventDataTimestamp,
        data: T,
    ) -> Result<(), Error> {
        if event_number < self.tracker.floor() {
            return Ok(());
        }

        self.tracker.attempted = Some(event_number);

        let anchor = self.wb.get_tail();

        if let Err(e) = Self::write_event(
            self.wb,
            &self.path,
            event_number,
            priority,
            timestamp,
            &data,
        ) {
            self.wb.rewind_tail_to(anchor);
            return Err(e);
        }

        self.tracker.attempted = None;
        self.tracker.written += 1;
        self.tracker.consume(event_number);

        Ok(())
    }

    fn write_event<T: ToTLV>(
        wb: &mut WriteBuf,
        path: &EventPath,
        event_number: EventNumber,
        priority: u8,
        timestamp: EventDataTimestamp,
        data: &T,
    ) -> Result<(), Error> {
        wb.start_struct(&TLVTag::Anonymous)?;
        wb.start_struct(&TLVTag::Context(EventRespTag::Data as _))?;

        path.to_tlv(&TLVTag::Context(EventDataTag::Path as _), &mut *wb)?;
        wb.u64(&TLVTag::Context(EventDataTag::EventNumber as _), event_number)?;
        wb.u8(&TLVTag::Context(EventDataTag::Priority as _), priority)?;

        let (ts_tag, ts) = timestamp.tag_and_value();
        wb.u64(&TLVTag::Context(ts_tag as _), ts)?;

        data.to_tlv(&TLVTag::Context(EventDataTag::Data as _), &mut *wb)?;

        wb.end_container()?;
        wb.end_container()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttrDataEncoder, EventDataEncoder, EventDataTracker, FabricScoped};
    use crate::dm::{AttrDetails, EventDetails};
    use crate::error::{Error, ErrorCode};
    use crate::im::{EventDataTimestamp, EventResp, FabricIndex};
    use crate::tlv::{FromTLV, TLVElement, TLVTag, TLVWrite, ToTLV};
    use crate::utils::writebuf::WriteBuf;

    fn attr(dataver: Option<u32>, fab_filter: bool) -> AttrDetails {
        AttrDetails {
            endpoint_id: 1,
            cluster_id: 6,
            attr_id: 0,
            fab_idx: 1,
            fab_filter,
            dataver,
            wildcard: false,
        }
    }

    #[test]
    fn test_attr_data_wire() {
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);

        let writer = AttrDataEncoder::new(&attr(None, false), &mut wb)
            .with_dataver(5)
            .unwrap()
            .unwrap();
        writer.set(1_u8).unwrap();

        assert_eq!(
            wb.as_slice(),
            &[
                0x15, 0x35, 0x01, 0x24, 0x00, 0x05, 0x37, 0x01, 0x25, 0x02, 0x01, 0x00, 0x26, 0x03,
                0x06, 0x00, 0x00, 0x00, 0x26, 0x04, 0x00, 0x00, 0x00, 0x00, 0x18, 0x24, 0x02, 0x01,
                0x18, 0x18
            ]
        );
    }

    #[test]
    fn test_dataver_filter_match() {
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);

        let writer = AttrDataEncoder::new(&attr(Some(5), false), &mut wb)
            .with_dataver(5)
            .unwrap();

        assert!(writer.is_none());
        drop(writer);

        assert!(wb.as_slice().is_empty());
    }

    #[test]
    fn test_incomplete_writer_rewinds() {
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);

        wb.u8(&TLVTag::Anonymous, 7).unwrap();

        {
            let mut writer = AttrDataEncoder::new(&attr(None, false), &mut wb)
                .with_dataver(1)
                .unwrap()
                .unwrap();
            writer.writer().u8(&TLVTag::Context(2), 1).unwrap();
        }

        assert_eq!(wb.as_slice(), &[0x04, 0x07]);
    }

    #[test]
    fn test_value_overflow_rewinds() {
        let mut buf = [0; 24];
        let mut wb = WriteBuf::new(&mut buf);

        let writer = AttrDataEncoder::new(&attr(None, false), &mut wb)
            .with_dataver(1)
            .unwrap()
            .unwrap();

        assert_eq!(
            writer.set("a value too long to fit").map_err(|e| e.code()),
            Err(ErrorCode::NoSpace)
        );
        assert!(wb.as_slice().is_empty());
    }

    struct Entry(FabricIndex);

    impl FabricScoped for Entry {
        fn fabric_index(&self) -> FabricIndex {
            self.0
        }
    }

    impl ToTLV for Entry {
        fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
            tw.u8(tag, self.0)
        }
    }

    fn fabric_list(fab_filter: bool) -> usize {
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);

        AttrDataEncoder::new(&attr(None, fab_filter), &mut wb)
            .with_dataver(1)
            .unwrap()
            .unwrap()
            .fabric_scoped_list([Entry(1), Entry(2), Entry(1)])
            .unwrap();

        let element = TLVElement::new(wb.as_slice());
        let data = element
            .r#struct()
            .unwrap()
            .ctx(1)
            .unwrap()
            .r#struct()
            .unwrap()
            .ctx(2)
            .unwrap();

        data.array().unwrap().iter().count()
    }

    #[test]
    fn test_fabric_scoped_list() {
        assert_eq!(fabric_list(false), 3);
        assert_eq!(fabric_list(true), 2);
    }

    #[test]
    fn test_event_floor() {
        let mut buf = [0; 128];
        let mut wb = WriteBuf::new(&mut buf);
        let mut tracker = EventDataTracker::new(3);

        let event = EventDetails {
            endpoint_id: 1,
            cluster_id: 6,
            event_id: 0,
            fab_idx: 1,
            fab_filter: false,
            wildcard: false,
        };

        {
            let mut encoder = EventDataEncoder::new(&event, &mut tracker, &mut wb);
            for number in 1..5 {
                encoder
                    .push(number, 1, EventDataTimestamp::SystemTimestamp(100), true)
                    .unwrap();
            }
        }

        assert_eq!(tracker.written(), 2);
        assert_eq!(tracker.last(), Some(4));
        assert_eq!(tracker.floor(), 5);

        let first = EventResp::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        let EventResp::Data(data) = first else {
            panic!("expected event data");
        };
        assert_eq!(data.event_number, 3);
        assert_eq!(data.timestamp, EventDataTimestamp::SystemTimestamp(100));
    }

    #[test]
    fn test_event_overflow_skip() {
        let mut buf = [0; 16];
        let mut wb = WriteBuf::new(&mut buf);
        let mut tracker = EventDataTracker::new(0);

        let event = EventDetails {
            endpoint_id: 1,
            cluster_id: 6,
            event_id: 0,
            fab_idx: 1,
            fab_filter: false,
            wildcard: false,
        };

        let result = EventDataEncoder::new(&event, &mut tracker, &mut wb).push(
            9,
            1,
            EventDataTimestamp::EpochTimestamp(0),
            true,
        );

        assert_eq!(result.map_err(|e| e.code()), Err(ErrorCode::NoSpace));
        assert!(wb.as_slice().is_empty());
        assert_eq!(tracker.skip_attempted(), Some(9));
        assert_eq!(tracker.floor(), 10);
    }
}
