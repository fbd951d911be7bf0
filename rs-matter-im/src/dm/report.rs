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

use crate::error::{Error, ErrorCode};
use crate::im::{
    AttrRespTag, AttrStatus, EventRespTag, EventStatus, IMStatusCode, ReportDataRespTag,
    SubscriptionId, IM_REVISION_TAG,
};
use crate::tlv::{TLVTag, TLVWrite, ToTLV};
use crate::utils::writebuf::WriteBuf;

use super::{
    AttrDataEncoder, AttrDetails, DataHandler, EventDataEncoder, EventDataTracker, EventDetails,
    PathKind,
};

/// Outcome of adding one path to a report chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Retrieved {
    /// The path is fully processed (possibly with nothing to report)
    Done,
    /// The chunk has no room left; the path has to be retried in the next chunk
    ChunkFull,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Section {
    Pending,
    Open,
    Closed,
}

#[derive(Debug, Copy, Clone)]
struct Sections {
    attrs: Section,
    events: Section,
}

/// Assembles one `ReportData` message.
///
/// The attribute and event report arrays are opened lazily, so a chunk
/// without attribute (or event) items carries no such array. All attribute
/// items of a chunk precede its event items.
pub struct ReportBuilder<'a, 'b> {
    wb: &'a mut WriteBuf<'b>,
    revision: u8,
    items: usize,
    sections: Sections,
}

impl<'a, 'b> ReportBuilder<'a, 'b> {
    /// Room kept at the end of the buffer for closing the message.
    pub const RESERVE: usize = 24;

    pub fn start(
        wb: &'a mut WriteBuf<'b>,
        subscription_id: Option<SubscriptionId>,
        revision: u8,
    ) -> Result<Self, Error> {
        wb.reset();
        wb.shrink(Self::RESERVE)?;

        wb.start_struct(&TLVTag::Anonymous)?;

        if let Some(subscription_id) = subscription_id {
            wb.u32(
                &TLVTag::Context(ReportDataRespTag::SubscriptionId as u8),
                subscription_id,
            )?;
        }

        Ok(Self {
            wb,
            revision,
            items: 0,
            sections: Sections {
                attrs: Section::Pending,
                events: Section::Pending,
            },
        })
    }

    /// Number of report items (data or status) in the chunk so far.
    pub fn items(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Read one concrete attribute into the chunk.
    ///
    /// A value that does not fit is retried in the next chunk; a value that
    /// does not even fit into an empty chunk is replaced by a
    /// `ResourceExhausted` status. Other read failures turn into a status
    /// item, unless the status is suppressed for wildcard paths.
    pub fn retrieve_cluster_data<D>(
        &mut self,
        handler: &D,
        attr: &AttrDetails,
    ) -> Result<Retrieved, Error>
    where
        D: DataHandler,
    {
        let result = self.with_item(PathKind::Attribute, |wb| {
            handler.read(attr, AttrDataEncoder::new(attr, wb))
        });

        match result {
            Ok(_) => Ok(Retrieved::Done),
            Err(e) if e.code() == ErrorCode::NoSpace => {
                if !self.is_empty() {
                    return Ok(Retrieved::ChunkFull);
                }

                warn!(
                    "Attribute {:?} does not fit in a report, reporting a status instead",
                    attr.path()
                );

                match attr.status(IMStatusCode::ResourceExhausted) {
                    Some(status) => self.attr_status(&status),
                    None => Ok(Retrieved::Done),
                }
            }
            Err(e) => {
                error!("Error reading attribute {:?}: {:?}", attr.path(), e);

                match attr.status(e.into()) {
                    Some(status) => self.attr_status(&status),
                    None => Ok(Retrieved::Done),
                }
            }
        }
    }

    /// Add an `AttributeStatusIB` item.
    pub fn attr_status(&mut self, status: &AttrStatus) -> Result<Retrieved, Error> {
        let result = self.with_item(PathKind::Attribute, |wb| {
            wb.start_struct(&TLVTag::Anonymous)?;
            status.to_tlv(&TLVTag::Context(AttrRespTag::Status as _), &mut *wb)?;
            wb.end_container()
        });

        self.status_outcome(result)
    }

    /// Read the events of one concrete event path into the chunk.
    ///
    /// `tracker` carries the progress of the path across chunks: once the
    /// chunk is full, the events written so far stay and the path is retried
    /// from the first event not yet written.
    pub fn retrieve_event_data<D>(
        &mut self,
        handler: &D,
        event: &EventDetails,
        tracker: &mut EventDataTracker,
    ) -> Result<Retrieved, Error>
    where
        D: DataHandler,
    {
        let anchor = self.wb.get_tail();
        let sections = self.sections;
        let written_before = tracker.written();

        let result = self.open(PathKind::Event).and_then(|_| {
            handler.read_events(event, EventDataEncoder::new(event, tracker, &mut *self.wb))
        });

        let written = tracker.written() - written_before;
        if written == 0 {
            self.wb.rewind_tail_to(anchor);
            self.sections = sections;
        }

        self.items += written;

        match result {
            Ok(()) => Ok(Retrieved::Done),
            Err(e) if e.code() == ErrorCode::NoSpace => {
                if !self.is_empty() {
                    return Ok(Retrieved::ChunkFull);
                }

                let Some(event_number) = tracker.skip_attempted() else {
                    return Err(e);
                };

                warn!(
                    "Event {} of {:?} does not fit in a report, skipping it",
                    event_number,
                    event.path()
                );

                if let Some(status) = event.status(IMStatusCode::ResourceExhausted) {
                    self.event_status(&status)?;
                }

                Ok(Retrieved::ChunkFull)
            }
            Err(e) => {
                error!("Error reading events of {:?}: {:?}", event.path(), e);

                match event.status(e.into()) {
                    Some(status) => self.event_status(&status),
                    None => Ok(Retrieved::Done),
                }
            }
        }
    }

    /// Add an `EventStatusIB` item.
    pub fn event_status(&mut self, status: &EventStatus) -> Result<Retrieved, Error> {
        let result = self.with_item(PathKind::Event, |wb| {
            wb.start_struct(&TLVTag::Anonymous)?;
            status.to_tlv(&TLVTag::Context(EventRespTag::Status as _), &mut *wb)?;
            wb.end_container()
        });

        self.status_outcome(result)
    }

    /// Close the message.
    ///
    /// `suppress_response` only applies to the last chunk of an interaction.
    pub fn finish(self, more_chunks: bool, suppress_response: bool) -> Result<(), Error> {
        self.wb.expand(Self::RESERVE)?;

        if self.sections.attrs == Section::Open {
            self.wb.end_container()?;
        }

        if self.sections.events == Section::Open {
            self.wb.end_container()?;
        }

        if more_chunks {
            self.wb.bool(
                &TLVTag::Context(ReportDataRespTag::MoreChunkedMsgs as u8),
                true,
            )?;
        } else if suppress_response {
            self.wb.bool(
                &TLVTag::Context(ReportDataRespTag::SuppressResponse as u8),
                true,
            )?;
        }

        self.wb
            .u8(&TLVTag::Context(IM_REVISION_TAG), self.revision)?;

        self.wb.end_container()
    }

    fn status_outcome(&self, result: Result<bool, Error>) -> Result<Retrieved, Error> {
        match result {
            Ok(_) => Ok(Retrieved::Done),
            Err(e) if e.code() == ErrorCode::NoSpace && !self.is_empty() => {
                Ok(Retrieved::ChunkFull)
            }
            Err(e) => Err(e),
        }
    }

    /// Write one item, opening its array first if needed.
    ///
    /// Returns `false` if `f` wrote nothing. On error, and when nothing was
    /// written, the buffer and the array state are left as they were.
    fn with_item<F>(&mut self, kind: PathKind, f: F) -> Result<bool, Error>
    where
        F: FnOnce(&mut WriteBuf<'b>) -> Result<(), Error>,
    {
        let anchor = self.wb.get_tail();
        let sections = self.sections;

        let result = self.open(kind).and_then(|_| {
            let start = self.wb.get_tail();

            f(&mut *self.wb)?;

            Ok(self.wb.get_tail() != start)
        });

        match result {
            Ok(true) => {
                self.items += 1;
                Ok(true)
            }
            Ok(false) | Err(_) => {
                self.wb.rewind_tail_to(anchor);
                self.sections = sections;

                result
            }
        }
    }

    fn open(&mut self, kind: PathKind) -> Result<(), Error> {
        match kind {
            PathKind::Attribute => match self.sections.attrs {
                Section::Open => Ok(()),
                Section::Closed => Err(ErrorCode::InvalidState.into()),
                Section::Pending => {
                    if self.sections.events != Section::Pending {
                        Err(ErrorCode::InvalidState)?;
                    }

                    self.wb.start_array(&TLVTag::Context(
                        ReportDataRespTag::AttributeReports as u8,
                    ))?;
                    self.sections.attrs = Section::Open;

                    Ok(())
                }
            },
            PathKind::Event => match self.sections.events {
                Section::Open => Ok(()),
                Section::Closed => Err(ErrorCode::InvalidState.into()),
                Section::Pending => {
                    if self.sections.attrs == Section::Open {
                        self.wb.end_container()?;
                        self.sections.attrs = Section::Closed;
                    }

                    self.wb
                        .start_array(&TLVTag::Context(ReportDataRespTag::EventReports as u8))?;
                    self.sections.events = Section::Open;

                    Ok(())
                }
            },
        }
    }
}
