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
    AttrId, AttrPath, AttrStatus, ClusterId, DataVersion, DataVersionFilter, EndptId, EventId,
    EventNumber, EventPath, EventStatus, GenericPath, ReadReq, SubscribeReq, SubscriptionId,
};
use crate::tlv::{FromTLV, TLVArray};
use crate::transport::{ExchangeId, SessionInfo};
use crate::utils::writebuf::WriteBuf;

use super::{
    AttrDetails, DataModel, DirtySet, EventDataTracker, EventDetails, ExpanderCursor, ImConfig,
    PathExpander, PathKind, ReportBuilder, Retrieved, MAX_DATAVER_FILTERS_PER_REQUEST,
    MAX_PATHS_PER_REQUEST,
};

pub type PathList = heapless::Vec<GenericPath, MAX_PATHS_PER_REQUEST>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerState {
    /// Allocated, nothing parsed yet
    Idle,
    /// Request parsed, paths stored
    AwaitingInitialRequest,
    /// Pulling paths into report chunks
    GeneratingReports,
    /// A chunk is in flight
    AwaitingReportAck,
    /// A subscription between two reports
    Reportable,
    Terminated,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InteractionKind {
    Read,
    Subscribe,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportKind {
    /// The first report of an interaction: the only report of a read, or the
    /// priming report of a subscription. Carries every requested path.
    Priming,
    /// Carries only the paths changed since the last report.
    Dirty,
    /// Carries every requested path, keeping the subscription alive.
    KeepAlive,
}

/// What to do once the peer acknowledged a chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckOutcome {
    NextChunk,
    /// The priming report is complete; the subscribe response is due.
    Primed,
    ReportDone,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkOutcome {
    /// More chunks follow this one
    pub more: bool,
    /// Report items in the chunk
    pub items: usize,
}

/// Where report generation resumes in the next chunk.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportCursor {
    pub attrs: ExpanderCursor,
    pub events: ExpanderCursor,
    /// Event floor of the event path interrupted by the end of the previous chunk
    pub event_resume: Option<EventNumber>,
    /// The highest event number put in the current report
    pub last_event: Option<EventNumber>,
}

impl ReportCursor {
    pub const fn new() -> Self {
        Self {
            attrs: ExpanderCursor::new(),
            events: ExpanderCursor::new(),
            event_resume: None,
            last_event: None,
        }
    }

    fn precedes(&self, other: &Self) -> bool {
        self.attrs <= other.attrs && self.events <= other.events
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionParams {
    pub id: SubscriptionId,
    pub min_int_secs: u16,
    pub max_int_secs: u16,
}

/// One read or subscribe interaction with a peer.
///
/// The handler owns the parsed request and the progress of the report being
/// generated. It does no I/O: the engine feeds it the data model, the dirty
/// set and a buffer, and hands the generated chunks to the transport.
#[derive(Debug)]
pub struct ReadHandler {
    kind: InteractionKind,
    state: HandlerState,
    session: SessionInfo,
    exchange: Option<ExchangeId>,
    attr_paths: PathList,
    event_paths: PathList,
    dataver_filters: heapless::Vec<DataVersionFilter, MAX_DATAVER_FILTERS_PER_REQUEST>,
    event_min: EventNumber,
    fabric_filtered: bool,
    cursor: ReportCursor,
    subscription: Option<SubscriptionParams>,
    watermark: u64,
    target_generation: u64,
    report_kind: ReportKind,
    chunks: u16,
    more_pending: bool,
    retries: u8,
    active: bool,
}

impl ReadHandler {
    pub const fn new(kind: InteractionKind, session: SessionInfo) -> Self {
        Self {
            kind,
            state: HandlerState::Idle,
            session,
            exchange: None,
            attr_paths: heapless::Vec::new(),
            event_paths: heapless::Vec::new(),
            dataver_filters: heapless::Vec::new(),
            event_min: 0,
            fabric_filtered: true,
            cursor: ReportCursor::new(),
            subscription: None,
            watermark: 0,
            target_generation: 0,
            report_kind: ReportKind::Priming,
            chunks: 0,
            more_pending: false,
            retries: 0,
            active: false,
        }
    }

    /// Take over the paths and filters of a read request.
    ///
    /// Malformed requests fail with `InvalidAction`, requests with too many
    /// paths with `PathsExhausted`.
    pub fn parse_read(&mut self, req: &ReadReq) -> Result<(), Error> {
        self.expect_state(HandlerState::Idle)?;

        self.parse_paths(
            req.attr_requests(),
            req.event_requests(),
            req.event_filters().map(|filters| {
                filters.map(|filters| filters.iter().filter_map(|f| f.ok()?.event_min).max())
            }),
            req.fabric_filtered(),
            req.dataver_filters(),
        )
        .map_err(Error::map_invalid_action)?;

        self.state = HandlerState::AwaitingInitialRequest;

        Ok(())
    }

    /// Take over the paths, filters and intervals of a subscribe request.
    ///
    /// The max interval is raised to at least `ImConfig::min_keepalive_secs`
    /// and capped at `ImConfig::max_interval_ceiling_secs`; the min interval
    /// never exceeds the resulting max interval.
    pub fn parse_subscribe(&mut self, req: &SubscribeReq, config: &ImConfig) -> Result<(), Error> {
        self.expect_state(HandlerState::Idle)?;

        let (min_int_floor, max_int_ceil) = req
            .min_int_floor()
            .and_then(|min| Ok((min, req.max_int_ceil()?)))
            .map_err(Error::map_invalid_action)?;

        if min_int_floor > max_int_ceil {
            warn!(
                "Rejecting subscription with min interval {} above max interval {}",
                min_int_floor, max_int_ceil
            );
            Err(ErrorCode::InvalidAction)?;
        }

        self.parse_paths(
            req.attr_requests(),
            req.event_requests(),
            req.event_filters().map(|filters| {
                filters.map(|filters| filters.iter().filter_map(|f| f.ok()?.event_min).max())
            }),
            req.fabric_filtered(),
            req.dataver_filters(),
        )
        .map_err(Error::map_invalid_action)?;

        if self.attr_paths.is_empty() && self.event_paths.is_empty() {
            warn!("Rejecting subscription without paths");
            Err(ErrorCode::InvalidAction)?;
        }

        let max_int_secs = max_int_ceil
            .max(config.min_keepalive_secs)
            .max(min_int_floor)
            .min(config.max_interval_ceiling_secs);
        let min_int_secs = min_int_floor.min(max_int_secs);

        debug!(
            "Subscription intervals: requested {}..{}s, negotiated {}..{}s",
            min_int_floor, max_int_ceil, min_int_secs, max_int_secs
        );

        self.subscription = Some(SubscriptionParams {
            id: 0,
            min_int_secs,
            max_int_secs,
        });
        self.state = HandlerState::AwaitingInitialRequest;

        Ok(())
    }

    pub fn assign_subscription_id(&mut self, id: SubscriptionId) {
        debug_assert!(id != 0);

        if let Some(subscription) = self.subscription.as_mut() {
            subscription.id = id;
        }
    }

    /// Return `true` if a change of the given attribute (or of all attributes
    /// of the cluster, for `None`) is visible to this interaction.
    pub fn matches_attr(&self, endpoint: EndptId, cluster: ClusterId, attr: Option<AttrId>) -> bool {
        self.is_interested(&GenericPath::new(Some(endpoint), Some(cluster), attr))
    }

    /// Return `true` if a change of the possibly wildcarded attribute path
    /// `changed` is visible to this interaction.
    pub fn is_interested(&self, changed: &GenericPath) -> bool {
        self.attr_paths.iter().any(|path| path.overlaps(changed))
    }

    pub fn matches_event(&self, endpoint: EndptId, cluster: ClusterId, event: EventId) -> bool {
        let emitted = GenericPath::new(Some(endpoint), Some(cluster), Some(event));

        self.event_paths.iter().any(|path| path.overlaps(&emitted))
    }

    /// Start a new report.
    ///
    /// `generation` is the dirty-set generation the report catches up to once
    /// its final chunk is out.
    pub fn begin_report(&mut self, kind: ReportKind, generation: u64, exchange: ExchangeId) {
        debug_assert!(matches!(
            self.state,
            HandlerState::AwaitingInitialRequest | HandlerState::Reportable
        ));

        self.report_kind = kind;
        self.target_generation = generation;
        self.exchange = Some(exchange);
        self.cursor = ReportCursor::new();
        self.chunks = 0;
        self.more_pending = false;
        self.state = HandlerState::GeneratingReports;

        debug!(
            "Handler {:?}/{}: starting {:?} report on exchange {}",
            self.kind,
            self.subscription_id().unwrap_or_default(),
            kind,
            exchange
        );
    }

    /// Fill `wb` with the next chunk of the current report.
    ///
    /// Attribute paths are reported before event paths. A chunk ends when
    /// the next item does not fit; the cursor then points at that item. The
    /// cursor is only persisted once the chunk is complete, so on error the
    /// same chunk is generated again.
    pub fn generate_chunk<D, const DN: usize>(
        &mut self,
        dm: &D,
        dirty: &DirtySet<DN>,
        wb: &mut WriteBuf,
        revision: u8,
    ) -> Result<ChunkOutcome, Error>
    where
        D: DataModel,
    {
        self.expect_state(HandlerState::GeneratingReports)?;

        let mut cursor = self.cursor;
        let mut report = ReportBuilder::start(wb, self.subscription_id(), revision)?;

        let more = self.fill_attrs(dm, dirty, &mut report, &mut cursor)?
            || self.fill_events(dm, &mut report, &mut cursor)?;

        let items = report.items();
        let suppress_response = !more && self.kind == InteractionKind::Read;

        report.finish(more, suppress_response)?;

        self.advance_cursor(cursor);

        Ok(ChunkOutcome { more, items })
    }

    /// A dirty report with nothing visible to this subscription is not sent.
    pub fn is_skippable(&self, outcome: &ChunkOutcome) -> bool {
        self.report_kind == ReportKind::Dirty
            && self.chunks == 0
            && outcome.items == 0
            && !outcome.more
    }

    /// The chunk was handed to the transport.
    pub fn on_chunk_sent(&mut self, outcome: &ChunkOutcome) {
        self.chunks += 1;
        self.more_pending = outcome.more;

        if !outcome.more {
            self.complete_report();
        }

        self.state = if !outcome.more && self.kind == InteractionKind::Read {
            HandlerState::Terminated
        } else {
            HandlerState::AwaitingReportAck
        };
    }

    /// The report was generated but found empty; nothing was sent.
    pub fn on_report_skipped(&mut self) {
        self.complete_report();
        self.release_report();
    }

    /// The peer acknowledged the chunk in flight.
    pub fn on_ack(&mut self) -> Result<AckOutcome, Error> {
        self.expect_state(HandlerState::AwaitingReportAck)?;

        if self.more_pending {
            self.state = HandlerState::GeneratingReports;

            Ok(AckOutcome::NextChunk)
        } else if !self.active {
            Ok(AckOutcome::Primed)
        } else {
            self.release_report();

            Ok(AckOutcome::ReportDone)
        }
    }

    /// The subscribe response went out; the subscription is live.
    pub fn activate(&mut self) {
        debug_assert!(self.kind == InteractionKind::Subscribe);

        self.active = true;
        self.release_report();
    }

    /// The report could not be generated or sent. The subscription goes back
    /// to waiting, with its changes still pending.
    ///
    /// Returns the number of consecutive failed reports.
    pub fn on_report_aborted(&mut self) -> u8 {
        self.retries = self.retries.saturating_add(1);
        self.release_report();

        self.retries
    }

    pub fn terminate(&mut self) {
        self.state = HandlerState::Terminated;
        self.exchange = None;
        self.active = false;
    }

    /// Forget the exchange of the current report, returning it.
    pub fn take_exchange(&mut self) -> Option<ExchangeId> {
        self.exchange.take()
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    pub fn report_kind(&self) -> ReportKind {
        self.report_kind
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn exchange(&self) -> Option<ExchangeId> {
        self.exchange
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.map(|subscription| subscription.id)
    }

    /// Negotiated `(min, max)` intervals in seconds, for subscriptions.
    pub fn intervals(&self) -> Option<(u16, u16)> {
        self.subscription
            .map(|subscription| (subscription.min_int_secs, subscription.max_int_secs))
    }

    pub fn is_active_subscription(&self) -> bool {
        self.active
    }

    /// The dirty-set generation reported so far.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn cursor(&self) -> &ReportCursor {
        &self.cursor
    }

    pub fn attr_paths(&self) -> &[GenericPath] {
        &self.attr_paths
    }

    pub fn event_paths(&self) -> &[GenericPath] {
        &self.event_paths
    }

    fn fill_attrs<D, const DN: usize>(
        &self,
        dm: &D,
        dirty: &DirtySet<DN>,
        report: &mut ReportBuilder,
        cursor: &mut ReportCursor,
    ) -> Result<bool, Error>
    where
        D: DataModel,
    {
        let mut expander = PathExpander::new(dm, PathKind::Attribute, &self.attr_paths);
        expander.resume(cursor.attrs);

        loop {
            let before = expander.cursor();

            let Some(item) = expander.next() else {
                break;
            };

            let item = item?;
            let wildcard = expander.request().is_some_and(GenericPath::is_wildcard);

            let path = match &item {
                Ok(path) => *path,
                Err(status) => status.path,
            };

            if self.report_kind == ReportKind::Dirty
                && !dirty.is_dirty(&path.to_gp(), self.watermark)
            {
                cursor.attrs = expander.cursor();
                continue;
            }

            let retrieved = match item {
                Ok(path) => {
                    let attr = AttrDetails {
                        endpoint_id: path.endpoint,
                        cluster_id: path.cluster,
                        attr_id: path.leaf,
                        fab_idx: self.session.fabric_idx,
                        fab_filter: self.fabric_filtered,
                        dataver: self.dataver_filter(path.endpoint, path.cluster),
                        wildcard,
                    };

                    report.retrieve_cluster_data(dm, &attr)?
                }
                Err(status) => report.attr_status(&AttrStatus::from_gp(
                    &status.path.to_gp(),
                    status.status,
                    None,
                ))?,
            };

            if retrieved == Retrieved::ChunkFull {
                cursor.attrs = before;
                return Ok(true);
            }

            cursor.attrs = expander.cursor();
        }

        cursor.attrs = expander.cursor();

        Ok(false)
    }

    fn fill_events<D>(
        &self,
        dm: &D,
        report: &mut ReportBuilder,
        cursor: &mut ReportCursor,
    ) -> Result<bool, Error>
    where
        D: DataModel,
    {
        let mut expander = PathExpander::new(dm, PathKind::Event, &self.event_paths);
        expander.resume(cursor.events);

        loop {
            let before = expander.cursor();

            let Some(item) = expander.next() else {
                break;
            };

            let item = item?;
            let wildcard = expander.request().is_some_and(GenericPath::is_wildcard);

            let retrieved = match item {
                Ok(path) => {
                    let floor = self
                        .event_min
                        .max(cursor.event_resume.take().unwrap_or_default());
                    let mut tracker = EventDataTracker::new(floor);

                    let event = EventDetails {
                        endpoint_id: path.endpoint,
                        cluster_id: path.cluster,
                        event_id: path.leaf,
                        fab_idx: self.session.fabric_idx,
                        fab_filter: self.fabric_filtered,
                        wildcard,
                    };

                    let retrieved = report.retrieve_event_data(dm, &event, &mut tracker)?;

                    cursor.last_event = cursor.last_event.max(tracker.last());

                    if retrieved == Retrieved::ChunkFull {
                        cursor.event_resume = Some(tracker.floor());
                    }

                    retrieved
                }
                Err(status) => report.event_status(&EventStatus::from_gp(
                    &status.path.to_gp(),
                    status.status,
                    None,
                ))?,
            };

            if retrieved == Retrieved::ChunkFull {
                cursor.events = before;
                return Ok(true);
            }

            cursor.events = expander.cursor();
        }

        cursor.events = expander.cursor();

        Ok(false)
    }

    /// Persist the cursor of a completed chunk.
    fn advance_cursor(&mut self, cursor: ReportCursor) {
        debug_assert!(
            self.cursor.precedes(&cursor),
            "Report cursor regressed from {:?} to {:?}",
            self.cursor,
            cursor
        );

        if self.cursor.precedes(&cursor) {
            self.cursor = cursor;
        } else {
            warn!("Ignoring report cursor regression");
        }
    }

    /// The final chunk of the report is out: its changes and events count as reported.
    fn complete_report(&mut self) {
        self.watermark = self.watermark.max(self.target_generation);

        if let Some(last_event) = self.cursor.last_event {
            self.event_min = self.event_min.max(last_event.saturating_add(1));
        }

        self.retries = 0;
    }

    fn release_report(&mut self) {
        self.cursor = ReportCursor::new();
        self.chunks = 0;
        self.more_pending = false;
        self.exchange = None;
        self.state = HandlerState::Reportable;
    }

    /// Data version filters only apply to the initial report.
    fn dataver_filter(&self, endpoint: EndptId, cluster: ClusterId) -> Option<DataVersion> {
        if self.report_kind != ReportKind::Priming {
            return None;
        }

        self.dataver_filters
            .iter()
            .find(|filter| filter.path.endpoint == endpoint && filter.path.cluster == cluster)
            .map(|filter| filter.data_ver)
    }

    fn parse_paths<'a, A, E>(
        &mut self,
        attr_requests: Result<Option<TLVArray<'a, A>>, Error>,
        event_requests: Result<Option<TLVArray<'a, E>>, Error>,
        event_min: Result<Option<Option<EventNumber>>, Error>,
        fabric_filtered: Result<bool, Error>,
        dataver_filters: Result<Option<TLVArray<'a, DataVersionFilter>>, Error>,
    ) -> Result<(), Error>
    where
        A: FromTLV<'a> + ToGenericPath,
        E: FromTLV<'a> + ToGenericPath,
    {
        self.attr_paths = collect_paths(attr_requests?)?;
        self.event_paths = collect_paths(event_requests?)?;
        self.event_min = event_min?.flatten().unwrap_or_default();
        self.fabric_filtered = fabric_filtered?;

        self.dataver_filters.clear();

        if let Some(filters) = dataver_filters? {
            for filter in filters {
                if self.dataver_filters.push(filter?).is_err() {
                    warn!("Too many data version filters, ignoring the rest");
                    break;
                }
            }
        }

        Ok(())
    }

    fn expect_state(&self, state: HandlerState) -> Result<(), Error> {
        if self.state != state {
            error!("Handler in state {:?}, expected {:?}", self.state, state);
            Err(ErrorCode::InvalidState)?;
        }

        Ok(())
    }
}

/// A request path type that can be reduced to a `GenericPath`.
pub trait ToGenericPath {
    fn to_generic_path(&self) -> GenericPath;
}

impl ToGenericPath for AttrPath {
    fn to_generic_path(&self) -> GenericPath {
        self.to_gp()
    }
}

impl ToGenericPath for EventPath {
    fn to_generic_path(&self) -> GenericPath {
        self.to_gp()
    }
}

fn collect_paths<'a, T>(paths: Option<TLVArray<'a, T>>) -> Result<PathList, Error>
where
    T: FromTLV<'a> + ToGenericPath,
{
    let mut list = PathList::new();

    for path in paths.into_iter().flatten() {
        list.push(path?.to_generic_path())
            .map_err(|_| ErrorCode::PathsExhausted)?;
    }

    Ok(list)
}
