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

#![allow(dead_code)]

use core::cell::{Cell, RefCell};

use embassy_time::Duration;

use rs_matter_im::dm::{
    Access, AttrDataEncoder, AttrDetails, Attribute, Cluster, DataHandler, Dataver, Endpoint,
    Engine, EventDataEncoder, EventDetails, GlobalElements, ImConfig, ManualTimer, Node,
    TimerDelegate,
};
use rs_matter_im::error::{Error, ErrorCode};
use rs_matter_im::im::{
    AttrPath, AttrResp, ClusterPath, DataVersionFilter, EventDataTimestamp, EventNumber,
    EventPath, EventResp, GenericPath, IMStatusCode, OpCode, ReportDataResp, StatusResp,
    SubscribeResp, IM_REVISION,
};
use rs_matter_im::tlv::{get_root_node_struct, FromTLV, TLVTag, TLVWrite, ToTLV};
use rs_matter_im::transport::{ExchangeId, SessionId, SessionInfo, Transport};
use rs_matter_im::utils::writebuf::WriteBuf;

pub fn init_env_logger() {
    #[cfg(feature = "std")]
    {
        let _ = env_logger::try_init_from_env(
            env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
        );
    }
}

pub const ON_OFF: u32 = 6;
pub const ATTR_ON_OFF: u32 = 0;
pub const ATTR_REVISION: u32 = GlobalElements::ClusterRevision as u32;
pub const EVENT_STATE_CHANGE: u32 = 0;

const ON_OFF_ATTRS: &[Attribute] = &[
    Attribute::new(ATTR_ON_OFF, Access::RV),
    Attribute::new(ATTR_REVISION, Access::RV),
];

const ON_OFF_VALUE_ONLY: &[Attribute] = &[Attribute::new(ATTR_ON_OFF, Access::RV)];

/// Endpoint 1 carries an On/Off cluster with its revision and a state-change
/// event, endpoint 2 a bare On/Off cluster.
pub static NODE: Node<'static> = Node::new(
    0,
    &[
        Endpoint::new(1, &[Cluster::new(ON_OFF, 4, ON_OFF_ATTRS, &[EVENT_STATE_CHANGE])]),
        Endpoint::new(2, &[Cluster::new(ON_OFF, 4, ON_OFF_VALUE_ONLY, &[])]),
    ],
);

/// Serves the On/Off state of both endpoints and the state-change events of endpoint 1.
pub struct OnOffHandler {
    on_off: [Cell<bool>; 2],
    dataver: [Dataver; 2],
    events: RefCell<Vec<(EventNumber, bool)>>,
    next_event: Cell<EventNumber>,
}

impl OnOffHandler {
    pub const fn new() -> Self {
        Self {
            on_off: [Cell::new(false), Cell::new(false)],
            dataver: [Dataver::new(1), Dataver::new(1)],
            events: RefCell::new(Vec::new()),
            next_event: Cell::new(1),
        }
    }

    pub fn set(&self, endpoint: u16, on: bool) {
        let index = endpoint as usize - 1;

        self.on_off[index].set(on);
        self.dataver[index].changed();
    }

    pub fn get(&self, endpoint: u16) -> bool {
        self.on_off[endpoint as usize - 1].get()
    }

    pub fn dataver(&self, endpoint: u16) -> u32 {
        self.dataver[endpoint as usize - 1].get()
    }

    /// Record a state-change event on endpoint 1, returning its number.
    pub fn emit(&self, on: bool) -> EventNumber {
        let number = self.next_event.get();

        self.next_event.set(number + 1);
        self.events.borrow_mut().push((number, on));

        number
    }
}

impl DataHandler for OnOffHandler {
    fn read(&self, attr: &AttrDetails, encoder: AttrDataEncoder) -> Result<(), Error> {
        if !(1..=2).contains(&attr.endpoint_id) || attr.cluster_id != ON_OFF {
            Err(ErrorCode::ClusterNotFound)?;
        }

        let Some(writer) = encoder.with_dataver(self.dataver(attr.endpoint_id))? else {
            return Ok(());
        };

        match attr.attr_id {
            ATTR_ON_OFF => writer.set(self.get(attr.endpoint_id)),
            ATTR_REVISION => writer.set(4_u16),
            _ => Err(ErrorCode::AttributeNotFound.into()),
        }
    }

    fn read_events(&self, _event: &EventDetails, mut encoder: EventDataEncoder) -> Result<(), Error> {
        for (number, on) in self.events.borrow().iter() {
            encoder.push(
                *number,
                1,
                EventDataTimestamp::SystemTimestamp(*number * 1000),
                *on,
            )?;
        }

        Ok(())
    }
}

/// A message handed to the transport.
#[derive(Debug, Clone)]
pub struct Sent {
    pub exchange: ExchangeId,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

/// Records everything the engine sends; exchanges opened by the engine get
/// indices from 8 upwards.
#[derive(Default)]
pub struct RecordingTransport {
    sent: RefCell<Vec<Sent>>,
    closed: RefCell<Vec<ExchangeId>>,
    next_exchange: Cell<usize>,
    fail_sends: Cell<bool>,
}

impl RecordingTransport {
    pub fn take_sent(&self) -> Vec<Sent> {
        self.sent.take()
    }

    pub fn take_closed(&self) -> Vec<ExchangeId> {
        self.closed.take()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.set(fail);
    }
}

impl Transport for &RecordingTransport {
    fn send(&mut self, exchange: ExchangeId, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        if self.fail_sends.get() {
            Err(ErrorCode::SendFailed)?;
        }

        self.sent.borrow_mut().push(Sent {
            exchange,
            opcode,
            payload: payload.to_vec(),
        });

        Ok(())
    }

    fn new_exchange(&mut self, session: SessionId) -> Result<ExchangeId, Error> {
        let index = self.next_exchange.get();

        self.next_exchange.set((index + 1) % 8);

        ExchangeId::new(session, 8 + index)
    }

    fn close_exchange(&mut self, exchange: ExchangeId) {
        self.closed.borrow_mut().push(exchange);
    }
}

pub type TestEngine<'a, const N: usize> =
    Engine<(&'static Node<'static>, &'a OnOffHandler), &'a RecordingTransport, &'a ManualTimer, N, 16>;

pub fn engine<'a, const N: usize>(
    config: ImConfig,
    handler: &'a OnOffHandler,
    transport: &'a RecordingTransport,
    timer: &'a ManualTimer,
) -> TestEngine<'a, N> {
    Engine::new(config, (&NODE, handler), transport, timer)
}

/// Advance the clock in steps of `step`, firing the engine timer whenever it is due.
pub fn run_for<const N: usize>(
    engine: &mut TestEngine<'_, N>,
    timer: &ManualTimer,
    total: Duration,
    step: Duration,
) {
    let end = timer.now() + total;

    while timer.now() < end {
        timer.advance(step);

        if timer.is_due() {
            engine.on_timer(timer.now());
        }
    }
}

pub fn session(fab_idx: u8, peer_node_id: u64) -> SessionInfo {
    SessionInfo::new(SessionId(fab_idx as u32 * 0x100 + peer_node_id as u32), fab_idx, peer_node_id)
}

pub fn exchange(session: &SessionInfo, index: usize) -> ExchangeId {
    ExchangeId::new(session.id, index).unwrap()
}

fn write_paths<P: ToTLV>(wb: &mut WriteBuf, tag: u8, paths: &[P]) {
    if paths.is_empty() {
        return;
    }

    wb.start_array(&TLVTag::Context(tag)).unwrap();
    for path in paths {
        path.to_tlv(&TLVTag::Anonymous, &mut *wb).unwrap();
    }
    wb.end_container().unwrap();
}

fn dataver_filters(filters: &[(u16, u32, u32)]) -> Vec<DataVersionFilter> {
    filters
        .iter()
        .map(|(endpoint, cluster, data_ver)| DataVersionFilter {
            path: ClusterPath {
                node: None,
                endpoint: *endpoint,
                cluster: *cluster,
            },
            data_ver: *data_ver,
        })
        .collect()
}

fn attr_paths(paths: &[GenericPath]) -> Vec<AttrPath> {
    paths.iter().map(AttrPath::from_gp).collect()
}

fn event_paths(paths: &[GenericPath]) -> Vec<EventPath> {
    paths.iter().map(EventPath::from_gp).collect()
}

pub fn read_req(
    attrs: &[GenericPath],
    events: &[GenericPath],
    filters: &[(u16, u32, u32)],
) -> Vec<u8> {
    let mut buf = [0; 512];
    let mut wb = WriteBuf::new(&mut buf);

    wb.start_struct(&TLVTag::Anonymous).unwrap();
    write_paths(&mut wb, 0, &attr_paths(attrs));
    write_paths(&mut wb, 1, &event_paths(events));
    wb.bool(&TLVTag::Context(3), true).unwrap();
    write_paths(&mut wb, 4, &dataver_filters(filters));
    wb.u8(&TLVTag::Context(0xFF), IM_REVISION).unwrap();
    wb.end_container().unwrap();

    wb.as_slice().to_vec()
}

pub fn subscribe_req(
    keep_subs: bool,
    min_int_floor: u16,
    max_int_ceil: u16,
    attrs: &[GenericPath],
    events: &[GenericPath],
) -> Vec<u8> {
    let mut buf = [0; 512];
    let mut wb = WriteBuf::new(&mut buf);

    wb.start_struct(&TLVTag::Anonymous).unwrap();
    wb.bool(&TLVTag::Context(0), keep_subs).unwrap();
    wb.u16(&TLVTag::Context(1), min_int_floor).unwrap();
    wb.u16(&TLVTag::Context(2), max_int_ceil).unwrap();
    write_paths(&mut wb, 3, &attr_paths(attrs));
    write_paths(&mut wb, 4, &event_paths(events));
    wb.bool(&TLVTag::Context(7), true).unwrap();
    wb.u8(&TLVTag::Context(0xFF), IM_REVISION).unwrap();
    wb.end_container().unwrap();

    wb.as_slice().to_vec()
}

pub fn status_resp(status: IMStatusCode) -> Vec<u8> {
    let mut buf = [0; 16];
    let mut wb = WriteBuf::new(&mut buf);

    StatusResp::write(&mut wb, status, IM_REVISION).unwrap();

    wb.as_slice().to_vec()
}

pub fn status_of(payload: &[u8]) -> IMStatusCode {
    StatusResp::from_tlv(&get_root_node_struct(payload).unwrap())
        .unwrap()
        .status
}

pub fn subscribe_resp_of(payload: &[u8]) -> SubscribeResp {
    SubscribeResp::from_tlv(&get_root_node_struct(payload).unwrap()).unwrap()
}

/// One attribute report item: a value (`None` for non-boolean values) or a status.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Data(GenericPath, Option<bool>),
    Status(GenericPath, IMStatusCode),
}

impl Item {
    pub fn path(&self) -> GenericPath {
        match self {
            Self::Data(path, _) | Self::Status(path, _) => *path,
        }
    }
}

/// The decoded content of a `ReportDataMessage`.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub subscription_id: Option<u32>,
    pub attrs: Vec<Item>,
    pub events: Vec<(EventNumber, bool)>,
    pub more_chunks: bool,
    pub suppress_response: bool,
}

pub fn report_of(payload: &[u8]) -> Report {
    let resp = ReportDataResp::from_tlv(&get_root_node_struct(payload).unwrap()).unwrap();

    let attrs = resp
        .attr_reports
        .map(|reports| {
            reports
                .iter()
                .map(|report| match report.unwrap() {
                    AttrResp::Data(data) => Item::Data(data.path.to_gp(), data.data.bool().ok()),
                    AttrResp::Status(status) => {
                        Item::Status(status.path.to_gp(), status.status.status)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let events = resp
        .event_reports
        .map(|reports| {
            reports
                .iter()
                .filter_map(|report| match report.unwrap() {
                    EventResp::Data(data) => Some((data.event_number, data.data.bool().unwrap())),
                    EventResp::Status(_) => None,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Report {
        subscription_id: resp.subscription_id,
        attrs,
        events,
        more_chunks: resp.more_chunks.unwrap_or(false),
        suppress_response: resp.suppress_response.unwrap_or(false),
    }
}

/// Only the `ReportData` messages among `sent`.
pub fn reports(sent: &[Sent]) -> Vec<(ExchangeId, Report)> {
    sent.iter()
        .filter(|sent| sent.opcode == OpCode::ReportData)
        .map(|sent| (sent.exchange, report_of(&sent.payload)))
        .collect()
}

/// Subscribe and acknowledge the priming report, returning the subscription id.
pub fn establish<const N: usize>(
    engine: &mut TestEngine<'_, N>,
    transport: &RecordingTransport,
    session: &SessionInfo,
    exchange_index: usize,
    req: &[u8],
) -> u32 {
    let exchange = exchange(session, exchange_index);

    engine.on_subscribe_request(*session, exchange, req).unwrap();

    loop {
        let sent = transport.take_sent();
        let last = sent.last().unwrap();

        assert_eq!(last.opcode, OpCode::ReportData);
        let more = report_of(&last.payload).more_chunks;

        engine
            .on_status_response(exchange, &status_resp(IMStatusCode::Success))
            .unwrap();

        if !more {
            break;
        }
    }

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, OpCode::SubscribeResponse);

    transport.take_closed();

    subscribe_resp_of(&sent[0].payload).subs_id
}

/// Acknowledge every report in `sent` that expects an answer.
pub fn ack_all<const N: usize>(engine: &mut TestEngine<'_, N>, sent: &[Sent]) {
    for sent in sent.iter().filter(|sent| sent.opcode == OpCode::ReportData) {
        if !report_of(&sent.payload).suppress_response {
            engine
                .on_status_response(sent.exchange, &status_resp(IMStatusCode::Success))
                .unwrap();
        }
    }
}

/// The path of an attribute of the On/Off cluster.
pub const fn on_off(endpoint: u16, attr: u32) -> GenericPath {
    GenericPath::new(Some(endpoint), Some(ON_OFF), Some(attr))
}
