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

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;

use crate::error::{Error, ErrorCode};
use crate::im::{
    AttrId, ClusterId, EndptId, EventId, GenericPath, IMStatusCode, OpCode, ReadReq,
    StatusResp, SubscribeReq, SubscribeResp, SubscriptionId,
};
use crate::tlv::{get_root_node_struct, FromTLV};
use crate::transport::{ExchangeId, MessageMeta, SessionId, SessionInfo, Transport};
use crate::utils::slab::Slab;
use crate::utils::writebuf::WriteBuf;

use super::{
    AckOutcome, DataModel, DirtySet, HandlerRef, HandlerState, ImConfig, InteractionKind,
    PathExpander, PathKind, ReadHandler, ReportKind, ReportReason, ReportScheduler,
    TimerDelegate, WorkItem, WorkQueue,
};

/// Size of the buffer outgoing messages are assembled in.
pub const MAX_MESSAGE_SIZE: usize = 1280;

/// The Interaction Model engine serving reads and subscriptions.
///
/// The engine owns every `ReadHandler` (in a slab of `N` slots), the report
/// scheduler and the dirty set shared by all subscriptions (`DN` records).
/// It is driven from a single task: incoming messages, transport callbacks,
/// timer expirations and data-model changes all come in through `&mut self`.
/// Changes from other threads go through a `WorkQueue`.
pub struct Engine<D, X, T, const N: usize, const DN: usize>
where
    D: DataModel,
    X: Transport,
    T: TimerDelegate,
{
    config: ImConfig,
    dm: D,
    transport: X,
    handlers: Slab<ReadHandler, N>,
    scheduler: ReportScheduler<T, N>,
    dirty: DirtySet<DN>,
    next_subscription_id: SubscriptionId,
    tx_buf: [u8; MAX_MESSAGE_SIZE],
}

impl<D, X, T, const N: usize, const DN: usize> Engine<D, X, T, N, DN>
where
    D: DataModel,
    X: Transport,
    T: TimerDelegate,
{
    pub const fn new(config: ImConfig, dm: D, transport: X, timer: T) -> Self {
        Self {
            config,
            dm,
            transport,
            handlers: Slab::new(),
            scheduler: ReportScheduler::new(timer),
            dirty: DirtySet::new(),
            next_subscription_id: 1,
            tx_buf: [0; MAX_MESSAGE_SIZE],
        }
    }

    pub fn config(&self) -> &ImConfig {
        &self.config
    }

    pub fn dm(&self) -> &D {
        &self.dm
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn scheduler(&self) -> &ReportScheduler<T, N> {
        &self.scheduler
    }

    pub fn dirty(&self) -> &DirtySet<DN> {
        &self.dirty
    }

    pub fn handler(&self, handle: HandlerRef) -> Option<&ReadHandler> {
        self.handlers.get(handle)
    }

    pub fn handlers(&self) -> impl Iterator<Item = (HandlerRef, &ReadHandler)> + '_ {
        self.handlers.iter()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.handlers
            .iter()
            .filter(|(_, handler)| handler.is_active_subscription())
            .count()
    }

    /// Dispatch an incoming Interaction Model message.
    pub fn on_message(
        &mut self,
        session: SessionInfo,
        exchange: ExchangeId,
        meta: &MessageMeta,
        payload: &[u8],
    ) -> Result<(), Error> {
        match meta.im_opcode()? {
            OpCode::ReadRequest => self.on_read_request(session, exchange, payload),
            OpCode::SubscribeRequest => self.on_subscribe_request(session, exchange, payload),
            OpCode::StatusResponse => self.on_status_response(exchange, payload),
            opcode => {
                warn!("Unsupported opcode {:?} on exchange {}", opcode, exchange);
                Err(ErrorCode::InvalidOpcode.into())
            }
        }
    }

    /// Serve a read request, sending its first report chunk right away.
    pub fn on_read_request(
        &mut self,
        session: SessionInfo,
        exchange: ExchangeId,
        payload: &[u8],
    ) -> Result<(), Error> {
        let mut handler = ReadHandler::new(InteractionKind::Read, session);

        let parsed = get_root_node_struct(payload)
            .map_err(Error::map_invalid_action)
            .and_then(|req| handler.parse_read(&ReadReq::new(req)));

        if let Err(e) = parsed {
            warn!("Rejecting read request on exchange {}: {:?}", exchange, e);
            return self.reject(exchange, e.into());
        }

        let Ok(handle) = self.handlers.insert(handler) else {
            warn!("No free read handler, rejecting read on exchange {}", exchange);
            return self.reject(exchange, IMStatusCode::ResourceExhausted);
        };

        debug!("Read on exchange {}: handler {:?}", exchange, handle);

        self.start_report(handle, ReportKind::Priming, exchange)
    }

    /// Serve a subscribe request, sending the first chunk of its priming report right away.
    pub fn on_subscribe_request(
        &mut self,
        session: SessionInfo,
        exchange: ExchangeId,
        payload: &[u8],
    ) -> Result<(), Error> {
        let mut handler = ReadHandler::new(InteractionKind::Subscribe, session);

        let parsed = get_root_node_struct(payload)
            .map_err(Error::map_invalid_action)
            .and_then(|req| {
                let req = SubscribeReq::new(req);

                handler.parse_subscribe(&req, &self.config)?;

                req.keep_subs().map_err(Error::map_invalid_action)
            });

        let keep_subs = match parsed {
            Ok(keep_subs) => keep_subs,
            Err(e) => {
                warn!("Rejecting subscribe request on exchange {}: {:?}", exchange, e);
                return self.reject(exchange, e.into());
            }
        };

        if !keep_subs {
            self.terminate_matching(|other| {
                other.kind() == InteractionKind::Subscribe
                    && other.session().fabric_idx == session.fabric_idx
                    && other.session().peer_node_id == session.peer_node_id
            });
        }

        let subscription_id = self.next_subscription_id();
        handler.assign_subscription_id(subscription_id);

        let Ok(handle) = self.handlers.insert(handler) else {
            warn!(
                "No free read handler, rejecting subscription on exchange {}",
                exchange
            );
            return self.reject(exchange, IMStatusCode::ResourceExhausted);
        };

        info!(
            "Subscription {} requested on exchange {}: handler {:?}",
            subscription_id, exchange, handle
        );

        self.start_report(handle, ReportKind::Priming, exchange)
    }

    /// Route a `StatusResponse` to the handler with a report in flight on `exchange`.
    pub fn on_status_response(&mut self, exchange: ExchangeId, payload: &[u8]) -> Result<(), Error> {
        let Some(handle) = self.find_by_exchange(exchange) else {
            warn!("Status response on unknown exchange {}", exchange);
            return Err(ErrorCode::NoHandler.into());
        };

        let status = get_root_node_struct(payload).and_then(|resp| StatusResp::from_tlv(&resp));

        match status {
            Ok(resp) if resp.status == IMStatusCode::Success => (),
            Ok(resp) => {
                info!(
                    "Peer ended the interaction on exchange {} with status {:?}",
                    exchange, resp.status
                );
                self.terminate(handle);
                return Ok(());
            }
            Err(e) => {
                warn!("Malformed status response on exchange {}: {:?}", exchange, e);
                self.terminate(handle);
                return Ok(());
            }
        }

        let Some(handler) = self.handlers.get_mut(handle) else {
            return Ok(());
        };

        match handler.on_ack() {
            Ok(AckOutcome::NextChunk) => self.send_chunk(handle),
            Ok(AckOutcome::Primed) => self.complete_subscription(handle),
            Ok(AckOutcome::ReportDone) => {
                self.transport.close_exchange(exchange);

                if self.has_pending_changes(handle) {
                    let now = self.scheduler.now();
                    self.scheduler.on_became_reportable(handle, now);
                }

                Ok(())
            }
            Err(e) => {
                warn!("Unexpected status response on exchange {}", exchange);
                Err(e)
            }
        }
    }

    /// The transport gave up delivering a message on `exchange`.
    pub fn on_exchange_failed(&mut self, exchange: ExchangeId) {
        if let Some(handle) = self.find_by_exchange(exchange) {
            warn!("Exchange {} failed, dropping handler {:?}", exchange, handle);
            self.terminate(handle);
        }
    }

    pub fn on_session_closed(&mut self, session: SessionId) {
        debug!("Session {} closed", session.0);

        self.terminate_matching(|handler| handler.session().id == session);
    }

    /// Drop every interaction of the fabric with index `fab_idx`.
    pub fn shutdown_matching_fabric(&mut self, fab_idx: u8) {
        info!("Dropping all interactions of fabric {}", fab_idx);

        self.terminate_matching(|handler| handler.session().fabric_idx == fab_idx);
    }

    /// The report timer fired: send the reports that are due and drop the
    /// subscriptions that are no longer alive.
    pub fn on_timer(&mut self, now: Instant) {
        for (handle, reason) in self.scheduler.timer_fired(now) {
            let Some(handler) = self.handlers.get(handle) else {
                continue;
            };

            let subscription_id = handler.subscription_id().unwrap_or_default();

            match (reason, handler.state()) {
                (ReportReason::Expired, _) => {
                    warn!("Subscription {} expired", subscription_id);
                    self.terminate(handle);
                }
                (
                    ReportReason::KeepAlive,
                    HandlerState::AwaitingReportAck | HandlerState::GeneratingReports,
                ) => {
                    warn!(
                        "Subscription {} still awaits the ack of its previous report, dropping it",
                        subscription_id
                    );
                    self.terminate(handle);
                }
                (_, HandlerState::Reportable) => {
                    let kind = if reason == ReportReason::Dirty {
                        ReportKind::Dirty
                    } else {
                        ReportKind::KeepAlive
                    };

                    let session = handler.session().id;

                    let result = self
                        .transport
                        .new_exchange(session)
                        .and_then(|exchange| self.start_report(handle, kind, exchange));

                    if let Err(e) = result {
                        self.report_failed(handle, e, false);
                    }
                }
                _ => (),
            }
        }
    }

    /// Record a change of an attribute (or of all attributes of a cluster, for
    /// `None`) and schedule a report for every subscription interested in it.
    pub fn notify_attribute_changed(
        &mut self,
        endpoint: EndptId,
        cluster: ClusterId,
        attr: Option<AttrId>,
    ) {
        let generation = self.dirty.mark(endpoint, cluster, attr);
        let changed = GenericPath::new(Some(endpoint), Some(cluster), attr);

        debug!("Attribute {:?} changed, generation {}", changed, generation);

        self.wake_matching(|handler| handler.is_interested(&changed));
        self.gc_dirty();
    }

    /// Endpoint `endpoint` was added to or removed from the data model.
    ///
    /// Everything on the endpoint counts as changed. Only subscriptions whose
    /// requests, expanded over the current data model, reach the endpoint are
    /// scheduled. A concrete request for a removed endpoint reaches it through
    /// its `UnsupportedEndpoint` status.
    pub fn notify_endpoints_changed(&mut self, endpoint: EndptId) {
        let generation = self.dirty.mark_endpoint(endpoint);

        debug!("Endpoint {} changed, generation {}", endpoint, generation);

        let now = self.scheduler.now();
        let mut expander = PathExpander::new(&self.dm, PathKind::Attribute, &[]);

        for (handle, handler) in self.handlers.iter() {
            if !handler.is_active_subscription() {
                continue;
            }

            expander.reset_to(handler.attr_paths());

            let reaches = expander.any(|item| match item {
                Ok(Ok(path)) => path.endpoint == endpoint,
                Ok(Err(status)) => status.path.endpoint == endpoint,
                Err(_) => true,
            });

            if reaches {
                self.scheduler.on_became_reportable(handle, now);
            }
        }

        self.gc_dirty();
    }

    /// Schedule a report for every subscription interested in a newly emitted event.
    pub fn notify_event(&mut self, endpoint: EndptId, cluster: ClusterId, event: EventId) {
        debug!("Event {}/{:x}/{:x} emitted", endpoint, cluster, event);

        self.wake_matching(|handler| handler.matches_event(endpoint, cluster, event));
    }

    /// Apply all changes queued by other tasks or threads. Returns the number of items processed.
    pub fn process_work<M, const Q: usize>(&mut self, queue: &WorkQueue<M, Q>) -> usize
    where
        M: RawMutex,
    {
        let mut processed = 0;

        while let Some(item) = queue.try_take() {
            match item {
                WorkItem::AttributeChanged {
                    endpoint,
                    cluster,
                    attr,
                } => self.notify_attribute_changed(endpoint, cluster, attr),
                WorkItem::EventEmitted {
                    endpoint,
                    cluster,
                    event,
                } => self.notify_event(endpoint, cluster, event),
            }

            processed += 1;
        }

        processed
    }

    /// Drop every interaction and disarm the report timer.
    pub fn shutdown(&mut self) {
        info!("Shutting down, dropping {} handlers", self.handlers.len());

        self.terminate_matching(|_| true);
        self.scheduler.unregister_all();
    }

    fn start_report(
        &mut self,
        handle: HandlerRef,
        kind: ReportKind,
        exchange: ExchangeId,
    ) -> Result<(), Error> {
        let generation = self.dirty.generation();

        let Some(handler) = self.handlers.get_mut(handle) else {
            self.transport.close_exchange(exchange);
            return Ok(());
        };

        handler.begin_report(kind, generation, exchange);

        self.send_chunk(handle)
    }

    /// Generate the next chunk of the handler's current report and hand it to the transport.
    fn send_chunk(&mut self, handle: HandlerRef) -> Result<(), Error> {
        let budget = self.config.max_chunk_size.min(self.tx_buf.len());

        let Some(handler) = self.handlers.get_mut(handle) else {
            return Ok(());
        };

        let mut wb = WriteBuf::new(&mut self.tx_buf[..budget]);

        let outcome =
            match handler.generate_chunk(&self.dm, &self.dirty, &mut wb, self.config.im_revision) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Generating report for handler {:?} failed: {:?}", handle, e);
                    self.report_failed(handle, e, true);
                    return Ok(());
                }
            };

        let exchange = handler.exchange();

        if handler.is_skippable(&outcome) {
            debug!("Nothing to report for handler {:?}", handle);

            handler.on_report_skipped();

            if let Some(exchange) = exchange {
                self.transport.close_exchange(exchange);
            }

            self.scheduler.on_report_skipped(handle);
            self.gc_dirty();

            return Ok(());
        }

        let Some(exchange) = exchange else {
            self.report_failed(handle, ErrorCode::NoExchange.into(), false);
            return Ok(());
        };

        if let Err(e) = self
            .transport
            .send(exchange, OpCode::ReportData, wb.as_slice())
        {
            warn!("Sending report on exchange {} failed: {:?}", exchange, e);
            self.report_failed(handle, e, false);
            return Ok(());
        }

        handler.on_chunk_sent(&outcome);

        debug!(
            "Report chunk with {} items sent on exchange {}, more: {}",
            outcome.items, exchange, outcome.more
        );

        if !outcome.more {
            if handler.state() == HandlerState::Terminated {
                self.terminate(handle);
            } else if handler.is_active_subscription() {
                let now = self.scheduler.now();
                self.scheduler.on_report_sent(handle, now);
            }

            self.gc_dirty();
        }

        Ok(())
    }

    /// The priming report was acknowledged: answer the subscribe request and
    /// start reporting.
    fn complete_subscription(&mut self, handle: HandlerRef) -> Result<(), Error> {
        let Some(handler) = self.handlers.get_mut(handle) else {
            return Ok(());
        };

        let (Some(subscription_id), Some((min_int, max_int)), Some(exchange)) = (
            handler.subscription_id(),
            handler.intervals(),
            handler.exchange(),
        ) else {
            self.terminate(handle);
            return Err(ErrorCode::InvalidState.into());
        };

        let mut wb = WriteBuf::new(&mut self.tx_buf);

        let sent = SubscribeResp::write(&mut wb, subscription_id, max_int, self.config.im_revision)
            .and_then(|_| {
                self.transport
                    .send(exchange, OpCode::SubscribeResponse, wb.as_slice())
            });

        if let Err(e) = sent {
            warn!(
                "Sending subscribe response for subscription {} failed: {:?}",
                subscription_id, e
            );
            self.terminate(handle);
            return Ok(());
        }

        handler.activate();
        self.transport.close_exchange(exchange);

        let now = self.scheduler.now();

        if let Err(e) = self.scheduler.register(handle, min_int, max_int, now) {
            error!("Cannot schedule subscription {}: {:?}", subscription_id, e);
            self.terminate(handle);
            return Ok(());
        }

        self.scheduler.on_subscription_established(handle, now);

        if self.has_pending_changes(handle) {
            self.scheduler.on_became_reportable(handle, now);
        }

        info!(
            "Subscription {} established, intervals {}..{}s",
            subscription_id, min_int, max_int
        );

        Ok(())
    }

    /// A report could not be generated or sent.
    ///
    /// Live subscriptions retry after their min interval, up to
    /// `ImConfig::max_report_retries` times. Reads and priming reports are
    /// dropped; `local` errors are reported to the peer first.
    fn report_failed(&mut self, handle: HandlerRef, e: Error, local: bool) {
        let Some(handler) = self.handlers.get_mut(handle) else {
            return;
        };

        if handler.is_active_subscription() {
            let subscription_id = handler.subscription_id().unwrap_or_default();
            let exchange = handler.take_exchange();
            let retries = handler.on_report_aborted();

            if let Some(exchange) = exchange {
                self.transport.close_exchange(exchange);
            }

            if retries > self.config.max_report_retries {
                warn!(
                    "Subscription {} failed {} reports in a row, dropping it: {:?}",
                    subscription_id, retries, e
                );
                self.terminate(handle);
            } else {
                debug!(
                    "Report of subscription {} failed ({}), retrying",
                    subscription_id, retries
                );

                let now = self.scheduler.now();
                self.scheduler.on_report_failed(handle, now);
            }
        } else {
            if local {
                if let Some(exchange) = handler.exchange() {
                    if let Err(e) = self.send_status(exchange, IMStatusCode::Failure) {
                        warn!("Sending failure status on exchange {} failed: {:?}", exchange, e);
                    }
                }
            }

            self.terminate(handle);
        }
    }

    /// Release a handler and everything referring to it.
    fn terminate(&mut self, handle: HandlerRef) {
        let Some(mut handler) = self.handlers.remove(handle) else {
            return;
        };

        debug!(
            "Handler {:?} ({:?}, subscription {}) terminated in state {:?}",
            handle,
            handler.kind(),
            handler.subscription_id().unwrap_or_default(),
            handler.state()
        );

        if let Some(exchange) = handler.take_exchange() {
            self.transport.close_exchange(exchange);
        }

        handler.terminate();

        self.scheduler.cancel(handle);
        self.gc_dirty();
    }

    fn terminate_matching<F>(&mut self, f: F)
    where
        F: Fn(&ReadHandler) -> bool,
    {
        let mut matching = heapless::Vec::<HandlerRef, N>::new();

        for (handle, handler) in self.handlers.iter() {
            if f(handler) {
                // Cannot overflow: at most one entry per slot
                let _ = matching.push(handle);
            }
        }

        for handle in matching {
            self.terminate(handle);
        }
    }

    fn wake_matching<F>(&mut self, f: F)
    where
        F: Fn(&ReadHandler) -> bool,
    {
        let now = self.scheduler.now();

        for (handle, handler) in self.handlers.iter() {
            if handler.is_active_subscription() && f(handler) {
                self.scheduler.on_became_reportable(handle, now);
            }
        }
    }

    /// Return `true` if the subscription has changes it has not reported yet.
    fn has_pending_changes(&self, handle: HandlerRef) -> bool {
        let Some(handler) = self.handlers.get(handle) else {
            return false;
        };

        self.scheduler.is_dirty(handle)
            || self.dirty.iter().any(|record| {
                record.generation > handler.watermark() && handler.is_interested(&record.path)
            })
    }

    /// Drop the dirty records every subscription has reported.
    fn gc_dirty(&mut self) {
        let watermark = self
            .handlers
            .iter()
            .filter(|(_, handler)| handler.kind() == InteractionKind::Subscribe)
            .map(|(_, handler)| handler.watermark())
            .min()
            .unwrap_or(self.dirty.generation());

        self.dirty.gc(watermark);
    }

    fn find_by_exchange(&self, exchange: ExchangeId) -> Option<HandlerRef> {
        self.handlers
            .iter()
            .find(|(_, handler)| handler.exchange() == Some(exchange))
            .map(|(handle, _)| handle)
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = self.next_subscription_id;

        self.next_subscription_id = self.next_subscription_id.wrapping_add(1).max(1);

        id
    }

    fn send_status(&mut self, exchange: ExchangeId, status: IMStatusCode) -> Result<(), Error> {
        let mut wb = WriteBuf::new(&mut self.tx_buf);

        StatusResp::write(&mut wb, status, self.config.im_revision)?;

        self.transport
            .send(exchange, OpCode::StatusResponse, wb.as_slice())
    }

    /// Answer a request that does not get a handler with a status and close its exchange.
    fn reject(&mut self, exchange: ExchangeId, status: IMStatusCode) -> Result<(), Error> {
        let result = self.send_status(exchange, status);

        self.transport.close_exchange(exchange);

        result
    }
}
