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

use embassy_time::{Duration, Instant};

use crate::error::{Error, ErrorCode};
use crate::utils::slab::SlabRef;

use super::TimerDelegate;

/// A weak reference to a `ReadHandler` in the engine's handler slab.
pub type HandlerRef = SlabRef;

/// Why a subscription is due for a report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportReason {
    /// Subscribed data changed and the min interval has elapsed
    Dirty,
    /// Nothing changed within the max interval
    KeepAlive,
    /// No report got through for two max intervals; the subscription is dead
    Expired,
}

#[derive(Debug)]
struct ScheduledReport {
    handler: HandlerRef,
    min_int: Duration,
    max_int: Duration,
    last_report: Instant,
    dirty: bool,
    next_due: Instant,
}

impl ScheduledReport {
    fn expires_at(&self) -> Instant {
        self.last_report + self.max_int * 2
    }

    fn wakeup(&self) -> Instant {
        self.next_due.min(self.expires_at())
    }
}

/// Decides when each subscription reports, driving a single delegate timer
/// armed at the earliest deadline of all subscriptions.
///
/// Between two successful reports of a subscription at least `min_int`
/// passes, and (absent failures) at most `max_int`.
pub struct ReportScheduler<T, const N: usize> {
    timer: T,
    entries: heapless::Vec<ScheduledReport, N>,
}

impl<T, const N: usize> ReportScheduler<T, N>
where
    T: TimerDelegate,
{
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            entries: heapless::Vec::new(),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn now(&self) -> Instant {
        self.timer.now()
    }

    /// Start tracking a subscription. Registering a handler twice updates its intervals.
    pub fn register(
        &mut self,
        handler: HandlerRef,
        min_int_secs: u16,
        max_int_secs: u16,
        now: Instant,
    ) -> Result<(), Error> {
        debug_assert!(min_int_secs <= max_int_secs);

        let min_int = Duration::from_secs(min_int_secs.min(max_int_secs) as _);
        let max_int = Duration::from_secs(max_int_secs as _);

        let entry = ScheduledReport {
            handler,
            min_int,
            max_int,
            last_report: now,
            dirty: false,
            next_due: now + max_int,
        };

        if let Some(existing) = self.entry_mut(handler) {
            *existing = entry;
        } else {
            self.entries
                .push(entry)
                .map_err(|_| ErrorCode::ResourceExhausted)?;
        }

        self.rearm();

        Ok(())
    }

    /// The priming report got through: the first keep-alive is due one max interval from now.
    pub fn on_subscription_established(&mut self, handler: HandlerRef, now: Instant) {
        if let Some(entry) = self.entry_mut(handler) {
            entry.last_report = now;
            entry.dirty = false;
            entry.next_due = now + entry.max_int;
        }

        self.rearm();
    }

    /// Subscribed data changed: report as soon as the min interval allows.
    pub fn on_became_reportable(&mut self, handler: HandlerRef, now: Instant) {
        if let Some(entry) = self.entry_mut(handler) {
            let due = (entry.last_report + entry.min_int).max(now);

            entry.dirty = true;
            entry.next_due = entry.next_due.min(due);
        }

        self.rearm();
    }

    pub fn on_report_sent(&mut self, handler: HandlerRef, now: Instant) {
        if let Some(entry) = self.entry_mut(handler) {
            entry.last_report = now;
            entry.dirty = false;
            entry.next_due = now + entry.max_int;
        }

        self.rearm();
    }

    /// The report did not go out; retry after one min interval.
    pub fn on_report_failed(&mut self, handler: HandlerRef, now: Instant) {
        if let Some(entry) = self.entry_mut(handler) {
            entry.next_due = now + entry.min_int;
        }

        self.rearm();
    }

    /// The change turned out to be invisible to the subscription; nothing was sent.
    pub fn on_report_skipped(&mut self, handler: HandlerRef) {
        if let Some(entry) = self.entry_mut(handler) {
            entry.dirty = false;
            entry.next_due = entry.last_report + entry.max_int;
        }

        self.rearm();
    }

    /// Collect every subscription due at `now`, in registration order.
    ///
    /// Each returned subscription gets a provisional deadline one max interval
    /// away, which the caller replaces by reporting the outcome of the report.
    pub fn timer_fired(&mut self, now: Instant) -> heapless::Vec<(HandlerRef, ReportReason), N> {
        let mut due = heapless::Vec::new();

        for entry in self.entries.iter_mut() {
            let reason = if entry.expires_at() <= now {
                ReportReason::Expired
            } else if entry.next_due <= now {
                if entry.dirty {
                    ReportReason::Dirty
                } else {
                    ReportReason::KeepAlive
                }
            } else {
                continue;
            };

            entry.next_due = now + entry.max_int;

            // Cannot overflow: there is at most one item per entry
            let _ = due.push((entry.handler, reason));
        }

        self.rearm();

        due
    }

    pub fn cancel(&mut self, handler: HandlerRef) {
        self.entries.retain(|entry| entry.handler != handler);

        self.rearm();
    }

    pub fn unregister_all(&mut self) {
        self.entries.clear();
        self.timer.cancel_timer();
    }

    pub fn is_expired(&self, handler: HandlerRef, now: Instant) -> bool {
        self.entry(handler)
            .is_some_and(|entry| entry.expires_at() <= now)
    }

    pub fn is_registered(&self, handler: HandlerRef) -> bool {
        self.entry(handler).is_some()
    }

    pub fn is_dirty(&self, handler: HandlerRef) -> bool {
        self.entry(handler).is_some_and(|entry| entry.dirty)
    }

    pub fn next_due(&self, handler: HandlerRef) -> Option<Instant> {
        self.entry(handler).map(|entry| entry.next_due)
    }

    pub fn last_report(&self, handler: HandlerRef) -> Option<Instant> {
        self.entry(handler).map(|entry| entry.last_report)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, handler: HandlerRef) -> Option<&ScheduledReport> {
        self.entries.iter().find(|entry| entry.handler == handler)
    }

    fn entry_mut(&mut self, handler: HandlerRef) -> Option<&mut ScheduledReport> {
        self.entries.iter_mut().find(|entry| entry.handler == handler)
    }

    fn rearm(&self) {
        match self.entries.iter().map(ScheduledReport::wakeup).min() {
            Some(deadline) => self.timer.start_timer(deadline),
            None => self.timer.cancel_timer(),
        }
    }
}
