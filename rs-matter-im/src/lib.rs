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

//! Native Rust implementation of the Matter Interaction Model read/subscribe/report engine.
//!
//! The crate turns read and subscribe requests into chunked `ReportData` messages,
//! keeps per-subscriber dirty state, negotiates reporting intervals and drives
//! long-lived subscriptions over an unreliable transport.
//!
//! The surrounding stack is plugged in through traits:
//! - [`dm::Metadata`] and [`dm::DataHandler`] describe and read the data model;
//! - [`transport::Transport`] sends messages on exchanges;
//! - [`dm::TimerDelegate`] arms the single report timer.
//!
//! Start off exploring by going to the [`dm::Engine`] object.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::uninlined_format_args)]

#[macro_use]
extern crate log;

pub mod dm;
pub mod error;
pub mod im;
pub mod tlv;
pub mod transport;
pub mod utils;
