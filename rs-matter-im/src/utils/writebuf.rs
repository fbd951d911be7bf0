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

/// A bounded, append-only window over a caller-provided byte buffer.
///
/// `shrink` hides bytes at the end of the buffer so that closing TLV containers
/// can always be written later with `expand`, regardless of how much content
/// was squeezed into a report chunk.
#[derive(Debug)]
pub struct WriteBuf<'a> {
    buf: &'a mut [u8],
    buf_size: usize,
    end: usize,
}

impl<'a> WriteBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        let buf_size = buf.len();

        Self {
            buf,
            buf_size,
            end: 0,
        }
    }

    pub fn get_tail(&self) -> usize {
        self.end
    }

    pub fn rewind_tail_to(&mut self, new_end: usize) {
        self.end = new_end.min(self.end);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.end]
    }

    /// Bytes still writable before the (possibly shrunk) end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf_size - self.end
    }

    pub fn reset(&mut self) {
        self.buf_size = self.buf.len();
        self.end = 0;
    }

    pub fn shrink(&mut self, with: usize) -> Result<(), Error> {
        if self.end + with <= self.buf_size {
            self.buf_size -= with;
            Ok(())
        } else {
            Err(ErrorCode::NoSpace.into())
        }
    }

    pub fn expand(&mut self, by: usize) -> Result<(), Error> {
        if self.buf.len() - self.buf_size >= by {
            self.buf_size += by;
            Ok(())
        } else {
            Err(ErrorCode::NoSpace.into())
        }
    }

    pub fn append(&mut self, src: &[u8]) -> Result<(), Error> {
        let end = self.end + src.len();

        if end > self.buf_size {
            Err(ErrorCode::NoSpace)?;
        }

        self.buf[self.end..end].copy_from_slice(src);
        self.end = end;

        Ok(())
    }

    pub fn le_u8(&mut self, data: u8) -> Result<(), Error> {
        self.append(&[data])
    }

    pub fn le_u16(&mut self, data: u16) -> Result<(), Error> {
        self.append(&data.to_le_bytes())
    }

    pub fn le_u32(&mut self, data: u32) -> Result<(), Error> {
        self.append(&data.to_le_bytes())
    }
}
