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
use crate::utils::writebuf::WriteBuf;

use super::{TLVControl, TLVTag, TLVTagType, TLVValueType};

/// An append-only sink for a TLV stream.
///
/// Implementors provide `write` for single bytes plus a tail position that can be
/// rewound to, which is what lets report generation drop a partially written item
/// when the chunk runs out of space.
///
/// Integer writers pick the narrowest encoding that fits the value. Attribute
/// values which must keep their declared width go through `raw_value` instead
/// (see the primitive `ToTLV` impls).
pub trait TLVWrite {
    type Position;

    fn i8(&mut self, tag: &TLVTag, data: i8) -> Result<(), Error> {
        self.raw_value(tag, TLVValueType::S8, &data.to_le_bytes())
    }

    fn u8(&mut self, tag: &TLVTag, data: u8) -> Result<(), Error> {
        self.raw_value(tag, TLVValueType::U8, &data.to_le_bytes())
    }

    fn i16(&mut self, tag: &TLVTag, data: i16) -> Result<(), Error> {
        match i8::try_from(data) {
            Ok(data) => self.i8(tag, data),
            Err(_) => self.raw_value(tag, TLVValueType::S16, &data.to_le_bytes()),
        }
    }

    fn u16(&mut self, tag: &TLVTag, data: u16) -> Result<(), Error> {
        match u8::try_from(data) {
            Ok(data) => self.u8(tag, data),
            Err(_) => self.raw_value(tag, TLVValueType::U16, &data.to_le_bytes()),
        }
    }

    fn i32(&mut self, tag: &TLVTag, data: i32) -> Result<(), Error> {
        match i16::try_from(data) {
            Ok(data) => self.i16(tag, data),
            Err(_) => self.raw_value(tag, TLVValueType::S32, &data.to_le_bytes()),
        }
    }

    fn u32(&mut self, tag: &TLVTag, data: u32) -> Result<(), Error> {
        match u16::try_from(data) {
            Ok(data) => self.u16(tag, data),
            Err(_) => self.raw_value(tag, TLVValueType::U32, &data.to_le_bytes()),
        }
    }

    fn i64(&mut self, tag: &TLVTag, data: i64) -> Result<(), Error> {
        match i32::try_from(data) {
            Ok(data) => self.i32(tag, data),
            Err(_) => self.raw_value(tag, TLVValueType::S64, &data.to_le_bytes()),
        }
    }

    fn u64(&mut self, tag: &TLVTag, data: u64) -> Result<(), Error> {
        match u32::try_from(data) {
            Ok(data) => self.u32(tag, data),
            Err(_) => self.raw_value(tag, TLVValueType::U64, &data.to_le_bytes()),
        }
    }

    fn f32(&mut self, tag: &TLVTag, data: f32) -> Result<(), Error> {
        self.raw_value(tag, TLVValueType::F32, &data.to_le_bytes())
    }

    fn f64(&mut self, tag: &TLVTag, data: f64) -> Result<(), Error> {
        self.raw_value(tag, TLVValueType::F64, &data.to_le_bytes())
    }

    /// Write an octet string with the shortest length prefix that fits.
    fn str(&mut self, tag: &TLVTag, data: &[u8]) -> Result<(), Error> {
        let value_type = match data.len() {
            len if len <= u8::MAX as usize => TLVValueType::Str8l,
            len if len <= u16::MAX as usize => TLVValueType::Str16l,
            len if len <= u32::MAX as usize => TLVValueType::Str32l,
            _ => TLVValueType::Str64l,
        };

        self.len_prefixed(tag, value_type, data)
    }

    /// Write a UTF-8 string with the shortest length prefix that fits.
    fn utf8(&mut self, tag: &TLVTag, data: &str) -> Result<(), Error> {
        let value_type = match data.len() {
            len if len <= u8::MAX as usize => TLVValueType::Utf8l,
            len if len <= u16::MAX as usize => TLVValueType::Utf16l,
            len if len <= u32::MAX as usize => TLVValueType::Utf32l,
            _ => TLVValueType::Utf64l,
        };

        self.len_prefixed(tag, value_type, data.as_bytes())
    }

    #[doc(hidden)]
    fn len_prefixed(
        &mut self,
        tag: &TLVTag,
        value_type: TLVValueType,
        data: &[u8],
    ) -> Result<(), Error> {
        let len = data.len();

        match value_type.variable_size_len() {
            1 => self.raw_value(tag, value_type, &(len as u8).to_le_bytes())?,
            2 => self.raw_value(tag, value_type, &(len as u16).to_le_bytes())?,
            4 => self.raw_value(tag, value_type, &(len as u32).to_le_bytes())?,
            8 => self.raw_value(tag, value_type, &(len as u64).to_le_bytes())?,
            _ => Err(ErrorCode::TLVTypeMismatch)?,
        }

        self.write_raw_data(data.iter().copied())
    }

    fn start_struct(&mut self, tag: &TLVTag) -> Result<(), Error> {
        self.start_container(tag, TLVValueType::Struct)
    }

    fn start_array(&mut self, tag: &TLVTag) -> Result<(), Error> {
        self.start_container(tag, TLVValueType::Array)
    }

    fn start_list(&mut self, tag: &TLVTag) -> Result<(), Error> {
        self.start_container(tag, TLVValueType::List)
    }

    /// Open a container. Every call must be balanced by `end_container`.
    fn start_container(&mut self, tag: &TLVTag, container_type: TLVValueType) -> Result<(), Error> {
        if !container_type.is_container_start() {
            Err(ErrorCode::TLVTypeMismatch)?;
        }

        self.raw_value(tag, container_type, &[])
    }

    fn end_container(&mut self) -> Result<(), Error> {
        self.write(TLVControl::new(TLVTagType::Anonymous, TLVValueType::EndCnt).as_raw())
    }

    fn null(&mut self, tag: &TLVTag) -> Result<(), Error> {
        self.raw_value(tag, TLVValueType::Null, &[])
    }

    fn bool(&mut self, tag: &TLVTag, val: bool) -> Result<(), Error> {
        let value_type = if val {
            TLVValueType::True
        } else {
            TLVValueType::False
        };

        self.raw_value(tag, value_type, &[])
    }

    /// Write the control byte, the tag and an already-encoded value payload.
    fn raw_value(
        &mut self,
        tag: &TLVTag,
        value_type: TLVValueType,
        value_payload: &[u8],
    ) -> Result<(), Error> {
        self.write(TLVControl::new(tag.tag_type(), value_type).as_raw())?;

        match tag {
            TLVTag::Anonymous => (),
            TLVTag::Context(v) => self.write(*v)?,
            TLVTag::CommonPrf16(v) | TLVTag::ImplPrf16(v) => self.write_raw_data(v.to_le_bytes())?,
            TLVTag::CommonPrf32(v) | TLVTag::ImplPrf32(v) => self.write_raw_data(v.to_le_bytes())?,
            TLVTag::FullQual48 {
                vendor_id,
                profile,
                tag,
            } => {
                self.write_raw_data(vendor_id.to_le_bytes())?;
                self.write_raw_data(profile.to_le_bytes())?;
                self.write_raw_data(tag.to_le_bytes())?;
            }
            TLVTag::FullQual64 {
                vendor_id,
                profile,
                tag,
            } => {
                self.write_raw_data(vendor_id.to_le_bytes())?;
                self.write_raw_data(profile.to_le_bytes())?;
                self.write_raw_data(tag.to_le_bytes())?;
            }
        }

        self.write_raw_data(value_payload.iter().copied())
    }

    fn write_raw_data<I>(&mut self, bytes: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = u8>,
    {
        bytes.into_iter().try_for_each(|byte| self.write(byte))
    }

    fn write(&mut self, byte: u8) -> Result<(), Error>;

    fn get_tail(&self) -> Self::Position;

    fn rewind_to(&mut self, pos: Self::Position);
}

impl<T> TLVWrite for &mut T
where
    T: TLVWrite,
{
    type Position = T::Position;

    fn write(&mut self, byte: u8) -> Result<(), Error> {
        (**self).write(byte)
    }

    fn get_tail(&self) -> Self::Position {
        (**self).get_tail()
    }

    fn rewind_to(&mut self, pos: Self::Position) {
        (**self).rewind_to(pos)
    }
}

impl TLVWrite for WriteBuf<'_> {
    type Position = usize;

    fn write(&mut self, byte: u8) -> Result<(), Error> {
        self.append(&[byte])
    }

    fn get_tail(&self) -> Self::Position {
        WriteBuf::get_tail(self)
    }

    fn rewind_to(&mut self, pos: Self::Position) {
        self.rewind_tail_to(pos)
    }
}

/// Counts the bytes a value would take once serialized.
impl TLVWrite for usize {
    type Position = usize;

    fn write(&mut self, _byte: u8) -> Result<(), Error> {
        *self += 1;

        Ok(())
    }

    fn get_tail(&self) -> Self::Position {
        *self
    }

    fn rewind_to(&mut self, pos: Self::Position) {
        *self = pos;
    }
}
