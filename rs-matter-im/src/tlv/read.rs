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

use core::cmp::Ordering;
use core::fmt;

use crate::error::{Error, ErrorCode};

use super::{pad, TLVControl, TLVTag, TLVTagType, TLVValueType};

/// A zero-copy view of one TLV element at the start of a byte slice.
///
/// The slice might extend beyond the element; only the element itself is
/// ever interpreted. An empty slice represents a missing element, which is
/// what [`TLVSequence::find_ctx`] returns when a context tag is absent.
#[derive(Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TLVElement<'a>(TLVSequence<'a>);

impl<'a> TLVElement<'a> {
    #[inline(always)]
    pub const fn new(data: &'a [u8]) -> Self {
        Self(TLVSequence(data))
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0 .0.is_empty()
    }

    #[inline(always)]
    pub const fn raw_data(&self) -> &'a [u8] {
        self.0 .0
    }

    /// Return the bytes of exactly this element, nested containers included.
    pub fn element_data(&self) -> Result<&'a [u8], Error> {
        let next = self.0.container_next()?;

        Ok(&self.0 .0[..self.0 .0.len() - next.0.len()])
    }

    #[inline(always)]
    pub fn control(&self) -> Result<TLVControl, Error> {
        self.0.control()
    }

    pub fn tag(&self) -> Result<TLVTag, Error> {
        let tag_type = self.control()?.tag_type;
        let slice = self.0.tag(tag_type)?;

        let tag = match tag_type {
            TLVTagType::Anonymous => TLVTag::Anonymous,
            TLVTagType::Context => TLVTag::Context(slice[0]),
            TLVTagType::CommonPrf16 => TLVTag::CommonPrf16(u16::from_le_bytes(slice.try_into()?)),
            TLVTagType::CommonPrf32 => TLVTag::CommonPrf32(u32::from_le_bytes(slice.try_into()?)),
            TLVTagType::ImplPrf16 => TLVTag::ImplPrf16(u16::from_le_bytes(slice.try_into()?)),
            TLVTagType::ImplPrf32 => TLVTag::ImplPrf32(u32::from_le_bytes(slice.try_into()?)),
            TLVTagType::FullQual48 => TLVTag::FullQual48 {
                vendor_id: u16::from_le_bytes([slice[0], slice[1]]),
                profile: u16::from_le_bytes([slice[2], slice[3]]),
                tag: u16::from_le_bytes([slice[4], slice[5]]),
            },
            TLVTagType::FullQual64 => TLVTag::FullQual64 {
                vendor_id: u16::from_le_bytes([slice[0], slice[1]]),
                profile: u16::from_le_bytes([slice[2], slice[3]]),
                tag: u32::from_le_bytes([slice[4], slice[5], slice[6], slice[7]]),
            },
        };

        Ok(tag)
    }

    pub fn ctx(&self) -> Result<u8, Error> {
        Ok(self.try_ctx()?.ok_or(ErrorCode::TLVTypeMismatch)?)
    }

    pub fn try_ctx(&self) -> Result<Option<u8>, Error> {
        let control = self.control()?;

        if matches!(control.tag_type, TLVTagType::Context) {
            Ok(Some(
                *self
                    .0
                    .tag(control.tag_type)?
                    .first()
                    .ok_or(ErrorCode::TLVTypeMismatch)?,
            ))
        } else {
            Ok(None)
        }
    }

    pub fn i8(&self) -> Result<i8, Error> {
        Ok(i8::from_le_bytes(self.fixed(TLVValueType::S8)?.try_into()?))
    }

    pub fn u8(&self) -> Result<u8, Error> {
        Ok(u8::from_le_bytes(self.fixed(TLVValueType::U8)?.try_into()?))
    }

    pub fn i16(&self) -> Result<i16, Error> {
        if self.is_value_type(TLVValueType::S16)? {
            Ok(i16::from_le_bytes(self.fixed(TLVValueType::S16)?.try_into()?))
        } else {
            self.i8().map(Into::into)
        }
    }

    pub fn u16(&self) -> Result<u16, Error> {
        if self.is_value_type(TLVValueType::U16)? {
            Ok(u16::from_le_bytes(self.fixed(TLVValueType::U16)?.try_into()?))
        } else {
            self.u8().map(Into::into)
        }
    }

    pub fn i32(&self) -> Result<i32, Error> {
        if self.is_value_type(TLVValueType::S32)? {
            Ok(i32::from_le_bytes(self.fixed(TLVValueType::S32)?.try_into()?))
        } else {
            self.i16().map(Into::into)
        }
    }

    pub fn u32(&self) -> Result<u32, Error> {
        if self.is_value_type(TLVValueType::U32)? {
            Ok(u32::from_le_bytes(self.fixed(TLVValueType::U32)?.try_into()?))
        } else {
            self.u16().map(Into::into)
        }
    }

    pub fn i64(&self) -> Result<i64, Error> {
        if self.is_value_type(TLVValueType::S64)? {
            Ok(i64::from_le_bytes(self.fixed(TLVValueType::S64)?.try_into()?))
        } else {
            self.i32().map(Into::into)
        }
    }

    pub fn u64(&self) -> Result<u64, Error> {
        if self.is_value_type(TLVValueType::U64)? {
            Ok(u64::from_le_bytes(self.fixed(TLVValueType::U64)?.try_into()?))
        } else {
            self.u32().map(Into::into)
        }
    }

    pub fn f32(&self) -> Result<f32, Error> {
        Ok(f32::from_le_bytes(self.fixed(TLVValueType::F32)?.try_into()?))
    }

    pub fn f64(&self) -> Result<f64, Error> {
        Ok(f64::from_le_bytes(self.fixed(TLVValueType::F64)?.try_into()?))
    }

    pub fn bool(&self) -> Result<bool, Error> {
        match self.control()?.value_type {
            TLVValueType::False => Ok(false),
            TLVValueType::True => Ok(true),
            _ => Err(ErrorCode::TLVTypeMismatch.into()),
        }
    }

    pub fn null(&self) -> Result<(), Error> {
        if self.is_null()? {
            Ok(())
        } else {
            Err(ErrorCode::TLVTypeMismatch.into())
        }
    }

    pub fn is_null(&self) -> Result<bool, Error> {
        self.is_value_type(TLVValueType::Null)
    }

    /// Return the content of an octet string.
    pub fn str(&self) -> Result<&'a [u8], Error> {
        let control = self.control()?;

        if !control.value_type.is_str() {
            Err(ErrorCode::TLVTypeMismatch)?;
        }

        self.0.value(control)
    }

    pub fn utf8(&self) -> Result<&'a str, Error> {
        let control = self.control()?;

        if !control.value_type.is_utf8() {
            Err(ErrorCode::TLVTypeMismatch)?;
        }

        Ok(core::str::from_utf8(self.0.value(control)?)?)
    }

    pub fn structure(&self) -> Result<TLVSequence<'a>, Error> {
        self.r#struct()
    }

    pub fn r#struct(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(TLVValueType::Struct)
    }

    pub fn array(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(TLVValueType::Array)
    }

    pub fn list(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(TLVValueType::List)
    }

    /// Return the members of a struct, array or list.
    pub fn container(&self) -> Result<TLVSequence<'a>, Error> {
        if self.control()?.value_type.is_container_start() {
            self.0.next_enter()
        } else {
            Err(ErrorCode::TLVTypeMismatch.into())
        }
    }

    fn container_of(&self, value_type: TLVValueType) -> Result<TLVSequence<'a>, Error> {
        if self.is_value_type(value_type)? {
            self.0.next_enter()
        } else {
            Err(ErrorCode::TLVTypeMismatch.into())
        }
    }

    fn is_value_type(&self, value_type: TLVValueType) -> Result<bool, Error> {
        Ok(self.control()?.value_type == value_type)
    }

    fn fixed(&self, value_type: TLVValueType) -> Result<&'a [u8], Error> {
        let control = self.control()?;

        if control.value_type != value_type {
            Err(ErrorCode::TLVTypeMismatch)?;
        }

        self.0.value(control)
    }

    fn fmt(&self, indent: usize, f: &mut fmt::Formatter) -> fmt::Result {
        pad(indent, f)?;

        let control = self.control().map_err(|_| fmt::Error)?;
        let tag = self.tag().map_err(|_| fmt::Error)?;

        if !matches!(tag, TLVTag::Anonymous) {
            write!(f, "{}: ", tag)?;
        }

        let value_type = control.value_type;

        match value_type {
            TLVValueType::S8 | TLVValueType::S16 | TLVValueType::S32 | TLVValueType::S64 => {
                write!(f, "{}", self.i64().map_err(|_| fmt::Error)?)
            }
            TLVValueType::U8 | TLVValueType::U16 | TLVValueType::U32 | TLVValueType::U64 => {
                write!(f, "{}", self.u64().map_err(|_| fmt::Error)?)
            }
            TLVValueType::False => write!(f, "false"),
            TLVValueType::True => write!(f, "true"),
            TLVValueType::F32 => write!(f, "{}", self.f32().map_err(|_| fmt::Error)?),
            TLVValueType::F64 => write!(f, "{}", self.f64().map_err(|_| fmt::Error)?),
            TLVValueType::Null => write!(f, "null"),
            TLVValueType::EndCnt => Ok(()),
            vt if vt.is_utf8() => write!(f, "{:?}", self.utf8().map_err(|_| fmt::Error)?),
            vt if vt.is_str() => write!(f, "{:02x?}", self.str().map_err(|_| fmt::Error)?),
            _ => {
                let (open, close) = match value_type {
                    TLVValueType::Struct => ("{", "}"),
                    TLVValueType::Array => ("[", "]"),
                    _ => ("(", ")"),
                };

                writeln!(f, "{}", open)?;

                for elem in self.container().map_err(|_| fmt::Error)?.iter() {
                    elem.map_err(|_| fmt::Error)?.fmt(indent + 2, f)?;
                    writeln!(f, ",")?;
                }

                pad(indent, f)?;
                write!(f, "{}", close)
            }
        }
    }
}

impl fmt::Debug for TLVElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<empty>")
        } else {
            self.fmt(0, f)
        }
    }
}

impl fmt::Display for TLVElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TLVElement<'_> {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::Display2Format(self).format(f)
    }
}

/// The members of a TLV container, terminated by the container end or by the end of the data.
#[derive(Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TLVSequence<'a>(pub(crate) &'a [u8]);

impl<'a> TLVSequence<'a> {
    const EMPTY: Self = Self(&[]);

    #[inline(always)]
    pub fn iter(&self) -> TLVSequenceIter<'a> {
        TLVSequenceIter(self.clone())
    }

    /// Return the element with the given context tag, failing if it is missing.
    pub fn ctx(&self, ctx: u8) -> Result<TLVElement<'a>, Error> {
        let element = self.find_ctx(ctx)?;

        if element.is_empty() {
            Err(ErrorCode::TLVNotFound.into())
        } else {
            Ok(element)
        }
    }

    /// Return the element with the given context tag, or an empty element if it is missing.
    pub fn find_ctx(&self, ctx: u8) -> Result<TLVElement<'a>, Error> {
        for elem in self.iter() {
            let elem = elem?;

            if elem.try_ctx()? == Some(ctx) {
                return Ok(elem);
            }
        }

        Ok(TLVElement(Self::EMPTY))
    }

    /// Return the element with the given context tag, scanning forward from the current position.
    ///
    /// Members are expected in increasing tag order. The sequence is left at the found
    /// element, or at the first element with a bigger tag when `ctx` is missing, in which
    /// case an empty element is returned.
    pub fn scan_ctx(&mut self, ctx: u8) -> Result<TLVElement<'a>, Error> {
        self.scan_map(move |elem| {
            if elem.is_empty() {
                return Ok(Some(elem));
            }

            if let Some(elem_ctx) = elem.try_ctx()? {
                match elem_ctx.cmp(&ctx) {
                    Ordering::Equal => return Ok(Some(elem)),
                    Ordering::Greater => return Ok(Some(TLVElement(Self::EMPTY))),
                    Ordering::Less => (),
                }
            }

            Ok(None)
        })
    }

    /// Advance over the sequence until `f` maps an element to `Some`.
    ///
    /// `f` is handed an empty element once the sequence is exhausted and must map it to `Some`.
    pub fn scan_map<F, T>(&mut self, mut f: F) -> Result<T, Error>
    where
        F: FnMut(TLVElement<'a>) -> Result<Option<T>, Error>,
    {
        loop {
            if let Some(elem) = f(self.current()?)? {
                return Ok(elem);
            }

            *self = self.container_next()?;
        }
    }

    fn next_enter(&self) -> Result<Self, Error> {
        if self.0.is_empty() {
            return Ok(Self::EMPTY);
        }

        let control = self.control()?;
        let value_len = self.value_len(control)?;

        Ok(Self(
            self.value_start(control)?
                .get(value_len..)
                .ok_or(ErrorCode::TruncatedPacket)?,
        ))
    }

    fn container_next(&self) -> Result<Self, Error> {
        if self.0.is_empty() {
            return Ok(Self::EMPTY);
        }

        let control = self.control()?;

        if control.is_container_end() {
            return Ok(self.clone());
        }

        let mut next = self.next_enter()?;

        if control.value_type.is_container_start() {
            let mut level = 1;

            while level > 0 {
                let control = next.control()?;

                if control.is_container_end() {
                    level -= 1;
                } else if control.value_type.is_container_start() {
                    level += 1;
                }

                next = next.next_enter()?;
            }
        }

        Ok(next)
    }

    fn current(&self) -> Result<TLVElement<'a>, Error> {
        if self.0.is_empty() || self.control()?.is_container_end() {
            return Ok(TLVElement(Self::EMPTY));
        }

        Ok(TLVElement(self.clone()))
    }

    #[inline(always)]
    fn control(&self) -> Result<TLVControl, Error> {
        TLVControl::parse(*self.0.first().ok_or(ErrorCode::TruncatedPacket)?)
    }

    #[inline(always)]
    fn tag(&self, tag_type: TLVTagType) -> Result<&'a [u8], Error> {
        Ok(self
            .0
            .get(1..1 + tag_type.size())
            .ok_or(ErrorCode::TruncatedPacket)?)
    }

    #[inline(always)]
    fn value_len_start(&self, tag_type: TLVTagType) -> Result<&'a [u8], Error> {
        Ok(self
            .0
            .get(1 + tag_type.size()..)
            .ok_or(ErrorCode::TruncatedPacket)?)
    }

    #[inline(always)]
    fn value_start(&self, control: TLVControl) -> Result<&'a [u8], Error> {
        Ok(self
            .value_len_start(control.tag_type)?
            .get(control.value_type.variable_size_len()..)
            .ok_or(ErrorCode::TruncatedPacket)?)
    }

    #[inline(always)]
    fn value(&self, control: TLVControl) -> Result<&'a [u8], Error> {
        let value_len = self.value_len(control)?;

        Ok(self
            .value_start(control)?
            .get(..value_len)
            .ok_or(ErrorCode::TruncatedPacket)?)
    }

    fn value_len(&self, control: TLVControl) -> Result<usize, Error> {
        if let Some(fixed_size) = control.value_type.fixed_size() {
            return Ok(fixed_size);
        }

        let size_len = control.value_type.variable_size_len();

        let len_slice = self
            .value_len_start(control.tag_type)?
            .get(..size_len)
            .ok_or(ErrorCode::TruncatedPacket)?;

        let len = match size_len {
            1 => len_slice[0] as usize,
            2 => u16::from_le_bytes(len_slice.try_into()?) as usize,
            4 => u32::from_le_bytes(len_slice.try_into()?) as usize,
            _ => u64::from_le_bytes(len_slice.try_into()?) as usize,
        };

        Ok(len)
    }
}

impl fmt::Debug for TLVSequence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for elem in self.iter() {
            elem.map_err(|_| fmt::Error)?.fmt(0, f)?;
            writeln!(f)?;
        }

        Ok(())
    }
}

#[derive(Clone)]
#[repr(transparent)]
pub struct TLVSequenceIter<'a>(TLVSequence<'a>);

impl TLVSequenceIter<'_> {
    fn advance(&mut self) -> Result<(), Error> {
        self.0 = self.0.container_next()?;

        Ok(())
    }
}

impl<'a> Iterator for TLVSequenceIter<'a> {
    type Item = Result<TLVElement<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0
            .current()
            .and_then(|current| self.advance().map(|_| current))
            .map(|elem| (!elem.is_empty()).then_some(elem))
            .transpose()
    }
}
