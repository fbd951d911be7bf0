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

//! Conversions between Rust types and TLV elements.
//!
//! `Option<T>` models an optional struct member: `None` is simply not written, and
//! a missing member (an empty element) reads back as `None`. `Nullable<T>` models a
//! nullable type domain, where the value is present but may be an explicit TLV null.

use core::fmt;
use core::marker::PhantomData;

use crate::error::{Error, ErrorCode};

use super::{TLVElement, TLVSequence, TLVSequenceIter, TLVTag, TLVValueType, TLVWrite};

pub trait FromTLV<'a>: Sized + 'a {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error>;
}

pub trait ToTLV {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, tw: W) -> Result<(), Error>;
}

impl<T> ToTLV for &T
where
    T: ToTLV + ?Sized,
{
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, tw: W) -> Result<(), Error> {
        (**self).to_tlv(tag, tw)
    }
}

macro_rules! fromtlv_for {
    ($($t:ident)*) => {
        $(
            impl<'a> FromTLV<'a> for $t {
                fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
                    element.$t()
                }
            }
        )*
    };
}

// Values keep the width of their declared type on the wire
macro_rules! totlv_for_fixed {
    ($($t:ident:$vt:ident)*) => {
        $(
            impl ToTLV for $t {
                fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
                    tw.raw_value(tag, TLVValueType::$vt, &self.to_le_bytes())
                }
            }
        )*
    };
}

fromtlv_for!(i8 u8 i16 u16 i32 u32 i64 u64 f32 f64 bool);
totlv_for_fixed!(i8:S8 u8:U8 i16:S16 u16:U16 i32:S32 u32:U32 i64:S64 u64:U64 f32:F32 f64:F64);

impl ToTLV for bool {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.bool(tag, *self)
    }
}

impl<'a> FromTLV<'a> for &'a str {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        element.utf8()
    }
}

impl ToTLV for str {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.utf8(tag, self)
    }
}

/// An octet string borrowed from the TLV stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OctetStr<'a>(pub &'a [u8]);

impl<'a> FromTLV<'a> for OctetStr<'a> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        element.str().map(OctetStr)
    }
}

impl ToTLV for OctetStr<'_> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.str(tag, self.0)
    }
}

impl<T: ToTLV> ToTLV for [T] {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_array(tag)?;

        for item in self {
            item.to_tlv(&TLVTag::Anonymous, &mut tw)?;
        }

        tw.end_container()
    }
}

impl<T: ToTLV, const N: usize> ToTLV for heapless::Vec<T, N> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, tw: W) -> Result<(), Error> {
        self.as_slice().to_tlv(tag, tw)
    }
}

impl<'a, T: FromTLV<'a>, const N: usize> FromTLV<'a> for heapless::Vec<T, N> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let mut vec = heapless::Vec::new();

        for item in TLVArray::<T>::new(element.clone())? {
            vec.push(item?).map_err(|_| ErrorCode::NoSpace)?;
        }

        Ok(vec)
    }
}

impl<'a, T: FromTLV<'a>> FromTLV<'a> for Option<T> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        if element.is_empty() {
            Ok(None)
        } else {
            T::from_tlv(element).map(Some)
        }
    }
}

impl<T: ToTLV> ToTLV for Option<T> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, tw: W) -> Result<(), Error> {
        match self {
            Some(value) => value.to_tlv(tag, tw),
            None => Ok(()),
        }
    }
}

/// A value of the nullable variant of `T`'s TLV type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Nullable<T>(Option<T>);

impl<T> Nullable<T> {
    pub const fn some(value: T) -> Self {
        Self(Some(value))
    }

    pub const fn none() -> Self {
        Self(None)
    }

    pub const fn new(value: Option<T>) -> Self {
        Self(value)
    }

    pub const fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_opt_ref(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_option(self) -> Option<T> {
        self.0
    }
}

impl<'a, T: FromTLV<'a>> FromTLV<'a> for Nullable<T> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        if element.is_null()? {
            Ok(Self::none())
        } else {
            T::from_tlv(element).map(Self::some)
        }
    }
}

impl<T: ToTLV> ToTLV for Nullable<T> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        match &self.0 {
            Some(value) => value.to_tlv(tag, tw),
            None => tw.null(tag),
        }
    }
}

impl<'a> FromTLV<'a> for TLVElement<'a> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        Ok(element.clone())
    }
}

/// Copies the element verbatim, replacing only its tag.
impl ToTLV for TLVElement<'_> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        let control = self.control()?;
        let data = self.element_data()?;

        tw.raw_value(tag, control.value_type, &data[1 + control.tag_type.size()..])
    }
}

/// A lazily decoded TLV array (or list) of `T`.
#[derive(Clone)]
pub struct TLVArray<'a, T> {
    seq: TLVSequence<'a>,
    _type: PhantomData<fn() -> T>,
}

impl<'a, T: FromTLV<'a>> TLVArray<'a, T> {
    pub fn new(element: TLVElement<'a>) -> Result<Self, Error> {
        let control = element.control()?;

        if !matches!(control.value_type, TLVValueType::Array | TLVValueType::List) {
            Err(ErrorCode::TLVTypeMismatch)?;
        }

        Ok(Self {
            seq: element.container()?,
            _type: PhantomData,
        })
    }

    pub fn iter(&self) -> TLVArrayIter<'a, T> {
        TLVArrayIter {
            iter: self.seq.iter(),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TLVArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;

        for elem in self.seq.iter() {
            write!(f, "{:?},", elem.map_err(|_| fmt::Error)?)?;
        }

        write!(f, "]")
    }
}

impl<'a, T: FromTLV<'a>> IntoIterator for TLVArray<'a, T> {
    type Item = Result<T, Error>;
    type IntoIter = TLVArrayIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: FromTLV<'a>> FromTLV<'a> for TLVArray<'a, T> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        Self::new(element.clone())
    }
}

pub struct TLVArrayIter<'a, T> {
    iter: TLVSequenceIter<'a>,
    _type: PhantomData<fn() -> T>,
}

impl<'a, T: FromTLV<'a>> Iterator for TLVArrayIter<'a, T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter
            .next()
            .map(|elem| elem.and_then(|elem| T::from_tlv(&elem)))
    }
}
