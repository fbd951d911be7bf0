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

//! Code generation for `#[derive(FromTLV, ToTLV)]`.
//!
//! Named struct members get consecutive context tags starting from `tlvargs(start)`
//! (0 by default), unless a member carries `#[tagval(N)]`. Struct members are
//! decoded in tag order unless the type is marked `tlvargs(unordered)`.
//!
//! Container attributes, all optional:
//! - `start = N`: first context tag
//! - `datatype = "struct" | "list"`: container type of a struct; `"u8" | "u16"`: width of a unit enum
//! - `lifetime = "'a"`: the lifetime `FromTLV` borrows the decoded data for
//! - `unordered`: look members up by tag instead of scanning in order
//!
//! Enums either have only unit variants, encoded as an unsigned integer
//! (the discriminant can be set with `#[enumval(N)]`), or only single-field
//! tuple variants, encoded as a struct with exactly one context-tagged member.

use std::collections::HashSet;

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::parse::ParseStream;
use syn::token::{Gt, Lt};
use syn::{DeriveInput, Lifetime, LifetimeParam, LitInt, LitStr, Type};

#[derive(PartialEq, Debug)]
struct TlvArgs {
    krate: String,
    start: u8,
    datatype: String,
    unordered: bool,
    lifetime: syn::Lifetime,
    lifetime_explicit: bool,
}

impl Default for TlvArgs {
    fn default() -> Self {
        Self {
            krate: "".to_string(),
            start: 0,
            datatype: "struct".to_string(),
            unordered: false,
            lifetime: Lifetime::new("'_", Span::call_site()),
            lifetime_explicit: false,
        }
    }
}

impl TlvArgs {
    /// Update the arguments from one nested `tlvargs(...)` item.
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("start") {
            self.start = meta.value()?.parse::<LitInt>()?.base10_parse()?;
        } else if meta.path.is_ident("lifetime") {
            self.lifetime =
                Lifetime::new(&meta.value()?.parse::<LitStr>()?.value(), Span::call_site());
            self.lifetime_explicit = true;
        } else if meta.path.is_ident("datatype") {
            self.datatype = meta.value()?.parse::<LitStr>()?.value();
        } else if meta.path.is_ident("unordered") {
            assert!(meta.input.is_empty());
            self.unordered = true;
        } else {
            return Err(meta.error(format!("unsupported attribute: {:?}", meta.path)));
        }

        Ok(())
    }

    fn krate(&self) -> Ident {
        Ident::new(&self.krate, Span::call_site())
    }
}

fn parse_tlvargs(ast: &DeriveInput, krate: String) -> TlvArgs {
    let mut tlvargs = TlvArgs {
        krate,
        ..Default::default()
    };

    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("tlvargs")) {
        attr.parse_nested_meta(|meta| tlvargs.parse(meta)).unwrap();
    }

    tlvargs
}

fn parse_enum_val(attrs: &[syn::Attribute]) -> Option<u16> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("enumval"))
        .map(|attr| {
            attr.parse_args_with(|parser: ParseStream| {
                parser.parse::<LitInt>()?.base10_parse::<u16>()
            })
            .unwrap()
        })
        .next()
}

fn parse_tag_val(attrs: &[syn::Attribute]) -> Option<u8> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("tagval"))
        .map(|attr| {
            attr.parse_args_with(|parser: ParseStream| {
                parser.parse::<LitInt>()?.base10_parse::<u8>()
            })
            .unwrap()
        })
        .next()
}

/// The context tags of named struct members, in declaration order.
fn struct_tags(fields: &syn::FieldsNamed, start: u8) -> Vec<u8> {
    let mut next = start;

    fields
        .named
        .iter()
        .map(|field| {
            parse_tag_val(&field.attrs).unwrap_or_else(|| {
                let tag = next;
                next += 1;
                tag
            })
        })
        .collect()
}

#[derive(PartialEq, Eq, Hash)]
enum VariantKind {
    Named,
    Unnamed,
    Unit,
}

/// Check the variants of `data_enum` and return their discriminants (or tags),
/// together with whether the enum is a unit enum.
fn enum_tags(data_enum: &syn::DataEnum, enum_name: &Ident, start: u8) -> (Vec<u16>, bool) {
    let kinds = data_enum
        .variants
        .iter()
        .map(|v| match v.fields {
            syn::Fields::Unnamed(_) => VariantKind::Unnamed,
            syn::Fields::Named(_) => VariantKind::Named,
            syn::Fields::Unit => VariantKind::Unit,
        })
        .collect::<HashSet<_>>();

    if kinds.contains(&VariantKind::Named) {
        panic!("Named items in enums not supported for {enum_name:?}");
    }

    if kinds.contains(&VariantKind::Unnamed) && kinds.contains(&VariantKind::Unit) {
        panic!("Enum {enum_name:?} mixes unit and unnamed variants");
    }

    let mut next = start as u16;

    let tags = data_enum
        .variants
        .iter()
        .map(|v| {
            parse_enum_val(&v.attrs).unwrap_or_else(|| {
                let tag = next;
                next += 1;
                tag
            })
        })
        .collect();

    (tags, kinds.contains(&VariantKind::Unit))
}

/// Map the discriminants of a unit enum onto the `u8`/`u16` read and write
/// method and literals of that width.
fn unit_enum_method_and_tags(
    enum_name: &Ident,
    datatype: &str,
    tags: Vec<u16>,
) -> (Ident, Vec<Literal>) {
    match datatype {
        "struct" | "u8" => {
            if tags.iter().any(|v| *v > 0xFF) {
                panic!("Enum discriminator value larger than 0xFF for {enum_name:?}")
            }

            (
                Ident::new("u8", Span::call_site()),
                tags.into_iter()
                    .map(|v| Literal::u8_suffixed(v as u8))
                    .collect(),
            )
        }
        "u16" => (
            Ident::new("u16", Span::call_site()),
            tags.into_iter().map(Literal::u16_suffixed).collect(),
        ),
        _ => panic!("Invalid data type {datatype:?} for enum {enum_name:?}"),
    }
}

/// Context tags of the variants of a tuple-variant enum.
fn variant_ctx_tags(enum_name: &Ident, tags: Vec<u16>) -> Vec<Literal> {
    if tags.iter().any(|v| *v > u8::MAX as _) {
        panic!("Enum tag larger than 0xFF for {enum_name:?}")
    }

    tags.into_iter()
        .map(|v| Literal::u8_suffixed(v as u8))
        .collect()
}

/// Strip the generic arguments of a type path, so that `Option<Nullable<u16>>`
/// can be used as the expression `Option::from_tlv`.
fn normalize_fromtlv_type(ty: &syn::Type) -> TokenStream {
    let Type::Path(type_path) = ty else {
        panic!("Don't know what to do {ty:?}");
    };

    let type_idents = type_path
        .path
        .segments
        .iter()
        .map(|s| s.ident.clone())
        .collect::<Vec<_>>();

    quote!(#(#type_idents)::*)
}

fn gen_totlv_for_struct_named(
    fields: &syn::FieldsNamed,
    struct_name: &Ident,
    tlvargs: &TlvArgs,
    generics: &syn::Generics,
) -> TokenStream {
    let krate = tlvargs.krate();
    let datatype = format_ident!("start_{}", tlvargs.datatype);

    let idents = fields.named.iter().map(|field| &field.ident);
    let tags = struct_tags(fields, tlvargs.start);

    quote! {
        impl #generics #krate::tlv::ToTLV for #struct_name #generics {
            fn to_tlv<W: #krate::tlv::TLVWrite>(&self, tag: &#krate::tlv::TLVTag, mut tw: W) -> Result<(), #krate::error::Error> {
                let anchor = tw.get_tail();

                if let Err(err) = (|| {
                    tw.#datatype(tag)?;
                    #(
                        #krate::tlv::ToTLV::to_tlv(&self.#idents, &#krate::tlv::TLVTag::Context(#tags), &mut tw)?;
                    )*
                    tw.end_container()
                })() {
                    tw.rewind_to(anchor);
                    Err(err)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A struct with a single unnamed field is encoded as that field.
fn gen_totlv_for_struct_unnamed(
    fields: &syn::FieldsUnnamed,
    struct_name: &Ident,
    tlvargs: &TlvArgs,
    generics: &syn::Generics,
) -> TokenStream {
    if fields.unnamed.len() != 1 {
        panic!("Only a single unnamed field supported for unnamed structures");
    }

    let krate = tlvargs.krate();

    quote! {
        impl #generics #krate::tlv::ToTLV for #struct_name #generics {
            fn to_tlv<W: #krate::tlv::TLVWrite>(&self, tag: &#krate::tlv::TLVTag, mut tw: W) -> Result<(), #krate::error::Error> {
                #krate::tlv::ToTLV::to_tlv(&self.0, tag, &mut tw)
            }
        }
    }
}

fn gen_totlv_for_enum(
    data_enum: &syn::DataEnum,
    enum_name: &Ident,
    tlvargs: &TlvArgs,
    generics: &syn::Generics,
) -> TokenStream {
    let krate = tlvargs.krate();
    let variant_names = data_enum.variants.iter().map(|v| &v.ident);
    let (tags, unit) = enum_tags(data_enum, enum_name, tlvargs.start);

    if unit {
        let (write_method, tags) = unit_enum_method_and_tags(enum_name, &tlvargs.datatype, tags);

        quote! {
            impl #generics #krate::tlv::ToTLV for #enum_name #generics {
                fn to_tlv<W: #krate::tlv::TLVWrite>(&self, tag: &#krate::tlv::TLVTag, mut tw: W) -> Result<(), #krate::error::Error> {
                    let anchor = tw.get_tail();

                    if let Err(err) = (|| {
                        match self {
                            #( Self::#variant_names => tw.#write_method(tag, #tags), )*
                        }
                    })() {
                        tw.rewind_to(anchor);
                        Err(err)
                    } else {
                        Ok(())
                    }
                }
            }
        }
    } else {
        let tags = variant_ctx_tags(enum_name, tags);

        quote! {
            impl #generics #krate::tlv::ToTLV for #enum_name #generics {
                fn to_tlv<W: #krate::tlv::TLVWrite>(&self, tag: &#krate::tlv::TLVTag, mut tw: W) -> Result<(), #krate::error::Error> {
                    let anchor = tw.get_tail();

                    if let Err(err) = (|| {
                        tw.start_struct(tag)?;
                        match self {
                            #(
                                Self::#variant_names(c) => #krate::tlv::ToTLV::to_tlv(c, &#krate::tlv::TLVTag::Context(#tags), &mut tw),
                            )*
                        }?;
                        tw.end_container()
                    })() {
                        tw.rewind_to(anchor);
                        Err(err)
                    } else {
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Derive `ToTLV`.
///
/// A failed encoding rewinds the writer to where the value started.
pub fn derive_totlv(ast: DeriveInput, krate: String) -> TokenStream {
    let name = &ast.ident;
    let tlvargs = parse_tlvargs(&ast, krate);
    let generics = &ast.generics;

    match &ast.data {
        syn::Data::Struct(data_struct) => match &data_struct.fields {
            syn::Fields::Named(fields) => {
                gen_totlv_for_struct_named(fields, name, &tlvargs, generics)
            }
            syn::Fields::Unnamed(fields) => {
                gen_totlv_for_struct_unnamed(fields, name, &tlvargs, generics)
            }
            syn::Fields::Unit => panic!("Unit structs are not supported"),
        },
        syn::Data::Enum(data_enum) => gen_totlv_for_enum(data_enum, name, &tlvargs, generics),
        syn::Data::Union(_) => panic!("Derive ToTLV - Only supported struct and enum for now"),
    }
}

fn gen_try_from(
    name: &Ident,
    krate: &Ident,
    lifetime: &Lifetime,
    impl_generics: &syn::Generics,
    generics: &syn::Generics,
) -> TokenStream {
    quote! {
        impl #impl_generics TryFrom<&#krate::tlv::TLVElement<#lifetime>> for #name #generics {
            type Error = #krate::error::Error;

            fn try_from(element: &#krate::tlv::TLVElement<#lifetime>) -> Result<Self, Self::Error> {
                use #krate::tlv::FromTLV;

                Self::from_tlv(element)
            }
        }
    }
}

fn gen_fromtlv_for_struct_named(
    fields: &syn::FieldsNamed,
    struct_name: &Ident,
    tlvargs: TlvArgs,
    generics: &syn::Generics,
) -> TokenStream {
    let (lifetime, impl_generics) = if tlvargs.lifetime_explicit {
        (tlvargs.lifetime.clone(), generics.clone())
    } else {
        // The impl needs a named lifetime of its own
        let lifetime = Lifetime::new("'__from_tlv", Span::call_site());

        let mut impl_generics = generics.clone();

        if impl_generics.gt_token.is_none() {
            impl_generics.gt_token = Some(Gt::default());
            impl_generics.lt_token = Some(Lt::default());
        }

        impl_generics
            .params
            .push(syn::GenericParam::Lifetime(LifetimeParam::new(
                lifetime.clone(),
            )));

        (lifetime, impl_generics)
    };

    let krate = tlvargs.krate();
    let datatype = format_ident!("r#{}", tlvargs.datatype);
    let seq_method = format_ident!("{}_ctx", if tlvargs.unordered { "find" } else { "scan" });

    let idents = fields.named.iter().map(|field| &field.ident);
    let types = fields
        .named
        .iter()
        .map(|field| normalize_fromtlv_type(&field.ty));
    let tags = struct_tags(fields, tlvargs.start);

    let try_from = gen_try_from(struct_name, &krate, &lifetime, &impl_generics, generics);

    quote! {
        impl #impl_generics #krate::tlv::FromTLV<#lifetime> for #struct_name #generics {
            fn from_tlv(element: &#krate::tlv::TLVElement<#lifetime>) -> Result<Self, #krate::error::Error> {
                #[allow(unused_mut)]
                let mut seq = element.#datatype()?;

                Ok(Self {
                    #(#idents: #types::from_tlv(&seq.#seq_method(#tags)?)?,
                    )*
                })
            }
        }

        #try_from
    }
}

/// A struct with a single unnamed field is decoded as that field.
fn gen_fromtlv_for_struct_unnamed(
    fields: &syn::FieldsUnnamed,
    struct_name: &Ident,
    tlvargs: TlvArgs,
    generics: &syn::Generics,
) -> TokenStream {
    if fields.unnamed.len() != 1 {
        panic!("Only a single unnamed field supported for unnamed structures");
    }

    let krate = tlvargs.krate();
    let lifetime = &tlvargs.lifetime;
    let ty = normalize_fromtlv_type(&fields.unnamed[0].ty);

    let try_from = gen_try_from(struct_name, &krate, lifetime, generics, generics);

    quote! {
        impl #generics #krate::tlv::FromTLV<#lifetime> for #struct_name #generics {
            fn from_tlv(element: &#krate::tlv::TLVElement<#lifetime>) -> Result<Self, #krate::error::Error> {
                Ok(Self(#ty::from_tlv(element)?))
            }
        }

        #try_from
    }
}

fn gen_fromtlv_for_enum(
    data_enum: &syn::DataEnum,
    enum_name: &Ident,
    tlvargs: TlvArgs,
    generics: &syn::Generics,
) -> TokenStream {
    let krate = tlvargs.krate();
    let lifetime = &tlvargs.lifetime;
    let variant_names = data_enum.variants.iter().map(|v| &v.ident);
    let (tags, unit) = enum_tags(data_enum, enum_name, tlvargs.start);

    let try_from = gen_try_from(enum_name, &krate, lifetime, generics, generics);

    if unit {
        let (read_method, tags) = unit_enum_method_and_tags(enum_name, &tlvargs.datatype, tags);

        quote! {
            impl #generics #krate::tlv::FromTLV<#lifetime> for #enum_name #generics {
                fn from_tlv(element: &#krate::tlv::TLVElement<#lifetime>) -> Result<Self, #krate::error::Error> {
                    Ok(match element.#read_method()? {
                        #(#tags => Self::#variant_names,
                        )*
                        _ => Err(#krate::error::ErrorCode::Invalid)?,
                    })
                }
            }

            #try_from
        }
    } else {
        let tags = variant_ctx_tags(enum_name, tags);

        let types = data_enum.variants.iter().map(|v| match &v.fields {
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                normalize_fromtlv_type(&fields.unnamed[0].ty)
            }
            _ => panic!("Variant {:?} must have exactly one unnamed field", v.ident),
        });

        quote! {
            impl #generics #krate::tlv::FromTLV<#lifetime> for #enum_name #generics {
                fn from_tlv(element: &#krate::tlv::TLVElement<#lifetime>) -> Result<Self, #krate::error::Error> {
                    let element = element
                        .r#struct()?
                        .iter()
                        .next()
                        .ok_or(#krate::error::ErrorCode::TLVTypeMismatch)??;

                    let tag = element
                        .try_ctx()?
                        .ok_or(#krate::error::ErrorCode::TLVTypeMismatch)?;

                    Ok(match tag {
                        #(#tags => Self::#variant_names(#types::from_tlv(&element)?),
                        )*
                        _ => Err(#krate::error::ErrorCode::Invalid)?,
                    })
                }
            }

            #try_from
        }
    }
}

/// Derive `FromTLV`, plus `TryFrom<&TLVElement>` in terms of it.
///
/// The field types must have `FromTLV` in scope at the derive site.
pub fn derive_fromtlv(ast: DeriveInput, krate: String) -> TokenStream {
    let name = &ast.ident;
    let tlvargs = parse_tlvargs(&ast, krate);
    let generics = &ast.generics;

    match &ast.data {
        syn::Data::Struct(data_struct) => match &data_struct.fields {
            syn::Fields::Named(fields) => {
                gen_fromtlv_for_struct_named(fields, name, tlvargs, generics)
            }
            syn::Fields::Unnamed(fields) => {
                gen_fromtlv_for_struct_unnamed(fields, name, tlvargs, generics)
            }
            syn::Fields::Unit => panic!("Unit structs are not supported"),
        },
        syn::Data::Enum(data_enum) => gen_fromtlv_for_enum(data_enum, name, tlvargs, generics),
        syn::Data::Union(_) => panic!("Derive FromTLV - Only supported struct and enum for now"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_tokenstreams_eq::assert_tokenstreams_eq;
    use quote::quote;

    #[test]
    fn tlvargs_parse() {
        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(datatype = "list")]
            enum Unused {}
        ))
        .unwrap();
        assert_eq!(
            parse_tlvargs(&ast, "test".to_string()),
            TlvArgs {
                krate: "test".to_string(),
                datatype: "list".to_string(),
                ..Default::default()
            }
        );

        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(unordered, start = 2)]
            enum Unused {}
        ))
        .unwrap();
        assert_eq!(
            parse_tlvargs(&ast, "crate".to_string()),
            TlvArgs {
                krate: "crate".to_string(),
                unordered: true,
                start: 2,
                ..Default::default()
            }
        );

        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(lifetime = "'a")]
            enum Unused {}
        ))
        .unwrap();
        let tlvargs = parse_tlvargs(&ast, "crate".to_string());
        assert_eq!(tlvargs.lifetime.ident, "a");
        assert!(tlvargs.lifetime_explicit);
    }

    #[test]
    fn test_to_tlv_for_list_with_tagval() {
        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(datatype = "list")]
            struct TestPath {
                node: Option<u64>,
                endpoint: Option<u16>,
                #[tagval(0xFF)]
                revision: Option<u8>,
            }
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_totlv(ast, "rs_matter_im".to_string()),
            &quote!(
                impl rs_matter_im::tlv::ToTLV for TestPath {
                    fn to_tlv<W: rs_matter_im::tlv::TLVWrite>(
                        &self,
                        tag: &rs_matter_im::tlv::TLVTag,
                        mut tw: W,
                    ) -> Result<(), rs_matter_im::error::Error> {
                        let anchor = tw.get_tail();
                        if let Err(err) = (|| {
                            tw.start_list(tag)?;
                            rs_matter_im::tlv::ToTLV::to_tlv(&self.node, &rs_matter_im::tlv::TLVTag::Context(0u8), &mut tw)?;
                            rs_matter_im::tlv::ToTLV::to_tlv(&self.endpoint, &rs_matter_im::tlv::TLVTag::Context(1u8), &mut tw)?;
                            rs_matter_im::tlv::ToTLV::to_tlv(&self.revision, &rs_matter_im::tlv::TLVTag::Context(255u8), &mut tw)?;
                            tw.end_container()
                        })() {
                            tw.rewind_to(anchor);
                            Err(err)
                        } else {
                            Ok(())
                        }
                    }
                }
            )
        );
    }

    #[test]
    fn test_from_tlv_for_struct() {
        let ast: DeriveInput = syn::parse2(quote!(
            struct TestS {
                field1: u8,
                field_null: rs_matter_im::tlv::Nullable<u32>,
                #[tagval(5)]
                field_opt: Option<u32>,
            }
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_fromtlv(ast, "rs_matter_im".to_string()),
            &quote!(
                impl<'__from_tlv> rs_matter_im::tlv::FromTLV<'__from_tlv> for TestS {
                    fn from_tlv(
                        element: &rs_matter_im::tlv::TLVElement<'__from_tlv>,
                    ) -> Result<Self, rs_matter_im::error::Error> {
                        #[allow(unused_mut)]
                        let mut seq = element.r#struct()?;

                        Ok(Self {
                            field1: u8::from_tlv(&seq.scan_ctx(0u8)?)?,
                            field_null: rs_matter_im::tlv::Nullable::from_tlv(&seq.scan_ctx(1u8)?)?,
                            field_opt: Option::from_tlv(&seq.scan_ctx(5u8)?)?,
                        })
                    }
                }

                impl<'__from_tlv> TryFrom<&rs_matter_im::tlv::TLVElement<'__from_tlv>> for TestS {
                    type Error = rs_matter_im::error::Error;

                    fn try_from(
                        element: &rs_matter_im::tlv::TLVElement<'__from_tlv>,
                    ) -> Result<Self, Self::Error> {
                        use rs_matter_im::tlv::FromTLV;
                        Self::from_tlv(element)
                    }
                }
            )
        );
    }

    #[test]
    fn test_from_tlv_unordered_with_lifetime() {
        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(lifetime = "'a", unordered)]
            struct TestData<'a> {
                data_ver: Option<u32>,
                data: TLVElement<'a>,
            }
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_fromtlv(ast, "crate".to_string()),
            &quote!(
                impl<'a> crate::tlv::FromTLV<'a> for TestData<'a> {
                    fn from_tlv(
                        element: &crate::tlv::TLVElement<'a>,
                    ) -> Result<Self, crate::error::Error> {
                        #[allow(unused_mut)]
                        let mut seq = element.r#struct()?;

                        Ok(Self {
                            data_ver: Option::from_tlv(&seq.find_ctx(0u8)?)?,
                            data: TLVElement::from_tlv(&seq.find_ctx(1u8)?)?,
                        })
                    }
                }

                impl<'a> TryFrom<&crate::tlv::TLVElement<'a>> for TestData<'a> {
                    type Error = crate::error::Error;

                    fn try_from(
                        element: &crate::tlv::TLVElement<'a>,
                    ) -> Result<Self, Self::Error> {
                        use crate::tlv::FromTLV;
                        Self::from_tlv(element)
                    }
                }
            )
        );
    }

    #[test]
    fn test_newtype() {
        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(lifetime = "'a")]
            struct TestReq<'a>(TLVElement<'a>);
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_totlv(ast.clone(), "crate".to_string()),
            &quote!(
                impl<'a> crate::tlv::ToTLV for TestReq<'a> {
                    fn to_tlv<W: crate::tlv::TLVWrite>(
                        &self,
                        tag: &crate::tlv::TLVTag,
                        mut tw: W,
                    ) -> Result<(), crate::error::Error> {
                        crate::tlv::ToTLV::to_tlv(&self.0, tag, &mut tw)
                    }
                }
            )
        );

        assert_tokenstreams_eq!(
            &derive_fromtlv(ast, "crate".to_string()),
            &quote!(
                impl<'a> crate::tlv::FromTLV<'a> for TestReq<'a> {
                    fn from_tlv(
                        element: &crate::tlv::TLVElement<'a>,
                    ) -> Result<Self, crate::error::Error> {
                        Ok(Self(TLVElement::from_tlv(element)?))
                    }
                }

                impl<'a> TryFrom<&crate::tlv::TLVElement<'a>> for TestReq<'a> {
                    type Error = crate::error::Error;

                    fn try_from(
                        element: &crate::tlv::TLVElement<'a>,
                    ) -> Result<Self, Self::Error> {
                        use crate::tlv::FromTLV;
                        Self::from_tlv(element)
                    }
                }
            )
        );
    }

    #[test]
    fn test_to_tlv_for_enum() {
        let ast: DeriveInput = syn::parse2(quote!(
            enum TestResp {
                Status(u16),
                Data(u32),
            }
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_totlv(ast, "crate".to_string()),
            &quote!(
                impl crate::tlv::ToTLV for TestResp {
                    fn to_tlv<W: crate::tlv::TLVWrite>(
                        &self,
                        tag: &crate::tlv::TLVTag,
                        mut tw: W,
                    ) -> Result<(), crate::error::Error> {
                        let anchor = tw.get_tail();
                        if let Err(err) = (|| {
                            tw.start_struct(tag)?;
                            match self {
                                Self::Status(c) => crate::tlv::ToTLV::to_tlv(c, &crate::tlv::TLVTag::Context(0u8), &mut tw),
                                Self::Data(c) => crate::tlv::ToTLV::to_tlv(c, &crate::tlv::TLVTag::Context(1u8), &mut tw),
                            }?;
                            tw.end_container()
                        })() {
                            tw.rewind_to(anchor);
                            Err(err)
                        } else {
                            Ok(())
                        }
                    }
                }
            )
        );
    }

    #[test]
    fn test_from_tlv_for_enum() {
        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(lifetime = "'a")]
            enum TestResp<'a> {
                Status(u16),
                Data(TestData<'a>),
            }
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_fromtlv(ast, "crate".to_string()),
            &quote!(
                impl<'a> crate::tlv::FromTLV<'a> for TestResp<'a> {
                    fn from_tlv(
                        element: &crate::tlv::TLVElement<'a>,
                    ) -> Result<Self, crate::error::Error> {
                        let element = element
                            .r#struct()?
                            .iter()
                            .next()
                            .ok_or(crate::error::ErrorCode::TLVTypeMismatch)??;

                        let tag = element
                            .try_ctx()?
                            .ok_or(crate::error::ErrorCode::TLVTypeMismatch)?;

                        Ok(match tag {
                            0u8 => Self::Status(u16::from_tlv(&element)?),
                            1u8 => Self::Data(TestData::from_tlv(&element)?),
                            _ => Err(crate::error::ErrorCode::Invalid)?,
                        })
                    }
                }

                impl<'a> TryFrom<&crate::tlv::TLVElement<'a>> for TestResp<'a> {
                    type Error = crate::error::Error;

                    fn try_from(
                        element: &crate::tlv::TLVElement<'a>,
                    ) -> Result<Self, Self::Error> {
                        use crate::tlv::FromTLV;
                        Self::from_tlv(element)
                    }
                }
            )
        );
    }

    #[test]
    fn test_unit_enum() {
        let ast: DeriveInput = syn::parse2(quote!(
            #[tlvargs(datatype = "u16")]
            enum TestEnum {
                A,
                #[enumval(0x1234)]
                B,
            }
        ))
        .unwrap();

        assert_tokenstreams_eq!(
            &derive_totlv(ast.clone(), "crate".to_string()),
            &quote!(
                impl crate::tlv::ToTLV for TestEnum {
                    fn to_tlv<W: crate::tlv::TLVWrite>(
                        &self,
                        tag: &crate::tlv::TLVTag,
                        mut tw: W,
                    ) -> Result<(), crate::error::Error> {
                        let anchor = tw.get_tail();
                        if let Err(err) = (|| {
                            match self {
                                Self::A => tw.u16(tag, 0u16),
                                Self::B => tw.u16(tag, 4660u16),
                            }
                        })() {
                            tw.rewind_to(anchor);
                            Err(err)
                        } else {
                            Ok(())
                        }
                    }
                }
            )
        );

        assert_tokenstreams_eq!(
            &derive_fromtlv(ast, "crate".to_string()),
            &quote!(
                impl crate::tlv::FromTLV<'_> for TestEnum {
                    fn from_tlv(
                        element: &crate::tlv::TLVElement<'_>,
                    ) -> Result<Self, crate::error::Error> {
                        Ok(match element.u16()? {
                            0u16 => Self::A,
                            4660u16 => Self::B,
                            _ => Err(crate::error::ErrorCode::Invalid)?,
                        })
                    }
                }

                impl TryFrom<&crate::tlv::TLVElement<'_>> for TestEnum {
                    type Error = crate::error::Error;

                    fn try_from(
                        element: &crate::tlv::TLVElement<'_>,
                    ) -> Result<Self, Self::Error> {
                        use crate::tlv::FromTLV;
                        Self::from_tlv(element)
                    }
                }
            )
        );
    }
}
