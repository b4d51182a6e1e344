//! Derive macro generating `Encode` and `Decode` implementations.
//!
//! Fields are serialized in declaration order with the crate's canonical
//! binary format (fixed-width integers little-endian, big integers as
//! length-prefixed big-endian magnitudes). Enum variants are prefixed with a
//! u8 discriminant taken from explicit values when present, auto-incremented
//! otherwise.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DataEnum, DeriveInput, Fields};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data),
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "BinaryCodec does not support unions")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(
                input: &mut &[u8],
            ) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Encode/decode bodies for a struct of any field shape.
fn struct_bodies(fields: &Fields) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    match fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            let encode = quote! {
                #(crate::types::encoding::Encode::encode(&self.#names, out);)*
            };
            let decode = quote! {
                Ok(Self {
                    #(#names: crate::types::encoding::Decode::decode(input)?,)*
                })
            };
            (encode, decode)
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<_> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
            let decodes = indices
                .iter()
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)?, });
            let encode = quote! {
                #(crate::types::encoding::Encode::encode(&self.#indices, out);)*
            };
            let decode = quote! { Ok(Self(#(#decodes)*)) };
            (encode, decode)
        }
        Fields::Unit => (quote! {}, quote! { Ok(Self) }),
    }
}

/// Encode/decode bodies for an enum: u8 tag then the variant's fields.
fn enum_bodies(data: &DataEnum) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    let tags = variant_tags(data);

    let encode_arms = data.variants.iter().zip(&tags).map(|(variant, &tag)| {
        let ident = &variant.ident;
        match &variant.fields {
            Fields::Unit => quote! {
                Self::#ident => crate::types::encoding::Encode::encode(&#tag, out),
            },
            Fields::Unnamed(fields) => {
                let binds: Vec<_> = (0..fields.unnamed.len())
                    .map(|i| quote::format_ident!("f{}", i))
                    .collect();
                quote! {
                    Self::#ident(#(#binds),*) => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #(crate::types::encoding::Encode::encode(#binds, out);)*
                    }
                }
            }
            Fields::Named(fields) => {
                let binds: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                quote! {
                    Self::#ident { #(#binds),* } => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #(crate::types::encoding::Encode::encode(#binds, out);)*
                    }
                }
            }
        }
    });

    let decode_arms = data.variants.iter().zip(&tags).map(|(variant, &tag)| {
        let ident = &variant.ident;
        match &variant.fields {
            Fields::Unit => quote! { #tag => Ok(Self::#ident), },
            Fields::Unnamed(fields) => {
                let decodes = (0..fields.unnamed.len())
                    .map(|_| quote! { crate::types::encoding::Decode::decode(input)?, });
                quote! { #tag => Ok(Self::#ident(#(#decodes)*)), }
            }
            Fields::Named(fields) => {
                let decodes = fields.named.iter().map(|f| {
                    let name = &f.ident;
                    quote! { #name: crate::types::encoding::Decode::decode(input)?, }
                });
                quote! { #tag => Ok(Self::#ident { #(#decodes)* }), }
            }
        }
    });

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::InvalidValue),
        }
    };
    (encode, decode)
}

/// Discriminant per variant: explicit `= N` values respected, otherwise the
/// previous tag plus one, starting at zero.
fn variant_tags(data: &DataEnum) -> Vec<u8> {
    let mut tags = Vec::with_capacity(data.variants.len());
    let mut next: u8 = 0;
    for variant in &data.variants {
        let tag = match &variant.discriminant {
            Some((_, syn::Expr::Lit(lit))) => match &lit.lit {
                syn::Lit::Int(int) => int.base10_parse::<u8>().expect("discriminant must fit u8"),
                _ => panic!("discriminant must be an integer literal"),
            },
            Some(_) => panic!("discriminant must be an integer literal"),
            None => next,
        };
        tags.push(tag);
        next = tag.wrapping_add(1);
    }
    tags
}
