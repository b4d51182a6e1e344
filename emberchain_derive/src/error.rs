//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations
//! from `#[error("...")]` attributes. Supports `{0}`-style positional
//! interpolation on tuple variants and `{name}` interpolation on struct
//! variants.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let display_body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let ident = &variant.ident;
                    let message = error_message(&variant.attrs, ident)?;
                    let arm = match &variant.fields {
                        Fields::Unit => quote! {
                            Self::#ident => write!(f, #message),
                        },
                        Fields::Unnamed(fields) => {
                            let binds: Vec<_> = (0..fields.unnamed.len())
                                .map(|i| quote::format_ident!("f{}", i))
                                .collect();
                            let message = positional_to_named(&message, binds.len());
                            quote! {
                                Self::#ident(#(#binds),*) =>
                                    write!(f, #message, #(#binds = #binds),*),
                            }
                        }
                        Fields::Named(fields) => {
                            let binds: Vec<_> =
                                fields.named.iter().map(|f| &f.ident).collect();
                            quote! {
                                Self::#ident { #(#binds),* } =>
                                    write!(f, #message, #(#binds = #binds),*),
                            }
                        }
                    };
                    Ok(arm)
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(_) => {
            let message = error_message(&input.attrs, &input.ident)?;
            quote! { write!(f, #message) }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(input, "Error does not support unions"));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Pulls the string literal out of an `#[error("...")]` attribute.
fn error_message(attrs: &[syn::Attribute], target: &syn::Ident) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        if let Meta::List(list) = &attr.meta {
            if let Ok(Lit::Str(lit)) = syn::parse2::<Lit>(list.tokens.clone()) {
                return Ok(lit.value());
            }
        }
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")] with a string literal",
        ));
    }
    Err(syn::Error::new_spanned(
        target,
        format!("missing #[error(\"...\")] attribute on `{}`", target),
    ))
}

/// Rewrites `{0}`, `{1}` to the `{f0}`, `{f1}` names the match arm binds.
fn positional_to_named(message: &str, field_count: usize) -> String {
    let mut rewritten = message.to_string();
    for i in (0..field_count).rev() {
        rewritten = rewritten.replace(&format!("{{{}}}", i), &format!("{{f{}}}", i));
    }
    rewritten
}
