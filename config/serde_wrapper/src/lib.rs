//! `Deserialize` derive for structs loaded from environment variables.
//!
//! Configuration keys are read from variables like
//! `MIPSEMU_KERNEL_MAXCONTEXTS`, where `_` separates nesting levels. A field
//! named `max_contexts` therefore has to be looked up as `maxcontexts`. This
//! derive re-emits the struct with a `rename` attribute on every named field
//! and hands it to `serde::Deserialize`; the re-emitted copy is then dropped
//! so only the generated impl survives.

use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use syn::parse_macro_input;

#[proc_macro_derive(Deserialize, attributes(serde))]
pub fn derive_deserialize(input: TokenStream) -> TokenStream {
    let mut derive_input = parse_macro_input!(input as syn::DeriveInput);

    let attrs: TokenStream = quote! {
        #[derive(serde::Deserialize)]
        #[::serde_wrapper::discard]
    }
    .into();
    let new_attrs = parse_macro_input!(attrs with syn::Attribute::parse_outer);
    derive_input.attrs = [&new_attrs[..], &derive_input.attrs[..]].concat();

    let syn::Data::Struct(item) = &mut derive_input.data else {
        return derive_input.to_token_stream().into();
    };

    for field in item.fields.iter_mut() {
        let Some(ident) = &field.ident else {
            continue;
        };
        let key = env_key(&ident.to_string());
        if key.is_empty() {
            continue;
        }

        let rename: TokenStream = quote! {
            #[serde(rename = #key)]
        }
        .into();
        field
            .attrs
            .extend(parse_macro_input!(rename with syn::Attribute::parse_outer));
    }

    derive_input.to_token_stream().into()
}

/// Key under which `field` is found in the environment.
fn env_key(field: &str) -> String {
    field.replace('_', "").to_lowercase()
}

/// Not public API, do not use.
#[doc(hidden)]
#[proc_macro_attribute]
pub fn discard(_: TokenStream, _: TokenStream) -> TokenStream {
    TokenStream::new()
}
