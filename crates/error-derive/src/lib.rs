use proc_macro::TokenStream;
use quote::quote;

/// Derives [Display](std::fmt::Display) and [Error](std::error::Error) for an enum.
///
/// Every variant needs a `#[msg = "..."]` attribute. Variants may either be units
/// or carry exactly one unnamed field. The message may refer to that field as `{0}`.
///
/// A field marked with `#[source]` is returned from `Error::source`.
/// A field marked with `#[from]` is additionally convertible into the enum.
#[proc_macro_derive(Error, attributes(msg, source, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    let item: syn::ItemEnum = syn::parse(input).expect("Could not parse input as enum");

    let name = item.ident;
    let mut variant_displays = vec![];
    let mut from_impls = vec![];
    let mut variant_sources = vec![];

    for variant in &item.variants {
        let ident = &variant.ident;

        let Some(message) = message_of(&variant.attrs) else {
            panic!("{ident} needs a #[msg = \"...\"] attribute");
        };
        let interpolates_field = message.value().contains("{0}");

        match &variant.fields {
            syn::Fields::Unit => {
                if interpolates_field {
                    panic!("{ident} has no field to interpolate");
                }
                variant_displays.push(quote!(Self::#ident => ::std::fmt::Display::fmt(#message, f)));
            },
            syn::Fields::Unnamed(unnamed_fields) => {
                if unnamed_fields.unnamed.len() != 1 {
                    panic!("Need exactly one field");
                }

                let field = &unnamed_fields.unnamed[0];
                let ty = &field.ty;
                let is_from = has_marker(&field.attrs, "from");
                let is_source = is_from || has_marker(&field.attrs, "source");

                if is_from {
                    from_impls.push(quote!(
                        #[automatically_derived]
                        impl From<#ty> for #name {
                            fn from(value: #ty) -> Self {
                                Self::#ident(value)
                            }
                        }
                    ));
                }

                if is_source {
                    variant_sources.push(quote!(Self::#ident(value) => Some(value)));
                }

                if interpolates_field {
                    variant_displays.push(quote!(Self::#ident(value) => write!(f, #message, value)));
                } else {
                    variant_displays.push(quote!(Self::#ident(_) => ::std::fmt::Display::fmt(#message, f)));
                }
            },
            syn::Fields::Named(_) => panic!("named fields are not allowed"),
        }
    }

    quote!(
        #[automatically_derived]
        impl ::std::fmt::Display for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> Result<(), ::std::fmt::Error> {
                match self {
                    #(
                        #variant_displays,
                    )*
                }
            }
        }

        #(
            #from_impls
        )*

        #[automatically_derived]
        impl ::std::error::Error for #name {
            fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
                match self {
                    #(
                        #variant_sources,
                    )*
                    _ => None,
                }
            }
        }
    )
    .into()
}

fn message_of(attrs: &[syn::Attribute]) -> Option<syn::LitStr> {
    attrs
        .iter()
        .flat_map(|attr| match &attr.meta {
            syn::Meta::NameValue(name_value) => Some(name_value),
            _ => None,
        })
        .find(|name_value| name_value.path.is_ident("msg"))
        .and_then(|name_value| match &name_value.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(message),
                ..
            }) => Some(message.clone()),
            _ => None,
        })
}

fn has_marker(attrs: &[syn::Attribute], marker: &str) -> bool {
    attrs.iter().any(|attr| match &attr.meta {
        syn::Meta::Path(path) => path.is_ident(marker),
        _ => false,
    })
}
