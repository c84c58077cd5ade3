//! # evframe Derive Macros
//!
//! This crate provides `#[derive(Archivable)]` for `evframe`. It writes the
//! save/load pair for a struct field by field, in declaration order.
//!
//! Type-level options go in `#[archive(...)]` on the struct:
//! - `key = "Name"`: the stable type key (defaults to the struct name).
//! - `version = N`: the current schema version (defaults to 0).
//! - `untracked`: instances are not deduplicated within an archive.
//!
//! Field-level options:
//! - `since = N`: the field was added in schema version `N`; records of an
//!   older version load it as `Default::default()`.
//! - `skip`: never written; always loaded as `Default::default()`.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitInt, LitStr, parse_macro_input};

/// Derives `evframe::archive::Archivable`.
#[proc_macro_derive(Archivable, attributes(archive))]
pub fn derive_archivable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct TypeOptions {
    key: String,
    version: u32,
    tracked: bool,
}

#[derive(Default)]
struct FieldOptions {
    since: Option<u32>,
    skip: bool,
}

struct FieldSpec {
    // `None` for tuple structs.
    ident: Option<syn::Ident>,
    ty: syn::Type,
    options: FieldOptions,
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let data_struct = match &input.data {
        Data::Struct(ds) => ds,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "Archivable can only be derived for structs",
            ));
        }
    };

    let options = parse_type_attributes(&input.attrs, &name.to_string())?;

    let mut fields = Vec::new();
    for field in data_struct.fields.iter() {
        let field_options = parse_field_attributes(&field.attrs)?;
        if let Some(since) = field_options.since
            && since > options.version
        {
            return Err(syn::Error::new_spanned(
                field,
                format!(
                    "field introduced in version {since} but the type is at version {}",
                    options.version
                ),
            ));
        }
        fields.push(FieldSpec {
            ident: field.ident.clone(),
            ty: field.ty.clone(),
            options: field_options,
        });
    }

    let save = generate_save(&fields);
    let load = generate_load(&data_struct.fields, &fields);

    let key = &options.key;
    let version = options.version;
    let tracked = options.tracked;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics evframe::archive::Archivable for #name #ty_generics #where_clause {
            const TYPE_KEY: &'static str = #key;
            const VERSION: u32 = #version;
            const TRACKED: bool = #tracked;

            fn save(&self, ar: &mut evframe::archive::OutputArchive<'_>) -> evframe::Result<()> {
                #save
                Ok(())
            }

            #[allow(unused_variables)]
            fn load(
                ar: &mut evframe::archive::InputArchive<'_>,
                version: u32,
            ) -> evframe::Result<Self> {
                #load
            }
        }
    })
}

fn parse_type_attributes(attrs: &[Attribute], default_key: &str) -> syn::Result<TypeOptions> {
    let mut options = TypeOptions {
        key: default_key.to_string(),
        version: 0,
        tracked: true,
    };

    for attr in attrs {
        if !attr.path().is_ident("archive") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                let s: LitStr = meta.value()?.parse()?;
                if s.value().is_empty() {
                    return Err(meta.error("type key must not be empty"));
                }
                options.key = s.value();
                return Ok(());
            }

            if meta.path.is_ident("version") {
                let n: LitInt = meta.value()?.parse()?;
                options.version = n.base10_parse()?;
                return Ok(());
            }

            if meta.path.is_ident("untracked") {
                options.tracked = false;
                return Ok(());
            }

            Err(meta.error("Unknown archive attribute key. Supported: key, version, untracked"))
        })?;
    }
    Ok(options)
}

fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("archive") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("since") {
                let n: LitInt = meta.value()?.parse()?;
                options.since = Some(n.base10_parse()?);
                return Ok(());
            }

            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }

            Err(meta.error("Unknown archive field attribute. Supported: since, skip"))
        })?;
    }
    Ok(options)
}

fn field_access(index: usize, field: &FieldSpec) -> proc_macro2::TokenStream {
    match &field.ident {
        Some(ident) => quote! { self.#ident },
        None => {
            let index = syn::Index::from(index);
            quote! { self.#index }
        }
    }
}

fn generate_save(fields: &[FieldSpec]) -> proc_macro2::TokenStream {
    let writes = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.options.skip)
        .map(|(i, f)| {
            let access = field_access(i, f);
            quote! { ar.write(&#access)?; }
        });
    quote! { #(#writes)* }
}

fn generate_load(shape: &Fields, fields: &[FieldSpec]) -> proc_macro2::TokenStream {
    let locals: Vec<syn::Ident> = (0..fields.len())
        .map(|i| quote::format_ident!("__field{}", i))
        .collect();

    let reads = fields.iter().zip(&locals).map(|(f, local)| {
        let ty = &f.ty;
        if f.options.skip {
            return quote! { let #local: #ty = ::core::default::Default::default(); };
        }
        match f.options.since {
            Some(since) => quote! {
                let #local: #ty = if version >= #since {
                    ar.read()?
                } else {
                    ::core::default::Default::default()
                };
            },
            None => quote! { let #local: #ty = ar.read()?; },
        }
    });

    let construct = match shape {
        Fields::Named(_) => {
            let names = fields.iter().filter_map(|f| f.ident.as_ref());
            quote! { Self { #(#names: #locals),* } }
        }
        Fields::Unnamed(_) => quote! { Self(#(#locals),*) },
        Fields::Unit => quote! { Self },
    };

    quote! {
        #(#reads)*
        Ok(#construct)
    }
}
