use proc_macro2::{Literal, TokenStream};
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{
    Data, DeriveInput, Field, Fields, GenericArgument, Ident, LitStr, PathArguments, Type,
    Visibility,
};

/// Field-level `#[config(...)]` options.
#[derive(Default)]
struct FieldAttrs {
    name: Option<String>,
    skip: bool,
    flatten: bool,
    format: Option<String>,
    required: bool,
}

struct ConfigField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    attrs: FieldAttrs,
    visible: bool,
}

/// Implementation of `#[derive(Configurable)]`.
pub fn derive_configurable(input: &DeriveInput) -> syn::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Configurable cannot be derived for generic types",
        ));
    }
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "Configurable requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "Configurable can only be derived for structs",
            ));
        }
    };

    let mut entries = Vec::new();
    for field in fields {
        if let Some(entry) = config_field(field)? {
            entries.push(entry);
        }
    }

    Ok(generate(&input.ident, &entries))
}

fn config_field(field: &Field) -> syn::Result<Option<ConfigField<'_>>> {
    let attrs = parse_field_attrs(field)?;
    let Some(ident) = field.ident.as_ref() else {
        return Ok(None);
    };
    if attrs.skip || attrs.name.as_deref() == Some("-") || is_opaque(&field.ty) {
        return Ok(None);
    }
    let visible = matches!(field.vis, Visibility::Public(_));
    if !visible && attrs.name.is_none() && !attrs.flatten {
        return Ok(None);
    }
    Ok(Some(ConfigField {
        ident,
        ty: &field.ty,
        attrs,
        visible,
    }))
}

fn parse_field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("config") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.name = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("format") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.format = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else if meta.path.is_ident("flatten") {
                attrs.flatten = true;
                Ok(())
            } else if meta.path.is_ident("required") {
                attrs.required = true;
                Ok(())
            } else {
                Err(meta.error("expected one of: name, skip, flatten, format, required"))
            }
        })?;
    }
    if attrs.name.as_deref() == Some("") {
        return Err(syn::Error::new(field.span(), "config name cannot be empty"));
    }
    Ok(attrs)
}

/// Callable and trait-object fields carry behaviour, not configuration.
fn is_opaque(ty: &Type) -> bool {
    match ty {
        Type::BareFn(_) | Type::TraitObject(_) | Type::ImplTrait(_) => true,
        Type::Paren(inner) => is_opaque(&inner.elem),
        Type::Group(inner) => is_opaque(&inner.elem),
        Type::Path(path) => {
            let Some(segment) = path.path.segments.last() else {
                return false;
            };
            let wrapper = matches!(
                segment.ident.to_string().as_str(),
                "Box" | "Arc" | "Rc" | "Option" | "Mutex" | "RwLock"
            );
            if !wrapper {
                return false;
            }
            let PathArguments::AngleBracketed(args) = &segment.arguments else {
                return false;
            };
            args.args.iter().any(|arg| match arg {
                GenericArgument::Type(inner) => is_opaque(inner),
                _ => false,
            })
        }
        _ => false,
    }
}

fn optional_str(value: Option<&str>) -> TokenStream {
    match value {
        Some(value) => quote!(::core::option::Option::Some(#value)),
        None => quote!(::core::option::Option::None),
    }
}

fn generate(ident: &Ident, entries: &[ConfigField<'_>]) -> TokenStream {
    let type_name = ident.to_string();
    let count = entries.len();

    let descriptors = entries.iter().map(|entry| {
        let declared = entry.ident.to_string();
        let declared = declared.trim_start_matches("r#");
        let rename = optional_str(entry.attrs.name.as_deref());
        let format = optional_str(entry.attrs.format.as_deref());
        let visible = entry.visible;
        let embedded = entry.attrs.flatten;
        let required = entry.attrs.required;
        let ty = entry.ty;
        quote_spanned! {ty.span()=>
            ::tally_core::FieldDescriptor {
                ident: #declared,
                rename: #rename,
                visible: #visible,
                embedded: #embedded,
                format: #format,
                required: #required,
                shape: <#ty as ::tally_core::Describe>::shape,
            }
        }
    });

    let reads = entries.iter().enumerate().map(|(index, entry)| {
        let index = Literal::usize_unsuffixed(index);
        let field = entry.ident;
        quote! {
            #index => ::core::option::Option::Some(&self.#field as &dyn ::tally_core::ConfigValue)
        }
    });

    let writes = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.visible)
        .map(|(index, entry)| {
            let index = Literal::usize_unsuffixed(index);
            let field = entry.ident;
            quote! {
                #index => ::core::option::Option::Some(&mut self.#field as &mut dyn ::tally_core::ConfigValue)
            }
        });

    quote! {
        const _: () = {
            static FIELDS: [::tally_core::FieldDescriptor; #count] = [#(#descriptors),*];

            static DESCRIPTOR: ::tally_core::ObjectDescriptor = ::tally_core::ObjectDescriptor {
                type_name: #type_name,
                fields: &FIELDS,
                construct: ::tally_core::descriptor::construct::<#ident>,
            };

            impl ::tally_core::Describe for #ident {
                fn shape() -> ::tally_core::Shape {
                    ::tally_core::Shape::Object(&DESCRIPTOR)
                }
            }

            impl ::tally_core::ConfigValue for #ident {
                fn assign(
                    &mut self,
                    source: &::tally_core::__private::Value,
                ) -> ::core::result::Result<(), ::tally_core::BindError> {
                    ::tally_core::assign_object(self, source)
                }

                fn snapshot(&self) -> ::tally_core::__private::Value {
                    ::tally_core::__private::snapshot_object(self)
                }

                fn is_zero(&self) -> bool {
                    ::tally_core::__private::is_zero_object(self)
                }

                fn as_configurable(&self) -> ::core::option::Option<&dyn ::tally_core::Configurable> {
                    ::core::option::Option::Some(self)
                }

                fn as_configurable_mut(
                    &mut self,
                ) -> ::core::option::Option<&mut dyn ::tally_core::Configurable> {
                    ::core::option::Option::Some(self)
                }
            }

            impl ::tally_core::Configurable for #ident {
                fn descriptor(&self) -> &'static ::tally_core::ObjectDescriptor {
                    &DESCRIPTOR
                }

                #[allow(clippy::match_single_binding)]
                fn field(&self, index: usize) -> ::core::option::Option<&dyn ::tally_core::ConfigValue> {
                    match index {
                        #(#reads,)*
                        _ => ::core::option::Option::None,
                    }
                }

                #[allow(clippy::match_single_binding)]
                fn field_mut(
                    &mut self,
                    index: usize,
                ) -> ::core::option::Option<&mut dyn ::tally_core::ConfigValue> {
                    match index {
                        #(#writes,)*
                        _ => ::core::option::Option::None,
                    }
                }
            }
        };
    }
}
