use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Ident, ItemStruct, LitStr, Token};

/// Arguments of `#[register_plugin(category, "name")]`.
pub struct RegisterArgs {
    category: Ident,
    name: LitStr,
}

impl Parse for RegisterArgs {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let category = input.parse()?;
        input.parse::<Token![,]>()?;
        let name = input.parse()?;
        Ok(Self { category, name })
    }
}

/// Implementation of `#[register_plugin(category, "name")]`.
///
/// Leaves the decorated struct unchanged and appends a
/// `#[::tally_framework::linkme::distributed_slice]` static that adds a
/// factory for it to the category's registry in `tally-framework`.
pub fn register_plugin(args: RegisterArgs, item: ItemStruct) -> syn::Result<TokenStream> {
    let RegisterArgs { category, name } = args;

    let (slice, plugin_trait) = match category.to_string().as_str() {
        "inputs" => (quote!(INPUT_REGISTRY), quote!(Input)),
        "outputs" => (quote!(OUTPUT_REGISTRY), quote!(Output)),
        "processors" => (quote!(PROCESSOR_REGISTRY), quote!(Processor)),
        "aggregators" => (quote!(AGGREGATOR_REGISTRY), quote!(Aggregator)),
        other => {
            return Err(syn::Error::new(
                category.span(),
                format!(
                    "unknown plugin category `{other}`, \
                     expected one of: inputs, outputs, processors, aggregators"
                ),
            ));
        }
    };

    let plugin_name = name.value();
    if plugin_name.is_empty() || plugin_name.contains('.') {
        return Err(syn::Error::new(
            name.span(),
            "plugin name must be non-empty and must not contain '.'",
        ));
    }

    let ty = &item.ident;
    let static_name = Ident::new(
        &format!(
            "_TALLY_REGISTER_{}_{}",
            category.to_string().to_uppercase(),
            ty.to_string().to_uppercase()
        ),
        Span::call_site(),
    );

    Ok(quote! {
        #item

        #[::tally_framework::linkme::distributed_slice(::tally_framework::plugin::#slice)]
        #[linkme(crate = ::tally_framework::linkme)]
        static #static_name: ::tally_framework::plugin::Registration<
            ::tally_framework::plugin::Factory<dyn ::tally_framework::plugin::#plugin_trait>,
        > = ::tally_framework::plugin::Registration {
            name: #name,
            create: || -> ::std::boxed::Box<dyn ::tally_framework::plugin::#plugin_trait> {
                ::std::boxed::Box::new(<#ty as ::core::default::Default>::default())
            },
        };
    })
}
