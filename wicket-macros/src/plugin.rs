//! The `#[plugin]` attribute.
//!
//! Accepts three item shapes:
//! - `impl Plugin for T { .. }`: adds an exact `implemented()` set
//! - `impl T { .. }`: generates `impl Plugin for T` forwarding each hook method
//! - `mod m { .. }`: generates `m::Functions` forwarding to the module's hook functions

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{
    FnArg, Ident, ImplItem, Item, ItemImpl, ItemMod, LitStr, Signature, Token,
    parse::{Parse, ParseStream},
    parse_quote,
};

/// Hook method names, the trait method they bind to, and the flag constant.
const HOOKS: &[(&str, &str, &str)] = &[
    ("start_request", "start_request", "START_REQUEST"),
    ("check_access", "check_access", "CHECK_ACCESS"),
    ("after_check_access", "after_check_access", "AFTER_CHECK_ACCESS"),
    ("read_input", "read_input", "READ_INPUT"),
    ("normalize_input", "normalize_input", "NORMALIZE_INPUT"),
    ("process_input", "normalize_input", "NORMALIZE_INPUT"),
    ("validate_input", "validate_input", "VALIDATE_INPUT"),
    ("call_function", "call_function", "CALL_FUNCTION"),
    ("process_output", "process_output", "PROCESS_OUTPUT"),
    ("create_response", "create_response", "CREATE_RESPONSE"),
    ("process_error", "process_error", "PROCESS_ERROR"),
    ("process_response", "process_response", "PROCESS_RESPONSE"),
    ("end_request", "end_request", "END_REQUEST"),
];

fn lookup(name: &str) -> Option<(&'static str, &'static str)> {
    HOOKS
        .iter()
        .find(|(method, _, _)| *method == name)
        .map(|(_, target, flag)| (*target, *flag))
}

/// Arguments for `#[plugin]`.
pub(crate) struct PluginArgs {
    /// Name reported by `Plugin::name`.
    name: Option<LitStr>,
    /// Struct generated for the module shape.
    ident: Option<Ident>,
}

impl Parse for PluginArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut name = None;
        let mut ident = None;

        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match key.to_string().as_str() {
                "name" => name = Some(input.parse()?),
                "ident" => ident = Some(input.parse()?),
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown attribute: {}", other),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(PluginArgs { name, ident })
    }
}

/// A hook found on the annotated item.
struct Bound {
    /// The user's method or function.
    source: Ident,
    /// The `Plugin` method it implements.
    target: Ident,
    flag: Ident,
    is_async: bool,
    has_receiver: bool,
}

pub(crate) fn expand(args: PluginArgs, item: Item) -> syn::Result<TokenStream> {
    match item {
        Item::Impl(imp) if imp.trait_.is_some() => expand_trait_impl(args, imp),
        Item::Impl(imp) => expand_inherent_impl(args, imp),
        Item::Mod(module) => expand_module(args, module),
        other => Err(syn::Error::new_spanned(
            other,
            "#[plugin] expects an `impl` block or an inline module",
        )),
    }
}

fn collect<'a>(sigs: impl Iterator<Item = &'a Signature>) -> syn::Result<Vec<Bound>> {
    let mut bound: Vec<Bound> = Vec::new();
    for sig in sigs {
        let Some((target, flag)) = lookup(&sig.ident.to_string()) else {
            continue;
        };
        if let Some(previous) = bound.iter().find(|b| b.target == target) {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                format!("`{}` and `{}` both implement `{}`", previous.source, sig.ident, target),
            ));
        }
        bound.push(Bound {
            source: sig.ident.clone(),
            target: Ident::new(target, sig.ident.span()),
            flag: Ident::new(flag, Span::call_site()),
            is_async: sig.asyncness.is_some(),
            has_receiver: matches!(sig.inputs.first(), Some(FnArg::Receiver(_))),
        });
    }
    Ok(bound)
}

fn implemented(bound: &[Bound]) -> TokenStream {
    let flags = bound.iter().map(|b| &b.flag);
    quote! {
        fn implemented(&self) -> ::wicket::Hooks {
            ::wicket::Hooks::empty() #(| ::wicket::Hooks::#flags)*
        }
    }
}

fn name_fn(name: Option<&LitStr>) -> TokenStream {
    match name {
        Some(name) => quote! {
            fn name(&self) -> &'static str {
                #name
            }
        },
        None => TokenStream::new(),
    }
}

fn forwarders(bound: &[Bound], owner: TokenStream) -> Vec<TokenStream> {
    bound
        .iter()
        .map(|b| {
            let Bound { source, target, .. } = b;
            let call = if b.has_receiver {
                quote! { #owner #source(self, ctx) }
            } else {
                quote! { #owner #source(ctx) }
            };
            let body = if b.is_async {
                call
            } else {
                quote! { ::core::future::ready(#call) }
            };
            quote! {
                fn #target(
                    &self,
                    ctx: &mut ::wicket::Context,
                ) -> impl ::core::future::Future<Output = ::wicket::HookResult> + ::core::marker::Send {
                    #body
                }
            }
        })
        .collect()
}

fn expand_trait_impl(args: PluginArgs, mut imp: ItemImpl) -> syn::Result<TokenStream> {
    if let Some(ident) = &args.ident {
        return Err(syn::Error::new_spanned(
            ident,
            "`ident` only applies to modules",
        ));
    }
    let mut has_name = false;
    for item in &imp.items {
        if let ImplItem::Fn(f) = item {
            if f.sig.ident == "implemented" {
                return Err(syn::Error::new_spanned(
                    &f.sig.ident,
                    "#[plugin] computes `implemented` itself",
                ));
            }
            has_name |= f.sig.ident == "name";
        }
    }
    if has_name && args.name.is_some() {
        return Err(syn::Error::new_spanned(
            &args.name,
            "`name` is already defined in this impl",
        ));
    }

    let bound = collect(imp.items.iter().filter_map(|item| match item {
        ImplItem::Fn(f) => Some(&f.sig),
        _ => None,
    }))?;
    if let Some(alias) = bound.iter().find(|b| b.source != b.target) {
        return Err(syn::Error::new_spanned(
            &alias.source,
            format!("use `{}` inside a `Plugin` impl", alias.target),
        ));
    }

    let implemented = implemented(&bound);
    imp.items.push(parse_quote!(#implemented));
    if let Some(name) = args.name.as_ref() {
        let name = name_fn(Some(name));
        imp.items.push(parse_quote!(#name));
    }
    Ok(quote!(#imp))
}

fn expand_inherent_impl(args: PluginArgs, imp: ItemImpl) -> syn::Result<TokenStream> {
    if let Some(ident) = &args.ident {
        return Err(syn::Error::new_spanned(
            ident,
            "`ident` only applies to modules",
        ));
    }
    let bound = collect(imp.items.iter().filter_map(|item| match item {
        ImplItem::Fn(f) => Some(&f.sig),
        _ => None,
    }))?;

    let self_ty = &imp.self_ty;
    let (impl_generics, _, where_clause) = imp.generics.split_for_impl();
    let implemented = implemented(&bound);
    let name = name_fn(args.name.as_ref());
    let forwarders = forwarders(&bound, quote!(<#self_ty>::));

    Ok(quote! {
        #imp

        impl #impl_generics ::wicket::Plugin for #self_ty #where_clause {
            #implemented
            #name
            #(#forwarders)*
        }
    })
}

fn expand_module(args: PluginArgs, mut module: ItemMod) -> syn::Result<TokenStream> {
    let Some((_, items)) = module.content.as_mut() else {
        return Err(syn::Error::new_spanned(
            &module,
            "#[plugin] needs an inline module body",
        ));
    };

    let bound = collect(items.iter().filter_map(|item| match item {
        Item::Fn(f) => Some(&f.sig),
        _ => None,
    }))?;
    if let Some(method) = bound.iter().find(|b| b.has_receiver) {
        return Err(syn::Error::new_spanned(
            &method.source,
            "module hooks are free functions taking `&mut Context`",
        ));
    }

    let ident = args
        .ident
        .clone()
        .unwrap_or_else(|| format_ident!("Functions"));
    let default_name = LitStr::new(&module.ident.to_string(), module.ident.span());
    let name = name_fn(Some(args.name.as_ref().unwrap_or(&default_name)));
    let implemented = implemented(&bound);
    let forwarders = forwarders(&bound, TokenStream::new());
    let doc = format!(
        "Plugin generated by `#[plugin]` from the hook functions of `{}`.",
        module.ident
    );

    items.push(parse_quote! {
        #[doc = #doc]
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #ident;
    });
    items.push(parse_quote! {
        impl ::wicket::Plugin for #ident {
            #implemented
            #name
            #(#forwarders)*
        }
    });

    Ok(quote!(#module))
}
