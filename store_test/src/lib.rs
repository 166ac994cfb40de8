use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Turn a function into a test against a fresh in-memory store, with
/// logging initialised.
///
/// Injectable dependencies are `MemoryStore` and, if a phase is given as
/// in `#[store_test(voting)]`, the example `Election` already inserted
/// into the store in that phase with the example credentials registered.
#[proc_macro_attribute]
pub fn store_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let phase = parse_macro_input!(args as Option<Ident>);

    // Map the phase argument onto an `ElectionPhase` variant.
    let phase = match phase.map(|arg| phase_variant(&arg)).transpose() {
        Ok(phase) => phase,
        Err(err) => return err.into_compile_error().into(),
    };

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(&item_fn.sig, phase.is_some()) {
        Ok(args) => args,
        Err(err) => return err.into_compile_error().into(),
    };

    // Rename the body so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_body", name);
    item_fn.sig.ident = new_name.clone();

    let maybe_election = phase
        .map(|variant| {
            quote! {
                #[allow(unused_variables)]
                let election = crate::model::election::Election::example_in(
                    &store,
                    crate::model::election::ElectionPhase::#variant,
                );
            }
        })
        .unwrap_or_default();

    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["icelect"], None, None);

            let store = crate::model::store::MemoryStore::new();
            #maybe_election

            #new_name(#(#test_args),*);
        }
    }
    .into()
}

fn phase_variant(arg: &Ident) -> Result<Ident, syn::Error> {
    let variant = match arg.to_string().as_str() {
        "init" => "Init",
        "voting" => "Voting",
        "counting" => "Counting",
        "results" => "Results",
        _ => {
            return Err(syn::Error::new(
                arg.span(),
                "Expected one of `init`, `voting`, `counting` or `results`",
            ))
        }
    };
    Ok(Ident::new(variant, arg.span()))
}

/// Ensure the wrapped test is synchronous, and map its parameters onto the
/// injected values.
fn check_sig(sig: &Signature, has_election: bool) -> Result<Vec<TokenStream2>, syn::Error> {
    if let Some(asyncness) = sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "Store tests are synchronous, remove `async`",
        ));
    }

    let mut has_store = false;
    let mut wants_election = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.get_ident() {
                    if type_ident == "MemoryStore" {
                        if has_store {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `MemoryStore`",
                            ));
                        }
                        has_store = true;
                        args.push(quote! { store });
                        continue;
                    } else if type_ident == "Election" {
                        if !has_election {
                            return Err(syn::Error::new(
                                input.span(),
                                "An `Election` needs a phase, e.g. `#[store_test(voting)]`",
                            ));
                        }
                        if wants_election {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Election`",
                            ));
                        }
                        wants_election = true;
                        args.push(quote! { election });
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `store_ident: MemoryStore` or `election_ident: Election`",
        ));
    }

    Ok(args)
}
