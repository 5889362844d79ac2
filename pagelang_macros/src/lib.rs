use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, Pat, Type, parse_macro_input};

/// Derive a `Builtin` implementation from a single-parameter function.
///
/// The parameter receives the call argument (the value after the backtick
/// in `name`arg`). Type validation is generated from the parameter type,
/// and the generated struct is named after the function in PascalCase with
/// a `Builtin` suffix (`fn page_title` becomes `PageTitleBuiltin`).
///
/// # Attribute syntax
///
/// ```ignore
/// #[builtin(name = "upper")]
/// ```
///
/// # Supported parameter types
/// - `Value`: accepts any value, including `Empty`
/// - `String`: validates the argument is a string, passes the inner String
/// - `Vec<Value>`: validates the argument is a list, passes the inner Vec
/// - `Node`: validates the argument is a render-tree node
///
/// # Example
/// ```ignore
/// #[builtin(name = "upper")]
/// fn upper(text: String) -> Result<Value, EvalError> {
///     Ok(Value::Str(text.to_uppercase()))
/// }
///
/// registry.register_builtin(UpperBuiltin);
/// ```
#[proc_macro_attribute]
pub fn builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as BuiltinArgs);
    let input_fn = parse_macro_input!(item as ItemFn);

    let fn_name = &input_fn.sig.ident;
    let vis = &input_fn.vis;
    let attrs = &input_fn.attrs;
    let struct_name = format_ident!("{}Builtin", to_pascal_case(&fn_name.to_string()));
    let builtin_name = &args.name;

    let params: Vec<_> = input_fn
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => Some(pat_type),
            FnArg::Receiver(_) => None,
        })
        .collect();

    if params.len() != 1 || input_fn.sig.inputs.len() != 1 {
        return syn::Error::new_spanned(
            &input_fn.sig.inputs,
            "a builtin takes exactly one parameter: the call argument",
        )
        .to_compile_error()
        .into();
    }

    let pat_type = params[0];
    let Pat::Ident(ident) = &*pat_type.pat else {
        return syn::Error::new_spanned(&pat_type.pat, "expected a plain parameter name")
            .to_compile_error()
            .into();
    };
    let param_name = &ident.ident;

    let Some((extraction, value_type, rust_type)) =
        generate_extraction(param_name, &pat_type.ty, builtin_name)
    else {
        return syn::Error::new_spanned(
            &pat_type.ty,
            "unsupported parameter type, expected `Value`, `String`, `Vec<Value>`, or `Node`",
        )
        .to_compile_error()
        .into();
    };

    let fn_body = &input_fn.block;

    let output = quote! {
        #(#attrs)*
        #vis struct #struct_name;

        impl #struct_name {
            fn execute(#param_name: #rust_type) -> Result<pagelang::Value, pagelang::EvalError> {
                #fn_body
            }
        }

        impl pagelang::registry::Builtin for #struct_name {
            fn call(&self, arg: pagelang::Value) -> Result<pagelang::Value, pagelang::EvalError> {
                #extraction
                Self::execute(#param_name)
            }

            fn signature(&self) -> pagelang::registry::BuiltinSignature {
                pagelang::registry::BuiltinSignature {
                    name: #builtin_name.to_string(),
                    param: #value_type,
                }
            }
        }
    };

    output.into()
}

/// Returns (extraction_code, value_type_token, rust_type_token), or `None`
/// for a parameter type the macro cannot validate.
fn generate_extraction(
    ident: &syn::Ident,
    ty: &Type,
    builtin_name: &str,
) -> Option<(
    proc_macro2::TokenStream,
    proc_macro2::TokenStream,
    proc_macro2::TokenStream,
)> {
    let type_str = quote!(#ty).to_string().replace(' ', "");

    // Same wording as the evaluator's own signature check.
    let mismatch = |expected: proc_macro2::TokenStream| {
        quote! {
            return Err(pagelang::EvalError::builtin_argument(
                #builtin_name,
                #expected.name(),
                other.type_name(),
            ))
        }
    };

    let generated = match type_str.as_str() {
        "Value" | "pagelang::Value" => (
            quote! {
                let #ident = arg;
            },
            quote! { pagelang::registry::ValueType::Any },
            quote! { pagelang::Value },
        ),
        "String" => {
            let fail = mismatch(quote! { pagelang::registry::ValueType::Str });
            (
                quote! {
                    let #ident = match arg {
                        pagelang::Value::Str(s) => s,
                        other => #fail,
                    };
                },
                quote! { pagelang::registry::ValueType::Str },
                quote! { String },
            )
        }
        "Vec<Value>" | "Vec<pagelang::Value>" => {
            let fail = mismatch(quote! { pagelang::registry::ValueType::List });
            (
                quote! {
                    let #ident = match arg {
                        pagelang::Value::List(items) => items,
                        other => #fail,
                    };
                },
                quote! { pagelang::registry::ValueType::List },
                quote! { Vec<pagelang::Value> },
            )
        }
        "Node" | "pagelang::Node" => {
            let fail = mismatch(quote! { pagelang::registry::ValueType::Node });
            (
                quote! {
                    let #ident = match arg {
                        pagelang::Value::Node(n) => n,
                        other => #fail,
                    };
                },
                quote! { pagelang::registry::ValueType::Node },
                quote! { pagelang::Node },
            )
        }
        _ => return None,
    };

    Some(generated)
}

fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

// -- Attribute arg parsing -----------------------------------------------

struct BuiltinArgs {
    name: String,
}

impl syn::parse::Parse for BuiltinArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let ident: syn::Ident = input.parse()?;
        if ident != "name" {
            return Err(syn::Error::new(
                ident.span(),
                format!("unexpected key `{ident}`, expected `name`"),
            ));
        }
        input.parse::<syn::Token![=]>()?;
        let lit: syn::LitStr = input.parse()?;
        if !input.is_empty() {
            input.parse::<syn::Token![,]>()?;
        }
        if !input.is_empty() {
            return Err(input.error("expected only `name = \"...\"`"));
        }
        Ok(BuiltinArgs { name: lit.value() })
    }
}
