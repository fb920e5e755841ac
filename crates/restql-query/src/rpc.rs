//! RPC overload resolution.
//!
//! A call supplies a set of argument names (from the query string or a JSON
//! body object) or an opaque payload. Matching order: exact name-set match
//! among overloads first, then the single-unnamed-parameter fallback gated
//! by the request content type. Ties fail with a multiple-choices error
//! rather than picking arbitrarily.

use crate::suggest;
use restql_core::{ApiError, ErrorCode};
use restql_schema::{Function, ResultKind, SchemaCache, Volatility, types};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcVerb {
    /// GET or HEAD; only allowed for stable/immutable functions.
    Get,
    Post,
}

/// How the chosen overload receives its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallArguments {
    /// Passed by name, one bind per argument.
    Named,
    /// The raw request body is the single unnamed parameter.
    RawBody,
}

#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub function: Function,
    pub arguments: CallArguments,
    /// Computed once here; the synthesizer shapes the response from it.
    pub result_kind: ResultKind,
}

/// Resolve a function call against the catalog.
///
/// `supplied` is the set of argument names present in the request, empty
/// when the request carries only an opaque payload (or nothing at all).
pub fn resolve_function(
    cache: &SchemaCache,
    schema: &str,
    name: &str,
    supplied: &[&str],
    content_type: Option<&str>,
    verb: RpcVerb,
) -> Result<ResolvedCall, ApiError> {
    let qualified = types::qualify(schema, name);
    let overloads = cache.functions_named(&qualified);
    if overloads.is_empty() {
        return Err(not_found(cache, &qualified, supplied, content_type));
    }

    let exact: Vec<&Function> = overloads
        .iter()
        .filter(|f| name_set_matches(f, supplied))
        .collect();
    let (function, arguments) = match exact.len() {
        1 => (exact[0], CallArguments::Named),
        0 => {
            let fallback: Vec<&Function> = overloads
                .iter()
                .filter(|f| unnamed_payload_matches(f, content_type))
                .collect();
            match fallback.len() {
                1 => (fallback[0], CallArguments::RawBody),
                0 => return Err(not_found(cache, &qualified, supplied, content_type)),
                _ => return Err(ambiguous(&fallback)),
            }
        }
        _ => return Err(ambiguous(&exact)),
    };

    if verb == RpcVerb::Get && function.volatility == Volatility::Volatile {
        return Err(ApiError::new(
            ErrorCode::RpcMethodNotAllowed,
            format!("Cannot use the GET method on the volatile function {qualified}"),
        ));
    }

    debug!(function = %function, ?arguments, "rpc overload resolved");
    Ok(ResolvedCall {
        function: function.clone(),
        arguments,
        result_kind: function.result_kind(),
    })
}

/// Every supplied name is an input argument, and every input argument
/// without a default is supplied.
fn name_set_matches(f: &Function, supplied: &[&str]) -> bool {
    let inputs: Vec<&str> = f.input_args().map(|a| a.name.as_str()).collect();
    supplied.iter().all(|s| inputs.contains(s))
        && f.input_args()
            .filter(|a| !a.has_default)
            .all(|a| supplied.contains(&a.name.as_str()))
}

/// Raw-payload fallback: one unnamed input parameter whose type the request
/// content type can feed.
fn unnamed_payload_matches(f: &Function, content_type: Option<&str>) -> bool {
    let Some(param_type) = f.single_unnamed_type() else {
        return false;
    };
    let media = content_type
        .and_then(|c| c.split(';').next())
        .map_or("application/json", str::trim);
    match media {
        "application/json" => matches!(param_type, "json" | "jsonb"),
        "text/plain" => param_type == "text",
        "text/xml" | "application/xml" => param_type == "xml",
        "application/octet-stream" => param_type == "bytea",
        _ => false,
    }
}

fn not_found(
    cache: &SchemaCache,
    qualified: &str,
    supplied: &[&str],
    content_type: Option<&str>,
) -> ApiError {
    let call = if supplied.is_empty() {
        // A raw-payload attempt names the function bare; a parameterless
        // call is reported as such.
        if content_type.is_some() {
            qualified.to_string()
        } else {
            format!("{qualified} without parameters")
        }
    } else {
        format!("{qualified}({})", supplied.join(", "))
    };
    let mut err = ApiError::new(
        ErrorCode::NoMatchingFunction,
        format!("Could not find the function {call} in the schema cache"),
    );
    let nearest = if cache.functions_named(qualified).is_empty() {
        suggest::nearest(qualified, cache.function_names()).map(str::to_string)
    } else {
        Some(qualified.to_string())
    };
    if let Some(best_name) = nearest
        && let Some(best) = best_overload(cache.functions_named(&best_name), supplied)
    {
        err = err.with_hint(format!(
            "Perhaps you meant to call the function {}",
            hint_signature(best, supplied)
        ));
    }
    err
}

/// The overload whose argument names overlap the supplied set the most;
/// fewer arguments, then signature text, break ties.
fn best_overload<'a>(overloads: &'a [Function], supplied: &[&str]) -> Option<&'a Function> {
    overloads.iter().min_by_key(|f| {
        let overlap = f
            .input_args()
            .filter(|a| supplied.contains(&a.name.as_str()))
            .count();
        (
            std::cmp::Reverse(overlap),
            f.input_args().count(),
            f.to_string(),
        )
    })
}

fn hint_signature(f: &Function, supplied: &[&str]) -> String {
    let names: Vec<&str> = f.input_args().map(|a| a.name.as_str()).collect();
    if names.is_empty() || supplied.is_empty() {
        f.qualified_name()
    } else {
        format!("{}({})", f.qualified_name(), names.join(", "))
    }
}

fn ambiguous(candidates: &[&Function]) -> ApiError {
    let mut signatures: Vec<String> = candidates.iter().map(|f| typed_signature(f)).collect();
    signatures.sort_unstable();
    ApiError::new(
        ErrorCode::AmbiguousFunction,
        format!(
            "Could not choose the best candidate function between: {}",
            signatures.join(", ")
        ),
    )
    .with_hint(
        "Try renaming the parameters or the function itself in the database so function overloading can be resolved",
    )
}

/// `schema.name(arg => type, ...)`, the form used in ambiguity messages.
fn typed_signature(f: &Function) -> String {
    let args: Vec<String> = f
        .input_args()
        .map(|a| format!("{} => {}", a.name, a.data_type))
        .collect();
    format!("{}({})", f.qualified_name(), args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use restql_schema::{ArgMode, FunctionArg};

    fn arg(name: &str, data_type: &str, has_default: bool) -> FunctionArg {
        FunctionArg {
            name: name.into(),
            data_type: data_type.into(),
            mode: ArgMode::In,
            has_default,
        }
    }

    fn function(name: &str, args: Vec<FunctionArg>, volatility: Volatility) -> Function {
        Function {
            schema: "api".into(),
            name: name.into(),
            args,
            return_type: "integer".into(),
            returns_set: false,
            returns_composite: false,
            volatility,
        }
    }

    fn fixture() -> SchemaCache {
        SchemaCache::builder()
            .function(function("sayhello", vec![arg("name", "text", false)], Volatility::Stable))
            .function(function(
                "add_them",
                vec![arg("a", "integer", false), arg("b", "integer", false)],
                Volatility::Immutable,
            ))
            .function(function(
                "add_them",
                vec![
                    arg("a", "integer", false),
                    arg("b", "integer", false),
                    arg("c", "integer", true),
                ],
                Volatility::Immutable,
            ))
            .function(function("ingest", vec![arg("", "json", false)], Volatility::Volatile))
            .function(function("ingest_b", vec![arg("", "json", false)], Volatility::Stable))
            .function(function("ingest_b", vec![arg("", "jsonb", false)], Volatility::Stable))
            .function(function("launch", vec![], Volatility::Volatile))
            .build()
    }

    #[test]
    fn test_exact_match_by_name_set() {
        let call =
            resolve_function(&fixture(), "api", "sayhello", &["name"], None, RpcVerb::Get)
                .unwrap();
        assert_eq!(call.arguments, CallArguments::Named);
        assert_eq!(call.function.name, "sayhello");
    }

    #[test]
    fn test_default_arg_makes_overloads_ambiguous() {
        // a,b satisfies both overloads (c has a default), a,b,c only one.
        let err = resolve_function(&fixture(), "api", "add_them", &["a", "b"], None, RpcVerb::Get);
        let call =
            resolve_function(&fixture(), "api", "add_them", &["a", "b", "c"], None, RpcVerb::Get)
                .unwrap();
        assert_eq!(call.function.args.len(), 3);
        let err = err.unwrap_err();
        assert_eq!(err.code, ErrorCode::AmbiguousFunction);
        assert!(err.message.contains("api.add_them(a => integer, b => integer)"));
        assert!(
            err.message
                .contains("api.add_them(a => integer, b => integer, c => integer)")
        );
    }

    #[test]
    fn test_unknown_function_gets_nearest_name_hint() {
        let err = resolve_function(&fixture(), "api", "sayhell", &["name"], None, RpcVerb::Get)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoMatchingFunction);
        assert_eq!(err.status(), 404);
        assert!(err.message.contains("api.sayhell(name)"));
        assert_eq!(
            err.hint.as_deref(),
            Some("Perhaps you meant to call the function api.sayhello(name)")
        );
    }

    #[test]
    fn test_wrong_arg_names_hint_the_known_signature() {
        let err = resolve_function(
            &fixture(),
            "api",
            "add_them",
            &["a", "b", "smthelse"],
            None,
            RpcVerb::Get,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoMatchingFunction);
        assert!(err.message.contains("api.add_them(a, b, smthelse)"));
        assert_eq!(
            err.hint.as_deref(),
            Some("Perhaps you meant to call the function api.add_them(a, b)")
        );
    }

    #[test]
    fn test_parameterless_call_message() {
        let err =
            resolve_function(&fixture(), "api", "nothere", &[], None, RpcVerb::Get).unwrap_err();
        assert!(err.message.contains("api.nothere without parameters"));
    }

    #[test]
    fn test_raw_body_fallback_by_content_type() {
        let call = resolve_function(
            &fixture(),
            "api",
            "ingest",
            &[],
            Some("application/json"),
            RpcVerb::Post,
        )
        .unwrap();
        assert_eq!(call.arguments, CallArguments::RawBody);

        let err = resolve_function(
            &fixture(),
            "api",
            "ingest",
            &[],
            Some("text/plain"),
            RpcVerb::Post,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoMatchingFunction);
    }

    #[test]
    fn test_json_jsonb_fallback_tie_is_ambiguous() {
        let err = resolve_function(
            &fixture(),
            "api",
            "ingest_b",
            &[],
            Some("application/json"),
            RpcVerb::Post,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::AmbiguousFunction);
        assert_eq!(err.status(), 300);
        assert!(err.message.contains("api.ingest_b( => json), api.ingest_b( => jsonb)"));
    }

    #[test]
    fn test_volatile_function_rejects_get() {
        let err = resolve_function(&fixture(), "api", "launch", &[], None, RpcVerb::Get)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RpcMethodNotAllowed);
        assert_eq!(err.status(), 405);
        let call = resolve_function(&fixture(), "api", "launch", &[], None, RpcVerb::Post).unwrap();
        assert_eq!(call.result_kind, ResultKind::Scalar);
    }
}
