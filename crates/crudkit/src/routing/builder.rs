//! URL construction from a base URL, a route template, and path parameters.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, trace, warn};

use super::params::PathParam;
use super::table::{Operation, RouteTable};
use crate::error::{ClientError, ClientResult};

/// Placeholder replaced by the version param.
pub const VERSION_PLACEHOLDER: &str = "{ver}";

/// RFC 3986 unreserved characters stay literal, everything else is encoded.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Stateless URL builder.
pub struct RouteBuilder;

impl RouteBuilder {
    /// Resolve the final URL for `operation`.
    ///
    /// `route_override` replaces the table lookup when present. The base URL
    /// may itself contain `{ver}`.
    ///
    /// # Errors
    ///
    /// [`ClientError::RouteNotDefined`] when neither an override nor a table
    /// entry exists, [`ClientError::UnresolvedVersion`] when `{ver}` is left
    /// in the URL after substitution.
    pub fn build(
        base_url: &str,
        operation: Operation,
        routes: &RouteTable,
        route_override: Option<&str>,
        params: &[PathParam],
    ) -> ClientResult<String> {
        let template = route_override
            .or_else(|| routes.template(operation))
            .ok_or_else(|| ClientError::RouteNotDefined {
                operation,
                service: routes.service().to_string(),
            })?;

        let resolved = ResolvedParams::collect(params);
        let (path, template_query) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };

        // Placeholders are filled in one pass over the base and the template
        // only; ids, method suffixes, and children are never re-scanned.
        let base = fill_placeholders(&normalize_base(base_url), &[], resolved.version);
        let route = fill_placeholders(
            path.trim_start_matches('/'),
            resolved.ids.unwrap_or_default(),
            resolved.version,
        );
        let mut url = base.text + &route.text;
        if base.unresolved_version || route.unresolved_version {
            return Err(ClientError::UnresolvedVersion { url });
        }

        if let Some(method) = resolved.method {
            url.push_str(method);
        }

        for child in resolved.children {
            let segment = child.trim_matches('/');
            if segment.is_empty() {
                continue;
            }
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(segment);
        }

        if route.unfilled_ordinal {
            warn!(
                "Route for {operation} on {} has unfilled id placeholders: {url}",
                routes.service()
            );
        }

        let query = encode_query(template_query, &resolved.queries);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        trace!("Resolved {operation} route: {url}");
        Ok(url)
    }
}

/// The subset of params the builder actually applies.
#[derive(Default)]
struct ResolvedParams<'a> {
    ids: Option<&'a [String]>,
    method: Option<&'a str>,
    version: Option<&'a str>,
    children: Vec<&'a str>,
    queries: Vec<(&'a str, &'a str)>,
}

impl<'a> ResolvedParams<'a> {
    fn collect(params: &'a [PathParam]) -> Self {
        let mut resolved = ResolvedParams::default();
        for param in params {
            match param {
                PathParam::Id(ids) => {
                    if resolved.ids.is_some() {
                        warn!("Duplicate {} path param ignored: {ids:?}", param.kind());
                    } else {
                        resolved.ids = Some(ids);
                    }
                }
                PathParam::Method(method) => {
                    if resolved.method.is_some() {
                        warn!("Duplicate {} path param ignored: {method}", param.kind());
                    } else {
                        resolved.method = Some(method);
                    }
                }
                PathParam::Version(version) => {
                    if resolved.version.is_some() {
                        debug!("Extra {} path param ignored: {version}", param.kind());
                    } else {
                        resolved.version = Some(version);
                    }
                }
                PathParam::Child(child) => resolved.children.push(child),
                PathParam::Query { key, value } => resolved.queries.push((key, value)),
            }
        }
        resolved
    }
}

fn normalize_base(base_url: &str) -> String {
    let mut base = base_url.trim_end_matches('/').to_string();
    base.push('/');
    base
}

fn encode_query(template_query: Option<&str>, pairs: &[(&str, &str)]) -> String {
    let mut parts: Vec<String> = template_query
        .filter(|q| !q.is_empty())
        .map(|q| vec![q.to_string()])
        .unwrap_or_default();
    parts.extend(pairs.iter().map(|(key, value)| {
        format!(
            "{}={}",
            utf8_percent_encode(key, QUERY_ENCODE_SET),
            utf8_percent_encode(value, QUERY_ENCODE_SET)
        )
    }));
    parts.join("&")
}

/// A template with its placeholders substituted.
#[derive(Debug, Default, PartialEq)]
struct Filled {
    text: String,
    unfilled_ordinal: bool,
    unresolved_version: bool,
}

/// Replace `{n}` with `ids[n]` and `{ver}` with `version` in a single
/// left-to-right pass. Substituted values are inserted verbatim and never
/// scanned again. Tokens without a value stay in place and are flagged.
fn fill_placeholders(template: &str, ids: &[String], version: Option<&str>) -> Filled {
    let mut filled = Filled {
        text: String::with_capacity(template.len()),
        ..Filled::default()
    };
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let (before, from_open) = rest.split_at(open);
        filled.text.push_str(before);
        let Some(close) = from_open.find('}') else {
            rest = from_open;
            break;
        };
        let (token, after) = from_open.split_at(close + 1);
        let name = token.get(1..close).unwrap_or_default();
        if name.contains('{') {
            // Stray brace: keep it and rescan from the next character.
            filled.text.push('{');
            rest = from_open.get(1..).unwrap_or_default();
            continue;
        }
        if name == "ver" {
            match version {
                Some(version) => filled.text.push_str(version.trim_matches('/')),
                None => {
                    filled.unresolved_version = true;
                    filled.text.push_str(token);
                }
            }
        } else if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            match name.parse::<usize>().ok().and_then(|i| ids.get(i)) {
                Some(id) => filled.text.push_str(id),
                None => {
                    filled.unfilled_ordinal = true;
                    filled.text.push_str(token);
                }
            }
        } else {
            filled.text.push_str(token);
        }
        rest = after;
    }
    filled.text.push_str(rest);
    filled
}
