//! Automatic auth, beta, version, and static header injection.
//!
//! [`apply`] runs before URL building, in four ordered steps:
//!
//! 1. auth: bearer or named header, or a query param with the configured key.
//! 2. beta: configured beta headers, or a beta `Version` param that also
//!    satisfies the version step.
//! 3. version: the standard `Version` param, unless beta already supplied one.
//! 4. static extra headers.
//!
//! The helper adds at most one `Version` param per call.

use tracing::trace;

use crate::config::{AuthMode, BetaMode, ClientConfiguration, VersionMode};
use crate::error::{ClientError, ClientResult};
use crate::request::{Header, Request};
use crate::routing::{PathParam, PathParamVecExt};

/// Decorate `request` and `params` according to `config`.
///
/// # Errors
///
/// Configuration errors when the mode asks for a value the configuration
/// does not have: [`ClientError::NoApiKey`], [`ClientError::NoBetaHeader`],
/// [`ClientError::NoBetaVersion`], [`ClientError::NoVersion`].
pub fn apply(
    config: &ClientConfiguration,
    request: &mut Request,
    params: &mut Vec<PathParam>,
) -> ClientResult<()> {
    apply_auth(config, request, params)?;
    let version_satisfied = apply_beta(config, request, params)?;
    if !version_satisfied {
        apply_version(config, params)?;
    }
    for header in &config.extra_headers {
        request.inject_header(header.clone());
    }
    trace!(
        "Auto params applied for {}: {} param(s)",
        config.api_name,
        params.len()
    );
    Ok(())
}

fn apply_auth(
    config: &ClientConfiguration,
    request: &mut Request,
    params: &mut Vec<PathParam>,
) -> ClientResult<()> {
    if config.auth == AuthMode::None {
        return Ok(());
    }
    let key = config.resolve_api_key().ok_or_else(|| ClientError::NoApiKey {
        api: config.api_name.clone(),
    })?;

    match &config.auth {
        AuthMode::None => {}
        AuthMode::Bearer => {
            request.inject_header(Header::new("Authorization", format!("Bearer {key}")));
        }
        AuthMode::Header { name } => {
            request.inject_header(Header::new(name.clone(), key.into_owned()));
        }
        AuthMode::Query { key: name } => {
            params.remove_query(name);
            params.push(PathParam::query(name.clone(), key));
        }
    }
    Ok(())
}

/// Returns `true` when the beta step supplied the version param.
fn apply_beta(
    config: &ClientConfiguration,
    request: &mut Request,
    params: &mut Vec<PathParam>,
) -> ClientResult<bool> {
    match config.beta {
        BetaMode::None => Ok(false),
        BetaMode::Header => {
            if config.beta_headers.is_empty() {
                return Err(ClientError::NoBetaHeader {
                    api: config.api_name.clone(),
                });
            }
            for header in &config.beta_headers {
                request.inject_header(header.clone());
            }
            Ok(false)
        }
        BetaMode::Path => {
            let version = config
                .beta_version
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ClientError::NoBetaVersion {
                    api: config.api_name.clone(),
                })?;
            params.push(PathParam::version(version));
            Ok(true)
        }
    }
}

fn apply_version(config: &ClientConfiguration, params: &mut Vec<PathParam>) -> ClientResult<()> {
    match config.version_mode {
        VersionMode::None => Ok(()),
        VersionMode::Path => {
            let version = config
                .version
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ClientError::NoVersion {
                    api: config.api_name.clone(),
                })?;
            params.push(PathParam::version(version));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Operation, RouteBuilder, RouteTable};

    fn base() -> ClientConfiguration {
        ClientConfiguration::new("Test", "https://host/{ver}")
    }

    fn header_names(request: &Request) -> Vec<String> {
        request.header_list().into_iter().map(|h| h.name).collect()
    }

    #[test]
    fn bearer_auth_adds_header() {
        let config = base().with_api_key("abc").with_auth(AuthMode::Bearer);
        let mut req = Request::new();
        let mut params = Vec::new();
        apply(&config, &mut req, &mut params).unwrap();
        let headers = req.header_list();
        assert_eq!(headers[0].name, "Authorization");
        assert_eq!(headers[0].value, "Bearer abc");
        assert!(params.is_empty());
    }

    #[test]
    fn named_header_auth() {
        let config = base().with_api_key("abc").with_auth(AuthMode::Header {
            name: "x-api-key".into(),
        });
        let mut req = Request::new();
        apply(&config, &mut req, &mut Vec::new()).unwrap();
        assert_eq!(req.header_list()[0].value, "abc");
    }

    #[test]
    fn query_auth_appears_exactly_once() {
        let config = base()
            .with_api_key("abc")
            .with_auth(AuthMode::Query { key: "K".into() })
            .with_version(VersionMode::Path, "v1");
        let routes = RouteTable::new("models").with(Operation::List, "models");
        let mut req = Request::new();
        let mut params = vec![PathParam::query("K", "abc"), PathParam::query("page", 2)];
        apply(&config, &mut req, &mut params).unwrap();

        let url = RouteBuilder::build(&config.base_url, Operation::List, &routes, None, &params)
            .unwrap();
        assert_eq!(url.matches("K=abc").count(), 1);
        assert!(url.starts_with("https://host/v1/models?"));
    }

    #[test]
    fn missing_key_fails() {
        let config = base().with_auth(AuthMode::Bearer);
        let err = apply(&config, &mut Request::new(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::NoApiKey { .. }));
    }

    #[test]
    fn key_from_environment() {
        let var = "CRUDKIT_TEST_AUTO_PARAMS_KEY";
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var(var, "from-env") };
        let config = base().with_api_key_env(var).with_auth(AuthMode::Bearer);
        let mut req = Request::new();
        apply(&config, &mut req, &mut Vec::new()).unwrap();
        assert_eq!(req.header_list()[0].value, "Bearer from-env");
        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn beta_path_wins_over_version() {
        let config = base()
            .with_version(VersionMode::Path, "v1")
            .with_beta_path("v1beta");
        let mut params = Vec::new();
        apply(&config, &mut Request::new(), &mut params).unwrap();
        assert_eq!(params.version_count(), 1);
        assert_eq!(params[0], PathParam::version("v1beta"));
    }

    #[test]
    fn standard_version_when_no_beta_path() {
        let config = base().with_version(VersionMode::Path, "v1");
        let mut params = Vec::new();
        apply(&config, &mut Request::new(), &mut params).unwrap();
        assert_eq!(params, vec![PathParam::version("v1")]);
    }

    #[test]
    fn beta_header_mode_still_injects_version() {
        let config = base()
            .with_version(VersionMode::Path, "v1")
            .with_beta_header("OpenAI-Beta", "assistants=v2");
        let mut req = Request::new();
        let mut params = Vec::new();
        apply(&config, &mut req, &mut params).unwrap();
        assert_eq!(params.version_count(), 1);
        assert_eq!(header_names(&req), vec!["OpenAI-Beta"]);
    }

    #[test]
    fn missing_beta_settings_fail() {
        let mut config = base();
        config.beta = BetaMode::Header;
        let err = apply(&config, &mut Request::new(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::NoBetaHeader { .. }));

        config.beta = BetaMode::Path;
        let err = apply(&config, &mut Request::new(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::NoBetaVersion { .. }));
    }

    #[test]
    fn missing_version_fails() {
        let mut config = base();
        config.version_mode = VersionMode::Path;
        let err = apply(&config, &mut Request::new(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::NoVersion { .. }));
    }

    #[test]
    fn headers_follow_auth_beta_static_order() {
        let config = base()
            .with_api_key("k")
            .with_auth(AuthMode::Bearer)
            .with_beta_header("Beta", "1")
            .with_extra_header("Static", "s");
        let mut req = Request::new().with_header("PerCall", "p");
        apply(&config, &mut req, &mut Vec::new()).unwrap();
        assert_eq!(
            header_names(&req),
            vec!["Authorization", "Beta", "Static", "PerCall"]
        );
    }
}
