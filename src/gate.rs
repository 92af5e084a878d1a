//! Request-level access gate.
//!
//! Every request is classified by path, then the session cookie (if any) is
//! verified against the identity provider when the route needs an answer. The
//! outcome is either "let it through" or a single redirect response that may
//! also clear the cookie.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

use crate::security::{Claims, IdentityVerifier};

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ASSET_PREFIXES: &[&str] = &["/static/", "/assets/", "/_next/"];
const ASSET_FILES: &[&str] = &["/favicon.ico", "/robots.txt", "/manifest.json"];
const ASSET_EXTENSIONS: &[&str] = &[
    "svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "css", "js", "map", "woff", "woff2", "ttf",
];
/// Route trees where a file extension never makes a path an asset.
const ROUTE_PREFIXES: &[&str] = &["/content/", "/auth/"];
const PUBLIC_PREFIXES: &[&str] = &["/auth/"];
const PUBLIC_PATHS: &[&str] = &[LOGIN_PATH, "/health"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Protected,
    Asset,
}

/// Static classification of a request path.
pub fn classify(path: &str) -> RouteClass {
    if is_asset(path) {
        RouteClass::Asset
    } else if PUBLIC_PATHS.contains(&path)
        || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
    {
        RouteClass::Public
    } else {
        RouteClass::Protected
    }
}

fn is_asset(path: &str) -> bool {
    if ASSET_FILES.contains(&path) || ASSET_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    if ROUTE_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return false;
    }
    let file = path.rsplit('/').next().unwrap_or_default();
    file.rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}

/// What the gate learned about the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    /// A cookie is present but the route did not need it verified.
    Unchecked,
    Valid(Claims),
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    PassThrough,
    Redirect {
        location: &'static str,
        clear_session: bool,
    },
}

/// Whether the table below needs the token verified for this request.
fn needs_verification(path: &str, class: RouteClass) -> bool {
    match class {
        RouteClass::Asset => false,
        RouteClass::Public => path == LOGIN_PATH,
        RouteClass::Protected => true,
    }
}

/// The gate's transition table.
pub fn decide(path: &str, class: RouteClass, session: &SessionState) -> GateDecision {
    match (class, session) {
        (RouteClass::Asset, _) => GateDecision::PassThrough,
        (RouteClass::Public, SessionState::Valid(_)) if path == LOGIN_PATH => {
            GateDecision::Redirect {
                location: HOME_PATH,
                clear_session: false,
            }
        }
        (RouteClass::Public, SessionState::Invalid) if path == LOGIN_PATH => {
            GateDecision::Redirect {
                location: LOGIN_PATH,
                clear_session: true,
            }
        }
        (RouteClass::Public, _) => GateDecision::PassThrough,
        (RouteClass::Protected, SessionState::Valid(_)) => GateDecision::PassThrough,
        (RouteClass::Protected, SessionState::Invalid) => GateDecision::Redirect {
            location: LOGIN_PATH,
            clear_session: true,
        },
        (RouteClass::Protected, SessionState::Absent | SessionState::Unchecked) => {
            GateDecision::Redirect {
                location: LOGIN_PATH,
                clear_session: false,
            }
        }
    }
}

/// Classifies `path`, verifies `token` only when the route requires it, and
/// returns the decision along with the session state it was based on.
pub async fn evaluate(
    verifier: &dyn IdentityVerifier,
    path: &str,
    token: Option<&str>,
) -> (GateDecision, SessionState) {
    let class = classify(path);
    let session = match token {
        None => SessionState::Absent,
        Some(_) if !needs_verification(path, class) => SessionState::Unchecked,
        Some(token) => match verifier.verify(token).await {
            Ok(claims) => SessionState::Valid(claims),
            Err(err) => {
                warn!(path, error = %err, "session token rejected");
                SessionState::Invalid
            }
        },
    };
    (decide(path, class, &session), session)
}

/// Reads the session token from the `Cookie` headers. An empty value counts as
/// no cookie at all.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value issuing a session for `token`.
pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_MAX_AGE.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn cleared_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

/// Builds the single redirect response for a redirect decision.
pub fn redirect_response(location: &'static str, clear_session: bool) -> Response {
    let mut response = Redirect::temporary(location).into_response();
    if clear_session {
        if let Ok(value) = HeaderValue::from_str(&cleared_session_cookie()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Axum middleware enforcing the gate. Verified claims are attached to the
/// request extensions for the handlers.
pub async fn access_gate(
    State(verifier): State<Arc<dyn IdentityVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let token = session_token(request.headers()).map(str::to_owned);
    let (decision, session) = evaluate(verifier.as_ref(), &path, token.as_deref()).await;

    match decision {
        GateDecision::PassThrough => {
            if let SessionState::Valid(claims) = session {
                request.extensions_mut().insert(claims);
            }
            next.run(request).await
        }
        GateDecision::Redirect {
            location,
            clear_session,
        } => {
            debug!(path = %path, location, clear_session, "gate redirect");
            redirect_response(location, clear_session)
        }
    }
}
