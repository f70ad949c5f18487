use std::sync::LazyLock;
use log::{debug, info};
use reqwest::header::{LOCATION, ORIGIN, REFERER};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use url::Url;
use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use crate::utils::html::{element_text, label_after, next_element};
use crate::utils::http::{read_success, HttpSessionClient, Redirects};

// The landing page reached after a successful login.
const LANDING_MARKER: &str = "inicio.php";
pub const UNKNOWN_USER: &str = "Usuario Desconocido";

static PROFILE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href*='perfil_egreso']").unwrap());

// A logged-in portal session. The identifier is a path segment that must prefix every request.
#[derive(Clone)]
pub struct Session {
    id: String,
    http: HttpSessionClient,
    config: PortalConfig,
}

impl Session {
    // Picks up a session identifier handed back by the caller, on a fresh cookie context.
    pub fn resume(config: &PortalConfig, session_id: &str) -> Result<Session> {
        Ok(Session { id: session_id.to_string(), http: HttpSessionClient::new(config)?, config: config.clone() })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn http(&self) -> &HttpSessionClient {
        &self.http
    }

    // Absolute URL of a page inside this session.
    pub fn url(&self, path: &str) -> String {
        self.config.session_url(&self.id, path)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct LoginSuccess {
    pub session: Session,
    pub landing_html: String,
}

impl LoginSuccess {
    pub fn display_name(&self) -> String {
        scrape_display_name(&self.landing_html)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginFailure {
    pub debug_info: Value,
}

// Bad credentials are an expected outcome, not an error.
#[derive(Debug)]
pub enum LoginOutcome {
    Success(LoginSuccess),
    Failure(LoginFailure),
}

// Performs the login handshake: base cookies, the redirect that reveals the session
// identifier, then the credential POST.
pub async fn acquire_session(config: &PortalConfig, identifier: &str, secret: &str) -> Result<LoginOutcome> {
    let (rut, check_digit) = match split_identifier(identifier) {
        Some(parts) => parts,
        None => {
            return Ok(LoginOutcome::Failure(LoginFailure {
                debug_info: json!({ "reason": "identifier must have the form NNNNNNNN-D" }),
            }))
        }
    };

    let http = HttpSessionClient::new(config)?;
    let root = config.root_url.as_str();

    let response = http.get(root, Redirects::Follow, &[]).await?;
    read_success(root, response).await?;

    let intranet_url = format!("{}intranet/", root);
    let response = http.get(&intranet_url, Redirects::Manual, &[]).await?;
    if response.status() != StatusCode::FOUND {
        return Err(PortalError::UnexpectedRedirect(format!(
            "expected 302 from {}, got {}",
            intranet_url,
            response.status()
        )));
    }

    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PortalError::UnexpectedRedirect(format!("{} answered 302 without a Location", intranet_url)))?;

    let session_id = session_id_from_location(&config.root_url, location)?;
    debug!("Portal assigned session {}", session_id);

    let login_url = config.session_url(&session_id, "intranet/inicio.php");
    let headers = [
        (ORIGIN, config.origin()),
        (REFERER, config.session_url(&session_id, "intranet/")),
    ];
    let form = [
        ("rut", rut.as_str()),
        ("dv", check_digit.as_str()),
        ("rut_cambio", ""),
        ("rut_aux", identifier),
        ("clave", secret),
    ];

    let response = http.post_form(&login_url, &form, Redirects::Follow, &headers).await?;
    let final_url = response.url().to_string();
    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(PortalError::Fetch { url: final_url, status: Some(status) });
    }

    if !final_url.contains(LANDING_MARKER) {
        info!("Login rejected for session {} (landed on {})", session_id, final_url);
        return Ok(LoginOutcome::Failure(LoginFailure {
            debug_info: json!({ "sessionId": session_id, "finalUrl": final_url, "status": status }),
        }));
    }

    let landing_html = response.text().await.map_err(|e| PortalError::from_request(&login_url, e))?;
    info!("Login succeeded for session {}", session_id);

    Ok(LoginOutcome::Success(LoginSuccess { session: Session { id: session_id, http, config: config.clone() }, landing_html }))
}

// "12.345.678-9" -> ("12345678", "9")
pub fn split_identifier(identifier: &str) -> Option<(String, String)> {
    let normalized = identifier.trim().replace('.', "");
    let (rut, check_digit) = normalized.split_once('-')?;
    if rut.is_empty() || check_digit.is_empty() {
        return None;
    }
    Some((rut.to_string(), check_digit.to_string()))
}

// The first path segment of the redirect target is the session identifier.
pub fn session_id_from_location(root: &Url, location: &str) -> Result<String> {
    let target = root.join(location)?;
    target
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PortalError::UnexpectedRedirect(format!("no session segment in {}", target)))
}

// Best effort: the Nombres/Apellidos labels, then the link next to the profile link,
// then a placeholder.
pub fn scrape_display_name(html: &str) -> String {
    let document = Html::parse_document(html);

    let full_name = [label_after(&document, "Nombres"), label_after(&document, "Apellidos")]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !full_name.is_empty() {
        return full_name;
    }

    let linked_name = document
        .select(&PROFILE_LINK)
        .filter_map(|link| next_element(&link))
        .find(|next| next.value().name() == "a")
        .map(|anchor| element_text(&anchor))
        .unwrap_or_default();

    if linked_name.is_empty() { UNKNOWN_USER.to_string() } else { linked_name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_national_id() {
        assert_eq!(split_identifier("12345678-9"), Some(("12345678".into(), "9".into())));
        assert_eq!(split_identifier("12.345.678-k"), Some(("12345678".into(), "k".into())));
        assert_eq!(split_identifier("123456789"), None);
        assert_eq!(split_identifier("-9"), None);
    }

    #[test]
    fn session_id_is_first_path_segment() {
        let root = Url::parse("https://intranet.ubiobio.cl/").unwrap();
        assert_eq!(session_id_from_location(&root, "/a1b2c3d4/intranet/").unwrap(), "a1b2c3d4");
        assert_eq!(
            session_id_from_location(&root, "https://intranet.ubiobio.cl/zz99/intranet/index.php").unwrap(),
            "zz99"
        );
        assert!(matches!(
            session_id_from_location(&root, "/").unwrap_err(),
            PortalError::UnexpectedRedirect(_)
        ));
    }

    #[test]
    fn display_name_prefers_labels() {
        let html = r#"<label class="blue">Nombres</label><label>ANA MARIA</label>
                      <label class="blue">Apellidos</label><label>ROJAS</label>"#;
        assert_eq!(scrape_display_name(html), "ANA MARIA ROJAS");
    }

    #[test]
    fn display_name_falls_back_to_profile_link() {
        let html = r##"<nav><a href="/x/perfil_egreso.php">Perfil</a><a href="#">  Ana Rojas </a></nav>"##;
        assert_eq!(scrape_display_name(html), "Ana Rojas");
    }

    #[test]
    fn display_name_placeholder_when_nothing_found() {
        assert_eq!(scrape_display_name("<html><body></body></html>"), UNKNOWN_USER);
    }
}
