mod common;

use common::{html, mount_handshake, service_for, session_path, SESSION};
use ubb_grades::utils::accounts::AccountStore;
use ubb_grades::PortalError;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LANDING: &str = r#"<html><body>
    <div><label class="blue">Nombres</label><label>ANA MARIA</label></div>
    <div><label class="blue">Apellidos</label><label>ROJAS SOTO</label></div>
</body></html>"#;

async fn mount_accepting_login(server: &MockServer, landing: &str) {
    Mock::given(method("POST"))
        .and(path(session_path("intranet/inicio.php")))
        .and(body_string_contains("rut=12345678"))
        .and(body_string_contains("dv=9"))
        .and(body_string_contains("clave=secreta"))
        .and(header("referer", format!("{}/{}/intranet/", server.uri(), SESSION).as_str()))
        .and(header("origin", server.uri().as_str()))
        .respond_with(html(landing))
        .mount(server)
        .await;
}

#[tokio::test]
async fn successful_login_returns_session_and_creates_one_account() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    mount_accepting_login(&server, LANDING).await;

    let (service, store) = service_for(&server);
    let response = service.login("12345678-9", "secreta").await.unwrap();

    assert!(response.success);
    assert_eq!(response.session_id.as_deref(), Some(SESSION));
    assert_eq!(store.writes(), 1);

    let account = store.find("12345678-9").unwrap().unwrap();
    assert_eq!(account.display_name, "ANA MARIA ROJAS SOTO");
    assert_ne!(account.encrypted_secret, "secreta");
}

#[tokio::test]
async fn repeated_login_with_same_secret_does_not_write() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    mount_accepting_login(&server, LANDING).await;

    let (service, store) = service_for(&server);
    service.login("12345678-9", "secreta").await.unwrap();
    service.login("12345678-9", "secreta").await.unwrap();

    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn landing_without_name_uses_placeholder() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    mount_accepting_login(&server, "<html><body>Bienvenido</body></html>").await;

    let (service, store) = service_for(&server);
    service.login("12345678-9", "secreta").await.unwrap();

    let account = store.find("12345678-9").unwrap().unwrap();
    assert_eq!(account.display_name, "Usuario Desconocido");
}

#[tokio::test]
async fn rejected_credentials_are_a_failure_without_store_write() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    Mock::given(method("POST"))
        .and(path(session_path("intranet/inicio.php")))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("/{}/intranet/index.php?error=1", SESSION)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(session_path("intranet/index.php")))
        .respond_with(html("<html><body>Clave incorrecta</body></html>"))
        .mount(&server)
        .await;

    let (service, store) = service_for(&server);
    let response = service.login("12345678-9", "equivocada").await.unwrap();

    assert!(!response.success);
    assert!(response.session_id.is_none());
    let debug_info = response.debug_info.unwrap();
    assert_eq!(debug_info["sessionId"], SESSION);
    assert!(store.is_empty());
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn identifier_without_check_digit_fails_without_contacting_portal() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(html("")).expect(0).mount(&server).await;

    let (service, store) = service_for(&server);
    let response = service.login("123456789", "secreta").await.unwrap();

    assert!(!response.success);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn missing_redirect_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/")).respond_with(html("ok")).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/intranet/"))
        .respond_with(html("<html>nuevo portal</html>"))
        .mount(&server)
        .await;

    let (service, _) = service_for(&server);
    let err = service.login("12345678-9", "secreta").await.unwrap_err();

    assert!(matches!(err, PortalError::UnexpectedRedirect(_)));
}

#[tokio::test]
async fn redirect_without_location_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/")).respond_with(html("ok")).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/intranet/"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&server)
        .await;

    let (service, store) = service_for(&server);
    let err = service.login("12345678-9", "secreta").await.unwrap_err();

    assert!(matches!(err, PortalError::UnexpectedRedirect(_)));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn server_error_on_credential_post_is_a_fetch_error_without_store_write() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    Mock::given(method("POST"))
        .and(path(session_path("intranet/inicio.php")))
        .respond_with(ResponseTemplate::new(500).set_body_string(LANDING))
        .mount(&server)
        .await;

    let (service, store) = service_for(&server);
    let err = service.login("12345678-9", "secreta").await.unwrap_err();

    assert!(matches!(err, PortalError::Fetch { status: Some(500), .. }), "{err:?}");
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn unavailable_root_page_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/")).respond_with(ResponseTemplate::new(503)).mount(&server).await;
    Mock::given(method("GET")).and(path("/intranet/")).respond_with(html("")).expect(0).mount(&server).await;

    let (service, store) = service_for(&server);
    let err = service.login("12345678-9", "secreta").await.unwrap_err();

    assert!(matches!(err, PortalError::Fetch { status: Some(503), .. }), "{err:?}");
    assert_eq!(store.writes(), 0);
}
