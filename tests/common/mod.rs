#![allow(dead_code)]

use std::sync::Arc;
use ubb_grades::utils::accounts::{AesCipher, MemoryAccountStore};
use ubb_grades::{GradeService, PortalConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SESSION: &str = "sess4f2a";
pub const KEY: &str = "0123456789abcdef0123456789abcdef";

pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

pub fn service_for(server: &MockServer) -> (GradeService, Arc<MemoryAccountStore>) {
    let config = PortalConfig::new(&server.uri()).unwrap();
    let store = Arc::new(MemoryAccountStore::new());
    let service = GradeService::new(config, store.clone(), Arc::new(AesCipher::new(KEY).unwrap()));
    (service, store)
}

// Root page plus the redirect that hands out the session identifier.
pub async fn mount_handshake(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body>Intranet</body></html>"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/intranet/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", format!("/{}/intranet/", SESSION)))
        .mount(server)
        .await;
}

pub fn session_path(rest: &str) -> String {
    format!("/{}/{}", SESSION, rest)
}
