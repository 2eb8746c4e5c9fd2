//! Manager creation, key store loading and per-thread error state

mod common;

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use common::TestPki;
use cryypt_tls::{
    ErrorReason, KeyStore, KeyStoreSlot, PasswordCallback, RustlsBackend, Socket, SslError,
    SslManager, SslMode, SslParams,
};
use secrecy::SecretString;

fn reason(err: &SslError) -> Option<ErrorReason> {
    ErrorReason::from_code(err.code())
}

#[test]
fn test_status_report_reflects_server_identity() {
    let pki = TestPki::new();
    let pem = pki.issue("server.pem", "server");
    let manager = SslManager::create(pki.params(Some(pem)), true)
        .expect("Failed to create server manager");

    let identity = manager
        .key_store()
        .find(KeyStore::SERVER_SLOT)
        .expect("server slot loaded");
    let config = manager.ssl_configuration();
    assert_eq!(config.server_subject_name, "CN=server,O=CRYYPT");
    assert_eq!(config.client_subject_name, "CN=server,O=CRYYPT");
    assert!(config.has_ca);
    assert_eq!(
        config.server_certificate_expiration_date,
        identity.facts().not_after
    );

    let doc = config.server_status_document();
    assert_eq!(doc["SSLServerSubjectName"], "CN=server,O=CRYYPT");
    assert_eq!(doc["SSLServerHasCertificateAuthority"], true);
    assert_eq!(manager.backend_name(), "rustls");
    assert!(manager.is_server());
}

#[test]
fn test_cluster_file_supplies_client_identity() {
    let pki = TestPki::new();
    let mut params = pki.params(Some(pki.issue("server.pem", "server")));
    params.cluster_file = Some(pki.issue("cluster.pem", "member"));
    let manager = SslManager::create(params, true).expect("Failed to create manager");

    let config = manager.ssl_configuration();
    assert_eq!(config.server_subject_name, "CN=server,O=CRYYPT");
    assert_eq!(config.client_subject_name, "CN=member,O=CRYYPT");
}

#[test]
fn test_client_without_identity_has_empty_status() {
    let pki = TestPki::new();
    let manager = SslManager::create(pki.params(None), false).expect("Failed to create client");

    assert!(manager.key_store().is_empty());
    assert!(manager.ssl_configuration().server_subject_name.is_empty());
    assert!(!manager.is_server());
}

#[test]
fn test_disabled_mode_creates_no_manager() {
    let err = SslManager::create(SslParams::default(), true).expect_err("disabled must fail");
    assert!(matches!(err, SslError::Initialization { .. }));

    let params = SslParams {
        ssl_mode: SslMode::Disabled,
        ..SslParams::default()
    };
    assert!(SslManager::create(params, false).is_err());
}

#[test]
fn test_server_requires_key_file() {
    let pki = TestPki::new();
    let err = SslManager::create(pki.params(None), true).expect_err("server needs a key file");
    assert!(matches!(err, SslError::Initialization { .. }));
}

#[test]
fn test_missing_key_file_fails_initialization() {
    let pki = TestPki::new();
    let err = SslManager::create(pki.params(Some(pki.path("absent.pem"))), true)
        .expect_err("missing file must fail");
    assert!(matches!(err, SslError::Initialization { .. }));
}

#[test]
fn test_missing_ca_file_fails_initialization() {
    let pki = TestPki::new();
    let mut params = pki.params(Some(pki.issue("server.pem", "server")));
    params.ca_file = Some(pki.path("absent-ca.pem"));
    let err = SslManager::create(params, true).expect_err("missing CA file must fail");
    assert!(matches!(err, SslError::Initialization { .. }));
}

#[test]
fn test_expired_certificate_fails_initialization() {
    let pki = TestPki::new();
    let err = SslManager::create(pki.params(Some(pki.expired("old.pem", "old"))), true)
        .expect_err("expired certificate must fail");
    assert!(matches!(err, SslError::Initialization { .. }));
    assert_eq!(reason(&err), Some(ErrorReason::CertificateExpired));
}

#[test]
fn test_encrypted_key_with_configured_password() {
    let pki = TestPki::new();
    let mut params = pki.params(Some(pki.issue_encrypted("enc.pem", "locked", "hunter2")));
    params.pem_password = Some("hunter2".to_string());

    let manager = SslManager::create(params, true).expect("Failed to unlock key");
    assert_eq!(
        manager.ssl_configuration().server_subject_name,
        "CN=locked,O=CRYYPT"
    );
}

#[test]
fn test_encrypted_key_with_wrong_password() {
    let pki = TestPki::new();
    let mut params = pki.params(Some(pki.issue_encrypted("enc.pem", "locked", "hunter2")));
    params.pem_password = Some("wrong".to_string());

    let err = SslManager::create(params, true).expect_err("wrong password must fail");
    assert!(matches!(err, SslError::Initialization { .. }));
    assert_eq!(reason(&err), Some(ErrorReason::BadDecrypt));
}

#[test]
fn test_encrypted_key_without_password() {
    let pki = TestPki::new();
    let params = pki.params(Some(pki.issue_encrypted("enc.pem", "locked", "hunter2")));

    let err = SslManager::create(params, true).expect_err("missing password must fail");
    assert_eq!(reason(&err), Some(ErrorReason::PasswordRequired));
}

#[test]
fn test_password_callback_is_retried() {
    let pki = TestPki::new();
    let params = pki.params(Some(pki.issue_encrypted("enc.pem", "locked", "hunter2")));
    let attempts = AtomicU32::new(0);

    let callback = |slot: &KeyStoreSlot, retry: u32| {
        assert_eq!(slot.name(), KeyStore::SERVER_SLOT);
        attempts.fetch_add(1, Ordering::SeqCst);
        let password = if retry == 0 { "typo" } else { "hunter2" };
        Some(SecretString::from(password))
    };

    let manager = SslManager::create_with::<RustlsBackend>(
        params,
        true,
        Some(&callback as &PasswordCallback<'_>),
    )
    .expect("second attempt should unlock the key");

    // One slot, unlocked on the second attempt
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(manager.key_store().server().is_some());

    // The client slot reuses the server file without asking again
    let client = manager.key_store().client().expect("client slot shares the server file");
    assert_eq!(client.slot().name(), KeyStore::CLIENT_SLOT);
    assert_eq!(client.subject_name(), "CN=locked,O=CRYYPT");
}

#[test]
fn test_password_callback_gives_up() {
    let pki = TestPki::new();
    let params = pki.params(Some(pki.issue_encrypted("enc.pem", "locked", "hunter2")));
    let attempts = AtomicU32::new(0);

    let callback = |_: &KeyStoreSlot, _: u32| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Some(SecretString::from("typo"))
    };

    let err = SslManager::create_with::<RustlsBackend>(
        params,
        true,
        Some(&callback as &PasswordCallback<'_>),
    )
    .expect_err("every attempt uses the wrong password");
    assert_eq!(reason(&err), Some(ErrorReason::BadDecrypt));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_accept_without_server_identity() {
    let pki = TestPki::new();
    let client = SslManager::create(pki.params(Some(pki.issue("client.pem", "client"))), false)
        .expect("Failed to create client manager");
    assert!(client.key_store().server().is_none());

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind loopback");
    let addr = listener.local_addr().expect("Failed to read local address");
    let _peer = TcpStream::connect(addr).expect("Failed to connect");
    let (stream, _) = listener.accept().expect("Failed to accept");

    let err = client
        .accept(Socket::new(stream).expect("Failed to wrap socket"), &[])
        .expect_err("accept needs a server certificate");
    assert!(matches!(err, SslError::Connect { .. }));
    assert_eq!(reason(&err), Some(ErrorReason::NoServerCertificate));
    assert_eq!(
        client.err_get_error(),
        ErrorReason::NoServerCertificate.code()
    );
    assert!(client.err_get_error().is_none());
}

#[test]
fn test_error_queue_is_per_thread_and_cleanable() {
    let pki = TestPki::new();
    let manager = SslManager::create(pki.params(Some(pki.issue("client.pem", "client"))), false)
        .expect("Failed to create manager");

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind loopback");
    let addr = listener.local_addr().expect("Failed to read local address");
    let _peer = TcpStream::connect(addr).expect("Failed to connect");
    let (stream, _) = listener.accept().expect("Failed to accept");
    let _ = manager.accept(Socket::new(stream).expect("Failed to wrap socket"), &[]);

    let code = manager.err_peek_error();
    assert!(!code.is_none());
    assert_eq!(
        manager.err_error_string(code),
        SslManager::get_error_message(code)
    );

    // Another thread sees its own, empty queue
    thread::scope(|scope| {
        scope
            .spawn(|| {
                assert!(manager.err_peek_error().is_none());
                manager.cleanup_thread_locals();
            })
            .join()
            .expect("worker thread panicked");
    });
    assert_eq!(manager.err_peek_error(), code);

    manager.cleanup_thread_locals();
    manager.cleanup_thread_locals();
    assert!(manager.err_get_error().is_none());
}
