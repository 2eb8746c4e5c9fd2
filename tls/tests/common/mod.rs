//! Test PKI and loopback harness shared by the integration tests

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use cryypt_tls::{Connection, Result, Socket, SslManager, SslMode, SslParams};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason, RevokedCertParams, SanType, SerialNumber,
};

/// A throwaway certificate authority writing PEM files into a temp directory
pub struct TestPki {
    dir: tempfile::TempDir,
    issuer: Issuer<'static, KeyPair>,
    ca_file: PathBuf,
}

impl TestPki {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut params = CertificateParams::new(Vec::default()).expect("Failed to create CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "CRYYPT");
        dn.push(DnType::CommonName, "CRYYPT Test CA");
        params.distinguished_name = dn;

        let key_pair = KeyPair::generate().expect("Failed to generate CA key");
        let cert = params
            .clone()
            .self_signed(&key_pair)
            .expect("Failed to self-sign CA");

        let ca_file = dir.path().join("ca.pem");
        std::fs::write(&ca_file, cert.pem()).expect("Failed to write CA file");

        Self {
            dir,
            issuer: Issuer::new(params, key_pair),
            ca_file,
        }
    }

    pub fn ca_file(&self) -> &Path {
        &self.ca_file
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    /// Certificate and key signed by the test CA, in one PEM file
    pub fn issue(&self, file: &str, common_name: &str) -> PathBuf {
        self.sign(file, leaf_params(common_name))
    }

    /// Like [`issue`](Self::issue) restricted to the given extended key usages
    pub fn issue_with_usages(
        &self,
        file: &str,
        common_name: &str,
        usages: Vec<ExtendedKeyUsagePurpose>,
    ) -> PathBuf {
        let mut params = leaf_params(common_name);
        params.extended_key_usages = usages;
        self.sign(file, params)
    }

    /// Like [`issue`](Self::issue) with a fixed serial number
    pub fn issue_with_serial(&self, file: &str, common_name: &str, serial: &[u8]) -> PathBuf {
        let mut params = leaf_params(common_name);
        params.serial_number = Some(SerialNumber::from_slice(serial));
        self.sign(file, params)
    }

    /// Revocation list signed by the test CA naming `serials`
    pub fn revoke(&self, file: &str, serials: &[&[u8]]) -> PathBuf {
        let now = SystemTime::now();
        let revoked_certs = serials
            .iter()
            .map(|serial| RevokedCertParams {
                serial_number: SerialNumber::from_slice(serial),
                revocation_time: (now - Duration::from_secs(3600)).into(),
                reason_code: Some(RevocationReason::KeyCompromise),
                invalidity_date: None,
            })
            .collect();
        let crl = CertificateRevocationListParams {
            this_update: (now - Duration::from_secs(3600)).into(),
            next_update: (now + Duration::from_secs(7 * 24 * 3600)).into(),
            crl_number: SerialNumber::from_slice(&[0x01]),
            issuing_distribution_point: None,
            revoked_certs,
            key_identifier_method: KeyIdMethod::Sha256,
        }
        .signed_by(&self.issuer)
        .expect("Failed to sign revocation list");
        self.write(
            file,
            &pem::encode(&pem::Pem::new("X509 CRL", crl.der().to_vec())),
        )
    }

    /// Like [`issue`](Self::issue) with the key stored as encrypted PKCS#8
    pub fn issue_encrypted(&self, file: &str, common_name: &str, password: &str) -> PathBuf {
        let key_pair = KeyPair::generate().expect("Failed to generate key pair");
        let cert = leaf_params(common_name)
            .signed_by(&key_pair, &self.issuer)
            .expect("Failed to sign certificate");
        self.write(
            file,
            &format!("{}{}", cert.pem(), encrypt_key(&key_pair, password)),
        )
    }

    /// Self-signed certificate the test CA knows nothing about
    pub fn self_signed(&self, file: &str, common_name: &str) -> PathBuf {
        let key_pair = KeyPair::generate().expect("Failed to generate key pair");
        let cert = leaf_params(common_name)
            .self_signed(&key_pair)
            .expect("Failed to self-sign certificate");
        self.write(file, &format!("{}{}", cert.pem(), key_pair.serialize_pem()))
    }

    /// CA-signed certificate whose validity ended ten days ago
    pub fn expired(&self, file: &str, common_name: &str) -> PathBuf {
        let now = SystemTime::now();
        let mut params = leaf_params(common_name);
        params.not_before = (now - Duration::from_secs(20 * 24 * 3600)).into();
        params.not_after = (now - Duration::from_secs(10 * 24 * 3600)).into();
        self.sign(file, params)
    }

    /// Parameters for a node that requires TLS and trusts the test CA
    pub fn params(&self, pem_key_file: Option<PathBuf>) -> SslParams {
        SslParams {
            ssl_mode: SslMode::RequireSsl,
            pem_key_file,
            ca_file: Some(self.ca_file.clone()),
            ..SslParams::default()
        }
    }

    fn sign(&self, file: &str, params: CertificateParams) -> PathBuf {
        let key_pair = KeyPair::generate().expect("Failed to generate key pair");
        let cert = params
            .signed_by(&key_pair, &self.issuer)
            .expect("Failed to sign certificate");
        self.write(file, &format!("{}{}", cert.pem(), key_pair.serialize_pem()))
    }

    fn write(&self, file: &str, contents: &str) -> PathBuf {
        let path = self.path(file);
        std::fs::write(&path, contents).expect("Failed to write PEM file");
        path
    }
}

fn leaf_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec!["localhost".to_string()])
        .expect("Failed to create certificate params");
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "CRYYPT");
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params
}

fn encrypt_key(key_pair: &KeyPair, password: &str) -> String {
    use pkcs8::pkcs5::pbes2;

    let der = key_pair.serialize_der();
    let info = pkcs8::PrivateKeyInfo::try_from(der.as_slice()).expect("Failed to parse PKCS#8");
    let salt = [0x5a_u8; 16];
    let iv = [0xa5_u8; 16];
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &salt, &iv)
        .expect("Failed to build PBES2 parameters");
    let encrypted = info
        .encrypt_with_params(params, password)
        .expect("Failed to encrypt key");
    pem::encode(&pem::Pem::new(
        "ENCRYPTED PRIVATE KEY",
        encrypted.as_bytes().to_vec(),
    ))
}

/// Run `accept` on `server` and `connect` on `client` over a loopback socket pair
pub fn handshake(
    server: &SslManager,
    client: &SslManager,
) -> (Result<Connection>, Result<Connection>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind loopback");
    let addr = listener.local_addr().expect("Failed to read local address");

    thread::scope(|scope| {
        let accepted = scope.spawn(|| {
            let (stream, _) = listener.accept().expect("Failed to accept");
            server.accept(Socket::new(stream).expect("Failed to wrap server socket"), &[])
        });

        let stream = TcpStream::connect(addr).expect("Failed to connect");
        let socket =
            Socket::with_remote_host(stream, "localhost").expect("Failed to wrap client socket");
        let connected = client.connect(socket);

        let accepted = accepted.join().expect("Server thread panicked");
        (accepted, connected)
    })
}

/// Write every byte, looping over partial writes
pub fn write_all(manager: &SslManager, conn: &mut Connection, mut data: &[u8]) {
    while !data.is_empty() {
        let n = manager.ssl_write(conn, data).expect("ssl_write failed");
        assert!(n > 0, "ssl_write made no progress");
        data = &data[n..];
    }
}

/// Read until the peer's close-notify
pub fn read_to_end(manager: &SslManager, conn: &mut Connection) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = manager.ssl_read(conn, &mut buf).expect("ssl_read failed");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
