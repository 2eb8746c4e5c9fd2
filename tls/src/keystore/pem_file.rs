//! PEM key-store file parsing

use std::path::Path;

use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use zeroize::Zeroizing;

use crate::error::{BackendError, ErrorReason};

pub(super) enum KeyBlock {
    Plain(PrivateKeyDer<'static>),
    Encrypted(Zeroizing<Vec<u8>>),
}

pub(super) fn read_blocks(path: &Path) -> Result<Vec<pem::Pem>, BackendError> {
    let contents = Zeroizing::new(std::fs::read(path).map_err(|e| {
        BackendError::new(
            ErrorReason::ReadFailed,
            format!("failed to read {}: {e}", path.display()),
        )
    })?);
    pem::parse_many(contents.as_slice()).map_err(|e| {
        BackendError::new(
            ErrorReason::BadPemEncoding,
            format!("invalid PEM in {}: {e}", path.display()),
        )
    })
}

/// Certificates in file order and the single private key
pub(super) fn split_identity(
    blocks: Vec<pem::Pem>,
) -> Result<(Vec<CertificateDer<'static>>, Option<KeyBlock>), BackendError> {
    let mut chain = Vec::new();
    let mut key = None;

    for block in blocks {
        let tag = block.tag().to_string();
        let contents = block.into_contents();
        let parsed = match tag.as_str() {
            "CERTIFICATE" => {
                chain.push(CertificateDer::from(contents));
                continue;
            }
            "PRIVATE KEY" => KeyBlock::Plain(PrivatePkcs8KeyDer::from(contents).into()),
            "RSA PRIVATE KEY" => KeyBlock::Plain(PrivatePkcs1KeyDer::from(contents).into()),
            "EC PRIVATE KEY" => KeyBlock::Plain(PrivateSec1KeyDer::from(contents).into()),
            "ENCRYPTED PRIVATE KEY" => KeyBlock::Encrypted(Zeroizing::new(contents)),
            other => {
                tracing::debug!("Skipping PEM block {}", other);
                continue;
            }
        };
        if key.replace(parsed).is_some() {
            return Err(BackendError::new(
                ErrorReason::UnsupportedKeyType,
                "more than one private key in key store",
            ));
        }
    }

    Ok((chain, key))
}

pub(super) fn decrypt_pkcs8(
    encrypted: &[u8],
    password: &[u8],
) -> Result<PrivateKeyDer<'static>, BackendError> {
    let info = EncryptedPrivateKeyInfo::try_from(encrypted).map_err(|e| {
        BackendError::new(
            ErrorReason::BadPemEncoding,
            format!("malformed encrypted private key: {e}"),
        )
    })?;
    let document = info
        .decrypt(password)
        .map_err(|e| BackendError::new(ErrorReason::BadDecrypt, format!("bad decrypt: {e}")))?;
    // A wrong password can still yield well-padded garbage
    PrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|e| BackendError::new(ErrorReason::BadDecrypt, format!("bad decrypt: {e}")))?;
    Ok(PrivatePkcs8KeyDer::from(document.as_bytes().to_vec()).into())
}
