//! Public key algorithm and size extraction

use std::fmt;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::{
    ID_DSA, ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_224_R_1, SECP_256_R_1, SECP_384_R_1,
    SECP_521_R_1,
};
use const_oid::db::rfc8410::{ID_ED_448, ID_ED_25519};
use der::asn1::UintRef;
use der::{AnyRef, Decode};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

/// Algorithm of a certificate's public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// rsaEncryption
    Rsa,
    /// id-dsa
    Dsa,
    /// id-ecPublicKey on a named curve
    Ecdsa,
    /// Edwards curve 25519
    Ed25519,
    /// Edwards curve 448
    Ed448,
    /// Any other algorithm identifier
    Unknown,
}

impl KeyAlgorithm {
    pub(crate) fn label(self, bits: u32) -> String {
        match self {
            Self::Ecdsa => format!("ECDSA P-{bits}"),
            Self::Ed25519 | Self::Ed448 => self.to_string(),
            other => format!("{other} {bits}"),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsa => "RSA",
            Self::Dsa => "DSA",
            Self::Ecdsa => "ECDSA",
            Self::Ed25519 => "Ed25519",
            Self::Ed448 => "Ed448",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[derive(der::Sequence)]
struct RsaPublicKey<'a> {
    modulus: UintRef<'a>,
    #[allow(dead_code)]
    public_exponent: UintRef<'a>,
}

/// Algorithm and size in bits, when the size can be determined
pub fn key_info(spki: &SubjectPublicKeyInfoOwned) -> (KeyAlgorithm, Option<u32>) {
    let oid = spki.algorithm.oid;

    if oid == RSA_ENCRYPTION {
        let bits = spki
            .subject_public_key
            .as_bytes()
            .and_then(|raw| RsaPublicKey::from_der(raw).ok())
            .and_then(|key| bit_length(key.modulus.as_bytes()));
        (KeyAlgorithm::Rsa, bits)
    } else if oid == ID_DSA {
        (KeyAlgorithm::Dsa, None)
    } else if oid == ID_EC_PUBLIC_KEY {
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .map(AnyRef::from)
            .and_then(|params| ObjectIdentifier::try_from(params).ok());
        (KeyAlgorithm::Ecdsa, curve.and_then(curve_bits))
    } else if oid == ID_ED_25519 {
        (KeyAlgorithm::Ed25519, Some(256))
    } else if oid == ID_ED_448 {
        (KeyAlgorithm::Ed448, Some(448))
    } else {
        (KeyAlgorithm::Unknown, None)
    }
}

fn curve_bits(curve: ObjectIdentifier) -> Option<u32> {
    match curve {
        SECP_224_R_1 => Some(224),
        SECP_256_R_1 => Some(256),
        SECP_384_R_1 => Some(384),
        SECP_521_R_1 => Some(521),
        _ => None,
    }
}

/// Bit length of a big-endian unsigned integer
fn bit_length(bytes: &[u8]) -> Option<u32> {
    let start = bytes.iter().position(|&b| b != 0)?;
    let effective = &bytes[start..];
    let high_bits = 8 - effective[0].leading_zeros();
    let rest_bits = u32::try_from((effective.len() - 1) * 8).ok()?;
    Some(high_bits + rest_bits)
}
