//! Distinguished name rendering
//!
//! Names are printed in RFC 2253 order (last RDN first) with the usual short
//! attribute labels, falling back to the dotted OID for anything else.

use der::Encode;
use der::asn1::{Ia5StringRef, PrintableStringRef, Utf8StringRef};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::Name;

const SHORT_NAMES: [(&str, &str); 10] = [
    ("2.5.4.3", "CN"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("0.9.2342.19200300.100.1.1", "UID"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("1.2.840.113549.1.9.1", "emailAddress"),
];

/// Render a name as `CN=...,OU=...,O=...`
pub fn format_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(format_attribute)
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn format_attribute(atv: &AttributeTypeAndValue) -> String {
    let oid = atv.oid.to_string();
    let label = SHORT_NAMES
        .iter()
        .find(|(dotted, _)| *dotted == oid)
        .map_or(oid.as_str(), |&(_, short)| short);

    let value = if let Ok(ps) = PrintableStringRef::try_from(&atv.value) {
        escape_value(&ps.to_string())
    } else if let Ok(utf8) = Utf8StringRef::try_from(&atv.value) {
        escape_value(&utf8.to_string())
    } else if let Ok(ia5) = Ia5StringRef::try_from(&atv.value) {
        escape_value(&ia5.to_string())
    } else {
        // Unprintable types keep their BER encoding as `#hex`
        match atv.value.to_der() {
            Ok(der) => format!("#{}", hex::encode(der)),
            Err(_) => String::from("#"),
        }
    };

    format!("{label}={value}")
}

fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let last = raw.chars().count().saturating_sub(1);
    for (i, c) in raw.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn reverses_rdn_order() {
        let name = Name::from_str("CN=server,OU=db,O=CRYYPT").expect("valid name");
        assert_eq!(format_name(&name), "CN=server,OU=db,O=CRYYPT");
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_value("a,b"), "a\\,b");
        assert_eq!(escape_value(" lead"), "\\ lead");
        assert_eq!(escape_value("trail "), "trail\\ ");
        assert_eq!(escape_value("#x"), "\\#x");
        assert_eq!(escape_value("plain"), "plain");
    }
}
