// src/credentials.rs

use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except ASCII alphanumerics and the RFC 3986 unreserved marks.
const CREDENTIAL_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Builds the opaque client credential sent as `Authorization: Basic <value>`
/// on introspection requests.
///
/// Both parts are URL-escaped before being joined with `:`, so a secret
/// containing `:` or non-ASCII text survives the round trip on the server.
pub fn client_credential(client_id: &str, client_secret: &str) -> String {
    let joined = format!(
        "{}:{}",
        utf8_percent_encode(client_id, CREDENTIAL_ESCAPE),
        utf8_percent_encode(client_secret, CREDENTIAL_ESCAPE)
    );
    STANDARD.encode(joined)
}
