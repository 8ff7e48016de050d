// src/codec.rs

//! Base64/base64url helpers and compact JWT decomposition.
//!
//! Tokens arrive base64url encoded without padding. Everything here converts
//! them to standard base64 first and decodes with the standard alphabet, so
//! the conversion rules in [`base64_url_to_base64`] apply to every segment
//! and JWK member we read.

use crate::error::NilaJwtError;
use base64::engine::{
    general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};

/// Line width used when newline wrapping is requested (PEM convention).
const WRAP_WIDTH: usize = 64;

/// Converts a base64url segment into standard base64 text.
///
/// Padding is restored from `len % 4`: `0` adds nothing, `2` adds `"=="`,
/// `3` adds `"="`. A remainder of `1` can never come out of an encoder and is
/// rejected. The second tuple element is the logical padding count, which is
/// `1` only for the remainder-3 case.
///
/// The input must use the URL alphabet: a `'+'`, `'/'` or newline already in
/// the source is rejected instead of passed through.
pub fn base64_url_to_base64(segment: &str) -> Result<(String, usize), NilaJwtError> {
    let (suffix, padding) = match segment.len() % 4 {
        0 => ("", 0),
        2 => ("==", 0),
        3 => ("=", 1),
        _ => {
            return Err(NilaJwtError::MalformedEncoding(format!(
                "base64url length {} leaves a remainder of 1",
                segment.len()
            )))
        }
    };

    let mut converted = String::with_capacity(segment.len() + suffix.len());
    for c in segment.chars() {
        match c {
            '-' => converted.push('+'),
            '_' => converted.push('/'),
            '+' | '/' | '\n' => {
                return Err(NilaJwtError::MalformedEncoding(format!(
                    "unexpected {:?} in base64url input",
                    c
                )))
            }
            other => converted.push(other),
        }
    }
    converted.push_str(suffix);

    Ok((converted, padding))
}

/// Decodes standard base64 text. Empty input decodes to an empty vector.
///
/// With `allow_embedded_newlines`, line breaks (as produced by
/// [`encode_base64`] with wrapping) are skipped before decoding.
pub fn decode_base64(text: &str, allow_embedded_newlines: bool) -> Result<Vec<u8>, NilaJwtError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let result = if allow_embedded_newlines {
        let stripped: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        STANDARD.decode(stripped)
    } else {
        STANDARD.decode(text)
    };

    result.map_err(|e| NilaJwtError::MalformedEncoding(format!("base64 decode failed: {}", e)))
}

/// Encodes bytes as standard base64, optionally wrapped at 64 columns with
/// every line (including the last) terminated by `'\n'`.
pub fn encode_base64(bytes: &[u8], include_newlines: bool) -> String {
    let encoded = STANDARD.encode(bytes);
    if !include_newlines || encoded.is_empty() {
        return encoded;
    }

    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / WRAP_WIDTH + 1);
    // Base64 output is ASCII, so every byte offset is a char boundary.
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(WRAP_WIDTH));
        wrapped.push_str(line);
        wrapped.push('\n');
        rest = tail;
    }
    wrapped
}

/// Decodes a base64url segment through [`base64_url_to_base64`].
pub fn decode_base64_url(segment: &str) -> Result<Vec<u8>, NilaJwtError> {
    let (standard, _) = base64_url_to_base64(segment)?;
    decode_base64(&standard, false)
}

/// Encodes bytes as unpadded base64url.
pub fn encode_base64_url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Splits a compact token into its three still-encoded segments.
///
/// Rejects a token with no `'.'`, an empty header (first dot at position 0),
/// no second `'.'`, or an empty signature (second dot is the last character).
/// Anything after the second dot, dots included, is the signature segment.
pub fn decompose_token(token: &str) -> Result<(&str, &str, &str), NilaJwtError> {
    let header_end = token
        .find('.')
        .ok_or_else(|| NilaJwtError::MalformedToken("no '.' delimiter found".to_string()))?;
    if header_end == 0 {
        return Err(NilaJwtError::MalformedToken("header segment is empty".to_string()));
    }

    let payload_end = token[header_end + 1..]
        .find('.')
        .map(|pos| pos + header_end + 1)
        .ok_or_else(|| NilaJwtError::MalformedToken("no signature delimiter found".to_string()))?;
    if payload_end == token.len() - 1 {
        return Err(NilaJwtError::MalformedToken("signature segment is empty".to_string()));
    }

    Ok((
        &token[..header_end],
        &token[header_end + 1..payload_end],
        &token[payload_end + 1..],
    ))
}

/// Base64url-decodes the header and payload segments into UTF-8 text.
pub fn decode_header_and_payload(
    header_segment: &str,
    payload_segment: &str,
) -> Result<(String, String), NilaJwtError> {
    if header_segment.is_empty() || payload_segment.is_empty() {
        return Err(NilaJwtError::MalformedToken(
            "header or payload segment is empty".to_string(),
        ));
    }

    let header = decode_segment_text(header_segment, "header")?;
    let payload = decode_segment_text(payload_segment, "payload")?;
    Ok((header, payload))
}

fn decode_segment_text(segment: &str, name: &str) -> Result<String, NilaJwtError> {
    let bytes = decode_base64_url(segment)
        .map_err(|e| NilaJwtError::MalformedToken(format!("{} segment: {}", name, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| NilaJwtError::MalformedToken(format!("{} segment is not UTF-8: {}", name, e)))
}

/// A token split into its segments, with header and payload decoded.
///
/// Only lives for the duration of a validation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedToken {
    pub header_segment: String,
    pub payload_segment: String,
    pub signature_segment: String,
    pub header: String,
    pub payload: String,
}

impl DecomposedToken {
    /// Decomposes `token` and decodes its header and payload.
    pub fn parse(token: &str) -> Result<Self, NilaJwtError> {
        let (header_segment, payload_segment, signature_segment) = decompose_token(token)?;
        let (header, payload) = decode_header_and_payload(header_segment, payload_segment)?;
        Ok(Self {
            header_segment: header_segment.to_string(),
            payload_segment: payload_segment.to_string(),
            signature_segment: signature_segment.to_string(),
            header,
            payload,
        })
    }
}
