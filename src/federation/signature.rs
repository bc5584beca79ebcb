//! HTTP Signatures for ActivityPub
//!
//! Verification of the `Signature` header per
//! draft-cavage-http-signatures, as used by Mastodon and friends:
//! https://docs.joinmastodon.org/spec/security/

use std::time::Duration;

use axum::body::Bytes;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri, header::AUTHORIZATION};
use rsa::RsaPublicKey;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::{Digest, Sha256};

use super::key_resolver::{KeyResolver, ResolvedKey};
use crate::error::AppError;

/// Inbound HTTP request, detached from the web framework
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Path plus query, as used by `(request-target)`
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

/// Parsed Signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    /// Key ID (URL to public key, usually `actor#main-key`)
    pub key_id: String,
    /// Declared algorithm, if any
    pub algorithm: Option<String>,
    /// Signed header names, lowercased, in declared order
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
    pub created: Option<i64>,
    pub expires: Option<i64>,
}

/// Verifies inbound request signatures against the signer's stored key.
pub struct SignatureVerifier {
    resolver: KeyResolver,
    max_clock_skew: Option<Duration>,
}

impl SignatureVerifier {
    /// Create a verifier.
    ///
    /// `max_clock_skew` bounds how far a signed `date` may drift from now;
    /// `None` disables the check.
    pub fn new(resolver: KeyResolver, max_clock_skew: Option<Duration>) -> Self {
        Self {
            resolver,
            max_clock_skew,
        }
    }

    /// Verify the request signature.
    ///
    /// # Steps
    /// 1. Extract and parse the Signature header
    /// 2. Rebuild the signing string from the declared headers
    /// 3. Check freshness and body digest (when signed)
    /// 4. Resolve the signer's public key
    /// 5. Verify RSA-SHA256 over the signing string
    ///
    /// # Returns
    /// The signer's account and key
    ///
    /// # Errors
    /// Parse errors and key-resolution errors are returned unchanged.
    pub async fn verify(&self, request: &InboundRequest) -> Result<ResolvedKey, AppError> {
        let header = extract_signature_header(&request.headers)?;
        let params = parse_signature_header(header)?;

        check_algorithm(params.algorithm.as_deref())?;

        let signature = BASE64
            .decode(&params.signature)
            .map_err(|e| AppError::SignatureParse(format!("invalid signature encoding: {}", e)))?;

        let signing_string = build_signing_string(request, &params)?;

        check_freshness(&request.headers, &params, self.max_clock_skew, Utc::now())?;
        verify_digest(request, &params)?;

        let resolved = self.resolver.resolve_key(&params.key_id).await?;

        verify_rsa_sha256(&resolved.public_key, &signing_string, &signature)?;

        tracing::debug!(
            key_id = %params.key_id,
            signer = %resolved.account.uri,
            "HTTP signature verified"
        );

        Ok(resolved)
    }
}

/// Return the raw signature parameters from `Signature` or
/// `Authorization: Signature ...`.
pub fn extract_signature_header(headers: &HeaderMap) -> Result<&str, AppError> {
    if let Some(value) = headers.get("signature") {
        return value
            .to_str()
            .map_err(|_| AppError::SignatureParse("Signature header is not valid ASCII".to_string()));
    }

    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value.to_str().map_err(|_| {
            AppError::SignatureParse("Authorization header is not valid ASCII".to_string())
        })?;
        let scheme = "signature ";
        if value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        {
            return Ok(&value[scheme.len()..]);
        }
    }

    Err(AppError::MissingSignature)
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// Quoted values may contain commas. `headers` defaults to `date`.
pub fn parse_signature_header(header: &str) -> Result<SignatureParams, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;
    let mut created = None;
    let mut expires = None;

    for (name, value) in split_params(header)? {
        match name {
            "keyId" => key_id = Some(value.to_string()),
            "algorithm" => algorithm = Some(value.to_string()),
            "headers" => {
                headers = Some(
                    value
                        .split_whitespace()
                        .map(|s| s.to_ascii_lowercase())
                        .collect::<Vec<_>>(),
                )
            }
            "signature" => signature = Some(value.to_string()),
            "created" => created = Some(parse_timestamp_param("created", value)?),
            "expires" => expires = Some(parse_timestamp_param("expires", value)?),
            _ => {} // Ignore unknown fields
        }
    }

    let headers = headers.unwrap_or_else(|| vec!["date".to_string()]);
    if headers.is_empty() {
        return Err(AppError::SignatureParse(
            "empty signed header list".to_string(),
        ));
    }

    Ok(SignatureParams {
        key_id: key_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::SignatureParse("missing keyId".to_string()))?,
        algorithm,
        headers,
        signature: signature
            .filter(|sig| !sig.is_empty())
            .ok_or_else(|| AppError::SignatureParse("missing signature".to_string()))?,
        created,
        expires,
    })
}

fn split_params(input: &str) -> Result<Vec<(&str, &str)>, AppError> {
    let mut params = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let (name, after) = rest.split_once('=').ok_or_else(|| {
            AppError::SignatureParse(format!("expected name=value, found {:?}", rest))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::SignatureParse("empty parameter name".to_string()));
        }

        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            let end = quoted.find('"').ok_or_else(|| {
                AppError::SignatureParse(format!("unterminated value for {}", name))
            })?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            match after.find(',') {
                Some(idx) => (after[..idx].trim_end(), &after[idx..]),
                None => (after.trim_end(), ""),
            }
        };
        params.push((name, value));

        let remaining = remaining.trim_start();
        rest = match remaining.strip_prefix(',') {
            Some(next) => next.trim_start(),
            None if remaining.is_empty() => "",
            None => {
                return Err(AppError::SignatureParse(format!(
                    "expected ',' after {}",
                    name
                )));
            }
        };
    }

    Ok(params)
}

fn parse_timestamp_param(name: &str, value: &str) -> Result<i64, AppError> {
    value
        .parse::<i64>()
        .map_err(|_| AppError::SignatureParse(format!("invalid {} parameter", name)))
}

fn check_algorithm(algorithm: Option<&str>) -> Result<(), AppError> {
    match algorithm {
        None => Ok(()),
        Some(alg) if alg.eq_ignore_ascii_case("rsa-sha256") => Ok(()),
        // hs2019 defers the algorithm to the key; only RSA keys are stored.
        Some(alg) if alg.eq_ignore_ascii_case("hs2019") => Ok(()),
        Some(alg) => Err(AppError::SignatureInvalid(format!(
            "unsupported algorithm: {}",
            alg
        ))),
    }
}

/// Build the canonical signing string.
///
/// One `name: value` line per declared header, in declared order,
/// joined by `\n` with no trailing newline.
pub fn build_signing_string(
    request: &InboundRequest,
    params: &SignatureParams,
) -> Result<String, AppError> {
    let mut lines = Vec::with_capacity(params.headers.len());

    for name in &params.headers {
        let value = match name.as_str() {
            "(request-target)" => format!(
                "{} {}",
                request.method.as_str().to_ascii_lowercase(),
                request.path_and_query()
            ),
            "(created)" => params
                .created
                .ok_or_else(|| AppError::SignatureParse("(created) signed but absent".to_string()))?
                .to_string(),
            "(expires)" => params
                .expires
                .ok_or_else(|| AppError::SignatureParse("(expires) signed but absent".to_string()))?
                .to_string(),
            _ => match header_value(&request.headers, name)? {
                Some(value) => value,
                None if name == "host" => request
                    .uri
                    .authority()
                    .map(|authority| authority.to_string())
                    .ok_or_else(|| AppError::SignatureParse("missing host header".to_string()))?,
                None => {
                    return Err(AppError::SignatureParse(format!(
                        "missing signed header: {}",
                        name
                    )));
                }
            },
        };

        lines.push(format!("{}: {}", name, value));
    }

    Ok(lines.join("\n"))
}

/// All values of `name`, joined with ", ".
fn header_value(headers: &HeaderMap, name: &str) -> Result<Option<String>, AppError> {
    let mut values = Vec::new();
    for value in headers.get_all(name) {
        let value = value
            .to_str()
            .map_err(|_| AppError::SignatureParse(format!("invalid {} header", name)))?;
        values.push(value);
    }

    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(values.join(", ")))
    }
}

fn check_freshness(
    headers: &HeaderMap,
    params: &SignatureParams,
    max_clock_skew: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if let Some(expires) = params.expires {
        if expires < now.timestamp() {
            return Err(AppError::SignatureExpired(
                "signature (expires) has passed".to_string(),
            ));
        }
    }

    let Some(max_skew) = max_clock_skew else {
        return Ok(());
    };
    let max_skew = i64::try_from(max_skew.as_secs()).unwrap_or(i64::MAX);

    if let Some(created) = params.created {
        if created.saturating_sub(now.timestamp()) > max_skew {
            return Err(AppError::SignatureExpired(
                "signature (created) is in the future".to_string(),
            ));
        }
    }

    if params.headers.iter().any(|h| h == "date") {
        let date_str = header_value(headers, "date")?
            .ok_or_else(|| AppError::SignatureParse("missing signed header: date".to_string()))?;
        let date = DateTime::parse_from_rfc2822(&date_str)
            .map_err(|_| AppError::SignatureParse("invalid Date format".to_string()))?;

        if now.timestamp().saturating_sub(date.timestamp()).saturating_abs() > max_skew {
            return Err(AppError::SignatureExpired(
                "Date header too old or in future".to_string(),
            ));
        }
    }

    Ok(())
}

fn verify_digest(request: &InboundRequest, params: &SignatureParams) -> Result<(), AppError> {
    if !params.headers.iter().any(|h| h == "digest") {
        return Ok(());
    }

    let digest_header = header_value(&request.headers, "digest")?
        .ok_or_else(|| AppError::SignatureParse("missing signed header: digest".to_string()))?;

    let claimed = digest_header
        .split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .find(|(alg, _)| alg.eq_ignore_ascii_case("sha-256"))
        .map(|(_, value)| value)
        .ok_or_else(|| AppError::SignatureParse("Digest header has no SHA-256 entry".to_string()))?;

    let expected = BASE64.encode(Sha256::digest(&request.body));
    if claimed != expected {
        return Err(AppError::DigestMismatch);
    }

    Ok(())
}

/// Verify an RSASSA-PKCS1-v1_5 SHA-256 signature over `signing_string`.
pub fn verify_rsa_sha256(
    public_key: &RsaPublicKey,
    signing_string: &str,
    signature: &[u8],
) -> Result<(), AppError> {
    let verifier = VerifyingKey::<Sha256>::new(public_key.clone());

    let signature = Pkcs1v15Signature::try_from(signature)
        .map_err(|e| AppError::SignatureInvalid(format!("invalid signature format: {}", e)))?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::SignatureInvalid("signature verification failed".to_string()))
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 2616)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

/// Sign an HTTP request
///
/// Signs `(request-target) host date [digest]` with RSA-SHA256. Used by
/// clients and test harnesses that deliver to an inbox.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "POST")
/// * `url` - Full URL being requested
/// * `body` - Request body (for digest)
/// * `private_key_pem` - RSA private key in PKCS#8 PEM format
/// * `key_id` - Full URL to the public key (actor#main-key)
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
) -> Result<SignatureHeaders, AppError> {
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let parsed_url = url::Url::parse(url)
        .map_err(|e| AppError::BadRequest(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::BadRequest("Missing host in URL".to_string()))?;
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path_and_query = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = body.map(generate_digest);

    let mut signing_parts = vec![
        format!("(request-target): {} {}", method.to_lowercase(), path_and_query),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| AppError::KeyParse(format!("Invalid private key: {}", e)))?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());

    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers_list.join(" "),
        BASE64.encode(signature.to_bytes())
    );

    Ok(SignatureHeaders {
        signature: signature_header,
        date,
        digest,
    })
}
