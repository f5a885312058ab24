//! ID token parsing and signature verification.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use super::Identity;
use crate::error::AuthError;

/// Signing algorithms accepted from CI issuers. Symmetric algorithms are
/// never valid for a publicly verifiable ID token.
const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

#[derive(Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    iss: Option<String>,
}

/// Reads the `iss` claim without checking the signature.
///
/// Only used to choose which key set to verify against.
pub fn peek_issuer(token: &str) -> Result<String, AuthError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload encoding: {}", e)))?;
    let claims: UnverifiedClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("payload json: {}", e)))?;

    claims
        .iss
        .filter(|iss| !iss.is_empty())
        .ok_or_else(|| AuthError::MalformedToken("missing iss claim".to_string()))
}

fn audience_list(claims: &Value) -> Vec<String> {
    match claims.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Fully verifies `token`: signature against `keys`, issuer equality and
/// audience containment. Returns the audit identity and the raw claim set.
pub fn verify_token(
    token: &str,
    keys: &JwkSet,
    issuer: &str,
    audience: &str,
) -> Result<(Identity, Value), AuthError> {
    let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::InvalidSignature(format!(
            "algorithm {:?} not accepted",
            header.alg
        )));
    }

    let jwk = match &header.kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
    .ok_or_else(|| AuthError::InvalidSignature("no matching signing key".to_string()))?;

    let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

    let data = decode::<Value>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::Json(_) => AuthError::ClaimsUnparsable(e.to_string()),
        _ => AuthError::InvalidSignature(e.to_string()),
    })?;

    let claims = data.claims;
    let identity = Identity {
        subject: claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        issuer: issuer.to_string(),
        audience: audience_list(&claims),
    };
    Ok((identity, claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_keys::{github_claims, key_set, sign};
    use serde_json::json;

    const GITHUB_ISSUER: &str = "https://token.actions.githubusercontent.com";

    #[test]
    fn test_peek_issuer() {
        let token = sign(&github_claims("cache"));
        assert_eq!(peek_issuer(&token).unwrap(), GITHUB_ISSUER);
    }

    #[test]
    fn test_peek_issuer_rejects_garbage() {
        assert!(matches!(
            peek_issuer("not-a-token"),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            peek_issuer("a.!!!.c"),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_peek_issuer_requires_iss() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#);
        let token = format!("e30.{}.sig", payload);
        assert!(matches!(
            peek_issuer(&token),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_verify_valid_token() {
        let token = sign(&github_claims("cache"));
        let (identity, claims) = verify_token(&token, &key_set(), GITHUB_ISSUER, "cache").unwrap();

        assert_eq!(identity.subject, "repo:acme/app:ref:refs/heads/main");
        assert_eq!(identity.issuer, GITHUB_ISSUER);
        assert_eq!(identity.audience, vec!["cache".to_string()]);
        assert_eq!(claims["repository_owner"], "acme");
    }

    #[test]
    fn test_verify_audience_mismatch() {
        let token = sign(&github_claims("someone-else"));
        let result = verify_token(&token, &key_set(), GITHUB_ISSUER, "cache");
        assert_eq!(result.unwrap_err(), AuthError::AudienceMismatch);
    }

    #[test]
    fn test_verify_audience_list_contains_expected() {
        let mut claims = github_claims("cache");
        claims["aud"] = json!(["other", "cache"]);
        let token = sign(&claims);

        let (identity, _) = verify_token(&token, &key_set(), GITHUB_ISSUER, "cache").unwrap();
        assert_eq!(identity.audience.len(), 2);
    }

    #[test]
    fn test_verify_issuer_mismatch() {
        let token = sign(&github_claims("cache"));
        let result = verify_token(&token, &key_set(), "https://gitlab.com", "cache");
        assert_eq!(result.unwrap_err(), AuthError::IssuerMismatch);
    }

    #[test]
    fn test_verify_tampered_token() {
        let token = sign(&github_claims("cache"));
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({
                "iss": GITHUB_ISSUER,
                "aud": "cache",
                "sub": "x",
                "repository": "evil/app",
                "repository_owner": "evil",
                "exp": chrono::Utc::now().timestamp() + 3600
            }))
            .unwrap(),
        );
        parts[1] = &forged;
        let tampered = parts.join(".");

        let result = verify_token(&tampered, &key_set(), GITHUB_ISSUER, "cache");
        assert!(matches!(result, Err(AuthError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_expired_token() {
        let mut claims = github_claims("cache");
        claims["exp"] = json!(chrono::Utc::now().timestamp() - 3600);
        let token = sign(&claims);

        let result = verify_token(&token, &key_set(), GITHUB_ISSUER, "cache");
        assert!(matches!(result, Err(AuthError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_unknown_kid() {
        let token = sign(&github_claims("cache"));
        let empty: JwkSet = serde_json::from_value(json!({"keys": []})).unwrap();

        let result = verify_token(&token, &empty, GITHUB_ISSUER, "cache");
        assert!(matches!(result, Err(AuthError::InvalidSignature(_))));
    }
}
