//! AWS signature version 4 for S3 compatible object stores.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Payload hash used for streamed bodies.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Credentials and scope used to sign requests.
#[derive(Clone)]
pub struct Signer {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

/// Headers that must accompany a signed request.
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: &'static str,
}

impl Signer {
    /// Sign a request for `canonical_uri` against `host` at `now`.
    pub fn sign(
        &self,
        method: &str,
        host: &str,
        canonical_uri: &str,
        now: DateTime<Utc>,
    ) -> SignedHeaders {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n\nhost:{host}\nx-amz-content-sha256:{UNSIGNED_PAYLOAD}\nx-amz-date:{amz_date}\n\n{signed_headers}\n{UNSIGNED_PAYLOAD}"
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = {
            let date_key = hmac(format!("AWS4{}", self.secret_access_key).as_bytes(), &date);
            let region_key = hmac(&date_key, &self.region);
            let service_key = hmac(&region_key, "s3");
            hmac(&service_key, "aws4_request")
        };
        let signature = hex::encode(hmac(&signing_key, &string_to_sign));

        SignedHeaders {
            authorization: format!(
                "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.access_key_id
            ),
            amz_date,
            content_sha256: UNSIGNED_PAYLOAD,
        }
    }
}

fn hmac(key: &[u8], message: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// URI-encode a path, leaving `/` separators intact.
pub fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(char::from(byte));
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn signer(secret: &str) -> Signer {
        Signer {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: secret.into(),
            region: "us-east-1".into(),
        }
    }

    #[test]
    fn authorization_layout() {
        let now = Utc.with_ymd_and_hms(2024, 10, 16, 8, 30, 0).unwrap();
        let headers = signer("secret").sign("GET", "s3.example.com", "/bucket/ccdb.backup", now);

        assert_eq!(headers.amz_date, "20241016T083000Z");
        assert!(headers.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20241016/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));

        let signature = headers.authorization.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn signature_depends_on_secret() {
        let now = Utc.with_ymd_and_hms(2024, 10, 16, 8, 30, 0).unwrap();
        let first = signer("first").sign("PUT", "host", "/bucket/key", now);
        let second = signer("second").sign("PUT", "host", "/bucket/key", now);

        assert_ne!(first.authorization, second.authorization);
    }

    #[test]
    fn encode_reserved_characters() {
        assert_eq!(encode_path("/bucket/a b+c.backup"), "/bucket/a%20b%2Bc.backup");
        assert_eq!(encode_path("/bucket/nfs_server.backup"), "/bucket/nfs_server.backup");
    }
}
