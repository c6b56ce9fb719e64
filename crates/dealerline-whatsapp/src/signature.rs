// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `X-Twilio-Signature` validation.
//!
//! The provider signs the full webhook URL followed by every POST parameter,
//! sorted by name, with each name and value concatenated without separators.
//! The signature is base64(HMAC-SHA1(auth_token, payload)).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

#[derive(Clone)]
pub struct SignatureValidator {
    auth_token: String,
    webhook_url: String,
}

impl std::fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureValidator")
            .field("auth_token", &"[REDACTED]")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

impl SignatureValidator {
    pub fn new(auth_token: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            webhook_url: webhook_url.into(),
        }
    }

    fn mac(&self, params: &[(String, String)]) -> Option<HmacSha1> {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes()).ok()?;
        mac.update(self.webhook_url.as_bytes());
        for (key, value) in sorted {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        Some(mac)
    }

    /// Computes the signature the provider would send for `params`.
    pub fn sign(&self, params: &[(String, String)]) -> Option<String> {
        self.mac(params)
            .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Verifies a signature header in constant time. A missing or
    /// undecodable header never verifies.
    pub fn verify(&self, signature: Option<&str>, params: &[(String, String)]) -> bool {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return false;
        };
        let Ok(expected) = STANDARD.decode(signature) else {
            return false;
        };
        let Some(mac) = self.mac(params) else {
            return false;
        };
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("MessageSid".into(), "SM123".into()),
            ("From".into(), "whatsapp:+5585999990000".into()),
            ("Body".into(), "oi".into()),
        ]
    }

    fn validator() -> SignatureValidator {
        SignatureValidator::new("token-123", "https://dealer.example/webhooks/whatsapp")
    }

    #[test]
    fn signature_covers_url_and_sorted_params() {
        let mut mac = HmacSha1::new_from_slice(b"token-123").unwrap();
        mac.update(
            b"https://dealer.example/webhooks/whatsappBodyoiFromwhatsapp:+5585999990000MessageSidSM123",
        );
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        assert_eq!(validator().sign(&params()).unwrap(), expected);
    }

    #[test]
    fn valid_signature_verifies() {
        let v = validator();
        let sig = v.sign(&params()).unwrap();
        assert!(v.verify(Some(&sig), &params()));
    }

    #[test]
    fn tampered_params_fail() {
        let v = validator();
        let sig = v.sign(&params()).unwrap();
        let mut tampered = params();
        tampered[2].1 = "quero desconto".into();
        assert!(!v.verify(Some(&sig), &tampered));
    }

    #[test]
    fn missing_or_garbage_header_fails() {
        let v = validator();
        assert!(!v.verify(None, &params()));
        assert!(!v.verify(Some(""), &params()));
        assert!(!v.verify(Some("not base64!!"), &params()));
    }

    #[test]
    fn different_url_fails() {
        let sig = validator().sign(&params()).unwrap();
        let other = SignatureValidator::new("token-123", "https://other.example/hook");
        assert!(!other.verify(Some(&sig), &params()));
    }

    #[test]
    fn debug_redacts_token() {
        let out = format!("{:?}", validator());
        assert!(!out.contains("token-123"));
    }
}
