// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Detached document signatures.

A detached signature is a raw RSA-PSS/SHA-256 signature over a document's
exact bytes, stored beside a verbatim copy of the document and a copy of
the signing certificate. Nothing cryptographically binds the signature to
the co-located certificate: verification trusts whichever certificate the
caller supplies, an inherent property of this packaging style.
*/

use {
    crate::{
        certificate::{Certificate, Identity},
        error::Result,
        keys::SigningKeyPair,
    },
    ring::signature::{UnparsedPublicKey, RSA_PSS_2048_8192_SHA256},
    serde::Serialize,
};

/// Outcome of a signature check.
///
/// An invalid signature is a normal, reportable outcome. It is never
/// surfaced as an error and always carries the reason for display.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureVerdict {
    Valid,
    Invalid { reason: String },
}

impl SignatureVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Result of verifying a detached signature.
///
/// The signer identity comes from the supplied certificate's subject and is
/// populated regardless of the cryptographic outcome: who claims to have
/// signed and whether the signature holds are independent facts, and a
/// caller reporting a failed check still displays the claimed signer.
#[derive(Clone, Debug, Serialize)]
pub struct VerifiedDocument {
    pub verdict: SignatureVerdict,
    pub signer: Identity,
}

/// Sign a document's exact bytes with the key pair's RSA-PSS scheme.
///
/// The signature is randomized: signing the same document twice yields
/// different bytes, both of which verify.
pub fn sign_document(document: &[u8], keypair: &SigningKeyPair) -> Result<Vec<u8>> {
    keypair.sign_pss(document)
}

/// Check a detached signature over a document against a certificate.
///
/// Any byte difference in the document, any corruption of the signature,
/// or a certificate whose public key does not pair with the signing key
/// yields an `Invalid` verdict.
pub fn verify_document(
    document: &[u8],
    signature: &[u8],
    certificate: &Certificate,
) -> VerifiedDocument {
    let signer = certificate.subject_identity();

    let public_key = UnparsedPublicKey::new(&RSA_PSS_2048_8192_SHA256, certificate.public_key_data());

    let verdict = match public_key.verify(document, signature) {
        Ok(()) => SignatureVerdict::Valid,
        Err(_) => SignatureVerdict::Invalid {
            reason: "signature does not match the document and the certificate's public key"
                .to_string(),
        },
    };

    VerifiedDocument { verdict, signer }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            certificate::CertificateBuilder,
            testutil::{second_test_key_pair, test_identity, test_key_pair},
        },
    };

    #[test]
    fn sign_verify_roundtrip() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let document = b"hello";
        let signature = sign_document(document, &key).unwrap();

        let outcome = verify_document(document, &signature, &cert);
        assert!(outcome.verdict.is_valid());
        assert_eq!(outcome.signer.common_name, "Name");
    }

    #[test]
    fn tampered_document_is_invalid() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let document = b"important agreement".to_vec();
        let signature = sign_document(&document, &key).unwrap();

        // Single bit flip.
        let mut tampered = document.clone();
        tampered[0] ^= 0x01;

        let outcome = verify_document(&tampered, &signature, &cert);
        assert!(!outcome.verdict.is_valid());
    }

    #[test]
    fn corrupted_signature_is_invalid() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let document = b"document bytes";
        let mut signature = sign_document(document, &key).unwrap();
        let idx = signature.len() / 2;
        signature[idx] ^= 0x01;

        let outcome = verify_document(document, &signature, &cert);
        assert!(!outcome.verdict.is_valid());
    }

    #[test]
    fn mismatched_certificate_reports_identity_with_invalid_verdict() {
        let key = test_key_pair();
        let other_key = second_test_key_pair();

        // Certificate bound to a different key pair than the signer.
        let other_identity = Identity::new("US", "CA", "San Francisco", "Other Org", "Impostor");
        let other_cert = CertificateBuilder::new(other_identity.clone(), &other_key)
            .issue()
            .unwrap();

        let document = b"hello";
        let signature = sign_document(document, &key).unwrap();

        let outcome = verify_document(document, &signature, &other_cert);
        assert!(!outcome.verdict.is_valid());
        // Identity reporting is independent of the cryptographic outcome.
        assert_eq!(outcome.signer, other_identity);
    }

    #[test]
    fn resigning_with_different_key_fails_against_original_certificate() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let document = b"hello";
        let signature = sign_document(document, &key).unwrap();
        assert!(verify_document(document, &signature, &cert).verdict.is_valid());

        let second_key = second_test_key_pair();
        let second_signature = sign_document(document, &second_key).unwrap();

        let outcome = verify_document(document, &second_signature, &cert);
        assert!(!outcome.verdict.is_valid());
        assert_eq!(outcome.signer.common_name, "Name");
    }
}
