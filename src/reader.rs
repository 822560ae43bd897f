// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Structured inspection reports for parsed CMS packages.

[CmsReport] flattens a parsed [SignedData] into serializable value types:
which certificates are embedded, how each signer identifies its
certificate, whether each signature could be verified, and whether the
signed document travels inside the structure. Building a report never
fails; conditions that prevent verification are recorded as outcomes.
*/

use {
    crate::{
        certificate::Identity,
        cms::{SignedData, SignerId, SignerInfo},
    },
    serde::Serialize,
};

/// Marker recorded when the signed document is not embedded.
pub const DETACHED_CONTENT_NOTE: &str =
    "signature is detached; original document required separately";

/// One certificate embedded in the structure.
#[derive(Clone, Debug, Serialize)]
pub struct CertificateReport {
    pub subject: Identity,
    /// Serial number, hex encoded.
    pub serial: String,
}

/// The identification scheme a signer used, with its resolved values.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerIdentification {
    IssuerAndSerial { issuer: String, serial: String },
    SubjectKeyIdentifier { identifier: String },
    /// A scheme this system doesn't recognize. Reported, not rejected.
    Unrecognized,
}

/// Outcome of checking one signer's signature.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    Failed { reason: String },
    /// The signer could not be checked at all, e.g. because no embedded
    /// certificate matches its identifier.
    Unverifiable { reason: String },
}

/// One SignerInfo, as reported.
#[derive(Clone, Debug, Serialize)]
pub struct SignerReport {
    pub identification: SignerIdentification,

    /// Subject of the resolved signing certificate, when one matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_subject: Option<Identity>,

    pub verification: VerificationOutcome,

    /// Claimed signing time from the signed attributes, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_time: Option<String>,
}

/// Whether the signed document travels inside the structure.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentReport {
    Embedded {
        length: usize,
        /// Best-effort media type derived from the originating file name.
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type_guess: Option<String>,
    },
    Detached {
        detail: &'static str,
    },
}

/// Inspection report over a parsed SignedData package.
#[derive(Clone, Debug, Serialize)]
pub struct CmsReport {
    pub certificates: Vec<CertificateReport>,

    /// Count of embedded certificate choices with an unrecognized format.
    pub unrecognized_certificates: usize,

    pub signers: Vec<SignerReport>,

    pub content: ContentReport,
}

impl CmsReport {
    /// Build a report from a parsed package.
    ///
    /// `filename_hint` is the name of the file the package came from; it
    /// drives the media-type guess for embedded content.
    pub fn build(signed_data: &SignedData, filename_hint: Option<&str>) -> Self {
        let certificates = signed_data
            .certificates()
            .map(|cert| CertificateReport {
                subject: cert.subject_identity(),
                serial: hex::encode(cert.serial_number().as_slice()),
            })
            .collect();

        let signers = signed_data
            .signers()
            .map(|signer| report_signer(signer, signed_data))
            .collect();

        let content = match signed_data.signed_content() {
            Some(content) => ContentReport::Embedded {
                length: content.len(),
                media_type_guess: filename_hint.and_then(guess_media_type).map(String::from),
            },
            None => ContentReport::Detached {
                detail: DETACHED_CONTENT_NOTE,
            },
        };

        Self {
            certificates,
            unrecognized_certificates: signed_data.unrecognized_certificates(),
            signers,
            content,
        }
    }
}

fn report_signer(signer: &SignerInfo, signed_data: &SignedData) -> SignerReport {
    let identification = match signer.identifier() {
        SignerId::IssuerAndSerial { issuer, serial } => SignerIdentification::IssuerAndSerial {
            issuer: issuer
                .user_friendly_str()
                .unwrap_or_else(|_| "<malformed name>".to_string()),
            serial: hex::encode(serial.as_slice()),
        },
        SignerId::SubjectKeyIdentifier(ski) => SignerIdentification::SubjectKeyIdentifier {
            identifier: hex::encode(ski),
        },
        SignerId::Unrecognized => SignerIdentification::Unrecognized,
    };

    let certificate_subject = signer
        .resolve_certificate(signed_data.certificates())
        .map(|cert| cert.subject_identity());

    let verification = if certificate_subject.is_none() {
        VerificationOutcome::Unverifiable {
            reason: "no embedded certificate matches the signer identifier".to_string(),
        }
    } else {
        match signer.verify_signature_with_signed_data(signed_data) {
            Err(e) => VerificationOutcome::Failed {
                reason: e.to_string(),
            },
            Ok(()) => {
                // The message digest binds the signed attributes to the
                // document; it can only be checked when the document is
                // embedded. For detached packages the content report
                // records that the document must be supplied separately.
                if signed_data.signed_content().is_some() && signer.signed_attributes().is_some() {
                    match signer.verify_message_digest_with_signed_data(signed_data) {
                        Ok(()) => VerificationOutcome::Verified,
                        Err(e) => VerificationOutcome::Failed {
                            reason: e.to_string(),
                        },
                    }
                } else {
                    VerificationOutcome::Verified
                }
            }
        }
    };

    let signing_time = signer
        .signed_attributes()
        .and_then(|attrs| attrs.signing_time().map(|t| t.to_rfc3339()));

    SignerReport {
        identification,
        certificate_subject,
        verification,
        signing_time,
    }
}

/// Best-effort media type from a file name extension.
pub fn guess_media_type(filename: &str) -> Option<&'static str> {
    let extension = std::path::Path::new(filename)
        .extension()?
        .to_str()?
        .to_lowercase();

    match extension.as_str() {
        "txt" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "html" | "htm" => Some("text/html"),
        "xml" => Some("application/xml"),
        "json" => Some("application/json"),
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            asn1::rfc5652,
            certificate::CertificateBuilder,
            cms::SignedData,
            signing::pack_document,
            testutil::{test_identity, test_key_pair},
        },
        bcder::{encode::Values, Mode},
    };

    fn signed_package(document: &[u8], embed: bool) -> Vec<u8> {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        pack_document(document, &cert, &key, embed).unwrap()
    }

    #[test]
    fn embedded_package_report() {
        let der = signed_package(b"hello", true);
        let signed_data = SignedData::parse(&der).unwrap();

        let report = CmsReport::build(&signed_data, Some("documento_assinado.pkcs7"));

        assert_eq!(report.certificates.len(), 1);
        assert_eq!(report.certificates[0].subject, test_identity());
        assert_eq!(report.unrecognized_certificates, 0);

        assert_eq!(report.signers.len(), 1);
        let signer = &report.signers[0];
        assert!(matches!(
            signer.identification,
            SignerIdentification::IssuerAndSerial { .. }
        ));
        assert_eq!(signer.certificate_subject.as_ref(), Some(&test_identity()));
        assert!(matches!(signer.verification, VerificationOutcome::Verified));
        assert!(signer.signing_time.is_some());

        match &report.content {
            ContentReport::Embedded {
                length,
                media_type_guess,
            } => {
                assert_eq!(*length, 5);
                assert!(media_type_guess.is_none());
            }
            other => panic!("expected embedded content, got {:?}", other),
        }
    }

    #[test]
    fn detached_package_reports_absent_content() {
        let der = signed_package(b"detached", false);
        let signed_data = SignedData::parse(&der).unwrap();

        let report = CmsReport::build(&signed_data, None);

        match &report.content {
            ContentReport::Detached { detail } => {
                assert_eq!(*detail, DETACHED_CONTENT_NOTE);
            }
            other => panic!("expected detached content, got {:?}", other),
        }

        // The signature over the signed attributes still verifies; only the
        // document binding awaits the external document.
        assert!(matches!(
            report.signers[0].verification,
            VerificationOutcome::Verified
        ));
    }

    #[test]
    fn media_type_hint_follows_filename() {
        let der = signed_package(b"hello", true);
        let signed_data = SignedData::parse(&der).unwrap();

        let report = CmsReport::build(&signed_data, Some("contract.txt"));

        match &report.content {
            ContentReport::Embedded {
                media_type_guess, ..
            } => assert_eq!(media_type_guess.as_deref(), Some("text/plain")),
            other => panic!("expected embedded content, got {:?}", other),
        }
    }

    #[test]
    fn unresolvable_signer_is_reported_unverifiable() {
        let der = signed_package(b"no certs", true);

        let mut raw = rfc5652::SignedData::decode_ber(&der).unwrap();
        raw.certificates = None;

        let mut reencoded = Vec::new();
        raw.encode_ref()
            .write_encoded(Mode::Der, &mut reencoded)
            .unwrap();

        let signed_data = SignedData::parse(&reencoded).unwrap();
        let report = CmsReport::build(&signed_data, None);

        assert!(report.certificates.is_empty());
        assert!(report.signers[0].certificate_subject.is_none());
        assert!(matches!(
            report.signers[0].verification,
            VerificationOutcome::Unverifiable { .. }
        ));
    }

    #[test]
    fn tampered_content_is_reported_failed() {
        let document = b"original content";
        let der = signed_package(document, true);

        let idx = der
            .windows(document.len())
            .position(|w| w == document.as_ref())
            .unwrap();
        let mut tampered = der;
        tampered[idx] ^= 0x01;

        let signed_data = SignedData::parse(&tampered).unwrap();
        let report = CmsReport::build(&signed_data, None);

        assert!(matches!(
            report.signers[0].verification,
            VerificationOutcome::Failed { .. }
        ));
    }

    #[test]
    fn report_serializes_to_json() {
        let der = signed_package(b"hello", true);
        let signed_data = SignedData::parse(&der).unwrap();

        let report = CmsReport::build(&signed_data, Some("hello.txt"));
        let value = serde_json::to_value(&report).unwrap();

        assert!(value.get("certificates").is_some());
        assert!(value.get("signers").is_some());
        assert!(value.get("content").is_some());
    }

    #[test]
    fn media_type_guesses() {
        assert_eq!(guess_media_type("a.pdf"), Some("application/pdf"));
        assert_eq!(guess_media_type("A.TXT"), Some("text/plain"));
        assert_eq!(guess_media_type("archive.tar.gz"), None);
        assert_eq!(guess_media_type("no_extension"), None);
    }
}
