// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! High-level interface to CMS/PKCS#7 SignedData structures.

[SignedData] parses the binary (BER/DER) form directly and transparently
unwraps PEM armor when the input is textual. The types here expose what a
verifier needs: embedded certificates, per-signer identification (with an
explicit unrecognized arm), encapsulated content, and cryptographic
verification of signatures and message digests.

Verification here answers "did certificate X sign content Y" and nothing
more. There is no chain building, no revocation checking, and no trust
policy; the only certificates ever considered are the ones embedded in the
structure.
*/

use {
    crate::{
        algorithm::{DigestAlgorithm, KeyAlgorithm, SignatureAlgorithm},
        asn1::rfc5652::{
            self, CertificateChoices, SignerIdentifier, OID_CONTENT_TYPE, OID_MESSAGE_DIGEST,
            OID_SIGNING_TIME,
        },
        certificate::{certificate_is_subset_of, Certificate},
        error::{Error, Result},
    },
    bcder::{Integer, Mode, OctetString, Oid},
    bcder::encode::Values,
    ring::signature::UnparsedPublicKey,
    std::{
        collections::HashSet,
        fmt::{Debug, Formatter},
        ops::Deref,
    },
};

/// Whether input looks like PEM armor rather than raw BER/DER.
fn is_pem_armored(data: &[u8]) -> bool {
    data.iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|idx| data[idx..].starts_with(b"-----BEGIN"))
        .unwrap_or(false)
}

/// A parsed CMS SignedData structure.
///
/// High-level counterpart to [rfc5652::SignedData], carrying decoded
/// certificates and signers instead of raw ASN.1.
#[derive(Clone)]
pub struct SignedData {
    digest_algorithms: HashSet<DigestAlgorithm>,
    signed_content: Option<Vec<u8>>,
    certificates: Vec<Certificate>,
    unrecognized_certificates: usize,
    signers: Vec<SignerInfo>,
}

impl Debug for SignedData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SignedData");
        s.field("digest_algorithms", &self.digest_algorithms);
        s.field(
            "signed_content",
            &format_args!("{:?}", self.signed_content.as_ref().map(hex::encode)),
        );
        s.field("certificates", &self.certificates);
        s.field("unrecognized_certificates", &self.unrecognized_certificates);
        s.field("signers", &self.signers);
        s.finish()
    }
}

impl SignedData {
    /// Parse a SignedData package from binary or PEM-armored input.
    ///
    /// Textual armor is detected by its `-----BEGIN` delimiter and unwrapped
    /// before structural parsing. All failures are recoverable
    /// [Error::Format]/[Error::Pem] values describing which structural
    /// expectation failed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if is_pem_armored(data) {
            let pem = pem::parse(data)?;

            Self::parse_ber(&pem.contents)
        } else {
            Self::parse_ber(data)
        }
    }

    /// Parse a SignedData package from BER/DER bytes.
    pub fn parse_ber(data: &[u8]) -> Result<Self> {
        Self::try_from(&rfc5652::SignedData::decode_ber(data)?)
    }

    /// Obtain the encapsulated content that was signed, if embedded.
    pub fn signed_content(&self) -> Option<&[u8]> {
        self.signed_content.as_deref()
    }

    /// Iterate over the certificates embedded in the structure.
    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    /// Number of embedded certificate choices with a format this system
    /// doesn't recognize (attribute certificates and the like). Reported,
    /// not rejected.
    pub fn unrecognized_certificates(&self) -> usize {
        self.unrecognized_certificates
    }

    /// Iterate over entities that signed the content.
    pub fn signers(&self) -> impl Iterator<Item = &SignerInfo> {
        self.signers.iter()
    }

    /// Digest algorithms advertised by the structure.
    pub fn digest_algorithms(&self) -> impl Iterator<Item = &DigestAlgorithm> {
        self.digest_algorithms.iter()
    }
}

impl TryFrom<&rfc5652::SignedData> for SignedData {
    type Error = Error;

    fn try_from(raw: &rfc5652::SignedData) -> Result<Self> {
        let digest_algorithms = raw
            .digest_algorithms
            .iter()
            .map(DigestAlgorithm::try_from)
            .collect::<Result<HashSet<_>>>()?;

        let signed_content = raw
            .content_info
            .content
            .as_ref()
            .map(|content| content.to_bytes().to_vec());

        let mut certificates = Vec::new();
        let mut unrecognized_certificates = 0;

        if let Some(certs) = &raw.certificates {
            for choice in certs.iter() {
                match choice {
                    CertificateChoices::Certificate(cert) => {
                        let mut cert_der = Vec::new();
                        cert.encode_ref()
                            .write_encoded(Mode::Der, &mut cert_der)?;

                        certificates.push(Certificate::from_der(cert_der)?);
                    }
                    CertificateChoices::Other(_) => {
                        unrecognized_certificates += 1;
                    }
                }
            }
        }

        let signers = raw
            .signer_infos
            .iter()
            .map(SignerInfo::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            digest_algorithms,
            signed_content,
            certificates,
            unrecognized_certificates,
            signers,
        })
    }
}

/// How a SignerInfo identifies its signing certificate.
///
/// A closed set with an explicit unknown arm: identification schemes this
/// system doesn't know degrade to "reported, unverified" instead of
/// failing the parse.
#[derive(Clone, Debug)]
pub enum SignerId {
    /// Issuer distinguished name plus certificate serial number.
    IssuerAndSerial {
        issuer: crate::asn1::rfc3280::Name,
        serial: Integer,
    },

    /// Subject key identifier octets.
    SubjectKeyIdentifier(Vec<u8>),

    /// A scheme this system doesn't recognize.
    Unrecognized,
}

/// A single signed assertion within a [SignedData] payload.
#[derive(Clone)]
pub struct SignerInfo {
    sid: SignerId,
    digest_algorithm: DigestAlgorithm,
    signature_algorithm: SignatureAlgorithm,
    signature: Vec<u8>,
    signed_attributes: Option<SignedAttributes>,
    digested_signed_attributes_data: Option<Vec<u8>>,
}

impl Debug for SignerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SignerInfo");
        s.field("sid", &self.sid);
        s.field("digest_algorithm", &self.digest_algorithm);
        s.field("signature_algorithm", &self.signature_algorithm);
        s.field("signature", &format_args!("{}", hex::encode(&self.signature)));
        s.field("signed_attributes", &self.signed_attributes);
        s.finish()
    }
}

impl SignerInfo {
    /// How this signer identifies its certificate.
    pub fn identifier(&self) -> &SignerId {
        &self.sid
    }

    /// The message digest algorithm used by this signer.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// The cryptographic signing algorithm used by this signer.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// The raw bytes of the cryptographic signature.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Signed attributes attached to this signer, if present.
    pub fn signed_attributes(&self) -> Option<&SignedAttributes> {
        self.signed_attributes.as_ref()
    }

    /// Locate the certificate this signer refers to among candidates.
    ///
    /// Issuer+serial resolves via serial equality and issuer-name subset
    /// matching; subject key identifiers resolve against the corresponding
    /// certificate extension. `None` means the signer can only be reported,
    /// not cryptographically verified.
    pub fn resolve_certificate<'a, C>(&self, certs: C) -> Option<&'a Certificate>
    where
        C: IntoIterator<Item = &'a Certificate>,
    {
        match &self.sid {
            SignerId::IssuerAndSerial { issuer, serial } => certs.into_iter().find(|cert| {
                certificate_is_subset_of(serial, issuer, cert.serial_number(), cert.issuer_name())
            }),
            SignerId::SubjectKeyIdentifier(ski) => certs.into_iter().find(|cert| {
                cert.subject_key_identifier()
                    .map(|candidate| candidate.as_ref() == ski.as_slice())
                    .unwrap_or(false)
            }),
            SignerId::Unrecognized => None,
        }
    }

    /// Obtain the bytes whose digest constitutes the signed message.
    ///
    /// Per RFC 5652 Section 5.4 this is the DER encoding of the signed
    /// attributes when present, else the encapsulated content itself.
    pub fn signed_content(&self, content: Option<&[u8]>) -> Vec<u8> {
        if let Some(attributes_data) = &self.digested_signed_attributes_data {
            attributes_data.clone()
        } else if let Some(content) = content {
            content.to_vec()
        } else {
            vec![]
        }
    }

    /// Like [Self::signed_content] using the encapsulated content of a
    /// [SignedData].
    pub fn signed_content_with_signed_data(&self, signed_data: &SignedData) -> Vec<u8> {
        self.signed_content(signed_data.signed_content())
    }

    /// Verify this signer's signature given the containing [SignedData].
    ///
    /// This checks only that the signature matches the signed content and
    /// the resolved certificate's public key. It validates nothing about
    /// the certificate itself.
    pub fn verify_signature_with_signed_data(&self, signed_data: &SignedData) -> Result<()> {
        let signed_content = self.signed_content_with_signed_data(signed_data);

        self.verify_signature_with_signed_data_and_content(signed_data, &signed_content)
    }

    /// Verify this signer's signature over explicitly supplied content.
    ///
    /// Used for detached packages where the document travels outside the
    /// structure. `signed_content` is the exact message that was signed:
    /// for signers with signed attributes, that is the attributes DER, not
    /// the document.
    pub fn verify_signature_with_signed_data_and_content(
        &self,
        signed_data: &SignedData,
        signed_content: &[u8],
    ) -> Result<()> {
        let verifier = self.signature_verifier(signed_data.certificates())?;

        verifier
            .verify(signed_content, &self.signature)
            .map_err(|_| Error::SignatureVerification)
    }

    /// Verify the message-digest signed attribute against the encapsulated
    /// content of a [SignedData].
    pub fn verify_message_digest_with_signed_data(&self, signed_data: &SignedData) -> Result<()> {
        self.verify_message_digest_with_content(signed_data.signed_content().unwrap_or(&[]))
    }

    /// Verify the message-digest signed attribute against explicit content.
    pub fn verify_message_digest_with_content(&self, content: &[u8]) -> Result<()> {
        let signed_attributes = self
            .signed_attributes()
            .ok_or(Error::NoSignedAttributes)?;

        let mut hasher = self.digest_algorithm.digester();
        hasher.update(content);
        let got_digest = hasher.finish();

        if signed_attributes.message_digest == got_digest.as_ref() {
            Ok(())
        } else {
            Err(Error::DigestNotEqual)
        }
    }

    /// Obtain a verifier for this signer's signature.
    ///
    /// Resolves the signing certificate among the supplied candidates and
    /// pairs its public key with the advertised algorithms.
    pub fn signature_verifier<'a, C>(
        &self,
        certs: C,
    ) -> Result<UnparsedPublicKey<bytes::Bytes>>
    where
        C: IntoIterator<Item = &'a Certificate>,
    {
        let signing_cert = self
            .resolve_certificate(certs)
            .ok_or(Error::CertificateNotFound)?;

        let key_algorithm = signing_cert
            .key_algorithm()
            .ok_or_else(|| Error::UnknownKeyAlgorithm("unsupported public key".to_string()))?;

        let verification_algorithm = self
            .signature_algorithm
            .resolve_verification_algorithm(key_algorithm);

        Ok(UnparsedPublicKey::new(
            verification_algorithm,
            signing_cert.public_key_data(),
        ))
    }
}

impl TryFrom<&rfc5652::SignerInfo> for SignerInfo {
    type Error = Error;

    fn try_from(signer_info: &rfc5652::SignerInfo) -> Result<Self> {
        let sid = match &signer_info.sid {
            SignerIdentifier::IssuerAndSerialNumber(issuer) => SignerId::IssuerAndSerial {
                issuer: issuer.issuer.clone(),
                serial: issuer.serial_number.clone(),
            },
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                SignerId::SubjectKeyIdentifier(ski.to_bytes().to_vec())
            }
            SignerIdentifier::Unrecognized(_) => SignerId::Unrecognized,
        };

        let digest_algorithm = DigestAlgorithm::try_from(&signer_info.digest_algorithm)?;

        // The signature algorithm field may carry a bare key algorithm
        // identifier, so resolve using the digest algorithm as well.
        let signature_algorithm = SignatureAlgorithm::from_oid_and_digest_algorithm(
            &signer_info.signature_algorithm.algorithm,
            digest_algorithm,
        )?;

        let signature = signer_info.signature.to_bytes().to_vec();

        let signed_attributes = signer_info
            .signed_attributes
            .as_ref()
            .map(|attributes| SignedAttributes::from_attributes(attributes))
            .transpose()?;

        let digested_signed_attributes_data = signer_info
            .signed_attributes_digested_content()
            .map_err(Error::Io)?;

        Ok(Self {
            sid,
            digest_algorithm,
            signature_algorithm,
            signature,
            signed_attributes,
            digested_signed_attributes_data,
        })
    }
}

/// Decoded contents of a CMS SignedAttributes structure.
#[derive(Clone)]
pub struct SignedAttributes {
    content_type: Oid,
    message_digest: Vec<u8>,
    signing_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Debug for SignedAttributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SignedAttributes");
        s.field("content_type", &format_args!("{}", self.content_type));
        s.field(
            "message_digest",
            &format_args!("{}", hex::encode(&self.message_digest)),
        );
        s.field("signing_time", &self.signing_time);
        s.finish()
    }
}

impl SignedAttributes {
    fn from_attributes(attributes: &rfc5652::SignedAttributes) -> Result<Self> {
        // The content-type attribute MUST be present with exactly one value.
        let content_type = attributes
            .iter()
            .find(|attr| attr.typ == OID_CONTENT_TYPE)
            .ok_or(Error::MalformedSignedAttributes(
                "content-type attribute is missing",
            ))?;

        if content_type.values.len() != 1 {
            return Err(Error::MalformedSignedAttributes(
                "content-type attribute must have exactly one value",
            ));
        }

        let content_type = content_type.values[0]
            .deref()
            .clone()
            .decode(|cons| Oid::take_from(cons))
            .map_err(|_| {
                Error::MalformedSignedAttributes("content-type attribute value is not an OID")
            })?;

        // The message-digest attribute MUST be present with exactly one value.
        let message_digest = attributes
            .iter()
            .find(|attr| attr.typ == OID_MESSAGE_DIGEST)
            .ok_or(Error::MalformedSignedAttributes(
                "message-digest attribute is missing",
            ))?;

        if message_digest.values.len() != 1 {
            return Err(Error::MalformedSignedAttributes(
                "message-digest attribute must have exactly one value",
            ));
        }

        let message_digest = message_digest.values[0]
            .deref()
            .clone()
            .decode(|cons| OctetString::take_from(cons))
            .map_err(|_| {
                Error::MalformedSignedAttributes(
                    "message-digest attribute value is not an OCTET STRING",
                )
            })?
            .to_bytes()
            .to_vec();

        // Signing time is optional but common, so pull it out for display.
        let signing_time = attributes
            .iter()
            .find(|attr| attr.typ == OID_SIGNING_TIME)
            .map(|attr| {
                if attr.values.len() != 1 {
                    return Err(Error::MalformedSignedAttributes(
                        "signing-time attribute must have exactly one value",
                    ));
                }

                let time = attr.values[0]
                    .deref()
                    .clone()
                    .decode(|cons| crate::asn1::common::Time::take_from(cons))
                    .map_err(|_| {
                        Error::MalformedSignedAttributes(
                            "signing-time attribute value is not a Time",
                        )
                    })?;

                Ok(chrono::DateTime::from(time))
            })
            .transpose()?;

        Ok(Self {
            content_type,
            message_digest,
            signing_time,
        })
    }

    pub fn content_type(&self) -> &Oid {
        &self.content_type
    }

    pub fn message_digest(&self) -> &[u8] {
        &self.message_digest
    }

    pub fn signing_time(&self) -> Option<&chrono::DateTime<chrono::Utc>> {
        self.signing_time.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            asn1::rfc5652::{
                CmsVersion, SignerIdentifier, UnrecognizedIdentifier,
            },
            certificate::CertificateBuilder,
            signing::pack_document,
            testutil::{test_identity, test_key_pair},
        },
        bcder::{encode::PrimitiveContent, Captured, Tag},
    };

    fn signed_package(document: &[u8], embed: bool) -> (SignedData, Vec<u8>) {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let der = pack_document(document, &cert, &key, embed).unwrap();
        let parsed = SignedData::parse(&der).unwrap();

        (parsed, der)
    }

    #[test]
    fn embedded_roundtrip_verifies() {
        let document = b"hello";
        let (signed_data, _) = signed_package(document, true);

        assert_eq!(signed_data.signed_content(), Some(document.as_ref()));
        assert_eq!(signed_data.certificates().count(), 1);
        assert_eq!(signed_data.signers().count(), 1);

        for signer in signed_data.signers() {
            assert!(matches!(
                signer.identifier(),
                SignerId::IssuerAndSerial { .. }
            ));

            let cert = signer
                .resolve_certificate(signed_data.certificates())
                .expect("signer certificate should resolve");
            assert_eq!(cert.subject_identity(), test_identity());

            signer
                .verify_signature_with_signed_data(&signed_data)
                .unwrap();
            signer
                .verify_message_digest_with_signed_data(&signed_data)
                .unwrap();
        }
    }

    #[test]
    fn detached_package_has_no_content_and_verifies_externally() {
        let document = b"detached document bytes";
        let (signed_data, _) = signed_package(document, false);

        assert!(signed_data.signed_content().is_none());

        for signer in signed_data.signers() {
            // The digest binds the external document.
            signer
                .verify_message_digest_with_content(document)
                .unwrap();
            // The signature covers the signed attributes and verifies
            // without the document being embedded.
            signer
                .verify_signature_with_signed_data(&signed_data)
                .unwrap();

            // The wrong external document fails the digest check.
            assert!(matches!(
                signer.verify_message_digest_with_content(b"other bytes"),
                Err(Error::DigestNotEqual)
            ));
        }
    }

    #[test]
    fn pem_armored_input_parses() {
        let document = b"armored";
        let (_, der) = signed_package(document, true);

        let armored = pem::encode(&pem::Pem {
            tag: "PKCS7".to_string(),
            contents: der.clone(),
        });

        let from_pem = SignedData::parse(armored.as_bytes()).unwrap();
        assert_eq!(from_pem.signed_content(), Some(document.as_ref()));

        // Leading whitespace before the armor is tolerated.
        let padded = format!("\n  {}", armored);
        assert!(SignedData::parse(padded.as_bytes()).is_ok());
    }

    #[test]
    fn non_signed_data_content_type_is_format_error() {
        // An enveloped-data content type (1.2.840.113549.1.7.3).
        let mut bogus = Vec::new();
        bcder::encode::sequence((
            bcder::Oid(bytes::Bytes::from_static(&[
                42, 134, 72, 134, 247, 13, 1, 7, 3,
            ]))
            .encode(),
            bcder::encode::sequence_as(Tag::CTX_0, ().encode()),
        ))
        .write_encoded(Mode::Der, &mut bogus)
        .unwrap();

        match SignedData::parse(&bogus) {
            Err(Error::Format(_)) => {}
            other => panic!("expected Format error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn garbage_input_is_format_error() {
        match SignedData::parse(b"\x30\x03\x02\x01") {
            Err(Error::Format(_)) => {}
            other => panic!("expected Format error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn tampered_content_fails_digest_but_parses() {
        let document = b"original content";
        let (signed_data, der) = signed_package(document, true);

        // Locate the embedded content bytes in the DER and flip one bit.
        let idx = der
            .windows(document.len())
            .position(|w| w == document.as_ref())
            .expect("embedded content should be present verbatim");
        let mut tampered = der.clone();
        tampered[idx] ^= 0x01;

        let reparsed = SignedData::parse(&tampered).unwrap();
        for signer in reparsed.signers() {
            assert!(signer
                .verify_message_digest_with_signed_data(&reparsed)
                .is_err());
        }

        drop(signed_data);
    }

    #[test]
    fn unrecognized_signer_id_is_reported_not_rejected() {
        let document = b"forward compatibility";
        let (signed_data, _) = signed_package(document, true);

        // Re-encode the package with the signer identifier replaced by a
        // context-tagged value this system doesn't model.
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();
        let der = pack_document(document, &cert, &key, true).unwrap();

        let mut raw = rfc5652::SignedData::decode_ber(&der).unwrap();
        let foreign_sid = Captured::from_values(
            Mode::Der,
            OctetString::new(bytes::Bytes::from_static(b"\x01\x02\x03\x04"))
                .encode_ref_as(Tag::ctx(5)),
        );
        raw.signer_infos[0].sid =
            SignerIdentifier::Unrecognized(UnrecognizedIdentifier(foreign_sid));
        raw.signer_infos[0].version = CmsVersion::V3;

        let mut reencoded = Vec::new();
        raw.encode_ref()
            .write_encoded(Mode::Der, &mut reencoded)
            .unwrap();

        let reparsed = SignedData::parse(&reencoded).unwrap();
        let signer = reparsed.signers().next().unwrap();

        assert!(matches!(signer.identifier(), SignerId::Unrecognized));
        assert!(signer
            .resolve_certificate(reparsed.certificates())
            .is_none());
        assert!(matches!(
            signer.verify_signature_with_signed_data(&reparsed),
            Err(Error::CertificateNotFound)
        ));

        drop(signed_data);
    }

    #[test]
    fn signer_without_matching_certificate_is_unverifiable() {
        let document = b"no certificates";
        let (_, der) = signed_package(document, true);

        // Strip the embedded certificates and re-encode.
        let mut raw = rfc5652::SignedData::decode_ber(&der).unwrap();
        raw.certificates = None;

        let mut reencoded = Vec::new();
        raw.encode_ref()
            .write_encoded(Mode::Der, &mut reencoded)
            .unwrap();

        let reparsed = SignedData::parse(&reencoded).unwrap();
        assert_eq!(reparsed.certificates().count(), 0);

        let signer = reparsed.signers().next().unwrap();
        assert!(matches!(
            signer.verify_signature_with_signed_data(&reparsed),
            Err(Error::CertificateNotFound)
        ));
    }

    #[test]
    fn signed_attributes_expose_digest_and_time() {
        let document = b"attribute inspection";
        let (signed_data, _) = signed_package(document, true);

        let signer = signed_data.signers().next().unwrap();
        let attrs = signer.signed_attributes().unwrap();

        assert_eq!(
            attrs.content_type(),
            &Oid(bytes::Bytes::copy_from_slice(
                rfc5652::OID_ID_DATA.as_ref()
            ))
        );
        assert_eq!(attrs.message_digest().len(), 32);
        assert!(attrs.signing_time().is_some());
    }
}
