// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Building CMS/PKCS#7 SignedData packages. */

use {
    crate::{
        algorithm::{DigestAlgorithm, SignatureAlgorithm},
        asn1::rfc5652::{
            signing_time_now, Attribute, AttributeValue, CertificateChoices, CertificateSet,
            CmsVersion, DigestAlgorithmIdentifiers, EncapsulatedContentInfo,
            IssuerAndSerialNumber, SignedAttributes, SignedData, SignerIdentifier, SignerInfo,
            SignerInfos, OID_CONTENT_TYPE, OID_ID_DATA, OID_MESSAGE_DIGEST, OID_SIGNING_TIME,
        },
        certificate::Certificate,
        error::Result,
        keys::SigningKeyPair,
    },
    bcder::{
        encode::{PrimitiveContent, Values},
        Captured, Mode, OctetString, Oid,
    },
    bytes::Bytes,
    std::collections::HashSet,
};

/// Describes one entity signing content in a [SignedDataBuilder].
pub struct SignerBuilder<'a> {
    /// The key pair producing the signature.
    signing_key: &'a SigningKeyPair,

    /// X.509 certificate identifying the signer.
    signing_certificate: Certificate,

    /// Content digest algorithm to use.
    digest_algorithm: DigestAlgorithm,

    /// Explicit content for the message-digest attribute.
    ///
    /// Set when the document travels outside the structure (detached CMS
    /// mode); otherwise the encapsulated content is digested.
    message_content: Option<Vec<u8>>,

    /// Content type of the value being signed.
    content_type: Oid,
}

impl<'a> SignerBuilder<'a> {
    pub fn new(signing_key: &'a SigningKeyPair, signing_certificate: Certificate) -> Self {
        Self {
            signing_key,
            signing_certificate,
            digest_algorithm: DigestAlgorithm::Sha256,
            message_content: None,
            content_type: Oid(Bytes::copy_from_slice(OID_ID_DATA.as_ref())),
        }
    }

    /// Define external content for the message-digest attribute.
    ///
    /// Use for detached packages where the document is not embedded and
    /// must be supplied separately at verification time.
    pub fn message_content(mut self, data: Vec<u8>) -> Self {
        self.message_content = Some(data);
        self
    }

    /// The signature algorithm this signer will use on the wire.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Sha256Rsa
    }
}

/// Entity for incrementally deriving a SignedData package.
#[derive(Default)]
pub struct SignedDataBuilder<'a> {
    /// Content to embed and sign.
    signed_content: Option<Vec<u8>>,

    /// Entities that will produce signatures.
    signers: Vec<SignerBuilder<'a>>,

    /// Extra certificates to carry in the payload.
    certificates: Vec<crate::asn1::rfc5280::Certificate>,
}

impl<'a> SignedDataBuilder<'a> {
    /// Define the content to sign and embed (encapsulated content).
    pub fn signed_content(mut self, data: Vec<u8>) -> Self {
        self.signed_content = Some(data);
        self
    }

    /// Add a signer.
    ///
    /// The signer's certificate is embedded automatically.
    pub fn signer(mut self, signer: SignerBuilder<'a>) -> Self {
        self.signers.push(signer);
        self
    }

    /// Add a certificate to the payload.
    pub fn certificate(mut self, cert: &Certificate) -> Self {
        let cert = cert.raw_certificate();

        if !self.certificates.iter().any(|x| x == cert) {
            self.certificates.push(cert.clone());
        }

        self
    }

    /// Construct a DER-encoded document containing a `SignedData` object.
    pub fn build_der(&self) -> Result<Vec<u8>> {
        let mut signer_infos = SignerInfos::default();
        let mut seen_digest_algorithms = HashSet::new();
        let mut seen_certificates = self.certificates.clone();

        for signer in &self.signers {
            seen_digest_algorithms.insert(signer.digest_algorithm);

            let cert = signer.signing_certificate.raw_certificate();
            if !seen_certificates.iter().any(|x| x == cert) {
                seen_certificates.push(cert.clone());
            }

            let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: signer.signing_certificate.issuer_name().clone(),
                serial_number: signer.signing_certificate.serial_number().clone(),
            });

            let mut signed_attributes = SignedAttributes::default();

            // The content-type attribute is mandatory.
            signed_attributes.push(Attribute {
                typ: Oid(Bytes::copy_from_slice(OID_CONTENT_TYPE.as_ref())),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    signer.content_type.encode_ref(),
                ))],
            });

            // The message-digest attribute is mandatory. It digests the
            // external content when supplied, else the encapsulated content.
            let mut hasher = signer.digest_algorithm.digester();
            if let Some(content) = &signer.message_content {
                hasher.update(content);
            } else if let Some(content) = &self.signed_content {
                hasher.update(content);
            }

            signed_attributes.push(Attribute {
                typ: Oid(Bytes::copy_from_slice(OID_MESSAGE_DIGEST.as_ref())),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    hasher.finish().as_ref().encode(),
                ))],
            });

            // Signing time is conventional to include.
            signed_attributes.push(Attribute {
                typ: Oid(Bytes::copy_from_slice(OID_SIGNING_TIME.as_ref())),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    signing_time_now().encode(),
                ))],
            });

            let mut signer_info = SignerInfo {
                version: CmsVersion::V1,
                sid,
                digest_algorithm: signer.digest_algorithm.into(),
                signed_attributes: Some(signed_attributes),
                signature_algorithm: signer.signature_algorithm().into(),
                signature: OctetString::new(Bytes::new()),
                signed_attributes_data: None,
            };

            // RFC 5652 Section 5.4: with signed attributes present, the
            // signature covers the EXPLICIT SET OF DER encoding of the
            // attributes (which bind the content digest), not the content
            // itself.
            let signed_message = signer_info
                .signed_attributes_digested_content()?
                .expect("signed attributes are always present on built SignerInfos");

            signer_info.signature =
                OctetString::new(Bytes::from(signer.signing_key.sign_pkcs1v15(&signed_message)?));

            signer_infos.push(signer_info);
        }

        let mut digest_algorithms = DigestAlgorithmIdentifiers::default();
        digest_algorithms.extend(seen_digest_algorithms.into_iter().map(Into::into));

        let mut certificates = CertificateSet::default();
        certificates.extend(
            seen_certificates
                .into_iter()
                .map(|cert| CertificateChoices::Certificate(Box::new(cert))),
        );

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms,
            content_info: EncapsulatedContentInfo {
                content_type: Oid(Bytes::copy_from_slice(OID_ID_DATA.as_ref())),
                content: self
                    .signed_content
                    .as_ref()
                    .map(|content| OctetString::new(Bytes::copy_from_slice(content))),
            },
            certificates: if certificates.is_empty() {
                None
            } else {
                Some(certificates)
            },
            signer_infos,
        };

        let mut der = Vec::new();
        signed_data.encode_ref().write_encoded(Mode::Der, &mut der)?;

        Ok(der)
    }
}

/// Package a document as a SignedData blob with a single signer.
///
/// With `embed_content` the document bytes are carried inside the structure
/// (encapsulated content); without it only the signature and metadata are
/// carried and the document must be supplied separately at verification
/// time.
pub fn pack_document(
    document: &[u8],
    certificate: &Certificate,
    keypair: &SigningKeyPair,
    embed_content: bool,
) -> Result<Vec<u8>> {
    let mut signer = SignerBuilder::new(keypair, certificate.clone());
    let mut builder = SignedDataBuilder::default();

    if embed_content {
        builder = builder.signed_content(document.to_vec());
    } else {
        signer = signer.message_content(document.to_vec());
    }

    builder.signer(signer).build_der()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            certificate::CertificateBuilder,
            cms,
            testutil::{test_identity, test_key_pair},
        },
    };

    #[test]
    fn built_package_is_binary_der() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let der = pack_document(b"payload", &cert, &key, true).unwrap();

        // Outer SEQUENCE tag of ContentInfo.
        assert_eq!(der[0], 0x30);
    }

    #[test]
    fn builder_dedupes_certificates() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        // Explicitly added certificate equals the signer's certificate; it
        // must be carried once.
        let der = SignedDataBuilder::default()
            .signed_content(b"content".to_vec())
            .certificate(&cert)
            .signer(SignerBuilder::new(&key, cert.clone()))
            .build_der()
            .unwrap();

        let parsed = cms::SignedData::parse(&der).unwrap();
        assert_eq!(parsed.certificates().count(), 1);
    }

    #[test]
    fn multiple_signers_are_supported() {
        let key = test_key_pair();
        let second_key = crate::testutil::second_test_key_pair();

        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();
        let second_identity =
            crate::certificate::Identity::new("US", "NY", "New York", "Second Org", "Second");
        let second_cert = CertificateBuilder::new(second_identity, &second_key)
            .issue()
            .unwrap();

        let der = SignedDataBuilder::default()
            .signed_content(b"multi signer".to_vec())
            .signer(SignerBuilder::new(&key, cert))
            .signer(SignerBuilder::new(&second_key, second_cert))
            .build_der()
            .unwrap();

        let parsed = cms::SignedData::parse(&der).unwrap();
        assert_eq!(parsed.certificates().count(), 2);
        assert_eq!(parsed.signers().count(), 2);

        for signer in parsed.signers() {
            signer.verify_signature_with_signed_data(&parsed).unwrap();
            signer
                .verify_message_digest_with_signed_data(&parsed)
                .unwrap();
        }
    }
}
