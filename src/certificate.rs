// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! High-level interface to X.509 certificates and self-signed issuance. */

use {
    crate::{
        algorithm::{KeyAlgorithm, SignatureAlgorithm},
        asn1::{
            common::Time,
            rfc3280::{
                Name, OID_COMMON_NAME, OID_COUNTRY_NAME, OID_LOCALITY_NAME,
                OID_ORGANIZATION_NAME, OID_STATE_PROVINCE_NAME,
            },
            rfc5280::{
                AlgorithmIdentifier, Certificate as Asn1Certificate, SubjectPublicKeyInfo,
                TbsCertificate, Validity, Version,
            },
        },
        error::{Error, Result},
        keys::SigningKeyPair,
    },
    bcder::{
        decode::Constructed, encode::Values, BitString, ConstOid, Integer, Mode, Oid,
    },
    bytes::Bytes,
    chrono::{DateTime, Duration, Utc},
    rand::Rng,
    ring::signature::UnparsedPublicKey,
    serde::Serialize,
    std::fmt::{Display, Formatter},
};

/// Subject Key Identifier extension.
///
/// 2.5.29.14
const OID_EXTENSION_SUBJECT_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 14]);

/// Subject attributes bound into a certificate.
///
/// Pure value data: country, state/province, locality, organization, and
/// common name, mirroring the prompts of the certificate creation flow.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Identity {
    pub country: String,
    pub state_province: String,
    pub locality: String,
    pub organization: String,
    pub common_name: String,
}

impl Identity {
    pub fn new(
        country: impl ToString,
        state_province: impl ToString,
        locality: impl ToString,
        organization: impl ToString,
        common_name: impl ToString,
    ) -> Self {
        Self {
            country: country.to_string(),
            state_province: state_province.to_string(),
            locality: locality.to_string(),
            organization: organization.to_string(),
            common_name: common_name.to_string(),
        }
    }

    /// Convert to an X.501 Name.
    ///
    /// Country is encoded as a PrintableString, everything else as a
    /// UTF8String, each attribute in its own RDN.
    pub fn to_name(&self) -> Result<Name> {
        let mut name = Name::default();

        name.append_printable_string(Oid(OID_COUNTRY_NAME.as_ref().into()), &self.country)?;
        name.append_utf8_string(
            Oid(OID_STATE_PROVINCE_NAME.as_ref().into()),
            &self.state_province,
        )?;
        name.append_utf8_string(Oid(OID_LOCALITY_NAME.as_ref().into()), &self.locality)?;
        name.append_utf8_string(
            Oid(OID_ORGANIZATION_NAME.as_ref().into()),
            &self.organization,
        )?;
        name.append_utf8_string(Oid(OID_COMMON_NAME.as_ref().into()), &self.common_name)?;

        Ok(name)
    }

    /// Extract identity attributes from an X.501 Name.
    ///
    /// Attributes that are absent or fail to decode as strings come back
    /// empty; identity extraction never fails.
    pub fn from_name(name: &Name) -> Self {
        let attr = |oid: ConstOid| -> String {
            name.find_first_attribute_string(Oid(oid.as_ref().into()))
                .ok()
                .flatten()
                .unwrap_or_default()
        };

        Self {
            country: attr(OID_COUNTRY_NAME),
            state_province: attr(OID_STATE_PROVINCE_NAME),
            locality: attr(OID_LOCALITY_NAME),
            organization: attr(OID_ORGANIZATION_NAME),
            common_name: attr(OID_COMMON_NAME),
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CN={}, O={}, L={}, ST={}, C={}",
            self.common_name, self.organization, self.locality, self.state_province, self.country
        )
    }
}

/// An X.509 certificate together with the exact bytes it was parsed from.
///
/// Signatures over certificates cover the original encoding, so the
/// constructing data is retained and reused for verification and
/// re-serialization. Instances are immutable once constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certificate {
    original: Vec<u8>,
    cert: Asn1Certificate,
}

impl Certificate {
    /// Construct an instance by parsing DER encoded ASN.1 data.
    pub fn from_der(data: impl Into<Vec<u8>>) -> Result<Self> {
        let original = data.into();

        let cert = Constructed::decode(original.as_slice(), Mode::Der, |cons| {
            Asn1Certificate::take_from(cons)
        })?;

        Ok(Self { original, cert })
    }

    /// Construct an instance by parsing BER encoded ASN.1 data.
    ///
    /// X.509 certificates should be DER, but some producers emit BER.
    pub fn from_ber(data: impl Into<Vec<u8>>) -> Result<Self> {
        let original = data.into();

        let cert = Constructed::decode(original.as_slice(), Mode::Ber, |cons| {
            Asn1Certificate::take_from(cons)
        })?;

        Ok(Self { original, cert })
    }

    /// Construct an instance by parsing PEM armored data.
    ///
    /// The data is a human readable string containing
    /// `-----BEGIN CERTIFICATE-----`.
    pub fn from_pem(data: impl AsRef<[u8]>) -> Result<Self> {
        let pem = pem::parse(data.as_ref())?;

        Self::from_der(pem.contents)
    }

    /// Obtain the DER data this certificate was constructed from.
    pub fn encode_der(&self) -> &[u8] {
        &self.original
    }

    /// Encode the certificate to PEM.
    pub fn encode_pem(&self) -> String {
        pem::encode(&pem::Pem {
            tag: "CERTIFICATE".to_string(),
            contents: self.original.clone(),
        })
    }

    /// Obtain the backing ASN.1 certificate.
    pub fn raw_certificate(&self) -> &Asn1Certificate {
        &self.cert
    }

    pub fn subject_name(&self) -> &Name {
        &self.cert.tbs_certificate.subject
    }

    pub fn issuer_name(&self) -> &Name {
        &self.cert.tbs_certificate.issuer
    }

    pub fn serial_number(&self) -> &Integer {
        &self.cert.tbs_certificate.serial_number
    }

    /// Obtain the subject identity attributes.
    pub fn subject_identity(&self) -> Identity {
        Identity::from_name(self.subject_name())
    }

    /// Obtain the issuer identity attributes.
    ///
    /// For certificates issued by this system, subject and issuer are the
    /// same identity.
    pub fn issuer_identity(&self) -> Identity {
        Identity::from_name(self.issuer_name())
    }

    /// Whether the subject Name equals the issuer Name.
    pub fn subject_is_issuer(&self) -> bool {
        self.cert.tbs_certificate.subject == self.cert.tbs_certificate.issuer
    }

    /// Validity window as (not-before, not-after).
    ///
    /// Reported for display only; verification deliberately does not
    /// enforce expiry.
    pub fn validity(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let validity = &self.cert.tbs_certificate.validity;

        (
            validity.not_before.clone().into(),
            validity.not_after.clone().into(),
        )
    }

    /// Attempt to resolve the key algorithm of the embedded public key.
    pub fn key_algorithm(&self) -> Option<KeyAlgorithm> {
        KeyAlgorithm::try_from(&self.cert.tbs_certificate.subject_public_key_info.algorithm).ok()
    }

    /// Obtain the raw data constituting this certificate's public key.
    ///
    /// For RSA keys this is the PKCS#1 `RSAPublicKey` DER structure.
    pub fn public_key_data(&self) -> Bytes {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .octet_bytes()
    }

    /// Obtain the value of the subject key identifier extension, if present.
    pub fn subject_key_identifier(&self) -> Option<Bytes> {
        self.cert
            .iter_extensions()
            .find(|ext| ext.id == OID_EXTENSION_SUBJECT_KEY_IDENTIFIER)
            .and_then(|ext| ext.try_decode_octet_string())
    }

    /// Verify that this certificate was signed by a key with the given
    /// public key data.
    ///
    /// Verification is performed over the raw TBSCertificate bytes captured
    /// at parse time.
    pub fn verify_signed_by_public_key(&self, public_key_data: impl AsRef<[u8]>) -> Result<()> {
        let signed_data = self
            .cert
            .tbs_certificate
            .raw_data
            .as_ref()
            .expect("parsed certificates always capture raw TBS data");
        let signature = self.cert.signature.octet_bytes();

        let signature_algorithm = SignatureAlgorithm::try_from(&self.cert.signature_algorithm)?;
        let verify_algorithm = signature_algorithm.resolve_verification_algorithm(KeyAlgorithm::Rsa);

        let public_key = UnparsedPublicKey::new(verify_algorithm, public_key_data);

        public_key
            .verify(signed_data, &signature)
            .map_err(|_| Error::CertificateSignatureVerificationFailed)
    }

    /// Verify the self-signature of this certificate.
    pub fn verify_self_signed(&self) -> Result<()> {
        self.verify_signed_by_public_key(self.public_key_data())
    }
}

/// Whether one certificate reference is a subset of another.
///
/// True iff the serial numbers are equal and every Name attribute of the
/// first is present in the second. Used to match a SignerInfo's
/// issuer+serial against candidate certificates without requiring an exact
/// RDN encoding match.
pub fn certificate_is_subset_of(
    a_serial: &Integer,
    a_name: &Name,
    b_serial: &Integer,
    b_name: &Name,
) -> bool {
    if a_serial != b_serial {
        return false;
    }

    let Name::RdnSequence(a_sequence) = a_name;
    let Name::RdnSequence(b_sequence) = b_name;

    a_sequence.iter().all(|rdn| b_sequence.contains(rdn))
}

/// Builder for self-signed identity certificates.
///
/// The issued certificate binds one [Identity] (as both subject and issuer)
/// to the public key of the supplied key pair and is signed by that same
/// key pair, making the certificate its own root and leaf.
pub struct CertificateBuilder<'a> {
    identity: Identity,
    keypair: &'a SigningKeyPair,
    validity_days: u32,
    not_before: Option<DateTime<Utc>>,
}

impl<'a> CertificateBuilder<'a> {
    pub fn new(identity: Identity, keypair: &'a SigningKeyPair) -> Self {
        Self {
            identity,
            keypair,
            validity_days: 365,
            not_before: None,
        }
    }

    /// Set the validity duration in days. Defaults to 365.
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Override the start of the validity window. Defaults to now.
    pub fn not_before(mut self, when: DateTime<Utc>) -> Self {
        self.not_before = Some(when);
        self
    }

    /// Issue the certificate.
    pub fn issue(self) -> Result<Certificate> {
        let name = self.identity.to_name()?;
        let not_before = self.not_before.unwrap_or_else(Utc::now);
        let not_after = not_before + Duration::days(i64::from(self.validity_days));

        let tbs_certificate = TbsCertificate {
            version: Some(Version::V3),
            serial_number: Integer::from(random_serial()),
            signature: SignatureAlgorithm::Sha256Rsa.into(),
            issuer: name.clone(),
            validity: Validity {
                not_before: Time::from(not_before),
                not_after: Time::from(not_after),
            },
            subject: name,
            subject_public_key_info: SubjectPublicKeyInfo {
                algorithm: KeyAlgorithm::Rsa.into(),
                subject_public_key: BitString::new(
                    0,
                    Bytes::from(self.keypair.public_key_pkcs1_der()?),
                ),
            },
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
            raw_data: None,
        };

        let mut tbs_der = Vec::new();
        tbs_certificate
            .encode_ref()
            .write_encoded(Mode::Der, &mut tbs_der)?;

        let signature = self.keypair.sign_pkcs1v15(&tbs_der)?;

        let cert = Asn1Certificate {
            tbs_certificate,
            signature_algorithm: SignatureAlgorithm::Sha256Rsa.into(),
            signature: BitString::new(0, Bytes::from(signature)),
        };

        let mut der = Vec::new();
        cert.encode_ref().write_encoded(Mode::Der, &mut der)?;

        // A certificate this system just produced failing to re-parse is a
        // programming error, not a user-facing condition.
        Ok(Certificate::from_der(der)
            .expect("certificate produced by this builder should re-parse"))
    }
}

/// Draw a random non-negative serial number from the CSPRNG.
///
/// 63 bits of entropy makes collisions across issuances negligible without
/// maintaining any issuance state.
fn random_serial() -> i64 {
    (rand::thread_rng().gen::<u64>() >> 1) as i64
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testutil::{test_identity, test_key_pair},
    };

    #[test]
    fn identity_name_roundtrip() {
        let identity = test_identity();
        let name = identity.to_name().unwrap();

        assert_eq!(Identity::from_name(&name), identity);
    }

    #[test]
    fn identity_from_empty_name_is_empty() {
        let identity = Identity::from_name(&Name::default());

        assert_eq!(identity, Identity::default());
    }

    #[test]
    fn issue_self_signed() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        assert!(cert.subject_is_issuer());
        assert_eq!(cert.subject_identity(), test_identity());
        assert_eq!(cert.issuer_identity(), test_identity());
        assert_eq!(cert.key_algorithm(), Some(KeyAlgorithm::Rsa));
        cert.verify_self_signed().unwrap();
    }

    #[test]
    fn validity_window_follows_request() {
        let key = test_key_pair();
        let start = Utc::now();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .not_before(start)
            .validity_days(30)
            .issue()
            .unwrap();

        let (not_before, not_after) = cert.validity();
        assert_eq!(not_after - not_before, Duration::days(30));
    }

    #[test]
    fn serials_are_random() {
        let key = test_key_pair();

        let a = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();
        let b = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        assert_ne!(a.serial_number(), b.serial_number());
    }

    #[test]
    fn pem_roundtrip() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let pem_data = cert.encode_pem();
        assert!(pem_data.starts_with("-----BEGIN CERTIFICATE-----"));

        let restored = Certificate::from_pem(pem_data.as_bytes()).unwrap();
        assert_eq!(restored, cert);
        restored.verify_self_signed().unwrap();
    }

    #[test]
    fn tampered_certificate_fails_self_verification() {
        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let mut der = cert.encode_der().to_vec();
        // Flip a bit inside the TBS portion.
        let idx = der.len() / 2;
        der[idx] ^= 0x01;

        // The mutation either breaks parsing or breaks the signature.
        if let Ok(tampered) = Certificate::from_der(der) {
            assert!(tampered.verify_self_signed().is_err());
        }
    }

    #[test]
    fn verification_against_unrelated_key_fails() {
        let key = test_key_pair();
        let other = crate::testutil::second_test_key_pair();

        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        assert!(cert
            .verify_signed_by_public_key(other.public_key_pkcs1_der().unwrap())
            .is_err());
    }
}
