// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cryptographic algorithm identifiers used by this system.

use {
    crate::{asn1::rfc5280::AlgorithmIdentifier, error::Error},
    bcder::{ConstOid, Oid},
    ring::{digest, signature},
};

/// SHA-256 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.1
const OID_SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// SHA-512 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.3
const OID_SHA512: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 3]);

/// RSA encryption.
///
/// 1.2.840.113549.1.1.1
const OID_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);

/// RSA+SHA-256 encryption.
///
/// 1.2.840.113549.1.1.11
const OID_SHA256_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);

/// RSA+SHA-512 encryption.
///
/// 1.2.840.113549.1.1.13
const OID_SHA512_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 13]);

/// RSASSA-PSS.
///
/// 1.2.840.113549.1.1.10
const OID_RSA_PSS: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 10]);

/// A hashing algorithm used for digesting data.
///
/// Instances convert to and from [Oid] and the ASN.1 [AlgorithmIdentifier]
/// via `From`/`TryFrom`, and can produce a [digest::Context] for computing
/// digests.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    /// SHA-256.
    ///
    /// Corresponds to OID 2.16.840.1.101.3.4.2.1.
    Sha256,

    /// SHA-512.
    ///
    /// Corresponds to OID 2.16.840.1.101.3.4.2.3.
    Sha512,
}

impl From<DigestAlgorithm> for Oid {
    fn from(alg: DigestAlgorithm) -> Self {
        Oid(match alg {
            DigestAlgorithm::Sha256 => OID_SHA256.as_ref(),
            DigestAlgorithm::Sha512 => OID_SHA512.as_ref(),
        }
        .into())
    }
}

impl TryFrom<&Oid> for DigestAlgorithm {
    type Error = Error;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_SHA256 {
            Ok(Self::Sha256)
        } else if v == &OID_SHA512 {
            Ok(Self::Sha512)
        } else {
            Err(Error::UnknownDigestAlgorithm(format!("{}", v)))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for DigestAlgorithm {
    type Error = Error;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

impl From<DigestAlgorithm> for AlgorithmIdentifier {
    fn from(alg: DigestAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

impl DigestAlgorithm {
    /// Obtain an object that can digest content using this algorithm.
    pub fn digester(&self) -> digest::Context {
        digest::Context::new(match self {
            Self::Sha256 => &digest::SHA256,
            Self::Sha512 => &digest::SHA512,
        })
    }
}

/// An algorithm used to digitally sign content.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.11.
    Sha256Rsa,

    /// SHA-512 with RSA encryption.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.13.
    Sha512Rsa,

    /// RSASSA-PSS.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.10.
    RsaPss,
}

impl From<SignatureAlgorithm> for Oid {
    fn from(alg: SignatureAlgorithm) -> Self {
        Oid(match alg {
            SignatureAlgorithm::Sha256Rsa => OID_SHA256_RSA.as_ref(),
            SignatureAlgorithm::Sha512Rsa => OID_SHA512_RSA.as_ref(),
            SignatureAlgorithm::RsaPss => OID_RSA_PSS.as_ref(),
        }
        .into())
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifier {
    fn from(alg: SignatureAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for SignatureAlgorithm {
    type Error = Error;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        if v.algorithm == OID_SHA256_RSA {
            Ok(Self::Sha256Rsa)
        } else if v.algorithm == OID_SHA512_RSA {
            Ok(Self::Sha512Rsa)
        } else if v.algorithm == OID_RSA_PSS {
            Ok(Self::RsaPss)
        } else {
            Err(Error::UnknownSignatureAlgorithm(format!(
                "{}",
                v.algorithm
            )))
        }
    }
}

impl SignatureAlgorithm {
    /// Resolve a signature algorithm from an OID plus a digest algorithm.
    ///
    /// Some producers store the bare key algorithm (e.g. rsaEncryption) in
    /// the SignerInfo signature algorithm field instead of a concrete
    /// digest+signature pair. Resolving with the signer's digest algorithm
    /// handles both forms.
    pub fn from_oid_and_digest_algorithm(
        oid: &Oid,
        digest_algorithm: DigestAlgorithm,
    ) -> Result<Self, Error> {
        if oid == &OID_SHA256_RSA {
            Ok(Self::Sha256Rsa)
        } else if oid == &OID_SHA512_RSA {
            Ok(Self::Sha512Rsa)
        } else if oid == &OID_RSA_PSS {
            Ok(Self::RsaPss)
        } else if oid == &OID_RSA {
            Ok(match digest_algorithm {
                DigestAlgorithm::Sha256 => Self::Sha256Rsa,
                DigestAlgorithm::Sha512 => Self::Sha512Rsa,
            })
        } else {
            Err(Error::UnknownSignatureAlgorithm(format!("{}", oid)))
        }
    }

    /// Resolve the ring verification algorithm for this signature algorithm
    /// when paired with a given key algorithm.
    pub fn resolve_verification_algorithm(
        &self,
        key_algorithm: KeyAlgorithm,
    ) -> &'static dyn signature::VerificationAlgorithm {
        match key_algorithm {
            KeyAlgorithm::Rsa => match self {
                Self::Sha256Rsa => &signature::RSA_PKCS1_2048_8192_SHA256,
                Self::Sha512Rsa => &signature::RSA_PKCS1_2048_8192_SHA512,
                Self::RsaPss => &signature::RSA_PSS_2048_8192_SHA256,
            },
        }
    }
}

/// Cryptographic algorithm used by a private key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    /// RSA.
    ///
    /// Corresponds to OID 1.2.840.113549.1.1.1.
    Rsa,
}

impl From<KeyAlgorithm> for Oid {
    fn from(alg: KeyAlgorithm) -> Self {
        Oid(match alg {
            KeyAlgorithm::Rsa => OID_RSA.as_ref(),
        }
        .into())
    }
}

impl TryFrom<&Oid> for KeyAlgorithm {
    type Error = Error;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_RSA {
            Ok(Self::Rsa)
        } else {
            Err(Error::UnknownKeyAlgorithm(format!("{}", v)))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for KeyAlgorithm {
    type Error = Error;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

impl From<KeyAlgorithm> for AlgorithmIdentifier {
    fn from(alg: KeyAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_algorithm_oid_roundtrip() {
        for alg in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
            let oid = Oid::from(alg);
            assert_eq!(DigestAlgorithm::try_from(&oid).unwrap(), alg);
        }
    }

    #[test]
    fn signature_algorithm_resolution() {
        let rsa_oid = Oid::from(KeyAlgorithm::Rsa);
        assert_eq!(
            SignatureAlgorithm::from_oid_and_digest_algorithm(&rsa_oid, DigestAlgorithm::Sha256)
                .unwrap(),
            SignatureAlgorithm::Sha256Rsa
        );

        let pss_oid = Oid::from(SignatureAlgorithm::RsaPss);
        assert_eq!(
            SignatureAlgorithm::from_oid_and_digest_algorithm(&pss_oid, DigestAlgorithm::Sha256)
                .unwrap(),
            SignatureAlgorithm::RsaPss
        );

        let unknown = Oid(bytes::Bytes::from_static(&[1, 2, 3]));
        assert!(
            SignatureAlgorithm::from_oid_and_digest_algorithm(&unknown, DigestAlgorithm::Sha256)
                .is_err()
        );
    }

    #[test]
    fn sha256_digester() {
        let mut ctx = DigestAlgorithm::Sha256.digester();
        ctx.update(b"hello");
        let digest = ctx.finish();
        assert_eq!(
            hex::encode(digest.as_ref()),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
