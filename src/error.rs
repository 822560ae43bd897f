// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {std::path::PathBuf, thiserror::Error};

/// Unified error type for document signing operations.
///
/// A failed signature check is deliberately NOT represented here. Signature
/// validity is a value ([crate::SignatureVerdict] or a per-signer report
/// entry), always accompanied by the claimed signer identity. The variants
/// below describe conditions that prevent an operation from producing an
/// outcome at all, and none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// An expected artifact file is absent.
    ///
    /// The hint names the command that produces the artifact.
    #[error("{} not found; {hint}", path.display())]
    MissingArtifact { path: PathBuf, hint: &'static str },

    /// The encrypted private key could not be unlocked.
    ///
    /// Wrong passphrase and corrupt key material are indistinguishable by
    /// design; callers re-prompt.
    #[error("unable to decrypt the private key (wrong passphrase or corrupt key file)")]
    Decrypt,

    /// Malformed ASN.1 input. The decode error carries positional context
    /// identifying which structural expectation failed.
    #[error("malformed input: {0}")]
    Format(bcder::decode::DecodeError<std::convert::Infallible>),

    #[error("PEM error: {0}")]
    Pem(pem::PemError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for --{0}")]
    CliBadArgument(&'static str),

    #[error("RSA key generation error: {0}")]
    KeyGeneration(rsa::Error),

    #[error("private key serialization error: {0}")]
    KeyEncode(pkcs8::Error),

    #[error("private key parse error: {0}")]
    KeyDecode(pkcs8::Error),

    #[error("public key serialization error: {0}")]
    PublicKeyEncode(pkcs8::spki::Error),

    #[error("public key encoding error: {0}")]
    PublicKeyPkcs1(rsa::pkcs1::Error),

    #[error("error creating signature: {0}")]
    SignatureCreation(rsa::signature::Error),

    #[error("bad string value: {0:?}")]
    CharSet(bcder::string::CharSetError),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("unknown signature algorithm: {0}")]
    UnknownSignatureAlgorithm(String),

    #[error("unknown signing key algorithm: {0}")]
    UnknownKeyAlgorithm(String),

    /// A certificate's signature did not verify against the supplied key.
    #[error("certificate signature verification failed")]
    CertificateSignatureVerificationFailed,

    /// No embedded certificate matches a CMS signer identifier.
    #[error("no embedded certificate matches the signer identifier")]
    CertificateNotFound,

    /// A CMS signature failed cryptographic verification.
    #[error("CMS signature verification failed")]
    SignatureVerification,

    /// A CMS message digest did not match the encapsulated content.
    #[error("message digest does not match the signed content")]
    DigestNotEqual,

    /// Signed attributes were required but absent.
    #[error("SignedAttributes structure is missing")]
    NoSignedAttributes,

    /// A signed attribute violated a structural requirement of RFC 5652.
    #[error("malformed signed attributes: {0}")]
    MalformedSignedAttributes(&'static str),
}

impl From<bcder::decode::DecodeError<std::convert::Infallible>> for Error {
    fn from(e: bcder::decode::DecodeError<std::convert::Infallible>) -> Self {
        Self::Format(e)
    }
}

impl From<pem::PemError> for Error {
    fn from(e: pem::PemError) -> Self {
        Self::Pem(e)
    }
}

impl From<bcder::string::CharSetError> for Error {
    fn from(e: bcder::string::CharSetError) -> Self {
        Self::CharSet(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
