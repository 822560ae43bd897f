// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Self-signed PKI document signing and verification.

This crate implements a minimal PKI workflow in pure, safe Rust:

* Generation of RSA-2048 key pairs, persisted only as passphrase-encrypted
  PKCS#8 PEM ([keys]).
* Issuance of self-signed X.509 identity certificates ([certificate]).
* Detached document signatures: a randomized RSA-PSS/SHA-256 signature over
  a document's exact bytes, verified against a companion certificate
  ([detached]).
* CMS/PKCS#7 `SignedData` packaging and parsing, with optional embedded
  content ([signing], [cms]), plus a structured inspection report
  ([reader]).
* A per-identity filesystem layout for all persisted artifacts ([storage]).

Low-level ASN.1 primitives live in [asn1], in modules named after the RFC
defining the types they hold.

# IMPORTANT SECURITY LIMITATIONS

**The verification functionality in this crate is purposefully limited and
isn't sufficient for trusting signed data on its own.**

Verification here answers the question *did certificate X sign content Y*.
It does not answer *do I trust certificate X*: there is no certificate
chain validation, no revocation checking, and no trust-store management.
Only a single self-signed certificate is ever validated against a single
signature. Certificate expiry is likewise not enforced at verification
time. In the detached packaging style nothing cryptographically binds the
signature to the certificate stored beside it; verification trusts
whichever certificate is supplied.
*/

pub mod algorithm;
pub mod asn1;
pub mod certificate;
pub mod cms;
pub mod detached;
pub mod error;
pub mod keys;
pub mod reader;
pub mod signing;
pub mod storage;

#[cfg(test)]
mod testutil;

pub use {
    certificate::{Certificate, CertificateBuilder, Identity},
    cms::{SignedData, SignerId, SignerInfo},
    detached::{sign_document, verify_document, SignatureVerdict, VerifiedDocument},
    error::{Error, Result},
    keys::SigningKeyPair,
    reader::CmsReport,
    signing::{pack_document, SignedDataBuilder, SignerBuilder},
    storage::IdentityStore,
};
