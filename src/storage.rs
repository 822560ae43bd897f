// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem layout for persisted artifacts.

Keys and certificates live in a per-identity folder named after the
normalized identity name. Signed bundles and CMS packages are written to a
caller-chosen output directory. File names are fixed so artifacts written
by one invocation are found by later ones; a missing prerequisite surfaces
as [Error::MissingArtifact] naming the command that produces it.
*/

use {
    crate::{
        certificate::Certificate,
        error::{Error, Result},
        keys::SigningKeyPair,
    },
    log::info,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Passphrase-encrypted private key PEM.
pub const PRIVATE_KEY_FILE: &str = "chave_privada.pem";

/// Public key SPKI PEM.
pub const PUBLIC_KEY_FILE: &str = "chave_publica.pem";

/// Self-signed certificate PEM.
pub const CERTIFICATE_FILE: &str = "certificado.pem";

/// Folder holding a detached signature bundle.
pub const SIGNED_BUNDLE_DIR: &str = "assinatura_com_certificado";

/// Subfolder of the bundle holding the original document copy.
pub const BUNDLE_DOCUMENT_DIR: &str = "document";

/// Raw detached signature bytes.
pub const SIGNATURE_FILE: &str = "assinatura_digital.txt";

/// Copy of the signing certificate shipped beside the signature.
pub const BUNDLE_CERTIFICATE_FILE: &str = "certificado_assinatura.pem";

/// DER-encoded CMS/PKCS#7 SignedData package.
pub const CMS_PACKAGE_FILE: &str = "documento_assinado.pkcs7";

/// Normalize an identity name into a folder name.
///
/// Trims, lowercases, and collapses runs of whitespace to underscores.
pub fn normalize_identity_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Accessor for one identity's key and certificate files.
#[derive(Clone, Debug)]
pub struct IdentityStore {
    folder: PathBuf,
}

impl IdentityStore {
    /// Open the store for an identity name under a base directory.
    ///
    /// Nothing is created until something is saved.
    pub fn new(base_dir: impl AsRef<Path>, identity_name: &str) -> Self {
        Self {
            folder: base_dir.as_ref().join(normalize_identity_name(identity_name)),
        }
    }

    /// The identity's folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn private_key_path(&self) -> PathBuf {
        self.folder.join(PRIVATE_KEY_FILE)
    }

    fn certificate_path(&self) -> PathBuf {
        self.folder.join(CERTIFICATE_FILE)
    }

    /// Persist a key pair: encrypted private key PEM plus public key PEM.
    pub fn save_key_pair(&self, keypair: &SigningKeyPair, passphrase: &str) -> Result<()> {
        fs::create_dir_all(&self.folder)?;

        let encrypted = keypair.to_encrypted_pem(passphrase)?;
        fs::write(self.private_key_path(), encrypted.as_bytes())?;
        fs::write(self.folder.join(PUBLIC_KEY_FILE), keypair.public_key_pem()?)?;

        info!("saved key pair to {}", self.folder.display());

        Ok(())
    }

    /// Check that the encrypted private key file exists.
    ///
    /// Lets callers fail with [Error::MissingArtifact] before prompting
    /// for a passphrase.
    pub fn ensure_key_pair(&self) -> Result<()> {
        let path = self.private_key_path();

        if path.is_file() {
            Ok(())
        } else {
            Err(Error::MissingArtifact {
                path,
                hint: "run generate-keys first",
            })
        }
    }

    /// Load and unlock the private key with a passphrase.
    ///
    /// The returned key pair is meant to live for a single operation; drop
    /// it when the operation completes.
    pub fn load_key_pair(&self, passphrase: &str) -> Result<SigningKeyPair> {
        self.ensure_key_pair()?;

        SigningKeyPair::from_encrypted_pem(
            &fs::read_to_string(self.private_key_path())?,
            passphrase,
        )
    }

    /// Persist a certificate as PEM.
    pub fn save_certificate(&self, certificate: &Certificate) -> Result<()> {
        fs::create_dir_all(&self.folder)?;

        let path = self.certificate_path();
        fs::write(&path, certificate.encode_pem())?;

        info!("saved certificate to {}", path.display());

        Ok(())
    }

    /// Load the identity's certificate.
    pub fn load_certificate(&self) -> Result<Certificate> {
        let path = self.certificate_path();

        if !path.is_file() {
            return Err(Error::MissingArtifact {
                path,
                hint: "run create-certificate first",
            });
        }

        Certificate::from_pem(fs::read(path)?)
    }
}

/// Write a detached signature bundle under an output directory.
///
/// The bundle folder holds a verbatim copy of the document (under a
/// `document/` subfolder, keeping its original file name), the raw
/// signature bytes, and a copy of the signing certificate. Returns the
/// bundle folder path.
pub fn write_signed_bundle(
    output_dir: impl AsRef<Path>,
    document_name: &str,
    document: &[u8],
    signature: &[u8],
    certificate: &Certificate,
) -> Result<PathBuf> {
    let bundle = output_dir.as_ref().join(SIGNED_BUNDLE_DIR);
    let document_dir = bundle.join(BUNDLE_DOCUMENT_DIR);
    fs::create_dir_all(&document_dir)?;

    fs::write(document_dir.join(document_name), document)?;
    fs::write(bundle.join(SIGNATURE_FILE), signature)?;
    fs::write(bundle.join(BUNDLE_CERTIFICATE_FILE), certificate.encode_pem())?;

    info!("wrote signed bundle to {}", bundle.display());

    Ok(bundle)
}

/// Write a CMS package blob under an output directory.
///
/// Returns the package file path.
pub fn write_cms_package(output_dir: impl AsRef<Path>, der: &[u8]) -> Result<PathBuf> {
    let path = output_dir.as_ref().join(CMS_PACKAGE_FILE);
    fs::write(&path, der)?;

    info!("wrote CMS package to {}", path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            certificate::CertificateBuilder,
            testutil::{test_identity, test_key_pair},
        },
    };

    #[test]
    fn identity_name_normalization() {
        assert_eq!(normalize_identity_name("My Name "), "my_name");
        assert_eq!(normalize_identity_name("  Ada   Lovelace"), "ada_lovelace");
        assert_eq!(normalize_identity_name("single"), "single");
    }

    #[test]
    fn key_pair_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path(), "Test User");

        let key = test_key_pair();
        store.save_key_pair(&key, "pw1").unwrap();

        assert!(dir.path().join("test_user").join(PRIVATE_KEY_FILE).is_file());
        assert!(dir.path().join("test_user").join(PUBLIC_KEY_FILE).is_file());

        let restored = store.load_key_pair("pw1").unwrap();
        assert_eq!(key.public_key(), restored.public_key());

        match store.load_key_pair("wrong") {
            Err(Error::Decrypt) => {}
            other => panic!("expected Decrypt error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_key_names_prior_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path(), "nobody");

        match store.load_key_pair("pw") {
            Err(Error::MissingArtifact { hint, .. }) => {
                assert!(hint.contains("generate-keys"));
            }
            other => panic!("expected MissingArtifact, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_certificate_names_prior_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path(), "nobody");

        match store.load_certificate() {
            Err(Error::MissingArtifact { hint, .. }) => {
                assert!(hint.contains("create-certificate"));
            }
            other => panic!("expected MissingArtifact, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn certificate_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path(), "Test User");

        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        store.save_certificate(&cert).unwrap();
        assert_eq!(store.load_certificate().unwrap(), cert);
    }

    #[test]
    fn signed_bundle_layout() {
        let dir = tempfile::tempdir().unwrap();

        let key = test_key_pair();
        let cert = CertificateBuilder::new(test_identity(), &key)
            .issue()
            .unwrap();

        let bundle = write_signed_bundle(
            dir.path(),
            "contract.txt",
            b"document bytes",
            b"signature bytes",
            &cert,
        )
        .unwrap();

        assert_eq!(bundle, dir.path().join(SIGNED_BUNDLE_DIR));
        assert_eq!(
            fs::read(bundle.join(BUNDLE_DOCUMENT_DIR).join("contract.txt")).unwrap(),
            b"document bytes"
        );
        assert_eq!(
            fs::read(bundle.join(SIGNATURE_FILE)).unwrap(),
            b"signature bytes"
        );

        let cert_copy =
            Certificate::from_pem(fs::read(bundle.join(BUNDLE_CERTIFICATE_FILE)).unwrap()).unwrap();
        assert_eq!(cert_copy, cert);
    }

    #[test]
    fn cms_package_write() {
        let dir = tempfile::tempdir().unwrap();

        let path = write_cms_package(dir.path(), b"\x30\x00").unwrap();
        assert_eq!(path, dir.path().join(CMS_PACKAGE_FILE));
        assert_eq!(fs::read(path).unwrap(), b"\x30\x00");
    }

    // Full workflow: generate and store keys under a passphrase, issue and
    // store a certificate, sign, then verify from the persisted artifacts.
    #[test]
    fn end_to_end_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path(), "Name");

        store.save_key_pair(&test_key_pair(), "pw1").unwrap();

        let keypair = store.load_key_pair("pw1").unwrap();
        let cert = CertificateBuilder::new(test_identity(), &keypair)
            .issue()
            .unwrap();
        store.save_certificate(&cert).unwrap();
        drop(keypair);

        let document = b"hello";
        let keypair = store.load_key_pair("pw1").unwrap();
        let signature = crate::detached::sign_document(document, &keypair).unwrap();
        drop(keypair);

        let bundle = write_signed_bundle(
            dir.path(),
            "hello.txt",
            document,
            &signature,
            &store.load_certificate().unwrap(),
        )
        .unwrap();

        let stored_signature = fs::read(bundle.join(SIGNATURE_FILE)).unwrap();
        let stored_cert =
            Certificate::from_pem(fs::read(bundle.join(BUNDLE_CERTIFICATE_FILE)).unwrap()).unwrap();
        let stored_document =
            fs::read(bundle.join(BUNDLE_DOCUMENT_DIR).join("hello.txt")).unwrap();

        let outcome =
            crate::detached::verify_document(&stored_document, &stored_signature, &stored_cert);
        assert!(outcome.verdict.is_valid());
        assert_eq!(outcome.signer.common_name, "Name");

        // A signature from an unrelated key pair fails against the stored
        // certificate but still reports the claimed signer.
        let other_signature = crate::detached::sign_document(
            document,
            &crate::testutil::second_test_key_pair(),
        )
        .unwrap();
        let outcome = crate::detached::verify_document(document, &other_signature, &stored_cert);
        assert!(!outcome.verdict.is_valid());
        assert_eq!(outcome.signer.common_name, "Name");
    }
}
