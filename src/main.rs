// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command line shell over the document signing library.
//!
//! Each subcommand performs one workflow step to completion: generate
//! keys, issue a certificate, sign a document (detached or CMS), or
//! verify. Passphrases are prompted interactively and never taken from
//! arguments; an empty passphrase or absent input is an ordinary early
//! exit, not an error.

use {
    clap::{Arg, ArgMatches, Command},
    docsign::{
        reader::{CmsReport, ContentReport, SignerIdentification, VerificationOutcome},
        storage::{self, IdentityStore},
        Certificate, CertificateBuilder, Error, Identity, SignatureVerdict, SignedData,
        SigningKeyPair,
    },
    log::{warn, LevelFilter},
    std::path::Path,
};

/// The identity name to operate on, defaulting to the login user.
fn identity_name(args: &ArgMatches) -> String {
    if let Some(name) = args.value_of("name") {
        name.to_string()
    } else {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "user".to_string())
    }
}

fn identity_store(args: &ArgMatches) -> Result<IdentityStore, Error> {
    Ok(IdentityStore::new(
        std::env::current_dir()?,
        &identity_name(args),
    ))
}

/// Prompt for a new passphrase, confirmed twice.
///
/// `None` means the user supplied an empty passphrase and the operation
/// should stop without side effects.
fn prompt_new_passphrase() -> Result<Option<String>, Error> {
    let passphrase = dialoguer::Password::new()
        .with_prompt("Passphrase to encrypt the private key")
        .with_confirmation("Confirm passphrase", "Passphrases do not match")
        .allow_empty_password(true)
        .interact()?;

    Ok(if passphrase.is_empty() {
        None
    } else {
        Some(passphrase)
    })
}

/// Prompt once for the passphrase unlocking an existing private key.
fn prompt_passphrase() -> Result<Option<String>, Error> {
    let passphrase = dialoguer::Password::new()
        .with_prompt("Passphrase to unlock the private key")
        .allow_empty_password(true)
        .interact()?;

    Ok(if passphrase.is_empty() {
        None
    } else {
        Some(passphrase)
    })
}

fn command_generate_keys(args: &ArgMatches) -> Result<(), Error> {
    let name = identity_name(args);
    let store = identity_store(args)?;

    let passphrase = match prompt_new_passphrase()? {
        Some(passphrase) => passphrase,
        None => {
            println!("no passphrase provided; keys not generated");
            return Ok(());
        }
    };

    println!("generating a 2048-bit RSA key pair for {}...", name);
    let keypair = SigningKeyPair::generate()?;
    store.save_key_pair(&keypair, &passphrase)?;

    println!(
        "private and public keys written to {}",
        store.folder().display()
    );

    Ok(())
}

fn command_create_certificate(args: &ArgMatches) -> Result<(), Error> {
    let store = identity_store(args)?;
    store.ensure_key_pair()?;

    let identity = Identity::new(
        args.value_of("country").ok_or(Error::CliBadArgument("country"))?,
        args.value_of("state").ok_or(Error::CliBadArgument("state"))?,
        args.value_of("locality").ok_or(Error::CliBadArgument("locality"))?,
        args.value_of("organization").ok_or(Error::CliBadArgument("organization"))?,
        args.value_of("common_name")
            .map(ToString::to_string)
            .unwrap_or_else(|| identity_name(args)),
    );

    let validity_days = args
        .value_of("validity_days")
        .ok_or(Error::CliBadArgument("validity-days"))?
        .parse::<u32>()
        .map_err(|_| Error::CliBadArgument("validity-days"))?;

    let passphrase = match prompt_passphrase()? {
        Some(passphrase) => passphrase,
        None => {
            println!("no passphrase provided; certificate not created");
            return Ok(());
        }
    };

    println!("creating a certificate for {}...", identity.common_name);

    let keypair = store.load_key_pair(&passphrase)?;
    let certificate = CertificateBuilder::new(identity, &keypair)
        .validity_days(validity_days)
        .issue()?;
    drop(keypair);

    store.save_certificate(&certificate)?;

    let (not_before, not_after) = certificate.validity();
    println!("subject: {}", certificate.subject_identity());
    println!("valid from {} until {}", not_before, not_after);

    Ok(())
}

fn command_sign_document(args: &ArgMatches) -> Result<(), Error> {
    let document_path = Path::new(args.value_of("document").ok_or(Error::CliBadArgument("document"))?);
    let output_dir = args.value_of("output").ok_or(Error::CliBadArgument("output"))?;

    let store = identity_store(args)?;
    store.ensure_key_pair()?;
    let certificate = store.load_certificate()?;

    let document_name = document_path
        .file_name()
        .ok_or(Error::CliBadArgument("document"))?
        .to_string_lossy()
        .to_string();
    let document = std::fs::read(document_path)?;

    let passphrase = match prompt_passphrase()? {
        Some(passphrase) => passphrase,
        None => {
            println!("no passphrase provided; document not signed");
            return Ok(());
        }
    };

    let keypair = store.load_key_pair(&passphrase)?;
    println!("signing {}...", document_name);
    let signature = docsign::sign_document(&document, &keypair)?;
    drop(keypair);

    let bundle =
        storage::write_signed_bundle(output_dir, &document_name, &document, &signature, &certificate)?;

    println!(
        "signature, certificate copy and document copy written to {}",
        bundle.display()
    );

    Ok(())
}

fn command_sign_document_pkcs7(args: &ArgMatches) -> Result<(), Error> {
    let document_path = Path::new(args.value_of("document").ok_or(Error::CliBadArgument("document"))?);
    let output_dir = args.value_of("output").ok_or(Error::CliBadArgument("output"))?;

    let store = identity_store(args)?;
    store.ensure_key_pair()?;
    let certificate = store.load_certificate()?;

    let document = std::fs::read(document_path)?;

    let passphrase = match prompt_passphrase()? {
        Some(passphrase) => passphrase,
        None => {
            println!("no passphrase provided; document not signed");
            return Ok(());
        }
    };

    let keypair = store.load_key_pair(&passphrase)?;
    println!("signing and packaging as PKCS#7...");
    let der = docsign::pack_document(&document, &certificate, &keypair, true)?;
    drop(keypair);

    let path = storage::write_cms_package(output_dir, &der)?;
    println!("signed package written to {}", path.display());

    Ok(())
}

fn command_verify_signature(args: &ArgMatches) -> Result<(), Error> {
    let document = std::fs::read(args.value_of("document").ok_or(Error::CliBadArgument("document"))?)?;
    let signature = std::fs::read(args.value_of("signature").ok_or(Error::CliBadArgument("signature"))?)?;
    let certificate = Certificate::from_pem(std::fs::read(
        args.value_of("certificate").ok_or(Error::CliBadArgument("certificate"))?,
    )?)?;

    let outcome = docsign::verify_document(&document, &signature, &certificate);

    // The claimed signer is shown regardless of the verdict.
    println!("signer certificate details:");
    println!("  country:         {}", outcome.signer.country);
    println!("  state/province:  {}", outcome.signer.state_province);
    println!("  locality:        {}", outcome.signer.locality);
    println!("  organization:    {}", outcome.signer.organization);
    println!("  common name:     {}", outcome.signer.common_name);

    match outcome.verdict {
        SignatureVerdict::Valid => {
            println!("signature valid: the document has not been altered since signing");
            println!(
                "signed by {} of {}",
                outcome.signer.common_name, outcome.signer.organization
            );
            Ok(())
        }
        SignatureVerdict::Invalid { reason } => {
            println!("signature INVALID: {}", reason);
            std::process::exit(1);
        }
    }
}

fn command_verify_pkcs7(args: &ArgMatches) -> Result<(), Error> {
    let input = Path::new(args.value_of("input").ok_or(Error::CliBadArgument("input"))?);
    let data = std::fs::read(input)?;

    let signed_data = SignedData::parse(&data)?;
    let filename_hint = input.file_name().and_then(|name| name.to_str());
    let report = CmsReport::build(&signed_data, filename_hint);

    if args.is_present("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if let Some(content) = signed_data.signed_content() {
        if let Some(path) = args.value_of("extract_to") {
            std::fs::write(path, content)?;
            println!("embedded content written to {}", path);
        }
    } else if args.value_of("extract_to").is_some() {
        warn!("nothing to extract: the package carries no embedded content");
    }

    Ok(())
}

fn print_report(report: &CmsReport) {
    if report.certificates.is_empty() {
        println!("no certificates embedded in the package");
    }
    for cert in &report.certificates {
        println!("embedded certificate: {} (serial {})", cert.subject, cert.serial);
    }
    if report.unrecognized_certificates > 0 {
        warn!(
            "{} embedded certificate(s) have an unrecognized format",
            report.unrecognized_certificates
        );
    }

    for signer in &report.signers {
        match &signer.identification {
            SignerIdentification::IssuerAndSerial { issuer, serial } => {
                println!("signer identified by issuer and serial number:");
                println!("  issuer: {}", issuer);
                println!("  serial: {}", serial);
            }
            SignerIdentification::SubjectKeyIdentifier { identifier } => {
                println!("signer identified by subject key identifier {}", identifier);
            }
            SignerIdentification::Unrecognized => {
                println!("signer uses an unrecognized identification scheme");
            }
        }

        if let Some(time) = &signer.signing_time {
            println!("  claimed signing time: {}", time);
        }

        match &signer.verification {
            VerificationOutcome::Verified => println!("  signature verified"),
            VerificationOutcome::Failed { reason } => {
                println!("  signature verification FAILED: {}", reason)
            }
            VerificationOutcome::Unverifiable { reason } => {
                println!("  signature not verified: {}", reason)
            }
        }
    }

    match &report.content {
        ContentReport::Embedded {
            length,
            media_type_guess,
        } => {
            println!(
                "document content is embedded in the package ({} bytes, {})",
                length,
                media_type_guess.as_deref().unwrap_or("unknown media type")
            );
        }
        ContentReport::Detached { detail } => println!("{}", detail),
    }
}

fn main_impl() -> Result<(), Error> {
    let name_arg = Arg::new("name")
        .long("name")
        .takes_value(true)
        .help("Identity name whose folder holds the keys and certificate");

    let app = Command::new("docsign")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Self-signed PKI document signing and verification")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("generate-keys")
            .about("Generate an RSA key pair protected by a passphrase")
            .arg(name_arg.clone()),
    );

    let app = app.subcommand(
        Command::new("create-certificate")
            .about("Issue a self-signed certificate for an identity")
            .arg(name_arg.clone())
            .arg(
                Arg::new("country")
                    .long("country")
                    .takes_value(true)
                    .default_value("BR")
                    .help("Country name attribute"),
            )
            .arg(
                Arg::new("state")
                    .long("state")
                    .takes_value(true)
                    .default_value("TO")
                    .help("State or province attribute"),
            )
            .arg(
                Arg::new("locality")
                    .long("locality")
                    .takes_value(true)
                    .default_value("Palmas")
                    .help("Locality attribute"),
            )
            .arg(
                Arg::new("organization")
                    .long("organization")
                    .takes_value(true)
                    .default_value("FC Solutions")
                    .help("Organization attribute"),
            )
            .arg(
                Arg::new("common_name")
                    .long("common-name")
                    .takes_value(true)
                    .help("Common name attribute. Defaults to the identity name"),
            )
            .arg(
                Arg::new("validity_days")
                    .long("validity-days")
                    .takes_value(true)
                    .default_value("365")
                    .help("Validity window length in days"),
            ),
    );

    let app = app.subcommand(
        Command::new("sign-document")
            .about("Sign a document, writing a detached signature bundle")
            .arg(name_arg.clone())
            .arg(
                Arg::new("document")
                    .long("document")
                    .takes_value(true)
                    .required(true)
                    .help("Path of the document to sign"),
            )
            .arg(
                Arg::new("output")
                    .long("output")
                    .takes_value(true)
                    .required(true)
                    .help("Directory to write the signature bundle under"),
            ),
    );

    let app = app.subcommand(
        Command::new("sign-document-pkcs7")
            .about("Sign a document and package it as CMS/PKCS#7 with embedded content")
            .arg(name_arg.clone())
            .arg(
                Arg::new("document")
                    .long("document")
                    .takes_value(true)
                    .required(true)
                    .help("Path of the document to sign"),
            )
            .arg(
                Arg::new("output")
                    .long("output")
                    .takes_value(true)
                    .required(true)
                    .help("Directory to write the .pkcs7 package under"),
            ),
    );

    let app = app.subcommand(
        Command::new("verify-signature")
            .about("Verify a detached signature against a document and certificate")
            .arg(
                Arg::new("document")
                    .long("document")
                    .takes_value(true)
                    .required(true)
                    .help("Path of the original document"),
            )
            .arg(
                Arg::new("signature")
                    .long("signature")
                    .takes_value(true)
                    .required(true)
                    .help("Path of the raw signature bytes"),
            )
            .arg(
                Arg::new("certificate")
                    .long("certificate")
                    .takes_value(true)
                    .required(true)
                    .help("Path of the signer's certificate PEM"),
            ),
    );

    let app = app.subcommand(
        Command::new("verify-pkcs7")
            .about("Inspect and verify a CMS/PKCS#7 signed package")
            .arg(
                Arg::new("input")
                    .long("input")
                    .takes_value(true)
                    .required(true)
                    .help("Path of the .pkcs7 package (DER or PEM)"),
            )
            .arg(
                Arg::new("json")
                    .long("json")
                    .help("Emit the inspection report as JSON"),
            )
            .arg(
                Arg::new("extract_to")
                    .long("extract-to")
                    .takes_value(true)
                    .help("Write embedded content to this path"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Log context adds noise at normal verbosity.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("generate-keys", args)) => command_generate_keys(args),
        Some(("create-certificate", args)) => command_create_certificate(args),
        Some(("sign-document", args)) => command_sign_document(args),
        Some(("sign-document-pkcs7", args)) => command_sign_document_pkcs7(args),
        Some(("verify-signature", args)) => command_verify_signature(args),
        Some(("verify-pkcs7", args)) => command_verify_pkcs7(args),
        _ => unreachable!("clap enforces a known subcommand"),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };

    std::process::exit(exit_code)
}
