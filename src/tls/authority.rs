//! Certificate authority for intercepted hosts.
//!
//! # Responsibilities
//! - Load the proxy's CA from PEM files, or generate and persist one
//! - Issue leaf certificates for wildcard subjects
//! - Cache issued certificates for the life of the process
//!
//! # Design Decisions
//! - Cache hits are lock-free (`DashMap`)
//! - A miss takes one global mutex, re-checks the cache, then issues, so a
//!   subject is never issued twice even under concurrent demand
//! - Issuance is synchronous and CPU-bound; async callers use `spawn_blocking`

use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use super::CertificateError;
use crate::observability::metrics;

/// Source of leaf certificates for intercepted hosts.
pub trait IssueCertificate: Send + Sync {
    /// Return the certificate for `subject`, issuing it on first use.
    fn issue_or_fetch(&self, subject: &str) -> Result<Arc<IssuedCertificate>, CertificateError>;

    /// Subjects currently held in the cache.
    fn cached_subjects(&self) -> Vec<String>;

    /// The CA certificate clients must trust, in PEM form.
    fn ca_certificate_pem(&self) -> &str;
}

/// A leaf certificate with its chain and private key.
pub struct IssuedCertificate {
    subject: String,
    chain: Vec<CertificateDer<'static>>,
    key: PrivatePkcs8KeyDer<'static>,
    pem: String,
}

impl IssuedCertificate {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Leaf first, then the issuing CA.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key.clone_key())
    }

    pub fn certificate_pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("subject", &self.subject)
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

pub struct CertificateAuthority {
    issuer: Certificate,
    issuer_key: KeyPair,
    ca_der: CertificateDer<'static>,
    ca_pem: String,
    cache: DashMap<String, Arc<IssuedCertificate>>,
    issue_lock: Mutex<()>,
    issued: AtomicU64,
}

impl CertificateAuthority {
    /// Generate a fresh in-memory CA.
    pub fn generate(common_name: &str) -> Result<Self, CertificateError> {
        let key = KeyPair::generate()?;
        let issuer = ca_params(common_name).self_signed(&key)?;
        let ca_pem = issuer.pem();
        let ca_der = issuer.der().clone();
        Ok(Self::assemble(issuer, key, ca_der, ca_pem))
    }

    /// Load the CA from `cert_path` / `key_path`.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, CertificateError> {
        let ca_pem = read_file(cert_path)?;
        let key_pem = read_file(key_path)?;

        let key = KeyPair::from_pem(&key_pem)?;
        let ca_der = rustls_pemfile::certs(&mut ca_pem.as_bytes())
            .next()
            .ok_or_else(|| CertificateError::MissingCertificate(cert_path.to_path_buf()))?
            .map_err(|source| CertificateError::Io {
                path: cert_path.to_path_buf(),
                source,
            })?;

        // Re-signing the parsed parameters yields an issuer with the same
        // subject and key; clients keep validating against the on-disk cert.
        let issuer = CertificateParams::from_ca_cert_pem(&ca_pem)?.self_signed(&key)?;

        Ok(Self::assemble(issuer, key, ca_der, ca_pem))
    }

    /// Load the CA if both files exist, otherwise generate one and write it out.
    pub fn load_or_generate(
        cert_path: &Path,
        key_path: &Path,
        common_name: &str,
    ) -> Result<Self, CertificateError> {
        if cert_path.exists() && key_path.exists() {
            tracing::info!(cert_path = %cert_path.display(), "Loading CA certificate");
            return Self::load(cert_path, key_path);
        }

        let authority = Self::generate(common_name)?;
        write_file(cert_path, &authority.ca_pem)?;
        write_file(key_path, &authority.issuer_key.serialize_pem())?;
        tracing::info!(
            cert_path = %cert_path.display(),
            common_name,
            "Generated new CA certificate; install it as a trusted root on clients"
        );
        Ok(authority)
    }

    fn assemble(
        issuer: Certificate,
        issuer_key: KeyPair,
        ca_der: CertificateDer<'static>,
        ca_pem: String,
    ) -> Self {
        Self {
            issuer,
            issuer_key,
            ca_der,
            ca_pem,
            cache: DashMap::new(),
            issue_lock: Mutex::new(()),
            issued: AtomicU64::new(0),
        }
    }

    pub fn ca_der(&self) -> &CertificateDer<'static> {
        &self.ca_der
    }

    /// Number of certificates minted since startup.
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    fn issue(&self, subject: &str) -> Result<IssuedCertificate, CertificateError> {
        let mut params = CertificateParams::default();
        params.subject_alt_names = subject_alt_names(subject)?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, subject);
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;
        params.serial_number = Some(random_serial());

        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.issuer, &self.issuer_key)?;

        Ok(IssuedCertificate {
            subject: subject.to_string(),
            chain: vec![cert.der().clone(), self.ca_der.clone()],
            key: PrivatePkcs8KeyDer::from(key.serialize_der()),
            pem: cert.pem(),
        })
    }
}

impl IssueCertificate for CertificateAuthority {
    fn issue_or_fetch(&self, subject: &str) -> Result<Arc<IssuedCertificate>, CertificateError> {
        if let Some(cached) = self.cache.get(subject) {
            return Ok(Arc::clone(cached.value()));
        }

        let _guard = self
            .issue_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = self.cache.get(subject) {
            return Ok(Arc::clone(cached.value()));
        }

        let issued = Arc::new(self.issue(subject)?);
        self.cache.insert(subject.to_string(), Arc::clone(&issued));
        self.issued.fetch_add(1, Ordering::Relaxed);
        metrics::record_certificate_issued();
        tracing::debug!(subject, "Issued leaf certificate");

        Ok(issued)
    }

    fn cached_subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        subjects.sort();
        subjects
    }

    fn ca_certificate_pem(&self) -> &str {
        &self.ca_pem
    }
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "intercept-proxy");
    params.distinguished_name = dn;
    params.serial_number = Some(random_serial());
    params
}

/// `*.example.com` also covers the apex `example.com`.
fn subject_alt_names(subject: &str) -> Result<Vec<SanType>, CertificateError> {
    if let Ok(ip) = subject.parse::<IpAddr>() {
        return Ok(vec![SanType::IpAddress(ip)]);
    }

    let mut names = vec![SanType::DnsName(subject.try_into()?)];
    if let Some(apex) = subject.strip_prefix("*.") {
        names.push(SanType::DnsName(apex.try_into()?));
    }
    Ok(names)
}

fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    // positive INTEGER
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

fn read_file(path: &Path) -> Result<String, CertificateError> {
    fs::read_to_string(path).map_err(|source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), CertificateError> {
    let io_error = |source| CertificateError::Io {
        path: PathBuf::from(path),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_wildcard_chain() {
        let ca = CertificateAuthority::generate("Test Root").unwrap();
        let issued = ca.issue_or_fetch("*.google.com").unwrap();

        assert_eq!(issued.subject(), "*.google.com");
        assert_eq!(issued.chain().len(), 2);
        assert_eq!(&issued.chain()[1], ca.ca_der());
        assert!(issued.certificate_pem().contains("BEGIN CERTIFICATE"));
        assert!(ca.ca_certificate_pem().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_ip_subject() {
        let ca = CertificateAuthority::generate("Test Root").unwrap();
        let issued = ca.issue_or_fetch("127.0.0.1").unwrap();
        assert_eq!(issued.subject(), "127.0.0.1");
    }

    #[test]
    fn test_cache_is_idempotent_under_concurrency() {
        let ca = CertificateAuthority::generate("Test Root").unwrap();
        let barrier = std::sync::Barrier::new(16);

        let results: Vec<Arc<IssuedCertificate>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        ca.issue_or_fetch("*.example.com").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(ca.issued_count(), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(ca.cached_subjects(), vec!["*.example.com".to_string()]);
    }

    #[test]
    fn test_distinct_subjects_are_issued_separately() {
        let ca = CertificateAuthority::generate("Test Root").unwrap();
        let a = ca.issue_or_fetch("*.a.com").unwrap();
        let b = ca.issue_or_fetch("*.b.com").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(ca.issued_count(), 2);
    }

    #[test]
    fn test_persisted_ca_is_reloaded() {
        let dir = std::env::temp_dir().join(format!("intercept-proxy-ca-{}", uuid::Uuid::new_v4()));
        let cert_path = dir.join("ca.pem");
        let key_path = dir.join("ca.key");

        let first = CertificateAuthority::load_or_generate(&cert_path, &key_path, "Persisted Root").unwrap();
        let second = CertificateAuthority::load_or_generate(&cert_path, &key_path, "Ignored").unwrap();
        assert_eq!(first.ca_der(), second.ca_der());

        let issued = second.issue_or_fetch("*.example.org").unwrap();
        assert_eq!(&issued.chain()[1], first.ca_der());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
