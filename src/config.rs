use std::sync::Arc;

use der::Decode;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::Certificate as X509Certificate;

use crate::cipher_suite;
use crate::client_auth::{ClientCertVerifier, TrustRootVerifier};
use crate::crypto::{CryptoProvider, ServerPrivateKey};
use crate::session::{AesGcmTicketSealer, SessionCache, TicketSealer};
use crate::types::{ClientAuthType, KeyType, NamedCurve, ProtocolVersion, SignatureScheme};
use crate::types::{CERT_TYPE_ECDSA_SIGN, CERT_TYPE_RSA_SIGN};
use crate::Error;

const OID_SUBJECT_ALT_NAME: spki::ObjectIdentifier =
    spki::ObjectIdentifier::new_unwrap("2.5.29.17");

/// A certificate chain the server can present.
#[derive(Debug, Clone)]
pub struct ServerCertificate {
    chain: Vec<Vec<u8>>,
    private_key: ServerPrivateKey,
    ocsp_staple: Vec<u8>,
    sct_list: Vec<u8>,
    names: Vec<String>,
}

impl ServerCertificate {
    /// Create from a DER chain (leaf first) and the leaf's private key.
    ///
    /// The key may be PKCS#8, PKCS#1 or SEC1, DER or PEM. The DNS names the
    /// certificate is selected for are read from the leaf's subject
    /// alternative names.
    pub fn new(chain: Vec<Vec<u8>>, private_key: &[u8]) -> Result<Self, Error> {
        let leaf = chain
            .first()
            .ok_or_else(|| Error::Config("empty certificate chain".to_string()))?;
        let names = dns_names(leaf)?;
        Ok(ServerCertificate {
            chain,
            private_key: ServerPrivateKey::from_der(private_key)?,
            ocsp_staple: Vec::new(),
            sct_list: Vec::new(),
            names,
        })
    }

    /// OCSP response stapled when the client asks for one.
    pub fn with_ocsp_staple(mut self, staple: Vec<u8>) -> Self {
        self.ocsp_staple = staple;
        self
    }

    /// Serialized SignedCertificateTimestampList.
    pub fn with_sct_list(mut self, sct_list: Vec<u8>) -> Self {
        self.sct_list = sct_list;
        self
    }

    /// Replace the names this certificate is selected for.
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    #[inline(always)]
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    #[inline(always)]
    pub fn private_key(&self) -> &ServerPrivateKey {
        &self.private_key
    }

    #[inline(always)]
    pub fn key_type(&self) -> KeyType {
        self.private_key.key_type()
    }

    #[inline(always)]
    pub fn ocsp_staple(&self) -> &[u8] {
        &self.ocsp_staple
    }

    #[inline(always)]
    pub fn sct_list(&self) -> &[u8] {
        &self.sct_list
    }

    #[inline(always)]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn dns_names(leaf: &[u8]) -> Result<Vec<String>, Error> {
    let cert = X509Certificate::from_der(leaf)
        .map_err(|e| Error::Config(format!("failed to parse certificate: {}", e)))?;

    let mut names = Vec::new();
    for ext in cert.tbs_certificate.extensions.iter().flatten() {
        if ext.extn_id != OID_SUBJECT_ALT_NAME {
            continue;
        }
        let san = SubjectAltName::from_der(ext.extn_value.as_bytes())
            .map_err(|e| Error::Config(format!("bad subject alternative name: {}", e)))?;
        for name in san.0 {
            if let GeneralName::DnsName(dns) = name {
                names.push(dns.to_string().to_lowercase());
            }
        }
    }
    Ok(names)
}

/// Server configuration, shared by every connection.
#[derive(Clone)]
pub struct Config {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    cipher_suites: Vec<u16>,
    curve_preferences: Vec<NamedCurve>,
    certificates: Vec<ServerCertificate>,
    next_protos: Vec<String>,
    srtp_protection_profiles: Vec<u16>,
    client_auth: ClientAuthType,
    client_cas: Vec<Vec<u8>>,
    client_certificate_types: Vec<u8>,
    client_cert_verifier: Arc<dyn ClientCertVerifier>,
    prefer_server_cipher_suites: bool,
    session_tickets_disabled: bool,
    session_cache: Option<Arc<dyn SessionCache>>,
    ticket_sealer: Arc<dyn TicketSealer>,
    request_channel_id: bool,
    pre_shared_key: Option<Vec<u8>>,
    pre_shared_key_identity: String,
    signature_algorithms: Vec<SignatureScheme>,
    crypto_provider: CryptoProvider,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            min_version: ProtocolVersion::Ssl30,
            max_version: ProtocolVersion::Tls12,
            cipher_suites: cipher_suite::default_ids(),
            curve_preferences: vec![
                NamedCurve::X25519,
                NamedCurve::Secp256r1,
                NamedCurve::Secp384r1,
            ],
            certificates: Vec::new(),
            next_protos: Vec::new(),
            srtp_protection_profiles: Vec::new(),
            client_auth: ClientAuthType::NoClientCert,
            client_cas: Vec::new(),
            client_certificate_types: None,
            client_cert_verifier: None,
            prefer_server_cipher_suites: false,
            session_tickets_disabled: false,
            session_cache: None,
            ticket_sealer: None,
            request_channel_id: false,
            pre_shared_key: None,
            pre_shared_key_identity: String::new(),
            signature_algorithms: SignatureScheme::default_list(),
            crypto_provider: None,
        }
    }

    /// Lowest version we negotiate.
    #[inline(always)]
    pub fn min_version(&self) -> ProtocolVersion {
        self.min_version
    }

    /// Highest version we claim to support.
    ///
    /// Negotiation stops at TLS 1.2. A maximum of TLS 1.3 only changes the
    /// downgrade sentinel in the server random.
    #[inline(always)]
    pub fn max_version(&self) -> ProtocolVersion {
        self.max_version
    }

    /// Lowest version for the transport. DTLS has nothing below TLS 1.0.
    pub fn min_version_for(&self, is_dtls: bool) -> ProtocolVersion {
        if is_dtls {
            self.min_version.max(ProtocolVersion::Tls10)
        } else {
            self.min_version
        }
    }

    /// The version to speak with a client offering `client_version`.
    pub fn mutual_version(&self, client_version: u16, is_dtls: bool) -> Option<ProtocolVersion> {
        let max = self.max_version.min(ProtocolVersion::Tls12);
        let offered = if client_version >= max.as_u16() {
            max
        } else {
            ProtocolVersion::from_u16(client_version)?
        };
        // DTLS skips TLS 1.1.
        let offered = if is_dtls && offered == ProtocolVersion::Tls11 {
            ProtocolVersion::Tls10
        } else {
            offered
        };
        if offered < self.min_version_for(is_dtls) {
            return None;
        }
        Some(offered)
    }

    /// Cipher suites we accept, in our preference order.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[u16] {
        &self.cipher_suites
    }

    /// Curves for ECDHE, in our preference order.
    #[inline(always)]
    pub fn curve_preferences(&self) -> &[NamedCurve] {
        &self.curve_preferences
    }

    #[inline(always)]
    pub fn certificates(&self) -> &[ServerCertificate] {
        &self.certificates
    }

    /// The certificate to present for a server name.
    ///
    /// Tries an exact match, then wildcards replacing one label at a time
    /// from the left. Falls back to the first certificate.
    pub fn certificate_for_name(&self, server_name: &str) -> Option<&ServerCertificate> {
        let name = server_name.trim_end_matches('.').to_lowercase();
        let find = |candidate: &str| {
            self.certificates
                .iter()
                .find(|c| c.names.iter().any(|n| n == candidate))
        };

        if !name.is_empty() {
            if let Some(cert) = find(&name) {
                return Some(cert);
            }
            let mut labels: Vec<&str> = name.split('.').collect();
            for i in 0..labels.len() {
                labels[i] = "*";
                if let Some(cert) = find(&labels.join(".")) {
                    return Some(cert);
                }
            }
        }

        self.certificates.first()
    }

    /// Protocols for ALPN and NPN, in our preference order.
    #[inline(always)]
    pub fn next_protos(&self) -> &[String] {
        &self.next_protos
    }

    /// SRTP protection profiles, in our preference order.
    #[inline(always)]
    pub fn srtp_protection_profiles(&self) -> &[u16] {
        &self.srtp_protection_profiles
    }

    #[inline(always)]
    pub fn client_auth(&self) -> ClientAuthType {
        self.client_auth
    }

    /// Trusted roots for client certificates, DER.
    #[inline(always)]
    pub fn client_cas(&self) -> &[Vec<u8>] {
        &self.client_cas
    }

    /// ClientCertificateType values in a CertificateRequest.
    #[inline(always)]
    pub fn client_certificate_types(&self) -> &[u8] {
        &self.client_certificate_types
    }

    #[inline(always)]
    pub fn client_cert_verifier(&self) -> &dyn ClientCertVerifier {
        &*self.client_cert_verifier
    }

    /// Select the cipher suite in our order rather than the client's.
    #[inline(always)]
    pub fn prefer_server_cipher_suites(&self) -> bool {
        self.prefer_server_cipher_suites
    }

    #[inline(always)]
    pub fn session_tickets_disabled(&self) -> bool {
        self.session_tickets_disabled
    }

    #[inline(always)]
    pub fn session_cache(&self) -> Option<&dyn SessionCache> {
        self.session_cache.as_deref()
    }

    #[inline(always)]
    pub fn ticket_sealer(&self) -> &dyn TicketSealer {
        &*self.ticket_sealer
    }

    /// Ask clients that support it for a Channel ID.
    #[inline(always)]
    pub fn request_channel_id(&self) -> bool {
        self.request_channel_id
    }

    #[inline(always)]
    pub fn pre_shared_key(&self) -> Option<&[u8]> {
        self.pre_shared_key.as_deref()
    }

    /// The PSK identity hint we send and the identity we expect back.
    #[inline(always)]
    pub fn pre_shared_key_identity(&self) -> &str {
        &self.pre_shared_key_identity
    }

    /// Signature algorithms we sign with and accept, in preference order.
    #[inline(always)]
    pub fn signature_algorithms(&self) -> &[SignatureScheme] {
        &self.signature_algorithms
    }

    /// Cryptographic provider.
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("cipher_suites", &self.cipher_suites.len())
            .field("certificates", &self.certificates.len())
            .field("client_auth", &self.client_auth)
            .field("session_cache", &self.session_cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for the server configuration.
pub struct ConfigBuilder {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    cipher_suites: Vec<u16>,
    curve_preferences: Vec<NamedCurve>,
    certificates: Vec<ServerCertificate>,
    next_protos: Vec<String>,
    srtp_protection_profiles: Vec<u16>,
    client_auth: ClientAuthType,
    client_cas: Vec<Vec<u8>>,
    client_certificate_types: Option<Vec<u8>>,
    client_cert_verifier: Option<Arc<dyn ClientCertVerifier>>,
    prefer_server_cipher_suites: bool,
    session_tickets_disabled: bool,
    session_cache: Option<Arc<dyn SessionCache>>,
    ticket_sealer: Option<Arc<dyn TicketSealer>>,
    request_channel_id: bool,
    pre_shared_key: Option<Vec<u8>>,
    pre_shared_key_identity: String,
    signature_algorithms: Vec<SignatureScheme>,
    crypto_provider: Option<CryptoProvider>,
}

impl ConfigBuilder {
    /// Set the lowest version to negotiate.
    ///
    /// Defaults to SSL 3.0.
    pub fn min_version(mut self, version: ProtocolVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Set the highest supported version.
    ///
    /// Defaults to TLS 1.2.
    pub fn max_version(mut self, version: ProtocolVersion) -> Self {
        self.max_version = version;
        self
    }

    /// Set the accepted cipher suites, in preference order.
    ///
    /// Defaults to every registered suite.
    pub fn cipher_suites(mut self, suites: Vec<u16>) -> Self {
        self.cipher_suites = suites;
        self
    }

    /// Set the ECDHE curves, in preference order.
    ///
    /// Defaults to X25519, P-256, P-384.
    pub fn curve_preferences(mut self, curves: Vec<NamedCurve>) -> Self {
        self.curve_preferences = curves;
        self
    }

    /// Add a certificate. The first one is the default.
    pub fn certificate(mut self, certificate: ServerCertificate) -> Self {
        self.certificates.push(certificate);
        self
    }

    /// Set the ALPN and NPN protocols.
    ///
    /// Defaults to none.
    pub fn next_protos(mut self, protos: Vec<String>) -> Self {
        self.next_protos = protos;
        self
    }

    /// Set the SRTP protection profiles.
    ///
    /// Defaults to none.
    pub fn srtp_protection_profiles(mut self, profiles: Vec<u16>) -> Self {
        self.srtp_protection_profiles = profiles;
        self
    }

    /// Set how client certificates are handled.
    ///
    /// Defaults to [`ClientAuthType::NoClientCert`].
    pub fn client_auth(mut self, client_auth: ClientAuthType) -> Self {
        self.client_auth = client_auth;
        self
    }

    /// Add a trusted root for client certificates (DER).
    ///
    /// Its subject is also advertised in the CertificateRequest.
    pub fn client_ca(mut self, ca: Vec<u8>) -> Self {
        self.client_cas.push(ca);
        self
    }

    /// Set the ClientCertificateType list of the CertificateRequest.
    ///
    /// Defaults to RSA and ECDSA signing.
    pub fn client_certificate_types(mut self, types: Vec<u8>) -> Self {
        self.client_certificate_types = Some(types);
        self
    }

    /// Replace the verifier for client certificate chains.
    ///
    /// Defaults to a [`TrustRootVerifier`] over the configured client CAs.
    pub fn client_cert_verifier(mut self, verifier: Arc<dyn ClientCertVerifier>) -> Self {
        self.client_cert_verifier = Some(verifier);
        self
    }

    /// Select cipher suites in our order rather than the client's.
    ///
    /// Defaults to false.
    pub fn prefer_server_cipher_suites(mut self, prefer: bool) -> Self {
        self.prefer_server_cipher_suites = prefer;
        self
    }

    /// Disable session tickets.
    ///
    /// Defaults to false.
    pub fn session_tickets_disabled(mut self, disabled: bool) -> Self {
        self.session_tickets_disabled = disabled;
        self
    }

    /// Set the server side session cache.
    ///
    /// Defaults to none, so sessions are only resumed through tickets.
    pub fn session_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Set the ticket sealer.
    ///
    /// Defaults to an [`AesGcmTicketSealer`] keyed from the crypto provider's
    /// random source.
    pub fn ticket_sealer(mut self, sealer: Arc<dyn TicketSealer>) -> Self {
        self.ticket_sealer = Some(sealer);
        self
    }

    /// Request a Channel ID from clients that support it.
    ///
    /// Defaults to false.
    pub fn request_channel_id(mut self, request: bool) -> Self {
        self.request_channel_id = request;
        self
    }

    /// Set the pre-shared key and its identity.
    pub fn pre_shared_key(mut self, identity: impl Into<String>, key: Vec<u8>) -> Self {
        self.pre_shared_key_identity = identity.into();
        self.pre_shared_key = Some(key);
        self
    }

    /// Set the signature algorithms, in preference order.
    pub fn signature_algorithms(mut self, algorithms: Vec<SignatureScheme>) -> Self {
        self.signature_algorithms = algorithms;
        self
    }

    /// Set a custom crypto provider.
    ///
    /// Defaults to [`default_provider`](crate::crypto::default_provider).
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` if the version range is empty, no cipher
    /// suite is configured or the crypto provider does not validate.
    pub fn build(self) -> Result<Config, Error> {
        if self.min_version > self.max_version {
            return Err(Error::Config(format!(
                "min version {} above max version {}",
                self.min_version, self.max_version
            )));
        }
        if self.cipher_suites.is_empty() {
            return Err(Error::Config("no cipher suites configured".to_string()));
        }

        let crypto_provider = self.crypto_provider.unwrap_or_default();
        crypto_provider.validate()?;

        let client_cert_verifier = match self.client_cert_verifier {
            Some(v) => v,
            None => Arc::new(TrustRootVerifier::new(self.client_cas.clone())?),
        };

        let ticket_sealer: Arc<dyn TicketSealer> = match self.ticket_sealer {
            Some(sealer) => sealer,
            None => Arc::new(AesGcmTicketSealer::new(crypto_provider.secure_random)?),
        };

        Ok(Config {
            min_version: self.min_version,
            max_version: self.max_version,
            cipher_suites: self.cipher_suites,
            curve_preferences: self.curve_preferences,
            certificates: self.certificates,
            next_protos: self.next_protos,
            srtp_protection_profiles: self.srtp_protection_profiles,
            client_auth: self.client_auth,
            client_cas: self.client_cas,
            client_certificate_types: self
                .client_certificate_types
                .unwrap_or_else(|| vec![CERT_TYPE_RSA_SIGN, CERT_TYPE_ECDSA_SIGN]),
            client_cert_verifier,
            prefer_server_cipher_suites: self.prefer_server_cipher_suites,
            session_tickets_disabled: self.session_tickets_disabled,
            session_cache: self.session_cache,
            ticket_sealer,
            request_channel_id: self.request_channel_id,
            pre_shared_key: self.pre_shared_key,
            pre_shared_key_identity: self.pre_shared_key_identity,
            signature_algorithms: self.signature_algorithms,
            crypto_provider,
        })
    }
}
