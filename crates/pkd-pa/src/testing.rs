//! Builder for signed EF.SOD fixtures.
//!
//! Produces a CMS `SignedData` over an LDS Security Object, signed with a
//! [`Signer`] from `pkd_core::testing`. Panics on encoding failures.

use std::collections::BTreeMap;

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode, Tag, TagNumber};
use pkd_core::testing::Signer;
use pkd_core::{Certificate, DigestAlgorithm};
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::lds::{
    DataGroupHashAsn1, LdsSecurityObjectAsn1, LdsVersionInfoAsn1, ID_CONTENT_TYPE,
    ID_LDS_SECURITY_OBJECT, ID_MESSAGE_DIGEST, ID_SIGNED_DATA,
};

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

fn algorithm(oid: &str) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ObjectIdentifier::new_unwrap(oid),
        parameters: None,
    }
}

fn any_of<T: Encode>(value: &T) -> Any {
    Any::from_der(&value.to_der().expect("encode")).expect("re-decode")
}

/// Assembles a SOD signed by `signer` (ECDSA P-256 / SHA-256).
pub struct SodBuilder<'a> {
    signer: &'a Signer,
    hash_algorithm: DigestAlgorithm,
    data_groups: BTreeMap<u8, Vec<u8>>,
    embed_certificate: bool,
    signed_attributes: bool,
    lds_v1: bool,
    wrong_message_digest: bool,
    corrupt_signature: bool,
    signature_algorithm: ObjectIdentifier,
    lds_hash_oid: Option<&'static str>,
    repeated_groups: Vec<u8>,
    sid_by_key_identifier: bool,
    extra_certificates: Vec<Vec<u8>>,
}

impl<'a> SodBuilder<'a> {
    pub fn new(signer: &'a Signer) -> Self {
        Self {
            signer,
            hash_algorithm: DigestAlgorithm::Sha256,
            data_groups: BTreeMap::new(),
            embed_certificate: true,
            signed_attributes: true,
            lds_v1: false,
            wrong_message_digest: false,
            corrupt_signature: false,
            signature_algorithm: ECDSA_WITH_SHA256,
            lds_hash_oid: None,
            repeated_groups: Vec::new(),
            sid_by_key_identifier: false,
            extra_certificates: Vec::new(),
        }
    }

    /// Cover `content` as data group `number`.
    #[must_use]
    pub fn data_group(mut self, number: u8, content: &[u8]) -> Self {
        self.data_groups.insert(number, content.to_vec());
        self
    }

    #[must_use]
    pub const fn hash_algorithm(mut self, alg: DigestAlgorithm) -> Self {
        self.hash_algorithm = alg;
        self
    }

    #[must_use]
    pub const fn without_certificate(mut self) -> Self {
        self.embed_certificate = false;
        self
    }

    #[must_use]
    pub const fn without_signed_attributes(mut self) -> Self {
        self.signed_attributes = false;
        self
    }

    #[must_use]
    pub const fn lds_v1(mut self) -> Self {
        self.lds_v1 = true;
        self
    }

    /// Sign a `messageDigest` that does not match the eContent.
    #[must_use]
    pub const fn wrong_message_digest(mut self) -> Self {
        self.wrong_message_digest = true;
        self
    }

    /// Flip a bit in the signature value.
    #[must_use]
    pub const fn corrupt_signature(mut self) -> Self {
        self.corrupt_signature = true;
        self
    }

    /// Declare `oid` as the SignerInfo `signatureAlgorithm`. The signature
    /// itself stays ECDSA with SHA-256.
    #[must_use]
    pub fn signature_algorithm(mut self, oid: &str) -> Self {
        self.signature_algorithm = ObjectIdentifier::new_unwrap(oid);
        self
    }

    /// Declare `oid` as the LDS `hashAlgorithm`. Data group hashes are still
    /// computed with [`hash_algorithm`](Self::hash_algorithm).
    #[must_use]
    pub const fn lds_hash_oid(mut self, oid: &'static str) -> Self {
        self.lds_hash_oid = Some(oid);
        self
    }

    /// List data group `number` a second time in the hash table.
    #[must_use]
    pub fn repeat_data_group(mut self, number: u8) -> Self {
        self.repeated_groups.push(number);
        self
    }

    /// Name the signer by subjectKeyIdentifier instead of issuer and serial.
    #[must_use]
    pub const fn signer_by_key_identifier(mut self) -> Self {
        self.sid_by_key_identifier = true;
        self
    }

    /// Embed `certificate` as well, even with
    /// [`without_certificate`](Self::without_certificate).
    #[must_use]
    pub fn also_embed(mut self, certificate: &Certificate) -> Self {
        self.extra_certificates.push(certificate.der().to_vec());
        self
    }

    /// EF.SOD with the `0x77` wrapper.
    pub fn build(&self) -> Vec<u8> {
        let content_info = self.build_unwrapped();
        let wrapper = Any::new(
            Tag::Application {
                constructed: true,
                number: TagNumber::new(23),
            },
            content_info,
        )
        .expect("wrap");
        wrapper.to_der().expect("encode wrapper")
    }

    /// Bare `ContentInfo`.
    pub fn build_unwrapped(&self) -> Vec<u8> {
        let econtent = self.lds_security_object();

        let signed_attrs = self.signed_attributes.then(|| {
            let mut digest = DigestAlgorithm::Sha256.digest(&econtent);
            if self.wrong_message_digest {
                digest[0] ^= 0xFF;
            }
            let content_type = Attribute {
                oid: ID_CONTENT_TYPE,
                values: SetOfVec::try_from(vec![any_of(&ID_LDS_SECURITY_OBJECT)]).expect("set"),
            };
            let message_digest = Attribute {
                oid: ID_MESSAGE_DIGEST,
                values: SetOfVec::try_from(vec![any_of(&OctetString::new(digest).expect("octets"))])
                    .expect("set"),
            };
            SetOfVec::try_from(vec![content_type, message_digest]).expect("signed attrs")
        });

        let to_sign = match &signed_attrs {
            Some(attrs) => attrs.to_der().expect("encode signed attrs"),
            None => econtent.clone(),
        };
        let mut signature = self.signer.sign(&to_sign);
        if self.corrupt_signature {
            let last = signature.len() - 1;
            signature[last] ^= 0x01;
        }

        let cert = x509_cert::Certificate::from_der(self.signer.certificate().der())
            .expect("parse signer certificate");
        let (version, sid) = if self.sid_by_key_identifier {
            let ski = self
                .signer
                .certificate()
                .subject_key_identifier
                .as_deref()
                .expect("signer has a subjectKeyIdentifier");
            let ski = OctetString::new(hex::decode(ski).expect("hex")).expect("ski");
            (
                CmsVersion::V3,
                SignerIdentifier::SubjectKeyIdentifier(SubjectKeyIdentifier(ski)),
            )
        } else {
            (
                CmsVersion::V1,
                SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                    issuer: cert.tbs_certificate.issuer.clone(),
                    serial_number: cert.tbs_certificate.serial_number.clone(),
                }),
            )
        };
        let signer_info = SignerInfo {
            version,
            sid,
            digest_alg: algorithm(DigestAlgorithm::Sha256.oid()),
            signed_attrs,
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: self.signature_algorithm,
                parameters: None,
            },
            signature: OctetString::new(signature).expect("signature"),
            unsigned_attrs: None,
        };

        let mut choices: Vec<CertificateChoices> = self
            .extra_certificates
            .iter()
            .map(|der| {
                CertificateChoices::Certificate(
                    x509_cert::Certificate::from_der(der).expect("parse extra certificate"),
                )
            })
            .collect();
        if self.embed_certificate {
            choices.push(CertificateChoices::Certificate(cert));
        }
        let certificates = (!choices.is_empty())
            .then(|| CertificateSet(SetOfVec::try_from(choices).expect("cert set")));

        let signed_data = SignedData {
            version: CmsVersion::V3,
            digest_algorithms: SetOfVec::try_from(vec![algorithm(DigestAlgorithm::Sha256.oid())])
                .expect("digest set"),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_LDS_SECURITY_OBJECT,
                econtent: Some(Any::new(Tag::OctetString, econtent).expect("econtent")),
            },
            certificates,
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).expect("signers")),
        };

        ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: any_of(&signed_data),
        }
        .to_der()
        .expect("encode ContentInfo")
    }

    fn lds_security_object(&self) -> Vec<u8> {
        let empty = Vec::new();
        let entries = self
            .data_groups
            .iter()
            .map(|(number, content)| (*number, content))
            .chain(
                self.repeated_groups
                    .iter()
                    .map(|number| (*number, self.data_groups.get(number).unwrap_or(&empty))),
            );
        let lds = LdsSecurityObjectAsn1 {
            version: u8::from(self.lds_v1),
            hash_algorithm: algorithm(self.lds_hash_oid.unwrap_or(self.hash_algorithm.oid())),
            data_group_hash_values: entries
                .map(|(number, content)| DataGroupHashAsn1 {
                    data_group_number: number,
                    data_group_hash_value: OctetString::new(self.hash_algorithm.digest(content))
                        .expect("hash"),
                })
                .collect(),
            lds_version_info: self.lds_v1.then(|| LdsVersionInfoAsn1 {
                lds_version: Any::new(Tag::PrintableString, b"0108".as_slice()).expect("lds version"),
                unicode_version: Any::new(Tag::PrintableString, b"040000".as_slice())
                    .expect("unicode version"),
            }),
        };
        lds.to_der().expect("encode LDS security object")
    }
}
