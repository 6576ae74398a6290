//! EF.SOD decoding: CMS `SignedData` carrying an LDS Security Object.
//!
//! ```text
//! LDSSecurityObject ::= SEQUENCE {
//!     version                LDSSecurityObjectVersion,
//!     hashAlgorithm          DigestAlgorithmIdentifier,
//!     dataGroupHashValues    SEQUENCE SIZE (2..ub-DataGroups) OF DataGroupHash,
//!     ldsVersionInfo         LDSVersionInfo OPTIONAL }  -- V1 only
//! ```

use std::collections::BTreeMap;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{Any, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Reader, Sequence, SliceReader, Tag, TagNumber, Tagged};
use pkd_core::{serial_from_bytes, Certificate, CertificateType, DigestAlgorithm, PkdError, Result};
use serde::Serialize;
use tracing::debug;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

/// id-signedData
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// id-icao-mrtd-security-ldsSecurityObject
pub const ID_LDS_SECURITY_OBJECT: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.136.1.1.1");
/// id-contentType signed attribute
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
/// id-messageDigest signed attribute
pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// Application tag 23 wrapping EF.SOD.
const SOD_TAG: u8 = 0x77;

/// Highest data group number defined by Doc 9303.
pub const MAX_DATA_GROUP: u8 = 16;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct LdsSecurityObjectAsn1 {
    pub version: u8,
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub data_group_hash_values: Vec<DataGroupHashAsn1>,
    #[asn1(optional = "true")]
    pub lds_version_info: Option<LdsVersionInfoAsn1>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct DataGroupHashAsn1 {
    pub data_group_number: u8,
    pub data_group_hash_value: OctetString,
}

/// `PrintableString` fields, kept as raw values.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct LdsVersionInfoAsn1 {
    pub lds_version: Any,
    pub unicode_version: Any,
}

/// LDS Security Object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "version")]
pub enum LdsVersion {
    V0,
    V1 {
        lds_version: String,
        unicode_version: String,
    },
}

/// How the SignerInfo names its signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SignerId {
    IssuerAndSerial { issuer_dn: String, serial_number: String },
    SubjectKeyIdentifier(String),
}

/// Signed attributes of the SignerInfo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedAttributes {
    /// `messageDigest` value
    #[serde(with = "hex::serde")]
    pub message_digest: Vec<u8>,
    /// `contentType` value, dotted
    pub content_type: Option<String>,
}

/// A decoded EF.SOD. Immutable once decoded.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityObject {
    /// Certificate embedded in `SignedData.certificates`, if any
    pub embedded_signer: Option<Certificate>,
    pub signer_id: SignerId,
    /// SignerInfo `digestAlgorithm`
    pub digest_algorithm: DigestAlgorithm,
    /// SignerInfo `signatureAlgorithm`, dotted
    pub signature_algorithm_oid: String,
    /// LDS `hashAlgorithm` used for data group hashes
    pub hash_algorithm: DigestAlgorithm,
    /// Expected digest per data group number
    #[serde(serialize_with = "hex_map")]
    pub data_group_hashes: BTreeMap<u8, Vec<u8>>,
    pub lds_version: LdsVersion,
    pub signed_attributes: Option<SignedAttributes>,
    /// `eContent`: the DER LDS Security Object
    #[serde(skip)]
    pub econtent: Vec<u8>,
    /// Bytes the signature covers: the DER `SET OF` signed attributes when
    /// present, the eContent otherwise
    #[serde(skip)]
    pub signed_bytes: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

fn hex_map<S: serde::Serializer>(map: &BTreeMap<u8, Vec<u8>>, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_map(map.iter().map(|(k, v)| (k, hex::encode(v))))
}

fn decode_err(context: &str) -> impl Fn(der::Error) -> PkdError + '_ {
    move |e| PkdError::SodDecode(format!("{context}: {e}"))
}

impl SecurityObject {
    /// Decode EF.SOD bytes, with or without the `0x77` wrapper.
    pub fn decode(sod_bytes: &[u8]) -> Result<Self> {
        let content_info_der = strip_sod_tag(sod_bytes)?;
        let content_info =
            ContentInfo::from_der(&content_info_der).map_err(decode_err("ContentInfo"))?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(PkdError::SodDecode(format!(
                "content type {} is not id-signedData",
                content_info.content_type
            )));
        }

        let signed_data_der = content_info.content.to_der().map_err(decode_err("SignedData"))?;
        let signed_data =
            SignedData::from_der(&signed_data_der).map_err(decode_err("SignedData"))?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != ID_LDS_SECURITY_OBJECT {
            return Err(PkdError::SodDecode(format!(
                "eContentType {} is not ldsSecurityObject",
                encap.econtent_type
            )));
        }
        let econtent = encap
            .econtent
            .as_ref()
            .map(|any| any.value().to_vec())
            .ok_or_else(|| PkdError::SodDecode("missing eContent".into()))?;

        let lds = LdsSecurityObjectAsn1::from_der(&econtent).map_err(decode_err("LDSSecurityObject"))?;
        let hash_algorithm = DigestAlgorithm::from_oid(&lds.hash_algorithm.oid.to_string())?;
        let data_group_hashes = collect_hashes(&lds)?;
        let lds_version = lds_version(&lds)?;

        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| PkdError::SodDecode("no SignerInfo".into()))?;
        if signed_data.signer_infos.0.len() > 1 {
            debug!(count = signed_data.signer_infos.0.len(), "multiple SignerInfos, using the first");
        }

        let digest_algorithm = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid.to_string())?;
        let signer_id = signer_id(signer_info)?;
        let embedded_signer = embedded_signer(&signed_data, &signer_id)?;
        let signed_attributes = signed_attributes(signer_info)?;

        let signed_bytes = match raw_signed_attributes(&signed_data_der)? {
            Some(raw) => raw,
            None if signed_attributes.is_some() => {
                return Err(PkdError::SodDecode("signed attributes not found".into()))
            }
            None => econtent.clone(),
        };

        debug!(
            hash_algorithm = %hash_algorithm,
            data_groups = data_group_hashes.len(),
            embedded_signer = embedded_signer.is_some(),
            "security object decoded"
        );

        Ok(Self {
            embedded_signer,
            signer_id,
            digest_algorithm,
            signature_algorithm_oid: signer_info.signature_algorithm.oid.to_string(),
            hash_algorithm,
            data_group_hashes,
            lds_version,
            signed_attributes,
            econtent,
            signed_bytes,
            signature: signer_info.signature.as_bytes().to_vec(),
        })
    }
}

/// Remove the `0x77` application wrapper; bare `ContentInfo` passes through.
fn strip_sod_tag(bytes: &[u8]) -> Result<Vec<u8>> {
    match bytes.first() {
        Some(&SOD_TAG) => {
            let wrapper = Any::from_der(bytes).map_err(decode_err("EF.SOD wrapper"))?;
            Ok(wrapper.value().to_vec())
        }
        Some(&0x30) => Ok(bytes.to_vec()),
        Some(tag) => Err(PkdError::SodDecode(format!("unexpected EF.SOD tag 0x{tag:02X}"))),
        None => Err(PkdError::SodDecode("empty input".into())),
    }
}

fn collect_hashes(lds: &LdsSecurityObjectAsn1) -> Result<BTreeMap<u8, Vec<u8>>> {
    let mut hashes = BTreeMap::new();
    for entry in &lds.data_group_hash_values {
        let number = entry.data_group_number;
        if !(1..=MAX_DATA_GROUP).contains(&number) {
            return Err(PkdError::SodDecode(format!("data group number {number} out of range")));
        }
        if hashes
            .insert(number, entry.data_group_hash_value.as_bytes().to_vec())
            .is_some()
        {
            return Err(PkdError::SodDecode(format!("duplicate data group {number}")));
        }
    }
    Ok(hashes)
}

fn lds_version(lds: &LdsSecurityObjectAsn1) -> Result<LdsVersion> {
    match (lds.version, &lds.lds_version_info) {
        (0, None) => Ok(LdsVersion::V0),
        (1, Some(info)) => Ok(LdsVersion::V1 {
            lds_version: String::from_utf8_lossy(info.lds_version.value()).into_owned(),
            unicode_version: String::from_utf8_lossy(info.unicode_version.value()).into_owned(),
        }),
        (1, None) => Err(PkdError::SodDecode("LDS V1 without ldsVersionInfo".into())),
        (0, Some(_)) => Err(PkdError::SodDecode("LDS V0 with ldsVersionInfo".into())),
        (v, _) => Err(PkdError::SodDecode(format!("unknown LDS security object version {v}"))),
    }
}

fn signer_id(signer_info: &SignerInfo) -> Result<SignerId> {
    match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(isn) => {
            let issuer_der = isn.issuer.to_der().map_err(decode_err("signer issuer"))?;
            let (_, issuer) = X509Name::from_der(&issuer_der)
                .map_err(|e| PkdError::SodDecode(format!("signer issuer: {e}")))?;
            Ok(SignerId::IssuerAndSerial {
                issuer_dn: issuer.to_string(),
                serial_number: serial_from_bytes(isn.serial_number.as_bytes()),
            })
        }
        SignerIdentifier::SubjectKeyIdentifier(ski) => {
            Ok(SignerId::SubjectKeyIdentifier(hex::encode(ski.0.as_bytes())))
        }
    }
}

/// The embedded certificate the signer id names, if any.
fn embedded_signer(signed_data: &SignedData, signer_id: &SignerId) -> Result<Option<Certificate>> {
    let mut certificates = Vec::new();
    for choice in signed_data.certificates.iter().flat_map(|set| set.0.iter()) {
        if let CertificateChoices::Certificate(cert) = choice {
            let der = cert.to_der().map_err(decode_err("embedded certificate"))?;
            certificates.push(Certificate::from_der(CertificateType::Dsc, &der)?);
        }
    }

    let matching = certificates.iter().position(|c| match signer_id {
        SignerId::IssuerAndSerial { issuer_dn, serial_number } => {
            &c.serial_number == serial_number && pkd_core::dn_eq(&c.issuer_dn, issuer_dn)
        }
        SignerId::SubjectKeyIdentifier(ski) => {
            c.subject_key_identifier.as_deref() == Some(ski.as_str())
        }
    });
    if matching.is_none() && !certificates.is_empty() {
        debug!(
            embedded = certificates.len(),
            "no embedded certificate matches the signer id"
        );
    }
    Ok(matching.map(|index| certificates.swap_remove(index)))
}

fn signed_attributes(signer_info: &SignerInfo) -> Result<Option<SignedAttributes>> {
    let Some(attrs) = &signer_info.signed_attrs else {
        return Ok(None);
    };

    let mut message_digest = None;
    let mut content_type = None;
    for attr in attrs.iter() {
        let Some(value) = attr.values.iter().next() else {
            continue;
        };
        if attr.oid == ID_MESSAGE_DIGEST {
            message_digest = Some(value.value().to_vec());
        } else if attr.oid == ID_CONTENT_TYPE {
            let oid_der = value.to_der().map_err(decode_err("contentType attribute"))?;
            let oid = ObjectIdentifier::from_der(&oid_der).map_err(decode_err("contentType attribute"))?;
            content_type = Some(oid.to_string());
        }
    }

    let message_digest = message_digest
        .ok_or_else(|| PkdError::SodDecode("signed attributes lack messageDigest".into()))?;
    Ok(Some(SignedAttributes {
        message_digest,
        content_type,
    }))
}

/// Signed attributes exactly as encoded, re-tagged as `SET OF`.
///
/// Taken from the original bytes rather than re-encoded so a non-canonical
/// attribute order still verifies.
fn raw_signed_attributes(signed_data_der: &[u8]) -> Result<Option<Vec<u8>>> {
    let signed_data = Any::from_der(signed_data_der).map_err(decode_err("SignedData"))?;
    let fields = read_all(signed_data.value())?;
    let signer_infos = fields
        .last()
        .ok_or_else(|| PkdError::SodDecode("empty SignedData".into()))?;
    let first_signer = read_all(signer_infos.value())?
        .into_iter()
        .next()
        .ok_or_else(|| PkdError::SodDecode("no SignerInfo".into()))?;

    let signed_attrs_tag = Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::N0,
    };
    read_all(first_signer.value())?
        .into_iter()
        .find(|field| field.tag() == signed_attrs_tag)
        .map(|field| {
            Any::new(Tag::Set, field.value())
                .and_then(|set| set.to_der())
                .map_err(decode_err("signed attributes"))
        })
        .transpose()
}

fn read_all(bytes: &[u8]) -> Result<Vec<Any>> {
    let mut reader = SliceReader::new(bytes).map_err(decode_err("reader"))?;
    let mut items = Vec::new();
    while !reader.is_finished() {
        items.push(Any::decode(&mut reader).map_err(decode_err("element"))?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SodBuilder;
    use pkd_core::testing::TestPki;

    #[test]
    fn decodes_wrapped_sod() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .data_group(2, b"FACE")
            .build();
        assert_eq!(sod[0], 0x77);

        let so = SecurityObject::decode(&sod).unwrap();
        assert_eq!(so.hash_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(so.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(so.signature_algorithm_oid, "1.2.840.10045.4.3.2");
        assert_eq!(so.lds_version, LdsVersion::V0);
        assert_eq!(so.data_group_hashes.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(so.data_group_hashes[&1], DigestAlgorithm::Sha256.digest(b"MRZ"));
        assert_eq!(
            so.embedded_signer.as_ref().unwrap().fingerprint(),
            signer.certificate().fingerprint()
        );
        match &so.signer_id {
            SignerId::IssuerAndSerial { serial_number, .. } => assert_eq!(serial_number, "51"),
            other => panic!("unexpected signer id {other:?}"),
        }
        assert_eq!(so.signed_bytes[0], 0x31);
        assert_eq!(
            so.signed_attributes.unwrap().content_type.as_deref(),
            Some("2.23.136.1.1.1")
        );
    }

    #[test]
    fn accepts_bare_content_info() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer).data_group(1, b"MRZ").build_unwrapped();
        assert_eq!(sod[0], 0x30);
        assert!(SecurityObject::decode(&sod).is_ok());
    }

    #[test]
    fn lds_v1_and_sha384() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .hash_algorithm(DigestAlgorithm::Sha384)
            .lds_v1()
            .data_group(1, b"MRZ")
            .build();
        let so = SecurityObject::decode(&sod).unwrap();
        assert_eq!(so.hash_algorithm, DigestAlgorithm::Sha384);
        assert_eq!(
            so.lds_version,
            LdsVersion::V1 {
                lds_version: "0108".into(),
                unicode_version: "040000".into()
            }
        );
    }

    #[test]
    fn without_signed_attributes_signs_econtent() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .without_signed_attributes()
            .build();
        let so = SecurityObject::decode(&sod).unwrap();
        assert!(so.signed_attributes.is_none());
        assert_eq!(so.signed_bytes, so.econtent);
    }

    #[test]
    fn garbage_is_decode_error() {
        for input in [&b""[..], b"\x77\x03\x01\x02", b"\x04\x01\x00"] {
            assert!(matches!(
                SecurityObject::decode(input),
                Err(PkdError::SodDecode(_))
            ));
        }
    }

    #[test]
    fn out_of_range_data_group_rejected() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer).data_group(17, b"X").build();
        assert!(matches!(SecurityObject::decode(&sod), Err(PkdError::SodDecode(_))));
    }

    #[test]
    fn duplicate_data_group_rejected() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .data_group(2, b"FACE")
            .repeat_data_group(1)
            .build();
        match SecurityObject::decode(&sod) {
            Err(PkdError::SodDecode(msg)) => assert!(msg.contains("duplicate data group 1"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn md5_hash_algorithm_is_unsupported() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .lds_hash_oid("1.2.840.113549.2.5")
            .build();
        assert!(matches!(
            SecurityObject::decode(&sod),
            Err(PkdError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn key_identifier_selects_embedded_signer() {
        let pki = TestPki::new("KR");
        let first = pki.issue_signer("DS 01", 0x51);
        let second = pki.issue_signer("DS 02", 0x52);

        // whatever order the SET puts them in, each SOD must pick its own signer
        for (signer, other) in [(&first, &second), (&second, &first)] {
            let sod = SodBuilder::new(signer)
                .data_group(1, b"MRZ")
                .signer_by_key_identifier()
                .also_embed(other.certificate())
                .build();
            let so = SecurityObject::decode(&sod).unwrap();

            assert_eq!(
                so.signer_id,
                SignerId::SubjectKeyIdentifier(
                    signer.certificate().subject_key_identifier.clone().unwrap()
                )
            );
            assert_eq!(
                so.embedded_signer.unwrap().fingerprint(),
                signer.certificate().fingerprint()
            );
        }
    }

    #[test]
    fn unmatched_signer_id_embeds_nothing() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let unrelated = pki.issue_dsc("DS 09", 0x59);

        for sod in [
            SodBuilder::new(&signer)
                .data_group(1, b"MRZ")
                .without_certificate()
                .also_embed(&unrelated)
                .build(),
            SodBuilder::new(&signer)
                .data_group(1, b"MRZ")
                .without_certificate()
                .signer_by_key_identifier()
                .also_embed(&unrelated)
                .build(),
        ] {
            assert!(SecurityObject::decode(&sod).unwrap().embedded_signer.is_none());
        }
    }
}
