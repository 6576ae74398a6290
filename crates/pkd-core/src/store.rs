//! In-memory reference repositories.
//!
//! Backed by `parking_lot::RwLock`; results come back in insertion order so
//! chain building over a fixed store is reproducible.

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::repository::{CertificateRepository, CrlRepository};
use crate::types::{
    dn_eq, normalize_serial, Certificate, CertificateRevocationList, CertificateType,
};

/// Certificate store keyed by fingerprint.
#[derive(Debug, Default)]
pub struct InMemoryCertificateStore {
    certs: RwLock<Vec<Certificate>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a certificate. Returns `false` if the fingerprint is already present.
    pub fn insert(&self, cert: Certificate) -> bool {
        let mut certs = self.certs.write();
        if certs.iter().any(|c| c.fingerprint() == cert.fingerprint()) {
            return false;
        }
        debug!(
            subject = %cert.subject_dn,
            cert_type = %cert.cert_type,
            fingerprint = %cert.fingerprint(),
            "certificate stored"
        );
        certs.push(cert);
        true
    }

    pub fn len(&self) -> usize {
        self.certs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.read().is_empty()
    }

    fn filter(&self, pred: impl Fn(&Certificate) -> bool) -> Vec<Certificate> {
        self.certs.read().iter().filter(|c| pred(c)).cloned().collect()
    }
}

impl FromIterator<Certificate> for InMemoryCertificateStore {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        let store = Self::new();
        for cert in iter {
            store.insert(cert);
        }
        store
    }
}

impl CertificateRepository for InMemoryCertificateStore {
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Certificate>> {
        Ok(self
            .certs
            .read()
            .iter()
            .find(|c| c.fingerprint().eq_ignore_ascii_case(fingerprint))
            .cloned())
    }

    fn find_by_serial_and_issuer(
        &self,
        serial: &str,
        issuer_dn: &str,
    ) -> Result<Option<Certificate>> {
        let serial = normalize_serial(serial);
        Ok(self
            .certs
            .read()
            .iter()
            .find(|c| c.serial_number == serial && dn_eq(&c.issuer_dn, issuer_dn))
            .cloned())
    }

    fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Vec<Certificate>> {
        Ok(self.filter(|c| dn_eq(&c.subject_dn, subject_dn)))
    }

    fn find_by_type(&self, cert_type: CertificateType) -> Result<Vec<Certificate>> {
        Ok(self.filter(|c| c.cert_type == cert_type))
    }

    fn find_by_country(&self, country_code: &str) -> Result<Vec<Certificate>> {
        Ok(self.filter(|c| {
            c.country_code
                .as_deref()
                .is_some_and(|cc| cc.eq_ignore_ascii_case(country_code))
        }))
    }

    fn find_by_issuer_dn(&self, issuer_dn: &str) -> Result<Vec<Certificate>> {
        Ok(self.filter(|c| dn_eq(&c.issuer_dn, issuer_dn)))
    }
}

/// CRL store that keeps every ingested CRL and flags at most one valid per issuer.
#[derive(Debug, Default)]
pub struct InMemoryCrlStore {
    crls: RwLock<Vec<CertificateRevocationList>>,
}

impl InMemoryCrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a new CRL: every valid CRL of the same issuer is invalidated and
    /// the new one inserted as valid, under one write lock.
    pub fn ingest(&self, mut crl: CertificateRevocationList) {
        let mut crls = self.crls.write();
        let invalidated = invalidate(&mut crls, &crl.issuer_dn);
        debug!(
            issuer = %crl.issuer_dn,
            crl_id = %crl.id,
            entries = crl.entries.len(),
            invalidated,
            "CRL ingested"
        );
        crl.is_valid = true;
        crls.push(crl);
    }

    /// Flip every valid CRL of `issuer_dn` to invalid. Returns how many changed.
    pub fn invalidate_by_issuer(&self, issuer_dn: &str) -> usize {
        invalidate(&mut self.crls.write(), issuer_dn)
    }

    /// Every CRL ever ingested, valid or not.
    pub fn all(&self) -> Vec<CertificateRevocationList> {
        self.crls.read().clone()
    }

    pub fn valid_count_for_issuer(&self, issuer_dn: &str) -> usize {
        self.crls
            .read()
            .iter()
            .filter(|c| c.is_valid && dn_eq(&c.issuer_dn, issuer_dn))
            .count()
    }
}

fn invalidate(crls: &mut [CertificateRevocationList], issuer_dn: &str) -> usize {
    let mut changed = 0;
    for crl in crls
        .iter_mut()
        .filter(|c| c.is_valid && dn_eq(&c.issuer_dn, issuer_dn))
    {
        crl.is_valid = false;
        changed += 1;
    }
    changed
}

impl CrlRepository for InMemoryCrlStore {
    fn find_valid_by_issuer(&self, issuer_dn: &str) -> Result<Option<CertificateRevocationList>> {
        Ok(self
            .crls
            .read()
            .iter()
            .find(|c| c.is_valid && dn_eq(&c.issuer_dn, issuer_dn))
            .cloned())
    }

    fn find_valid_by_country(
        &self,
        country_code: &str,
    ) -> Result<Option<CertificateRevocationList>> {
        Ok(self
            .crls
            .read()
            .iter()
            .filter(|c| {
                c.is_valid
                    && c.country_code
                        .as_deref()
                        .is_some_and(|cc| cc.eq_ignore_ascii_case(country_code))
            })
            .max_by_key(|c| c.this_update)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPki;
    use crate::types::RevocationEntry;
    use chrono::{Duration, Utc};

    fn crl(id: &str, issuer: &str, age_days: i64) -> CertificateRevocationList {
        let this_update = Utc::now() - Duration::days(age_days);
        CertificateRevocationList::new(
            id,
            issuer,
            Some("KR".into()),
            this_update,
            Some(this_update + Duration::days(30)),
            [RevocationEntry::new("01", this_update, None)],
        )
    }

    #[test]
    fn ingest_keeps_one_valid_crl_per_issuer() {
        let store = InMemoryCrlStore::new();
        store.ingest(crl("a", "C=KR, CN=CSCA", 10));
        store.ingest(crl("b", "c=kr,cn=csca", 5));
        store.ingest(crl("c", "C=KR, CN=Other", 1));

        assert_eq!(store.valid_count_for_issuer("C=KR, CN=CSCA"), 1);
        assert_eq!(store.all().len(), 3);
        let current = store.find_valid_by_issuer("C=KR, CN=CSCA").unwrap().unwrap();
        assert_eq!(current.id, "b");
        assert!(!store.all()[0].is_valid);
    }

    #[test]
    fn invalidated_crls_are_never_returned() {
        let store = InMemoryCrlStore::new();
        store.ingest(crl("a", "C=KR, CN=CSCA", 1));
        assert_eq!(store.invalidate_by_issuer("C=KR, CN=CSCA"), 1);
        assert!(store.find_valid_by_issuer("C=KR, CN=CSCA").unwrap().is_none());
        assert!(store.find_valid_by_country("KR").unwrap().is_none());
        assert_eq!(store.invalidate_by_issuer("C=KR, CN=CSCA"), 0);
    }

    #[test]
    fn country_lookup_prefers_latest() {
        let store = InMemoryCrlStore::new();
        store.ingest(crl("old", "C=KR, CN=A", 10));
        store.ingest(crl("new", "C=KR, CN=B", 1));
        assert_eq!(store.find_valid_by_country("kr").unwrap().unwrap().id, "new");
    }

    #[test]
    fn certificate_lookups() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x0102);
        let store: InMemoryCertificateStore = [pki.csca().clone(), dsc.clone()].into_iter().collect();

        assert!(!store.insert(dsc.clone()));
        assert_eq!(store.len(), 2);
        assert_eq!(
            store
                .find_by_serial_and_issuer("00:01:02", &pki.csca().subject_dn)
                .unwrap()
                .unwrap()
                .fingerprint(),
            dsc.fingerprint()
        );
        assert_eq!(store.find_by_subject_dn(&pki.csca().subject_dn).unwrap().len(), 1);
        assert_eq!(store.find_by_issuer_dn(&pki.csca().subject_dn).unwrap().len(), 2);
        assert_eq!(store.find_by_type(CertificateType::Dsc).unwrap().len(), 1);
        assert_eq!(
            store
                .find_by_country_and_type("kr", CertificateType::Csca)
                .unwrap()
                .len(),
            1
        );
        assert!(store.find_by_fingerprint(dsc.fingerprint()).unwrap().is_some());
    }
}
