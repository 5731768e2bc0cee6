//! Decryption permits.
//!
//! A permit is the structured message an account signs to let a one-time keypair read the
//! totals of a closed prediction. The signed digest covers a domain (name, version, service)
//! followed by the permit fields, each length-prefixed, so a signature made for one service or
//! one keypair never verifies for another.

use chrono::{DateTime, Duration, Utc};
use secp256k1::{ecdsa::Signature, hashes::sha256::Hash, Message, SecretKey};
use serde::{Deserialize, Serialize};

use super::*;

pub const PERMIT_NAME: &str = "Pronostico";
pub const PERMIT_VERSION: &str = "1";
const PERMIT_TYPE: &str = "UserDecryptRequestVerification(bytes publicKey,string[] services,\
    int64 startTimestamp,uint32 durationDays)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitDomain {
    pub name: String,
    pub version: String,
    pub service: String,
}
impl PermitDomain {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            name: PERMIT_NAME.to_string(),
            version: PERMIT_VERSION.to_string(),
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub start: DateTime<Utc>,
    pub duration_days: u32,
}
impl ValidityWindow {
    pub fn starting_now(duration_days: u32) -> Self {
        Self {
            start: Utc::now(),
            duration_days,
        }
    }
    /// First instant the window no longer covers, `None` past the last representable date.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.start
            .checked_add_signed(Duration::days(self.duration_days.into()))
    }
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && self.end().map_or(false, |end| now < end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptPermit {
    /// Public half of the requester's one-time keypair.
    pub public_key: UserPubKey,
    pub services: Vec<String>,
    pub window: ValidityWindow,
}
impl DecryptPermit {
    pub fn encode(&self, domain: &PermitDomain) -> Vec<u8> {
        let mut out = vec![0x19, 0x01];
        put_str(&mut out, &domain.name);
        put_str(&mut out, &domain.version);
        put_str(&mut out, &domain.service);
        put_str(&mut out, PERMIT_TYPE);
        out.extend_from_slice(&self.public_key.serialize());
        out.extend_from_slice(&(self.services.len() as u32).to_be_bytes());
        for service in &self.services {
            put_str(&mut out, service);
        }
        out.extend_from_slice(&self.window.start.timestamp().to_be_bytes());
        out.extend_from_slice(&self.window.duration_days.to_be_bytes());
        out
    }
    pub fn message(&self, domain: &PermitDomain) -> Message {
        Message::from_hashed_data::<Hash>(&self.encode(domain))
    }
    pub fn sign(&self, domain: &PermitDomain, secret_key: &SecretKey) -> Signature {
        secret_key.sign_ecdsa(self.message(domain))
    }
}
fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

impl DecryptRequest {
    /// Builds a request for the current tallies of `prediction`, signed by `account_key`.
    pub fn sign(
        prediction: &Prediction,
        domain: &PermitDomain,
        account_key: &SecretKey,
        ephemeral: UserPubKey,
        window: ValidityWindow,
    ) -> Self {
        let permit = DecryptPermit {
            public_key: ephemeral,
            services: vec![domain.service.clone()],
            window,
        };
        let signature = permit.sign(domain, account_key);
        Self {
            prediction: prediction.id,
            handles: prediction.tallies,
            account: UserPubKey::from_secret_key_global(account_key),
            permit,
            signature,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use secp256k1::{generate_keypair, rand};

    #[test]
    fn signature_binds_domain_and_fields() {
        let (secret, account) = generate_keypair(&mut rand::thread_rng());
        let (_, ephemeral) = generate_keypair(&mut rand::thread_rng());
        let domain = PermitDomain::new("pronostico");
        let permit = DecryptPermit {
            public_key: ephemeral,
            services: vec!["pronostico".into()],
            window: ValidityWindow::starting_now(10),
        };
        let sig = permit.sign(&domain, &secret);
        sig.verify(&permit.message(&domain), &account).unwrap();

        let other_domain = PermitDomain::new("elsewhere");
        sig.verify(&permit.message(&other_domain), &account)
            .unwrap_err();

        let mut longer = permit.clone();
        longer.window.duration_days = 11;
        sig.verify(&longer.message(&domain), &account).unwrap_err();

        let (_, other_ephemeral) = generate_keypair(&mut rand::thread_rng());
        let mut rekeyed = permit;
        rekeyed.public_key = other_ephemeral;
        sig.verify(&rekeyed.message(&domain), &account).unwrap_err();
    }

    #[test]
    fn validity_window_bounds() {
        let window = ValidityWindow::starting_now(1);
        assert!(window.contains(window.start));
        assert!(window.contains(window.start + Duration::hours(23)));
        assert!(!window.contains(window.start - Duration::seconds(1)));
        assert!(!window.contains(window.end().unwrap()));
    }

    #[test]
    fn window_past_the_last_date_has_no_end() {
        let window = ValidityWindow {
            start: DateTime::<Utc>::MAX_UTC - Duration::days(1),
            duration_days: 10,
        };
        assert_eq!(window.end(), None);
        assert!(!window.contains(window.start));
        assert!(!window.contains(Utc::now()));
    }
}
