use serde::{Deserialize, Serialize};

pub type UserPubKey = secp256k1::PublicKey;
pub type PredictionId = u64;

/// Opaque reference to a ciphertext held by the ciphertext engine.
///
/// The all-zero handle stands for an encryption of `0` and is what every tally starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CipherHandle(pub [u8; 32]);
impl CipherHandle {
    pub const ZERO: Self = Self([0; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Away,
    Draw,
}

/// One value per outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tallies<T> {
    pub home: T,
    pub away: T,
    pub draw: T,
}
impl<T> Tallies<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Tallies<U> {
        Tallies {
            home: f(self.home),
            away: f(self.away),
            draw: f(self.draw),
        }
    }
}
impl<T: Copy> Tallies<T> {
    pub fn to_array(&self) -> [T; 3] {
        [self.home, self.away, self.draw]
    }
}
impl Tallies<u32> {
    pub fn one_hot(outcome: Outcome) -> Self {
        Tallies {
            home: (outcome == Outcome::Home).into(),
            away: (outcome == Outcome::Away).into(),
            draw: (outcome == Outcome::Draw).into(),
        }
    }
    pub fn is_one_hot(&self) -> bool {
        let values = self.to_array();
        values.iter().all(|v| *v <= 1) && values.iter().sum::<u32>() == 1
    }
}
impl Tallies<CipherHandle> {
    pub fn zero() -> Self {
        Tallies {
            home: CipherHandle::ZERO,
            away: CipherHandle::ZERO,
            draw: CipherHandle::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionState {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub title: String,
    pub home_team: String,
    pub away_team: String,
    pub creator: UserPubKey,
    pub state: PredictionState,
    pub tallies: Tallies<CipherHandle>,
}
impl Prediction {
    pub fn is_active(&self) -> bool {
        self.state == PredictionState::Active
    }
}

/// A one-hot selection encrypted client side, with the engine's proof of well-formedness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVote {
    pub handles: Tallies<CipherHandle>,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

/// What an input proof is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputContext {
    pub service: String,
    pub prediction: PredictionId,
    pub account: UserPubKey,
}
