use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::{anyhow, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::*;

impl Display for CipherHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
impl FromStr for CipherHandle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("Handle needs 32 bytes but had {}", b.len()))?;
        Ok(Self(bytes))
    }
}
impl Serialize for CipherHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> Deserialize<'de> for CipherHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
impl Display for PredictionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Active => "Active",
            Self::Closed => "Closed",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for PredictionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Closed" => Ok(Self::Closed),
            e => bail!("Couldn't deserialize to PredictionState: {}", e),
        }
    }
}
impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::InvalidPrediction => "InvalidPrediction",
            Self::PredictionInactive => "PredictionInactive",
            Self::PredictionStillActive => "PredictionStillActive",
            Self::AlreadyPredicted => "AlreadyPredicted",
            Self::InvalidProof => "InvalidProof",
            Self::DecryptionDenied => "DecryptionDenied",
            Self::Unauthorized => "Unauthorized",
            Self::DecryptTimeout => "DecryptTimeout",
            Self::Internal => "Internal",
        };
        write!(f, "{}", output)
    }
}
