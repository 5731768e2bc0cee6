use crate::api::*;
use crate::error::PredictionError;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secp256k1::ecdsa::Signature;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{query, Executor, Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const DB_CONN: &str = "sqlite::memory:";

/// Storage for predictions, voter sets and login sessions.
///
/// `record_vote` and `close_prediction` re-check the state they depend on as part of the
/// write and fail with a [`PredictionError`] wrapped in the returned error when it no longer
/// holds.
#[async_trait]
pub trait DB {
    async fn add_prediction(
        &self,
        title: String,
        home_team: String,
        away_team: String,
        creator: UserPubKey,
    ) -> Result<PredictionId>;
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>>;
    async fn get_prediction_count(&self) -> Result<u64>;
    async fn has_voted(&self, prediction: PredictionId, voter: &UserPubKey) -> Result<bool>;
    /// Marks `voter` as having voted and replaces the tallies, all or nothing.
    async fn record_vote(
        &self,
        prediction: PredictionId,
        voter: &UserPubKey,
        tallies: Tallies<CipherHandle>,
    ) -> Result<()>;
    /// Marks `prediction` closed with its final `tallies`.
    async fn close_prediction(
        &self,
        prediction: PredictionId,
        tallies: Tallies<CipherHandle>,
    ) -> Result<()>;

    async fn create_session(&self, user: UserPubKey, challenge: String) -> Result<()>;
    async fn update_access_token(
        &self,
        user: UserPubKey,
        sig: Signature,
        challenge: String,
    ) -> Result<()>;
    async fn get_last_access(
        &self,
        user: UserPubKey,
        challenge: String,
    ) -> Result<(Signature, DateTime<Utc>)>;
}

fn to_row_id(prediction: PredictionId) -> Result<i64> {
    i64::try_from(prediction).map_err(|_| PredictionError::InvalidPrediction(prediction).into())
}

pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    pub async fn new(conn: Option<String>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(conn.as_deref().unwrap_or(DB_CONN))?
            .create_if_missing(true);
        // An in-memory database lives as long as its only connection.
        let connection = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Couldn't open database")?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS predictions (\
                id INTEGER PRIMARY KEY,\
                title NOT NULL,\
                home_team NOT NULL,\
                away_team NOT NULL,\
                creator NOT NULL,\
                state NOT NULL,\
                home_tally NOT NULL,\
                away_tally NOT NULL,\
                draw_tally NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS voters (\
                prediction NOT NULL,\
                voter NOT NULL,\
                PRIMARY KEY (prediction,voter)\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS sessions (\
                pubkey NOT NULL,\
                challenge NOT NULL,\
                access_token,\
                last_access,\
                PRIMARY KEY (pubkey,challenge)\
                )",
            )
            .await?;
        Ok(Self { connection })
    }
}
fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    let id: i64 = row.get("id");
    Ok(Prediction {
        id: id.try_into()?,
        title: row.get("title"),
        home_team: row.get("home_team"),
        away_team: row.get("away_team"),
        creator: UserPubKey::from_str(row.get("creator"))?,
        state: PredictionState::from_str(row.get("state"))?,
        tallies: Tallies {
            home: CipherHandle::from_str(row.get("home_tally"))?,
            away: CipherHandle::from_str(row.get("away_tally"))?,
            draw: CipherHandle::from_str(row.get("draw_tally"))?,
        },
    })
}
#[async_trait]
impl DB for SQLite {
    async fn add_prediction(
        &self,
        title: String,
        home_team: String,
        away_team: String,
        creator: UserPubKey,
    ) -> Result<PredictionId> {
        let zero = CipherHandle::ZERO.to_string();
        let row = self
            .connection
            .fetch_one(
                query(
                    "INSERT INTO predictions (\
                    id,\
                    title,\
                    home_team,\
                    away_team,\
                    creator,\
                    state,\
                    home_tally,\
                    away_tally,\
                    draw_tally) \
                    VALUES ((SELECT COUNT(*) FROM predictions),?,?,?,?,?,?,?,?) \
                    RETURNING id",
                )
                .bind(title)
                .bind(home_team)
                .bind(away_team)
                .bind(creator.to_string())
                .bind(PredictionState::Active.to_string())
                .bind(zero.clone())
                .bind(zero.clone())
                .bind(zero),
            )
            .await?;
        let id: i64 = row.get("id");
        Ok(id.try_into()?)
    }
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>> {
        let Ok(id) = i64::try_from(prediction) else {
            return Ok(None);
        };
        let row = self
            .connection
            .fetch_optional(query("SELECT * FROM predictions WHERE id = ?").bind(id))
            .await
            .with_context(|| format!("couldn't get prediction {}", prediction))?;
        row.as_ref().map(prediction_from_row).transpose()
    }
    async fn get_prediction_count(&self) -> Result<u64> {
        let count: i64 = self
            .connection
            .fetch_one(query("SELECT COUNT(*) FROM predictions"))
            .await?
            .get(0);
        Ok(count.try_into()?)
    }
    async fn has_voted(&self, prediction: PredictionId, voter: &UserPubKey) -> Result<bool> {
        let Ok(id) = i64::try_from(prediction) else {
            return Ok(false);
        };
        let row = self
            .connection
            .fetch_optional(
                query("SELECT 1 FROM voters WHERE prediction = ? AND voter = ?")
                    .bind(id)
                    .bind(voter.to_string()),
            )
            .await?;
        Ok(row.is_some())
    }
    async fn record_vote(
        &self,
        prediction: PredictionId,
        voter: &UserPubKey,
        tallies: Tallies<CipherHandle>,
    ) -> Result<()> {
        let id = to_row_id(prediction)?;
        let mut tx = self.connection.begin().await?;
        let state = query("SELECT state FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(PredictionError::InvalidPrediction(prediction))?;
        if PredictionState::from_str(state.get("state"))? != PredictionState::Active {
            return Err(PredictionError::PredictionInactive(prediction).into());
        }
        let inserted = query("INSERT OR IGNORE INTO voters (prediction, voter) VALUES (?,?)")
            .bind(id)
            .bind(voter.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if inserted != 1 {
            return Err(PredictionError::AlreadyPredicted(prediction, *voter).into());
        }
        query(
            "UPDATE predictions SET \
            home_tally = ?, \
            away_tally = ?, \
            draw_tally = ? \
            WHERE id = ?",
        )
        .bind(tallies.home.to_string())
        .bind(tallies.away.to_string())
        .bind(tallies.draw.to_string())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
    async fn close_prediction(
        &self,
        prediction: PredictionId,
        tallies: Tallies<CipherHandle>,
    ) -> Result<()> {
        let id = to_row_id(prediction)?;
        let mut tx = self.connection.begin().await?;
        let state = query("SELECT state FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(PredictionError::InvalidPrediction(prediction))?;
        if PredictionState::from_str(state.get("state"))? != PredictionState::Active {
            return Err(PredictionError::PredictionInactive(prediction).into());
        }
        query(
            "UPDATE predictions SET \
            state = ?, \
            home_tally = ?, \
            away_tally = ?, \
            draw_tally = ? \
            WHERE id = ?",
        )
        .bind(PredictionState::Closed.to_string())
        .bind(tallies.home.to_string())
        .bind(tallies.away.to_string())
        .bind(tallies.draw.to_string())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
    async fn create_session(&self, user: UserPubKey, challenge: String) -> Result<()> {
        let stmt = query(
            "INSERT OR REPLACE INTO sessions \
            (pubkey, challenge) VALUES (?,?)",
        );
        self.connection
            .execute(stmt.bind(user.to_string()).bind(challenge))
            .await?;
        Ok(())
    }
    async fn update_access_token(
        &self,
        user: UserPubKey,
        sig: Signature,
        challenge: String,
    ) -> Result<()> {
        let stmt = query(
            "UPDATE sessions SET \
            access_token = ?, \
            last_access = ? \
            WHERE pubkey = ? AND challenge = ?",
        );
        let updated = self
            .connection
            .execute(
                stmt.bind(sig.to_string())
                    .bind(Utc::now().timestamp())
                    .bind(user.to_string())
                    .bind(challenge),
            )
            .await?
            .rows_affected();
        if updated != 1 {
            bail!("No login challenge issued for user {}", user)
        }
        Ok(())
    }
    async fn get_last_access(
        &self,
        user: UserPubKey,
        challenge: String,
    ) -> Result<(Signature, DateTime<Utc>)> {
        let stmt = query(
            "SELECT access_token, last_access \
            FROM sessions \
            WHERE pubkey = ? AND challenge = ?",
        );
        let row = self
            .connection
            .fetch_one(stmt.bind(user.to_string()).bind(challenge))
            .await?;
        let token: Option<String> = row.get("access_token");
        let last_access: Option<i64> = row.get("last_access");
        let (Some(token), Some(last_access)) = (token, last_access) else {
            bail!("Session of user {} was never logged in", user)
        };
        let last_access = Utc
            .timestamp_opt(last_access, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid last access time {}", last_access))?;
        Ok((Signature::from_str(token.as_str())?, last_access))
    }
}

/// Keeps everything in process memory. Used when no database is configured.
#[derive(Default)]
pub struct MemoryDB {
    state: Mutex<MemoryState>,
}
#[derive(Default)]
struct MemoryState {
    predictions: Vec<PredictionRecord>,
    sessions: HashMap<(UserPubKey, String), Option<(Signature, DateTime<Utc>)>>,
}
struct PredictionRecord {
    prediction: Prediction,
    voters: HashSet<UserPubKey>,
}
impl MemoryDB {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Memory database is poisoned"))
    }
}
impl MemoryState {
    fn record(&mut self, prediction: PredictionId) -> Result<&mut PredictionRecord> {
        usize::try_from(prediction)
            .ok()
            .and_then(|i| self.predictions.get_mut(i))
            .ok_or_else(|| PredictionError::InvalidPrediction(prediction).into())
    }
}
#[async_trait]
impl DB for MemoryDB {
    async fn add_prediction(
        &self,
        title: String,
        home_team: String,
        away_team: String,
        creator: UserPubKey,
    ) -> Result<PredictionId> {
        let mut state = self.state()?;
        let id = state.predictions.len() as PredictionId;
        state.predictions.push(PredictionRecord {
            prediction: Prediction {
                id,
                title,
                home_team,
                away_team,
                creator,
                state: PredictionState::Active,
                tallies: Tallies::zero(),
            },
            voters: HashSet::new(),
        });
        Ok(id)
    }
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>> {
        let state = self.state()?;
        Ok(usize::try_from(prediction)
            .ok()
            .and_then(|i| state.predictions.get(i))
            .map(|record| record.prediction.clone()))
    }
    async fn get_prediction_count(&self) -> Result<u64> {
        Ok(self.state()?.predictions.len() as u64)
    }
    async fn has_voted(&self, prediction: PredictionId, voter: &UserPubKey) -> Result<bool> {
        let state = self.state()?;
        Ok(usize::try_from(prediction)
            .ok()
            .and_then(|i| state.predictions.get(i))
            .map_or(false, |record| record.voters.contains(voter)))
    }
    async fn record_vote(
        &self,
        prediction: PredictionId,
        voter: &UserPubKey,
        tallies: Tallies<CipherHandle>,
    ) -> Result<()> {
        let mut state = self.state()?;
        let record = state.record(prediction)?;
        if !record.prediction.is_active() {
            return Err(PredictionError::PredictionInactive(prediction).into());
        }
        if !record.voters.insert(*voter) {
            return Err(PredictionError::AlreadyPredicted(prediction, *voter).into());
        }
        record.prediction.tallies = tallies;
        Ok(())
    }
    async fn close_prediction(
        &self,
        prediction: PredictionId,
        tallies: Tallies<CipherHandle>,
    ) -> Result<()> {
        let mut state = self.state()?;
        let record = state.record(prediction)?;
        if !record.prediction.is_active() {
            return Err(PredictionError::PredictionInactive(prediction).into());
        }
        record.prediction.state = PredictionState::Closed;
        record.prediction.tallies = tallies;
        Ok(())
    }
    async fn create_session(&self, user: UserPubKey, challenge: String) -> Result<()> {
        self.state()?.sessions.insert((user, challenge), None);
        Ok(())
    }
    async fn update_access_token(
        &self,
        user: UserPubKey,
        sig: Signature,
        challenge: String,
    ) -> Result<()> {
        let mut state = self.state()?;
        let Some(session) = state.sessions.get_mut(&(user, challenge)) else {
            bail!("No login challenge issued for user {}", user)
        };
        *session = Some((sig, Utc::now()));
        Ok(())
    }
    async fn get_last_access(
        &self,
        user: UserPubKey,
        challenge: String,
    ) -> Result<(Signature, DateTime<Utc>)> {
        let state = self.state()?;
        match state.sessions.get(&(user, challenge)) {
            Some(Some(access)) => Ok(*access),
            Some(None) => bail!("Session of user {} was never logged in", user),
            None => bail!("No session for user {}", user),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use secp256k1::hashes::sha256::Hash;
    use secp256k1::{generate_keypair, rand, Message};

    async fn backends() -> Vec<Box<dyn DB + Send + Sync>> {
        vec![
            Box::new(MemoryDB::default()),
            Box::new(SQLite::new(None).await.unwrap()),
        ]
    }

    fn handle(byte: u8) -> CipherHandle {
        CipherHandle([byte; 32])
    }

    #[tokio::test]
    async fn predictions_are_numbered_from_zero() {
        let (_, creator) = generate_keypair(&mut rand::thread_rng());
        for db in backends().await {
            assert_eq!(db.get_prediction_count().await.unwrap(), 0);
            assert_eq!(db.get_prediction(0).await.unwrap(), None);
            for expected in 0..3 {
                let id = db
                    .add_prediction(
                        format!("Match {}", expected),
                        "Home".into(),
                        "Away".into(),
                        creator,
                    )
                    .await
                    .unwrap();
                assert_eq!(id, expected);
            }
            assert_eq!(db.get_prediction_count().await.unwrap(), 3);
            let prediction = db.get_prediction(1).await.unwrap().unwrap();
            assert_eq!(prediction.title, "Match 1");
            assert_eq!(prediction.creator, creator);
            assert_eq!(prediction.state, PredictionState::Active);
            assert_eq!(prediction.tallies, Tallies::zero());
            assert_eq!(db.get_prediction(u64::MAX).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn votes_are_recorded_once() {
        let (_, creator) = generate_keypair(&mut rand::thread_rng());
        let (_, voter) = generate_keypair(&mut rand::thread_rng());
        for db in backends().await {
            let id = db
                .add_prediction("Derby".into(), "A".into(), "B".into(), creator)
                .await
                .unwrap();
            let tallies = Tallies {
                home: handle(1),
                away: handle(2),
                draw: handle(3),
            };
            assert!(!db.has_voted(id, &voter).await.unwrap());
            db.record_vote(id, &voter, tallies).await.unwrap();
            assert!(db.has_voted(id, &voter).await.unwrap());
            assert_eq!(db.get_prediction(id).await.unwrap().unwrap().tallies, tallies);

            let again = Tallies {
                home: handle(4),
                away: handle(5),
                draw: handle(6),
            };
            let err = db.record_vote(id, &voter, again).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PredictionError>(),
                Some(PredictionError::AlreadyPredicted(..))
            ));
            assert_eq!(db.get_prediction(id).await.unwrap().unwrap().tallies, tallies);

            let err = db.record_vote(id + 1, &voter, again).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PredictionError>(),
                Some(PredictionError::InvalidPrediction(_))
            ));
        }
    }

    #[tokio::test]
    async fn closing_is_final() {
        let (_, creator) = generate_keypair(&mut rand::thread_rng());
        let (_, voter) = generate_keypair(&mut rand::thread_rng());
        for db in backends().await {
            let id = db
                .add_prediction("Final".into(), "A".into(), "B".into(), creator)
                .await
                .unwrap();
            let last = Tallies {
                home: handle(7),
                away: handle(8),
                draw: handle(9),
            };
            db.close_prediction(id, last).await.unwrap();
            let closed = db.get_prediction(id).await.unwrap().unwrap();
            assert_eq!(closed.state, PredictionState::Closed);
            assert_eq!(closed.tallies, last);
            let err = db.close_prediction(id, Tallies::zero()).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PredictionError>(),
                Some(PredictionError::PredictionInactive(_))
            ));
            let err = db
                .record_vote(id, &voter, Tallies::zero())
                .await
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PredictionError>(),
                Some(PredictionError::PredictionInactive(_))
            ));
            assert!(!db.has_voted(id, &voter).await.unwrap());
        }
    }

    #[tokio::test]
    async fn sessions() {
        let (secret, user) = generate_keypair(&mut rand::thread_rng());
        let challenge = "aChallengeOfThirtyCharactersXY".to_string();
        let sig = secret.sign_ecdsa(Message::from_hashed_data::<Hash>(challenge.as_bytes()));
        for db in backends().await {
            db.update_access_token(user, sig, challenge.clone())
                .await
                .unwrap_err();
            db.create_session(user, challenge.clone()).await.unwrap();
            db.get_last_access(user, challenge.clone())
                .await
                .unwrap_err();
            db.update_access_token(user, sig, challenge.clone())
                .await
                .unwrap();
            let (stored, last_access) = db.get_last_access(user, challenge.clone()).await.unwrap();
            assert_eq!(stored, sig);
            assert!(last_access <= Utc::now());
            db.get_last_access(user, "other".into()).await.unwrap_err();
        }
    }

    #[tokio::test]
    async fn sqlite_file_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "pronostico-db-test-{}.sqlite",
            rand::random::<u32>()
        ));
        let conn = format!("sqlite://{}", path.display());
        let (_, creator) = generate_keypair(&mut rand::thread_rng());
        {
            let db = SQLite::new(Some(conn.clone())).await.unwrap();
            db.add_prediction("Kept".into(), "A".into(), "B".into(), creator)
                .await
                .unwrap();
        }
        let db = SQLite::new(Some(conn)).await.unwrap();
        assert_eq!(db.get_prediction_count().await.unwrap(), 1);
        assert_eq!(db.get_prediction(0).await.unwrap().unwrap().title, "Kept");
        std::fs::remove_file(path).ok();
    }
}
