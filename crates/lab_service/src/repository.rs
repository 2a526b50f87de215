//! Per-player persistence.
//!
//! Each entity (ledger, laboratory, turn) has its own load/save pair that
//! fails with `NotFound` before the first write. Phase actions go through
//! [`PlayerRepository::commit`], which writes all three at once and bumps a
//! per-player revision so a stale read cannot overwrite a newer commit.

use ahash::AHashMap;
use async_trait::async_trait;
use lab_core::{Laboratory, Ledger, PlayerId, PlayerState, Turn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Longest player id usable as a storage key.
pub const MAX_PLAYER_KEY_LEN: usize = 128;

/// Whether `key` can name a player's stored document: non-empty, at most
/// [`MAX_PLAYER_KEY_LEN`] bytes, ASCII alphanumerics plus `_` and `-`.
pub fn is_valid_player_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_PLAYER_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("no {kind} stored for player {player}")]
    NotFound {
        kind: &'static str,
        player: PlayerId,
    },
    #[error("player {0} already has stored state")]
    AlreadyExists(PlayerId),
    #[error("revision conflict for player {player}: expected {expected}, found {actual}")]
    Conflict {
        player: PlayerId,
        expected: u64,
        actual: u64,
    },
    #[error("player id {0:?} cannot be used as a storage key")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn load_ledger(&self, player: &PlayerId) -> Result<Ledger, RepoError>;
    async fn save_ledger(&self, player: &PlayerId, ledger: &Ledger) -> Result<(), RepoError>;
}

#[async_trait]
pub trait LaboratoryRepository: Send + Sync {
    async fn load_laboratory(&self, player: &PlayerId) -> Result<Laboratory, RepoError>;
    async fn save_laboratory(
        &self,
        player: &PlayerId,
        laboratory: &Laboratory,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait TurnRepository: Send + Sync {
    async fn load_turn(&self, player: &PlayerId) -> Result<Turn, RepoError>;
    async fn save_turn(&self, player: &PlayerId, turn: Turn) -> Result<(), RepoError>;
}

/// One consistent read of everything stored for a player. Entities that
/// were never written are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub revision: u64,
    pub ledger: Option<Ledger>,
    pub laboratory: Option<Laboratory>,
    pub turn: Option<Turn>,
}

fn found<T>(loaded: Result<T, RepoError>) -> Result<Option<T>, RepoError> {
    match loaded {
        Ok(value) => Ok(Some(value)),
        Err(RepoError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

#[async_trait]
pub trait PlayerRepository: LedgerRepository + LaboratoryRepository + TurnRepository {
    /// Current revision; 0 when nothing has been stored for `player`.
    async fn revision(&self, player: &PlayerId) -> Result<u64, RepoError>;

    /// Revision and entities together. Backends that keep one record per
    /// player override this with a single read.
    async fn snapshot(&self, player: &PlayerId) -> Result<PlayerSnapshot, RepoError> {
        Ok(PlayerSnapshot {
            revision: self.revision(player).await?,
            ledger: found(self.load_ledger(player).await)?,
            laboratory: found(self.load_laboratory(player).await)?,
            turn: found(self.load_turn(player).await)?,
        })
    }

    /// Write ledger, laboratory and turn together if the stored revision is
    /// still `expected_revision`. Returns the new revision.
    async fn commit(
        &self,
        player: &PlayerId,
        expected_revision: u64,
        state: &PlayerState,
    ) -> Result<u64, RepoError>;
}

/// Everything stored for one player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredPlayer {
    revision: u64,
    #[serde(default)]
    ledger: Option<Ledger>,
    #[serde(default)]
    laboratory: Option<Laboratory>,
    #[serde(default)]
    turn: Option<Turn>,
}

impl StoredPlayer {
    fn commit(
        &mut self,
        player: &PlayerId,
        expected_revision: u64,
        state: &PlayerState,
    ) -> Result<u64, RepoError> {
        if self.revision != expected_revision {
            if expected_revision == 0 {
                return Err(RepoError::AlreadyExists(player.clone()));
            }
            return Err(RepoError::Conflict {
                player: player.clone(),
                expected: expected_revision,
                actual: self.revision,
            });
        }
        self.ledger = Some(state.ledger.clone());
        self.laboratory = Some(state.laboratory.clone());
        self.turn = Some(state.turn);
        self.revision += 1;
        Ok(self.revision)
    }
}

impl From<StoredPlayer> for PlayerSnapshot {
    fn from(stored: StoredPlayer) -> Self {
        Self {
            revision: stored.revision,
            ledger: stored.ledger,
            laboratory: stored.laboratory,
            turn: stored.turn,
        }
    }
}

fn missing(kind: &'static str, player: &PlayerId) -> RepoError {
    RepoError::NotFound {
        kind,
        player: player.clone(),
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRepository {
    players: Mutex<AHashMap<PlayerId, StoredPlayer>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, player: &PlayerId, f: impl FnOnce(&StoredPlayer) -> T) -> Option<T> {
        self.players.lock().get(player).map(f)
    }

    fn update(&self, player: &PlayerId, f: impl FnOnce(&mut StoredPlayer)) {
        let mut players = self.players.lock();
        let stored = players.entry(player.clone()).or_default();
        f(stored);
        stored.revision += 1;
    }
}

#[async_trait]
impl LedgerRepository for MemoryRepository {
    async fn load_ledger(&self, player: &PlayerId) -> Result<Ledger, RepoError> {
        self.read(player, |stored| stored.ledger.clone())
            .flatten()
            .ok_or_else(|| missing("ledger", player))
    }

    async fn save_ledger(&self, player: &PlayerId, ledger: &Ledger) -> Result<(), RepoError> {
        self.update(player, |stored| stored.ledger = Some(ledger.clone()));
        Ok(())
    }
}

#[async_trait]
impl LaboratoryRepository for MemoryRepository {
    async fn load_laboratory(&self, player: &PlayerId) -> Result<Laboratory, RepoError> {
        self.read(player, |stored| stored.laboratory.clone())
            .flatten()
            .ok_or_else(|| missing("laboratory", player))
    }

    async fn save_laboratory(
        &self,
        player: &PlayerId,
        laboratory: &Laboratory,
    ) -> Result<(), RepoError> {
        self.update(player, |stored| stored.laboratory = Some(laboratory.clone()));
        Ok(())
    }
}

#[async_trait]
impl TurnRepository for MemoryRepository {
    async fn load_turn(&self, player: &PlayerId) -> Result<Turn, RepoError> {
        self.read(player, |stored| stored.turn)
            .flatten()
            .ok_or_else(|| missing("turn", player))
    }

    async fn save_turn(&self, player: &PlayerId, turn: Turn) -> Result<(), RepoError> {
        self.update(player, |stored| stored.turn = Some(turn));
        Ok(())
    }
}

#[async_trait]
impl PlayerRepository for MemoryRepository {
    async fn revision(&self, player: &PlayerId) -> Result<u64, RepoError> {
        Ok(self.read(player, |stored| stored.revision).unwrap_or(0))
    }

    async fn snapshot(&self, player: &PlayerId) -> Result<PlayerSnapshot, RepoError> {
        Ok(self
            .read(player, |stored| PlayerSnapshot::from(stored.clone()))
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        player: &PlayerId,
        expected_revision: u64,
        state: &PlayerState,
    ) -> Result<u64, RepoError> {
        let mut players = self.players.lock();
        let stored = players.entry(player.clone()).or_default();
        stored.commit(player, expected_revision, state)
    }
}

// ---------------------------------------------------------------------------
// JSON file backend
// ---------------------------------------------------------------------------

/// One `<player>.json` document per player under `dir`.
///
/// Writes go to a temporary file that is renamed over the old document, so
/// a crash leaves either the old or the new state on disk. Read-modify-write
/// cycles on one player's document are serialized through that player's
/// async lock; different players never wait on each other.
#[derive(Debug)]
pub struct JsonFileRepository {
    dir: PathBuf,
    locks: Mutex<AHashMap<PlayerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl JsonFileRepository {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: Mutex::new(AHashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_for(&self, player: &PlayerId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(player.clone())
            .or_default()
            .clone()
    }

    fn path_for(&self, player: &PlayerId) -> Result<PathBuf, RepoError> {
        let key = player.as_str();
        if !is_valid_player_key(key) {
            return Err(RepoError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    async fn read(&self, player: &PlayerId) -> Result<Option<StoredPlayer>, RepoError> {
        let path = self.path_for(player)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, player: &PlayerId, stored: &StoredPlayer) -> Result<(), RepoError> {
        let path = self.path_for(player)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", player.as_str()));
        let json = serde_json::to_string_pretty(stored)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn update(
        &self,
        player: &PlayerId,
        f: impl FnOnce(&mut StoredPlayer) + Send,
    ) -> Result<(), RepoError> {
        let lock = self.lock_for(player);
        let _guard = lock.lock().await;
        let mut stored = self.read(player).await?.unwrap_or_default();
        f(&mut stored);
        stored.revision += 1;
        self.write(player, &stored).await
    }
}

#[async_trait]
impl LedgerRepository for JsonFileRepository {
    async fn load_ledger(&self, player: &PlayerId) -> Result<Ledger, RepoError> {
        self.read(player)
            .await?
            .and_then(|stored| stored.ledger)
            .ok_or_else(|| missing("ledger", player))
    }

    async fn save_ledger(&self, player: &PlayerId, ledger: &Ledger) -> Result<(), RepoError> {
        self.update(player, |stored| stored.ledger = Some(ledger.clone()))
            .await
    }
}

#[async_trait]
impl LaboratoryRepository for JsonFileRepository {
    async fn load_laboratory(&self, player: &PlayerId) -> Result<Laboratory, RepoError> {
        self.read(player)
            .await?
            .and_then(|stored| stored.laboratory)
            .ok_or_else(|| missing("laboratory", player))
    }

    async fn save_laboratory(
        &self,
        player: &PlayerId,
        laboratory: &Laboratory,
    ) -> Result<(), RepoError> {
        self.update(player, |stored| stored.laboratory = Some(laboratory.clone()))
            .await
    }
}

#[async_trait]
impl TurnRepository for JsonFileRepository {
    async fn load_turn(&self, player: &PlayerId) -> Result<Turn, RepoError> {
        self.read(player)
            .await?
            .and_then(|stored| stored.turn)
            .ok_or_else(|| missing("turn", player))
    }

    async fn save_turn(&self, player: &PlayerId, turn: Turn) -> Result<(), RepoError> {
        self.update(player, |stored| stored.turn = Some(turn)).await
    }
}

#[async_trait]
impl PlayerRepository for JsonFileRepository {
    async fn revision(&self, player: &PlayerId) -> Result<u64, RepoError> {
        Ok(self.read(player).await?.map_or(0, |stored| stored.revision))
    }

    async fn snapshot(&self, player: &PlayerId) -> Result<PlayerSnapshot, RepoError> {
        Ok(self
            .read(player)
            .await?
            .map(PlayerSnapshot::from)
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        player: &PlayerId,
        expected_revision: u64,
        state: &PlayerState,
    ) -> Result<u64, RepoError> {
        let lock = self.lock_for(player);
        let _guard = lock.lock().await;
        let mut stored = self.read(player).await?.unwrap_or_default();
        let revision = stored.commit(player, expected_revision, state)?;
        self.write(player, &stored).await?;
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::test_fixtures::base_content;

    fn player() -> PlayerId {
        PlayerId::new("player_1")
    }

    #[tokio::test]
    async fn memory_entities_start_missing() {
        let repo = MemoryRepository::new();
        assert!(matches!(
            repo.load_ledger(&player()).await,
            Err(RepoError::NotFound { kind: "ledger", .. })
        ));
        assert!(matches!(
            repo.load_turn(&player()).await,
            Err(RepoError::NotFound { kind: "turn", .. })
        ));
        assert_eq!(repo.revision(&player()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_commit_detects_stale_revision() {
        let repo = MemoryRepository::new();
        let state = PlayerState::new(&base_content());
        assert_eq!(repo.commit(&player(), 0, &state).await.unwrap(), 1);
        assert!(matches!(
            repo.commit(&player(), 0, &state).await,
            Err(RepoError::AlreadyExists(_))
        ));
        assert_eq!(repo.commit(&player(), 1, &state).await.unwrap(), 2);
        assert!(matches!(
            repo.commit(&player(), 1, &state).await,
            Err(RepoError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn entity_save_bumps_revision() {
        let repo = MemoryRepository::new();
        repo.save_turn(&player(), Turn::GetReward).await.unwrap();
        assert_eq!(repo.load_turn(&player()).await.unwrap(), Turn::GetReward);
        assert_eq!(repo.revision(&player()).await.unwrap(), 1);
        assert!(repo.load_ledger(&player()).await.is_err());
    }

    #[tokio::test]
    async fn file_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let content = base_content();
        let mut state = PlayerState::new(&content);
        state.turn = Turn::SelectProblems;
        state.ledger.cash = 42;
        {
            let repo = JsonFileRepository::open(dir.path()).await.unwrap();
            repo.commit(&player(), 0, &state).await.unwrap();
        }
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        assert_eq!(repo.revision(&player()).await.unwrap(), 1);
        assert_eq!(repo.load_ledger(&player()).await.unwrap().cash, 42);
        assert_eq!(repo.load_turn(&player()).await.unwrap(), Turn::SelectProblems);
        assert_eq!(
            repo.load_laboratory(&player()).await.unwrap(),
            state.laboratory
        );
        assert!(!dir.path().join(".player_1.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_commit_detects_stale_revision() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        let state = PlayerState::new(&base_content());
        repo.commit(&player(), 0, &state).await.unwrap();
        repo.save_turn(&player(), Turn::ForgeSwords).await.unwrap();
        assert!(matches!(
            repo.commit(&player(), 1, &state).await,
            Err(RepoError::Conflict { actual: 2, .. })
        ));
    }

    #[tokio::test]
    async fn file_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        let result = repo.load_turn(&PlayerId::new("../etc/passwd")).await;
        assert!(matches!(result, Err(RepoError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("player_1.json"), "{not json").unwrap();
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        assert!(matches!(
            repo.load_ledger(&player()).await,
            Err(RepoError::Serde(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_reads_everything_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFileRepository::open(dir.path()).await.unwrap();
        let memory = MemoryRepository::new();
        let state = PlayerState::new(&base_content());
        let repos: [&dyn PlayerRepository; 2] = [&memory, &file];
        for repo in repos {
            assert_eq!(repo.snapshot(&player()).await.unwrap(), PlayerSnapshot::default());
            repo.commit(&player(), 0, &state).await.unwrap();
            let snapshot = repo.snapshot(&player()).await.unwrap();
            assert_eq!(snapshot.revision, 1);
            assert_eq!(snapshot.ledger.as_ref(), Some(&state.ledger));
            assert_eq!(snapshot.laboratory.as_ref(), Some(&state.laboratory));
            assert_eq!(snapshot.turn, Some(state.turn));
        }
    }

    #[tokio::test]
    async fn file_writes_for_one_player_do_not_block_another() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        let state = PlayerState::new(&base_content());
        let held = repo.lock_for(&player());
        let _guard = held.lock().await;
        let other = PlayerId::new("player_2");
        let committed =
            tokio::time::timeout(std::time::Duration::from_secs(5), repo.commit(&other, 0, &state))
                .await
                .expect("other player's commit waited on a foreign lock");
        assert_eq!(committed.unwrap(), 1);
    }

    #[test]
    fn player_keys_are_bounded() {
        assert!(is_valid_player_key("player_1"));
        assert!(is_valid_player_key(&"a".repeat(MAX_PLAYER_KEY_LEN)));
        assert!(!is_valid_player_key(&"a".repeat(MAX_PLAYER_KEY_LEN + 1)));
        assert!(!is_valid_player_key(""));
        assert!(!is_valid_player_key("a/b"));
    }
}
