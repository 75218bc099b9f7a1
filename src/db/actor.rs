use crate::db::models::{DbArtist, DbCredential, DbService, DbServiceOverride};
use crate::db::schema::SQLITE_INIT;
use crate::db::writes::{ArtistCreate, CredentialWrite, ServiceCreate, ServiceOverrideCreate};
use crate::error::AtelierError;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub enum DbActorMessage {
    /// Insert an artist and return its id.
    CreateArtist(ArtistCreate, RpcReplyPort<Result<i64, AtelierError>>),

    /// Get an artist by id.
    GetArtist(i64, RpcReplyPort<Result<Option<DbArtist>, AtelierError>>),

    /// Set (or clear) the artist's chosen calendar id.
    SetLinkedCalendar {
        artist_id: i64,
        calendar_id: Option<String>,
        reply: RpcReplyPort<Result<(), AtelierError>>,
    },

    /// Upsert a service by slug and return its id.
    UpsertService(ServiceCreate, RpcReplyPort<Result<i64, AtelierError>>),

    /// Get a service by id (active or not).
    GetService(i64, RpcReplyPort<Result<Option<DbService>, AtelierError>>),

    /// Upsert the override for one (artist, service) pair.
    UpsertServiceOverride(ServiceOverrideCreate, RpcReplyPort<Result<i64, AtelierError>>),

    /// Get the override for one (artist, service) pair.
    GetServiceOverride {
        artist_id: i64,
        service_id: i64,
        reply: RpcReplyPort<Result<Option<DbServiceOverride>, AtelierError>>,
    },

    /// Upsert an artist's credential; returns the new generation.
    SaveCredential(CredentialWrite, RpcReplyPort<Result<i64, AtelierError>>),

    /// Load an artist's credential.
    LoadCredential(i64, RpcReplyPort<Result<Option<DbCredential>, AtelierError>>),

    /// Delete an artist's credential, optionally only at an expected generation.
    DeleteCredential {
        artist_id: i64,
        expected_generation: Option<i64>,
        reply: RpcReplyPort<Result<bool, AtelierError>>,
    },
}

#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
}

fn rpc_failed(name: &str, e: impl std::fmt::Display) -> AtelierError {
    AtelierError::Actor(format!("DbActor {name} RPC failed: {e}"))
}

impl DbActorHandle {
    pub async fn create_artist(&self, create: ArtistCreate) -> Result<i64, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::CreateArtist, create)
            .map_err(|e| rpc_failed("CreateArtist", e))?
    }

    pub async fn get_artist(&self, id: i64) -> Result<Option<DbArtist>, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::GetArtist, id)
            .map_err(|e| rpc_failed("GetArtist", e))?
    }

    pub async fn set_linked_calendar(
        &self,
        artist_id: i64,
        calendar_id: Option<String>,
    ) -> Result<(), AtelierError> {
        ractor::call!(self.actor, |reply| DbActorMessage::SetLinkedCalendar {
            artist_id,
            calendar_id,
            reply
        })
        .map_err(|e| rpc_failed("SetLinkedCalendar", e))?
    }

    pub async fn upsert_service(&self, create: ServiceCreate) -> Result<i64, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::UpsertService, create)
            .map_err(|e| rpc_failed("UpsertService", e))?
    }

    pub async fn get_service(&self, id: i64) -> Result<Option<DbService>, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::GetService, id)
            .map_err(|e| rpc_failed("GetService", e))?
    }

    pub async fn upsert_service_override(
        &self,
        create: ServiceOverrideCreate,
    ) -> Result<i64, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::UpsertServiceOverride, create)
            .map_err(|e| rpc_failed("UpsertServiceOverride", e))?
    }

    pub async fn get_service_override(
        &self,
        artist_id: i64,
        service_id: i64,
    ) -> Result<Option<DbServiceOverride>, AtelierError> {
        ractor::call!(self.actor, |reply| DbActorMessage::GetServiceOverride {
            artist_id,
            service_id,
            reply
        })
        .map_err(|e| rpc_failed("GetServiceOverride", e))?
    }

    pub async fn save_credential(&self, write: CredentialWrite) -> Result<i64, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::SaveCredential, write)
            .map_err(|e| rpc_failed("SaveCredential", e))?
    }

    pub async fn load_credential(
        &self,
        artist_id: i64,
    ) -> Result<Option<DbCredential>, AtelierError> {
        ractor::call!(self.actor, DbActorMessage::LoadCredential, artist_id)
            .map_err(|e| rpc_failed("LoadCredential", e))?
    }

    pub async fn delete_credential(
        &self,
        artist_id: i64,
        expected_generation: Option<i64>,
    ) -> Result<bool, AtelierError> {
        ractor::call!(self.actor, |reply| DbActorMessage::DeleteCredential {
            artist_id,
            expected_generation,
            reply
        })
        .map_err(|e| rpc_failed("DeleteCredential", e))?
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pool = &state.pool;
        match message {
            DbActorMessage::CreateArtist(create, reply) => {
                let _ = reply.send(create_artist(pool, create).await);
            }
            DbActorMessage::GetArtist(id, reply) => {
                let _ = reply.send(get_artist(pool, id).await);
            }
            DbActorMessage::SetLinkedCalendar {
                artist_id,
                calendar_id,
                reply,
            } => {
                let _ = reply.send(set_linked_calendar(pool, artist_id, calendar_id).await);
            }
            DbActorMessage::UpsertService(create, reply) => {
                let _ = reply.send(upsert_service(pool, create).await);
            }
            DbActorMessage::GetService(id, reply) => {
                let _ = reply.send(get_service(pool, id).await);
            }
            DbActorMessage::UpsertServiceOverride(create, reply) => {
                let _ = reply.send(upsert_service_override(pool, create).await);
            }
            DbActorMessage::GetServiceOverride {
                artist_id,
                service_id,
                reply,
            } => {
                let _ = reply.send(get_service_override(pool, artist_id, service_id).await);
            }
            DbActorMessage::SaveCredential(write, reply) => {
                let _ = reply.send(save_credential(pool, write).await);
            }
            DbActorMessage::LoadCredential(artist_id, reply) => {
                let _ = reply.send(load_credential(pool, artist_id).await);
            }
            DbActorMessage::DeleteCredential {
                artist_id,
                expected_generation,
                reply,
            } => {
                let _ = reply.send(delete_credential(pool, artist_id, expected_generation).await);
            }
        }
        Ok(())
    }
}

async fn create_artist(pool: &SqlitePool, create: ArtistCreate) -> Result<i64, AtelierError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO artists (name, linked_calendar_id, credential_generation, created_at, updated_at)
        VALUES (?, ?, 0, ?, ?)
        RETURNING id
        ",
    )
    .bind(create.name)
    .bind(create.linked_calendar_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn get_artist(pool: &SqlitePool, id: i64) -> Result<Option<DbArtist>, AtelierError> {
    let row = sqlx::query_as::<_, DbArtist>(
        r"
        SELECT id, name, linked_calendar_id, created_at, updated_at
        FROM artists
        WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

async fn set_linked_calendar(
    pool: &SqlitePool,
    artist_id: i64,
    calendar_id: Option<String>,
) -> Result<(), AtelierError> {
    let res = sqlx::query(
        r"
        UPDATE artists
        SET linked_calendar_id = ?, updated_at = ?
        WHERE id = ?
        ",
    )
    .bind(calendar_id)
    .bind(Utc::now())
    .bind(artist_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AtelierError::not_found("artist", artist_id));
    }
    Ok(())
}

async fn upsert_service(pool: &SqlitePool, create: ServiceCreate) -> Result<i64, AtelierError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO services (
            title, slug, base_price, duration_minutes, buffer_before_minutes,
            buffer_after_minutes, active, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(slug) DO UPDATE SET
            title = excluded.title,
            base_price = excluded.base_price,
            duration_minutes = excluded.duration_minutes,
            buffer_before_minutes = excluded.buffer_before_minutes,
            buffer_after_minutes = excluded.buffer_after_minutes,
            active = excluded.active,
            updated_at = excluded.updated_at
        RETURNING id
        ",
    )
    .bind(create.title)
    .bind(create.slug)
    .bind(create.base_price)
    .bind(create.duration_minutes)
    .bind(create.buffer_before_minutes)
    .bind(create.buffer_after_minutes)
    .bind(create.active)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn get_service(pool: &SqlitePool, id: i64) -> Result<Option<DbService>, AtelierError> {
    let row = sqlx::query_as::<_, DbService>(
        r"
        SELECT id, title, slug, base_price, duration_minutes, buffer_before_minutes,
               buffer_after_minutes, active, created_at, updated_at
        FROM services
        WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

async fn upsert_service_override(
    pool: &SqlitePool,
    create: ServiceOverrideCreate,
) -> Result<i64, AtelierError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO service_overrides (artist_id, service_id, price, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(artist_id, service_id) DO UPDATE SET
            price = excluded.price,
            active = excluded.active,
            updated_at = excluded.updated_at
        RETURNING id
        ",
    )
    .bind(create.artist_id)
    .bind(create.service_id)
    .bind(create.price)
    .bind(create.active)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn get_service_override(
    pool: &SqlitePool,
    artist_id: i64,
    service_id: i64,
) -> Result<Option<DbServiceOverride>, AtelierError> {
    let row = sqlx::query_as::<_, DbServiceOverride>(
        r"
        SELECT id, artist_id, service_id, price, active, created_at, updated_at
        FROM service_overrides
        WHERE artist_id = ? AND service_id = ?
        ",
    )
    .bind(artist_id)
    .bind(service_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Single-transaction upsert. The generation is drawn from the artist's high-water
/// mark so a credential re-created after unlink never reuses an old generation.
async fn save_credential(pool: &SqlitePool, write: CredentialWrite) -> Result<i64, AtelierError> {
    let mut tx = pool.begin().await?;

    if let Some(expected) = write.expected_generation {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT generation FROM oauth_credentials WHERE artist_id = ?")
                .bind(write.artist_id)
                .fetch_optional(&mut *tx)
                .await?;

        if current != Some(expected) {
            tx.rollback().await?;
            debug!(
                artist_id = write.artist_id,
                expected,
                current = ?current,
                "credential CAS lost"
            );
            return Err(AtelierError::ConcurrencyConflict {
                artist_id: write.artist_id,
            });
        }
    }

    let now = Utc::now();
    let generation: Option<i64> = sqlx::query_scalar(
        r"
        UPDATE artists
        SET credential_generation = credential_generation + 1
        WHERE id = ?
        RETURNING credential_generation
        ",
    )
    .bind(write.artist_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(generation) = generation else {
        tx.rollback().await?;
        return Err(AtelierError::not_found("artist", write.artist_id));
    };

    let refresh_token_set = write.refresh_token.is_some();
    sqlx::query(
        r"
        INSERT INTO oauth_credentials (
            artist_id, access_token, refresh_token, expiry, scope, generation, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(artist_id) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = COALESCE(excluded.refresh_token, oauth_credentials.refresh_token),
            expiry = excluded.expiry,
            scope = excluded.scope,
            generation = excluded.generation,
            updated_at = excluded.updated_at
        ",
    )
    .bind(write.artist_id)
    .bind(write.access_token)
    .bind(write.refresh_token)
    .bind(write.expiry)
    .bind(write.scope)
    .bind(generation)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!(
        artist_id = write.artist_id,
        generation,
        refresh_token_set,
        expiry = %write.expiry,
        "credential saved"
    );
    Ok(generation)
}

async fn load_credential(
    pool: &SqlitePool,
    artist_id: i64,
) -> Result<Option<DbCredential>, AtelierError> {
    let row = sqlx::query_as::<_, DbCredential>(
        r"
        SELECT artist_id, access_token, refresh_token, expiry, scope, generation, created_at, updated_at
        FROM oauth_credentials
        WHERE artist_id = ?
        ",
    )
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

async fn delete_credential(
    pool: &SqlitePool,
    artist_id: i64,
    expected_generation: Option<i64>,
) -> Result<bool, AtelierError> {
    let res = sqlx::query(
        r"
        DELETE FROM oauth_credentials
        WHERE artist_id = ? AND (? IS NULL OR generation = ?)
        ",
    )
    .bind(artist_id)
    .bind(expected_generation)
    .bind(expected_generation)
    .execute(pool)
    .await?;

    let deleted = res.rows_affected() > 0;
    debug!(artist_id, expected_generation = ?expected_generation, deleted, "credential delete");
    Ok(deleted)
}

/// Spawn the database actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> Result<DbActorHandle, AtelierError> {
    // Unnamed: tests spawn several actors in one process.
    let (actor, _jh) = ractor::Actor::spawn(
        None,
        DbActor,
        database_url.to_string(),
    )
    .await
    .map_err(|e| AtelierError::Actor(format!("failed to spawn DbActor: {e}")))?;

    Ok(DbActorHandle { actor })
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), AtelierError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
