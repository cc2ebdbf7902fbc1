use dashmap::DashMap;
use futures::future::BoxFuture;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{
    audio::queue::GuildQueue,
    error::{MusicError, MusicResult},
};

/// Almacén concurrente del estado de cada guild.
///
/// Cada guild tiene su propio lock: las mutaciones de un guild se serializan
/// y las de guilds distintos corren en paralelo.
#[derive(Default)]
pub struct GuildStore {
    guilds: DashMap<GuildId, Arc<Mutex<GuildQueue>>>,
}

impl GuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea un estado vacío si el guild no existe; no hace nada si ya existe.
    pub fn initialize(&self, guild_id: GuildId) {
        self.guilds.entry(guild_id).or_insert_with(|| {
            debug!("🆕 Estado creado para guild {}", guild_id);
            Arc::new(Mutex::new(GuildQueue::new()))
        });
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }

    /// Copia del estado actual del guild.
    pub async fn get(&self, guild_id: GuildId) -> MusicResult<GuildQueue> {
        let entry = self.entry(guild_id)?;
        let queue = entry.lock().await;
        Ok(queue.clone())
    }

    /// Aplica `f` con el lock exclusivo del guild y devuelve su resultado.
    ///
    /// Es la única vía para leer-modificar-escribir el estado de un guild. El
    /// closure puede esperar comandos del player mientras mantiene el lock.
    pub async fn mutate<F, R>(&self, guild_id: GuildId, f: F) -> MusicResult<R>
    where
        F: for<'a> FnOnce(&'a mut GuildQueue) -> BoxFuture<'a, MusicResult<R>>,
    {
        let entry = self.entry(guild_id)?;
        let mut queue = entry.lock().await;
        f(&mut *queue).await
    }

    /// Quita el guild (por ejemplo, cuando deja de estar disponible).
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildQueue>>> {
        self.guilds.remove(&guild_id).map(|(_, queue)| queue)
    }

    fn entry(&self, guild_id: GuildId) -> MusicResult<Arc<Mutex<GuildQueue>>> {
        // Se clona el Arc para no mantener el shard de DashMap bloqueado durante el await
        self.guilds.get(&guild_id).map(|entry| entry.clone()).ok_or_else(|| {
            error!("❌ Guild {} no inicializado", guild_id);
            MusicError::UnknownGuild(guild_id)
        })
    }
}
