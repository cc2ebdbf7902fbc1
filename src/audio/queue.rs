use rand::seq::SliceRandom;
use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::{
        player::{PlayerHandle, SessionId},
        track::Track,
    },
    error::{MusicError, MusicResult},
};

/// Dónde insertar los tracks resueltos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// Al final de la cola
    End,
    /// Al principio, para "reproducir a continuación"
    Front,
}

/// Estado de reproducción de un guild.
///
/// Solo se modifica a través de [`GuildStore::mutate`](super::store::GuildStore::mutate).
#[derive(Clone, Default)]
pub struct GuildQueue {
    pub(crate) pending: VecDeque<Track>,
    pub(crate) current: Option<Track>,
    pub(crate) connection: Option<Arc<dyn PlayerHandle>>,
    pub(crate) session: SessionId,
    /// `leave` desconectó y la actualización de voz correspondiente aún no llegó
    pub(crate) leaving: bool,
}

impl fmt::Debug for GuildQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildQueue")
            .field("pending", &self.pending.len())
            .field("current", &self.current.as_ref().map(Track::display_title))
            .field("connected", &self.connection.is_some())
            .field("session", &self.session)
            .field("leaving", &self.leaving)
            .finish()
    }
}

impl GuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &VecDeque<Track> {
        &self.pending
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn connection(&self) -> Option<Arc<dyn PlayerHandle>> {
        self.connection.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Inserta tracks conservando su orden.
    ///
    /// Devuelve cuántos se agregaron; los que no caben en `max_size` se descartan.
    pub fn insert_tracks(&mut self, tracks: Vec<Track>, position: QueuePosition, max_size: usize) -> usize {
        let available = max_size.saturating_sub(self.pending.len());
        let to_add = tracks.len().min(available);

        match position {
            QueuePosition::End => self.pending.extend(tracks.into_iter().take(to_add)),
            QueuePosition::Front => {
                for track in tracks.into_iter().take(to_add).rev() {
                    self.pending.push_front(track);
                }
            }
        }

        info!("➕ Agregadas {} canciones a la cola ({:?})", to_add, position);
        to_add
    }

    /// Saca el siguiente track de la cola (FIFO)
    pub fn pop_next(&mut self) -> Option<Track> {
        let next = self.pending.pop_front();
        match &next {
            Some(track) => debug!("➡️ Siguiente en cola: {}", track.display_title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Descarta `amount` tracks del principio de la cola
    pub fn drop_front(&mut self, amount: usize) -> usize {
        let dropped = amount.min(self.pending.len());
        self.pending.drain(..dropped);
        dropped
    }

    /// Vuelve a poner el track actual al principio de la cola.
    pub fn requeue_current(&mut self) -> Option<&Track> {
        let current = self.current.take()?;
        self.pending.push_front(current);
        self.pending.front()
    }

    /// Elimina el track en la posición `index` (empezando en 1)
    pub fn remove(&mut self, index: usize) -> MusicResult<Track> {
        let len = self.pending.len();
        if index == 0 || index > len {
            return Err(MusicError::InvalidIndex { index, len });
        }

        let removed = self
            .pending
            .remove(index - 1)
            .ok_or(MusicError::InvalidIndex { index, len })?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) -> MusicResult<usize> {
        if self.pending.is_empty() {
            return Err(MusicError::QueueEmpty);
        }

        self.pending.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada");
        Ok(self.pending.len())
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        info!("🗑️ Cola limpiada");
        cleared
    }

    /// Deja el guild vacío y desconectado.
    ///
    /// Devuelve la conexión anterior para que el llamador la cierre fuera del lock.
    pub fn reset(&mut self) -> Option<Arc<dyn PlayerHandle>> {
        self.pending.clear();
        self.current = None;
        self.session += 1;
        self.leaving = false;
        self.connection.take()
    }

    pub fn info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.pending.iter().cloned().collect(),
            total_items: self.pending.len(),
            total_duration: self.calculate_total_duration(),
        }
    }

    fn calculate_total_duration(&self) -> Duration {
        let queue_duration: Duration = self.pending.iter().filter_map(Track::duration).sum();

        let current_duration = self
            .current
            .as_ref()
            .and_then(Track::duration)
            .unwrap_or_default();

        queue_duration + current_duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub total_items: usize,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = if self.total_items == 0 {
            1
        } else {
            self.total_items.div_ceil(items_per_page)
        };
        let safe_page = page.clamp(1, total_pages);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            items: if start < self.items.len() { self.items[start..end].to_vec() } else { Vec::new() },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Posición (desde 1) del primer item de la página
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
