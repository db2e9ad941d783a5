//! Guards against late history responses overwriting a newer client selection.
//!
//! Every selection hands out a [`Ticket`] stamped with a generation number.
//! A fetch result is only applied if its ticket is still the latest one, so a
//! slow response for a previously selected client is dropped.

use log::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    client_id: String,
    generation: u64,
}

impl Ticket {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    InFlight,
    Loaded,
}

#[derive(Debug, Default)]
pub struct SelectionGuard {
    generation: u64,
    selected: Option<(String, LoadState)>,
}

impl SelectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_ref().map(|(id, _)| id.as_str())
    }

    /// False when the client is already selected and its history is either
    /// loaded or being fetched.
    pub fn needs_fetch(&self, client_id: &str) -> bool {
        !matches!(&self.selected, Some((id, _)) if id == client_id)
    }

    /// Selects `client_id`. Returns `None` if no new fetch is required.
    pub fn begin(&mut self, client_id: impl Into<String>) -> Option<Ticket> {
        let client_id = client_id.into();
        if !self.needs_fetch(&client_id) {
            debug!("Client {} already selected, skipping fetch", client_id);
            return None;
        }
        self.generation += 1;
        self.selected = Some((client_id.clone(), LoadState::InFlight));
        Some(Ticket {
            client_id,
            generation: self.generation,
        })
    }

    /// Whether the result fetched under `ticket` may be applied.
    pub fn accept(&mut self, ticket: &Ticket) -> bool {
        let current = ticket.generation == self.generation
            && matches!(&self.selected, Some((id, _)) if *id == ticket.client_id);
        if !current {
            warn!(
                "Dropping stale response for client {} (generation {}, latest {})",
                ticket.client_id, ticket.generation, self.generation
            );
            return false;
        }
        if let Some((_, state)) = self.selected.as_mut() {
            *state = LoadState::Loaded;
        }
        true
    }

    /// Applies `value` if `ticket` is still current.
    pub fn complete<T>(&mut self, ticket: &Ticket, value: T) -> Option<T> {
        self.accept(ticket).then_some(value)
    }

    /// A fetch failed; allow the same client to be fetched again.
    pub fn fail(&mut self, ticket: &Ticket) {
        if ticket.generation == self.generation {
            self.selected = None;
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.selected, Some((_, LoadState::Loaded)))
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_selection_wins() {
        let mut guard = SelectionGuard::new();
        let first = guard.begin("1").unwrap();
        let second = guard.begin("2").unwrap();

        assert!(!guard.accept(&first));
        assert!(guard.accept(&second));
        assert_eq!(guard.selected(), Some("2"));
        assert!(guard.is_loaded());
    }

    #[test]
    fn test_reselecting_same_client_does_not_refetch() {
        let mut guard = SelectionGuard::new();
        let ticket = guard.begin("7").unwrap();
        assert!(guard.begin("7").is_none());
        assert!(guard.accept(&ticket));
        assert!(!guard.needs_fetch("7"));
        assert!(guard.needs_fetch("8"));
    }

    #[test]
    fn test_switching_back_invalidates_old_ticket() {
        let mut guard = SelectionGuard::new();
        let a1 = guard.begin("a").unwrap();
        let _b = guard.begin("b").unwrap();
        let a2 = guard.begin("a").unwrap();

        assert_eq!(guard.complete(&a1, "old"), None);
        assert_eq!(guard.complete(&a2, "new"), Some("new"));
    }

    #[test]
    fn test_clear_and_fail() {
        let mut guard = SelectionGuard::new();
        let ticket = guard.begin("1").unwrap();
        guard.clear();
        assert!(!guard.accept(&ticket));
        assert_eq!(guard.selected(), None);

        let ticket = guard.begin("1").unwrap();
        guard.fail(&ticket);
        assert!(guard.needs_fetch("1"));
    }
}
