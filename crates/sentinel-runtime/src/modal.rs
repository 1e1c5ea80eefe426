//! Violation reflection modal
//!
//! Opens immediately on a charged violation with a placeholder reflection.
//! It cannot be dismissed until the cooldown has run out, whether or not the
//! reflection text has arrived. A violation while it is already open
//! replaces the reason and keeps the running cooldown.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::ModalError;
use crate::reflection::Reflection;

/// Identifies one reflection request; stale results are dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalTicket(u64);

#[derive(Debug, Clone)]
struct OpenModal {
    reason: String,
    reflection: Reflection,
    opened_at: Instant,
    ticket: u64,
}

/// Rendered modal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalView {
    pub title: String,
    pub fraud_message: String,
    pub message: String,
    pub suggestion: String,
    pub remaining_secs: u64,
    pub can_dismiss: bool,
    pub button_label: String,
}

/// Cooldown-gated modal
#[derive(Debug)]
pub struct ReflectionModal {
    cooldown: Duration,
    open: Option<OpenModal>,
    generation: u64,
}

impl ReflectionModal {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            open: None,
            generation: 0,
        }
    }

    /// Show the modal for `reason`
    ///
    /// The returned ticket must accompany the reflection that answers this
    /// violation.
    pub fn open(&mut self, reason: impl Into<String>) -> ModalTicket {
        self.generation += 1;
        let reason = reason.into();
        match self.open.as_mut() {
            Some(open) => {
                open.reason = reason;
                open.reflection = Reflection::placeholder();
                open.ticket = self.generation;
            }
            None => {
                self.open = Some(OpenModal {
                    reason,
                    reflection: Reflection::placeholder(),
                    opened_at: Instant::now(),
                    ticket: self.generation,
                });
            }
        }
        ModalTicket(self.generation)
    }

    /// Fill in the reflection; returns `false` if the ticket is stale
    pub fn populate(&mut self, ticket: ModalTicket, reflection: Reflection) -> bool {
        match self.open.as_mut() {
            Some(open) if open.ticket == ticket.0 => {
                open.reflection = reflection;
                true
            }
            _ => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Time left before dismissal is allowed; zero when closed
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.open.as_ref().map_or(Duration::ZERO, |open| {
            self.cooldown.saturating_sub(open.opened_at.elapsed())
        })
    }

    #[must_use]
    pub fn can_dismiss(&self) -> bool {
        self.is_open() && self.remaining().is_zero()
    }

    /// Close the modal
    ///
    /// # Errors
    /// - `ModalError::NotOpen` if nothing is shown
    /// - `ModalError::CooldownActive` before the cooldown ran out
    pub fn dismiss(&mut self) -> Result<(), ModalError> {
        if !self.is_open() {
            return Err(ModalError::NotOpen);
        }
        let remaining = self.remaining();
        if !remaining.is_zero() {
            return Err(ModalError::CooldownActive {
                remaining_secs: ceil_secs(remaining),
            });
        }
        self.open = None;
        Ok(())
    }

    /// Close regardless of cooldown, on session teardown
    pub fn close(&mut self) {
        self.open = None;
    }

    #[must_use]
    pub fn view(&self) -> Option<ModalView> {
        let open = self.open.as_ref()?;
        let remaining_secs = ceil_secs(self.remaining());
        let can_dismiss = remaining_secs == 0;
        let button_label = if can_dismiss {
            "Entendido, continuaré con integridad".to_string()
        } else {
            format!("Por favor, lee la reflexión ({remaining_secs})")
        };
        Some(ModalView {
            title: open.reflection.title.clone(),
            fraud_message: format!("Intento de fraude detectado: {}", open.reason),
            message: open.reflection.message.clone(),
            suggestion: open.reflection.suggestion.clone(),
            remaining_secs,
            can_dismiss,
            button_label,
        })
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooldown_gates_dismissal() {
        let mut modal = ReflectionModal::new(Duration::from_secs(30));
        assert_eq!(modal.dismiss(), Err(ModalError::NotOpen));

        let ticket = modal.open("cambio de pestaña");
        assert!(modal.populate(ticket, Reflection::new("T", "M", "S")));

        tokio::time::advance(Duration::from_millis(29_500)).await;
        assert_eq!(modal.dismiss(), Err(ModalError::CooldownActive { remaining_secs: 1 }));
        let view = modal.view().unwrap();
        assert_eq!(view.button_label, "Por favor, lee la reflexión (1)");
        assert_eq!(view.title, "T");

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(modal.can_dismiss());
        assert_eq!(
            modal.view().unwrap().button_label,
            "Entendido, continuaré con integridad"
        );
        assert_eq!(modal.dismiss(), Ok(()));
        assert!(modal.view().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_keeps_cooldown_and_drops_stale_results() {
        let mut modal = ReflectionModal::new(Duration::from_secs(30));
        let first = modal.open("intento de copiar contenido");
        tokio::time::advance(Duration::from_secs(20)).await;

        let second = modal.open("intento de pegar contenido");
        assert_eq!(modal.remaining(), Duration::from_secs(10));
        assert!(!modal.populate(first, Reflection::new("old", "old", "old")));
        assert!(modal.populate(second, Reflection::new("new", "new", "new")));

        let view = modal.view().unwrap();
        assert_eq!(view.fraud_message, "Intento de fraude detectado: intento de pegar contenido");
        assert_eq!(view.title, "new");
    }
}
