//! Reflection requests
//!
//! After each charged violation a short reflective message is requested from
//! a text generator. The request never blocks event handling: the modal opens
//! with a placeholder and is populated when the generator answers. Any
//! failure is replaced by a fixed fallback triple.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use sentinel_core::{Severity, ViolationEvent};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::ReflectionError;

/// Title, message and suggestion shown in the modal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub title: String,
    pub message: String,
    pub suggestion: String,
}

impl Reflection {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Shown while the generator has not answered
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(
            "Integridad Académica",
            "Hemos detectado un comportamiento que podría comprometer la integridad de la evaluación.",
            "Por favor, continúa la evaluación sin utilizar recursos externos no autorizados.",
        )
    }

    /// Generator answered with something that is not a reflection
    #[must_use]
    pub fn generic_fallback() -> Self {
        Self::new(
            "Reflexión sobre Integridad",
            "Se ha detectado una acción que podría comprometer tu evaluación. Es una oportunidad para reflexionar sobre la importancia de la honestidad académica.",
            "Continúa con tu evaluación, enfocándote en demostrar tu propio conocimiento.",
        )
    }

    /// Generator could not be reached
    #[must_use]
    pub fn connection_fallback() -> Self {
        Self::new(
            "Error de Conexión",
            "No se pudo generar una reflexión en este momento debido a un error del sistema.",
            "Por favor, ignora este mensaje y continúa con tu evaluación.",
        )
    }

    fn is_complete(&self) -> bool {
        !(self.title.trim().is_empty()
            || self.message.trim().is_empty()
            || self.suggestion.trim().is_empty())
    }
}

/// Parameters of one reflection request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionPrompt {
    /// Student-facing reason label
    pub reason: String,
    pub count: u32,
    pub severity: Severity,
    pub seconds_away: u64,
}

impl ReflectionPrompt {
    #[must_use]
    pub fn from_event(event: &ViolationEvent) -> Self {
        Self {
            reason: event.reason.label(),
            count: event.count,
            severity: event.severity_hint,
            seconds_away: event.seconds_away,
        }
    }

    /// Instruction text for a language model
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "Eres un asistente educativo que promueve la integridad académica. Genera un mensaje \
             reflexivo único y profundo para un estudiante que ha realizado una acción que podría \
             considerarse un intento de fraude durante una evaluación en línea.\n\n\
             TIPO DE ACCIÓN DETECTADA:\n{reason}\n\n\
             NÚMERO DE INTENTOS DETECTADOS:\n{count}\n\n\
             NIVEL DE SEVERIDAD:\n{severity}\n\n\
             TIEMPO FUERA DE LA EVALUACIÓN:\n{seconds} segundos\n\n\
             INSTRUCCIONES ESPECÍFICAS:\n\
             - Genera un mensaje reflexivo ÚNICO y DIFERENTE cada vez\n\
             - Incluye una frase filosófica o cita inspiradora sobre la integridad, el conocimiento o la ética\n\
             - Adapta el tono según el nivel de severidad (bajo: educativo, medio: reflexivo, alto: serio pero constructivo)\n\
             - Evita un tono acusatorio, enfócate en el crecimiento personal\n\n\
             Responde ÚNICAMENTE en formato JSON con la siguiente estructura:\n\
             {{\"title\": string, \"message\": string, \"suggestion\": string}}\n",
            reason = self.reason,
            count = self.count,
            severity = self.severity.label(),
            seconds = self.seconds_away,
        )
    }
}

/// Text generation collaborator
#[async_trait]
pub trait ReflectionGenerator: Send + Sync {
    /// Free text expected to contain a JSON object
    ///
    /// # Errors
    /// Service failure
    async fn generate(&self, prompt: &ReflectionPrompt) -> Result<String, ReflectionError>;
}

/// Extract the first `{` .. last `}` span and decode it
///
/// Returns `None` when there is no object, it does not decode, or a field is
/// blank.
#[must_use]
pub fn parse_reflection(text: &str) -> Option<Reflection> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let reflection: Reflection = serde_json::from_str(&text[start..=end]).ok()?;
    reflection.is_complete().then_some(reflection)
}

const CANNED: &[(&str, &str, &str)] = &[
    (
        "Sócrates",
        "La verdadera sabiduría está en reconocer la propia ignorancia.",
        "Reflexiona sobre el valor de aprender por ti mismo.",
    ),
    (
        "Immanuel Kant",
        "La honestidad es mejor que cualquier política.",
        "Actúa siempre de acuerdo a principios éticos.",
    ),
    (
        "Confucio",
        "El hombre que ha cometido un error y no lo corrige comete otro error mayor.",
        "Corrige el rumbo y sigue aprendiendo con integridad.",
    ),
    (
        "Albert Einstein",
        "El ejemplo no es la mejor manera de educar, es la única.",
        "Sé ejemplo de honestidad en tu aprendizaje.",
    ),
    (
        "Aristóteles",
        "La excelencia moral es el resultado del hábito.",
        "Haz de la honestidad un hábito diario.",
    ),
    (
        "Platón",
        "La educación es el encendido de una llama, no el llenado de un recipiente.",
        "Busca el conocimiento por el placer de aprender.",
    ),
    (
        "Nelson Mandela",
        "La educación es el arma más poderosa que puedes usar para cambiar el mundo.",
        "Utiliza tu aprendizaje para construir un futuro mejor.",
    ),
    (
        "Leonardo da Vinci",
        "Aprender nunca cansa la mente.",
        "Disfruta el proceso de aprender con honestidad.",
    ),
    (
        "Mahatma Gandhi",
        "Vive como si fueras a morir mañana. Aprende como si fueras a vivir siempre.",
        "Aprovecha cada oportunidad para aprender con integridad.",
    ),
    (
        "Simone de Beauvoir",
        "El conocimiento es el único bien que crece cuando se comparte.",
        "Comparte lo que aprendes de manera honesta.",
    ),
    (
        "Voltaire",
        "Juzga a un hombre por sus preguntas más que por sus respuestas.",
        "Haz preguntas profundas y busca el porqué.",
    ),
    (
        "Emmanuel Levinas",
        "La ética es una óptica.",
        "Mira el aprendizaje desde la responsabilidad y el respeto.",
    ),
];

/// Offline generator returning a random canned quote
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticReflections;

impl StaticReflections {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Pick one canned reflection
    #[must_use]
    pub fn pick(&self) -> Reflection {
        let (title, message, suggestion) = CANNED[rand::rng().random_range(0..CANNED.len())];
        Reflection::new(title, message, suggestion)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        CANNED.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        CANNED.is_empty()
    }
}

#[async_trait]
impl ReflectionGenerator for StaticReflections {
    async fn generate(&self, _prompt: &ReflectionPrompt) -> Result<String, ReflectionError> {
        serde_json::to_string(&self.pick()).map_err(|e| ReflectionError::Unavailable(e.to_string()))
    }
}

/// Asks the generator and applies the fallbacks
#[derive(Clone)]
pub struct ReflectionRequester {
    generator: Arc<dyn ReflectionGenerator>,
}

impl ReflectionRequester {
    #[must_use]
    pub fn new(generator: Arc<dyn ReflectionGenerator>) -> Self {
        Self { generator }
    }

    /// Always yields a displayable reflection
    pub async fn reflect(&self, event: &ViolationEvent) -> Reflection {
        let prompt = ReflectionPrompt::from_event(event);
        match self.generator.generate(&prompt).await {
            Ok(text) => parse_reflection(&text).unwrap_or_else(|| {
                tracing::warn!(reason = %prompt.reason, "reflection output malformed, using fallback");
                Reflection::generic_fallback()
            }),
            Err(ReflectionError::Empty) => {
                tracing::warn!(reason = %prompt.reason, "reflection output empty, using fallback");
                Reflection::generic_fallback()
            }
            Err(error) => {
                tracing::warn!(reason = %prompt.reason, %error, "reflection request failed");
                Reflection::connection_fallback()
            }
        }
    }

    /// Fire and forget; `sink` receives the result on the spawned task
    pub fn request<F>(&self, event: ViolationEvent, sink: F) -> JoinHandle<()>
    where
        F: FnOnce(Reflection) + Send + 'static,
    {
        let requester = self.clone();
        tokio::spawn(async move {
            let reflection = requester.reflect(&event).await;
            sink(reflection);
        })
    }
}

impl std::fmt::Debug for ReflectionRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectionRequester").finish_non_exhaustive()
    }
}
