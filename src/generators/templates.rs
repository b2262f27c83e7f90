use super::{Locale, OfflineGenerator};

/// Fixed phrase per (kind, locale). Unknown kinds use the generic phrase.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn phrase(kind: &str, locale: Locale) -> &'static str {
        match (kind, locale) {
            ("quick_tip", Locale::Ru) => {
                "Я здесь. Опусти плечи и сделай длинный выдох, потом ещё один."
            }
            ("quick_tip", Locale::En) => {
                "I'm here. Drop your shoulders and take one long exhale, then another."
            }
            ("breathing_hint", Locale::Ru) => {
                "Попробуем вместе: вдох на четыре счёта, пауза на два, выдох на шесть. Три круга."
            }
            ("breathing_hint", Locale::En) => {
                "Let's try it together: breathe in for four, pause for two, out for six. Three rounds."
            }
            ("mood_reply", Locale::Ru) => {
                "Слышу тебя. Это чувство имеет право быть, давай просто заметим его."
            }
            ("mood_reply", Locale::En) => {
                "I hear you. This feeling is allowed to be here, let's simply notice it."
            }
            (_, Locale::Ru) => "Я рядом. Давай сделаем паузу и спокойно подышим.",
            (_, Locale::En) => "I'm with you. Let's pause for a moment and breathe calmly.",
        }
    }
}

impl OfflineGenerator for TemplateGenerator {
    fn generate(&self, kind: &str, _prompt: &str, locale: &str) -> String {
        Self::phrase(kind, Locale::from_code(locale)).to_string()
    }
}
