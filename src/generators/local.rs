use super::{Locale, OfflineGenerator};
use crate::cache::key::normalize_prompt;

/// Deterministic offline responder, also the fallback for failed paid calls.
///
/// Each kind has a small set of variants; the variant is picked from the
/// normalized prompt, so the same input always yields the same answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalGenerator;

impl LocalGenerator {
    fn variants(kind: &str, locale: Locale) -> &'static [&'static str] {
        match (kind, locale) {
            ("breathing_hint" | "quick_tip", Locale::Ru) => &[
                "Начнём с выдоха. Вдох на четыре, короткая пауза, медленный выдох на шесть. Повтори трижды.",
                "Положи ладонь на живот и почувствуй, как он поднимается на вдохе. Три спокойных цикла.",
            ],
            ("breathing_hint" | "quick_tip", Locale::En) => &[
                "Start with an exhale. In for four, a short pause, a slow six-count out. Repeat three times.",
                "Rest a hand on your belly and feel it rise as you breathe in. Three calm cycles.",
            ],
            ("weekly_review", Locale::Ru) => &[
                "Эта неделя уже сохранена в заметках. Завтра посмотрим на неё свежим взглядом.",
            ],
            ("weekly_review", Locale::En) => &[
                "This week is saved in your notes. Tomorrow we can look back at it with fresh eyes.",
            ],
            ("deep_insight", Locale::Ru) => &[
                "Запиши одну мысль, которая сейчас тебя поддерживает, и вернись к ровному дыханию.",
                "Назови одно маленькое дело, которое получилось сегодня. Этого уже достаточно.",
            ],
            ("deep_insight", Locale::En) => &[
                "Write down one thought that supports you right now, then return to an even breath.",
                "Name one small thing that went right today. That is already enough.",
            ],
            (_, Locale::Ru) => &[
                "Я рядом. Сначала выдох, потом один маленький спокойный шаг.",
                "Ты не один с этим. Сделай паузу и почувствуй опору под ногами.",
            ],
            (_, Locale::En) => &[
                "I'm here. Exhale first, then take one small, calm step.",
                "You're not alone with this. Pause and feel the ground under your feet.",
            ],
        }
    }

    pub fn respond(kind: &str, prompt: &str, locale: Locale) -> &'static str {
        let variants = Self::variants(kind, locale);
        let seed = normalize_prompt(prompt)
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
        variants[seed % variants.len()]
    }
}

impl OfflineGenerator for LocalGenerator {
    fn generate(&self, kind: &str, prompt: &str, locale: &str) -> String {
        Self::respond(kind, prompt, Locale::from_code(locale)).to_string()
    }
}
