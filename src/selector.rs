//! # Variant Selection Module
//!
//! Questo modulo costruisce i descriptor responsive e sceglie la variante
//! migliore per una larghezza target al momento del render.
//!
//! ## Responsabilità:
//! - `build_srcset`: lista srcset ordinata per larghezza crescente
//! - `build_sizes`: tabella fissa di breakpoint viewport
//! - `pick_optimal`: la più piccola variante con width >= target, con
//!   fallback alla più grande disponibile
//!
//! ## Regole:
//! - Solo varianti del formato richiesto entrano nella selezione
//! - La pseudo-classe "original" non partecipa mai alla selezione
//! - Nessuna variante del formato => None

use crate::media::{OutputFormat, SizeClass, Variant};

/// Builds responsive descriptors and picks render-time variants. Stateless.
pub struct VariantSelector;

impl VariantSelector {
    /// Candidates of one format, ascending by encoded width. The original
    /// pseudo-class is excluded.
    fn candidates<'a>(variants: &'a [Variant], format: OutputFormat) -> Vec<&'a Variant> {
        let mut matching: Vec<&Variant> = variants
            .iter()
            .filter(|v| v.format == Some(format) && v.size_class != SizeClass::Original)
            .collect();
        matching.sort_by_key(|v| v.width);
        matching
    }

    /// Build a `srcset` attribute value: `"<url> <width>w"` entries joined
    /// by commas, strictly ascending by width, one entry per variant of the
    /// requested format.
    pub fn build_srcset(variants: &[Variant], format: OutputFormat) -> String {
        Self::candidates(variants, format)
            .iter()
            .map(|v| format!("{} {}w", v.public_url, v.width))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Fixed viewport-breakpoint table for the `sizes` attribute.
    pub fn build_sizes() -> &'static str {
        "(max-width: 640px) 100vw, (max-width: 768px) 50vw, (max-width: 1024px) 33vw, 25vw"
    }

    /// Pick the best variant for a target display width.
    ///
    /// Returns the smallest variant of `format` with width >= `target_width`;
    /// if none qualifies, the largest available variant of that format; or
    /// `None` if the format has no variants at all.
    pub fn pick_optimal(
        variants: &[Variant],
        target_width: u32,
        format: OutputFormat,
    ) -> Option<&Variant> {
        let candidates = Self::candidates(variants, format);
        candidates
            .iter()
            .find(|v| v.width >= target_width)
            .copied()
            .or_else(|| candidates.last().copied())
    }
}
