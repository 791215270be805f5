//! Prompt rendering for the roast model.
//!
//! Pure and deterministic: the same (style, intensity, text) always yields the
//! same prompt, byte for byte.

use crate::types::{Intensity, RoastStyle};

const PERSONA: &str = "You are a stand-up comedian who is also the user's close friend. \
Roast the resume below in a fun, sarcastic, brutally honest way. \
Mature, slightly dark humor is fine, and so are dad jokes when they fit.";

const FORMAT_RULES: &str = "Format rules:\n\
- Keep the whole roast under 150 words.\n\
- Plain text only, no headings or bullet lists.\n\
- Talk to the reader directly and keep it casual.\n\
- Roast the resume, never the person's identity.";

const TEXT_HEADER: &str = "My Resume:";

fn style_line(style: RoastStyle) -> &'static str {
    match style {
        RoastStyle::Gentle => {
            "Style: gentle. Tease like a supportive friend and slip in one genuinely useful tip."
        }
        RoastStyle::Balanced => {
            "Style: balanced. Mix sharp jokes with honest observations about what stands out."
        }
        RoastStyle::Savage => {
            "Style: savage. Don't hold back; go for the cringe-worthy parts first."
        }
    }
}

fn intensity_line(intensity: Intensity) -> &'static str {
    match intensity {
        Intensity::Low => "Intensity: low. Keep the burns light and friendly.",
        Intensity::Medium => "Intensity: medium. Land a few real hits but keep it playful.",
        Intensity::High => "Intensity: high. Make every line sting; simple, sharp and to the point.",
    }
}

/// Render the model prompt. `text` is appended verbatim after the header.
pub fn render_prompt(style: RoastStyle, intensity: Intensity, text: &str) -> String {
    format!(
        "{}\n\n{}\n{}\n\n{}\n\n{}\n{}",
        PERSONA,
        style_line(style),
        intensity_line(intensity),
        FORMAT_RULES,
        TEXT_HEADER,
        text
    )
}
