//! services/api/src/prompts.rs
//!
//! Centralized prompt definitions for the astrology AI calls. Keeping every
//! prompt in one module makes the model-facing surface reviewable in one
//! place.

use astro_guide_core::domain::{AiSigns, MoonInfo};

//=========================================================================================
// Sign Lookup
//=========================================================================================

/// System prompt for the model-derived sign lookup. The calculation method
/// is pinned so the answer is deterministic in intent, and the output is
/// constrained to a bare three-key JSON object so it can be machine-parsed.
pub const SIGN_LOOKUP_SYSTEM: &str = r#"You are an expert astrologer. Calculate astrological signs using the sidereal zodiac with the Lahiri ayanamsha and geocentric planetary positions.

Respond with STRICT JSON only. The response must be exactly one JSON object with exactly these three keys and string values:
{"solarSign": "...", "vedicMoonSign": "...", "chineseSign": "..."}

Do not use markdown. Do not add code fences, commentary, or any other keys."#;

/// User message for the sign lookup. The UTC birth instant is included when
/// a validated location made one derivable.
pub fn sign_lookup_user(profile_summary: &str, birth_instant_utc: Option<&str>) -> String {
    match birth_instant_utc {
        Some(instant) => format!(
            "Determine the signs for this person.\n\nProfile:\n{profile_summary}\n\nBirth moment (UTC): {instant}"
        ),
        None => format!(
            "Determine the signs for this person from the profile alone.\n\nProfile:\n{profile_summary}"
        ),
    }
}

//=========================================================================================
// Focus Summaries
//=========================================================================================

/// System prompt for the per-focus-area weekly outlook.
pub const FOCUS_SYSTEM: &str = r#"You are an astrologer assistant blending Western, Vedic, and Chinese astrology.
Provide a short, practical weekly outlook based on the Lunar, Sun, and Chinese signs provided.

Requirements:
- Return 3-5 short lines (not long paragraphs).
- Keep it grounded and actionable (themes, timing, suggestions).
- Do not ask questions.
- Do not include disclaimers.
- Do not mention that you are an AI."#;

/// User message for the per-focus-area weekly outlook.
pub fn focus_user(
    focus_area: &str,
    lunar_sign: &str,
    solar_sign: &str,
    chinese_sign: &str,
    profile_summary: &str,
) -> String {
    format!(
        r#"Create a concise weekly prediction in the form of a haiku, focused on: {focus_area}.

Signs:
- Lunar (Sidereal): {lunar_sign}
- Sun (Western): {solar_sign}
- Chinese: {chinese_sign}

Profile context:
{profile_summary}

Output format:
- One-line overall theme
- Haiku for the week
- One-line guidance on what to do
- One-line guidance on what to avoid"#
    )
}

/// Shown when a summary stream completes without producing any text.
pub const EMPTY_SUMMARY_FALLBACK: &str =
    "No guidance is available for this focus area right now. Please try again.";

//=========================================================================================
// Chat
//=========================================================================================

/// Persona for the conversational guide.
pub const CHAT_PERSONA: &str = r#"You are a helpful astrologer assistant blending Western, Vedic, and Chinese astrology.
Provide thoughtful, actionable guidance. Be clear about uncertainty and avoid absolute claims.
Keep responses concise but useful. Ask a clarifying question if the user's query is ambiguous.
Do not include disclaimers. Do not mention that you are an AI."#;

/// Full system prompt for a chat turn. Sent in full on every call; no
/// server-side conversation state is retained by the model collaborator.
pub fn chat_system(
    profile_summary: &str,
    focus_hint: &str,
    moon: Option<&MoonInfo>,
    ai_signs: Option<&AiSigns>,
) -> String {
    let mut prompt = format!("{CHAT_PERSONA}\n\nUser Profile:\n{profile_summary}");

    if !focus_hint.is_empty() {
        prompt.push_str("\n\nFocus Guidance:\n");
        prompt.push_str(focus_hint);
    }

    if let Some(moon) = moon {
        prompt.push_str(&format!(
            "\n\nLunar sign (ephemeris, sidereal): {} ({:.2} degrees into the sign)",
            moon.sign, moon.degree_in_sign
        ));
    }

    if let Some(signs) = ai_signs {
        prompt.push_str(&format!(
            "\n\nOther signs: Sun (Western) {}, Moon (Vedic) {}, Chinese {}",
            signs.solar_sign, signs.vedic_moon_sign, signs.chinese_sign
        ));
    }

    prompt
}

/// First assistant message of every chat session.
pub const CHAT_GREETING: &str = "Hello. I'm your astrologer guide. Ask a specific question and I'll tailor the answer to your profile and focus area.";

/// Replaces the assistant placeholder when a stream fails mid-response.
pub const CHAT_APOLOGY: &str =
    "I'm sorry, I couldn't finish that response. Please try asking again.";
