//! ntfy tag to emoji mapping
//!
//! ntfy shows a tag as an emoji when the tag is a known emoji short code and
//! as plain text otherwise. This table covers the short codes ntfy documents
//! for tags.

const EMOJI: &[(&str, &str)] = &[
    ("+1", "👍"),
    ("-1", "👎"),
    ("facepalm", "🤦"),
    ("partying_face", "🥳"),
    ("warning", "⚠️"),
    ("no_entry", "⛔"),
    ("tada", "🎉"),
    ("rotating_light", "🚨"),
    ("no_entry_sign", "🚫"),
    ("heavy_check_mark", "✔️"),
    ("white_check_mark", "✅"),
    ("triangular_flag_on_post", "🚩"),
    ("cd", "💿"),
    ("loudspeaker", "📢"),
    ("skull", "💀"),
    ("computer", "💻"),
    ("fire", "🔥"),
    ("bell", "🔔"),
    ("x", "❌"),
    ("heavy_exclamation_mark", "❗"),
];

pub fn lookup(tag: &str) -> Option<&'static str> {
    EMOJI
        .iter()
        .find(|(code, _)| *code == tag)
        .map(|(_, emoji)| *emoji)
}

/// Split tags into emoji and the tags that have none, keeping order.
pub fn split_tags(tags: &[String]) -> (Vec<&'static str>, Vec<&str>) {
    let mut emoji = Vec::new();
    let mut plain = Vec::new();
    for tag in tags {
        match lookup(tag) {
            Some(e) => emoji.push(e),
            None => plain.push(tag.as_str()),
        }
    }
    (emoji, plain)
}
