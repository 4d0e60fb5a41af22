// Spellings a stem name or track title may take inside an uploaded filename.

fn push_unique(out: &mut Vec<String>, value: String) {
    if !value.is_empty() && !out.contains(&value) {
        out.push(value);
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `"elevator music"` -> `"Elevator_Music"`.
pub fn capitalized_joined(text: &str, separator: &str) -> String {
    words(text).map(capitalize).collect::<Vec<_>>().join(separator)
}

/// `"Elevator Music"` -> `"elevator_music"`.
pub fn snake(text: &str) -> String {
    words(text)
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Original, lowercase, underscore- and hyphen-joined.
pub fn stem_variants(stem_name: &str) -> Vec<String> {
    let trimmed = stem_name.trim();
    let mut out = Vec::new();
    push_unique(&mut out, trimmed.to_string());
    push_unique(&mut out, trimmed.to_lowercase());
    push_unique(&mut out, trimmed.replace(' ', "_"));
    push_unique(&mut out, trimmed.replace(' ', "-"));
    out
}

/// Stem variants plus the `Capitalized_Words` form uploads are often named with.
pub fn track_variants(track_title: &str) -> Vec<String> {
    let mut out = stem_variants(track_title);
    push_unique(&mut out, capitalized_joined(track_title, "_"));
    out
}

/// Case-insensitive substring match of any variant.
pub fn contains_any(haystack: &str, variants: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    variants
        .iter()
        .any(|variant| haystack.contains(&variant.to_lowercase()))
}
