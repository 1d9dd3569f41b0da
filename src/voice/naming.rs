pub const SHADOW_SUFFIX: &str = "-vc";

/// Name of the text channel shadowing the voice room `voice_name`.
///
/// Accents are folded, the name is lowercased, whitespace becomes a hyphen,
/// anything outside `[a-z0-9-]` is dropped, hyphen runs collapse to one,
/// then `-vc` is appended.
pub fn shadow_channel_name(voice_name: &str) -> String {
    let mut name = String::with_capacity(voice_name.len() + SHADOW_SUFFIX.len());

    for c in voice_name.chars().flat_map(char::to_lowercase) {
        match fold_accent(c) {
            c if c.is_whitespace() || c == '-' => push_hyphen(&mut name),
            c @ ('a'..='z' | '0'..='9') => name.push(c),
            _ => {}
        }
    }

    name.push_str(SHADOW_SUFFIX);
    name
}

fn push_hyphen(name: &mut String) {
    if !name.ends_with('-') {
        name.push('-');
    }
}

/// Base letter of the accented Latin letters room names use.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        c => c,
    }
}
