//! URL slugs for products and categories.

/// Build a URL slug from a display name.
///
/// Lowercases, folds Latin accents to their base letter, collapses every run
/// of other characters into a single `-` and trims dashes from both ends.
///
/// ```
/// use vitrine_core::slugify;
///
/// assert_eq!(slugify("Pão de Queijo (500g)"), "pao-de-queijo-500g");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

const fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_accents() {
        assert_eq!(slugify("Açúcar Orgânico"), "acucar-organico");
    }

    #[test]
    fn test_collapses_and_trims_separators() {
        assert_eq!(slugify("  --Café & Chá--  "), "cafe-cha");
        assert_eq!(slugify("a___b"), "a-b");
    }

    #[test]
    fn test_empty_when_nothing_alphanumeric() {
        assert_eq!(slugify("!!!"), "");
    }
}
