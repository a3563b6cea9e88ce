//! Display-name formatting

const GENERATIONAL_SUFFIXES: [&str; 4] = ["Jr.", "II", "III", "IV"];

/// Shorten a full name for tabular output
///
/// Generational suffixes are removed and the remaining tokens collapse to
/// first and last. When that is longer than `budget` characters the first
/// name is reduced to its initial.
pub fn format_user_name(full_name: &str, budget: usize) -> String {
    let names: Vec<&str> = full_name
        .split_whitespace()
        .filter(|token| !GENERATIONAL_SUFFIXES.contains(token))
        .collect();

    match names.as_slice() {
        [] => full_name.trim().to_string(),
        [only] => only.to_string(),
        [first, .., last] => {
            let short = format!("{} {}", first, last);
            if short.chars().count() > budget {
                let initial: String = first.chars().take(1).collect();
                format!("{}. {}", initial, last)
            } else {
                short
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NAME_LENGTH_BUDGET;

    fn fmt(name: &str) -> String {
        format_user_name(name, DEFAULT_NAME_LENGTH_BUDGET)
    }

    #[test]
    fn test_format_user_name() {
        assert_eq!(fmt("Jonathan D. Halverson"), "Jonathan Halverson");
        assert_eq!(fmt("Christopher A. Montgomery"), "C. Montgomery");
        assert_eq!(fmt("Garrett Wright"), "Garrett Wright");
        assert_eq!(fmt("Martin Luther King Jr."), "Martin King");
        assert_eq!(fmt("Henry Ford III"), "Henry Ford");
        assert_eq!(fmt("Madonna"), "Madonna");
        assert_eq!(fmt("Cher II"), "Cher");
    }

    #[test]
    fn test_budget_counts_characters() {
        // 18 characters with multi-byte letters stays whole
        assert_eq!(fmt("Zoë Ångström-Björk"), "Zoë Ångström-Björk");
        assert_eq!(format_user_name("Garrett Wright", 10), "G. Wright");
    }
}
