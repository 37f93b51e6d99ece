use regex::Regex;

/// Default suffixes stripped from class names before searching. These are
/// the naming conventions seen in practice; the list is user-editable at
/// runtime.
const DEFAULT_SUFFIXES: &[&str] = &[
    "_UIL",
    "_IN",
    "_US",
    "_CA",
    "_SG",
    "_AU",
    "_IE",
    "_UK",
    "_CS2",
    "_Class_Consolidation",
    "_Paradigm",
    "_Mirage",
    "_100keyword",
    "_100_keyword",
];

/// Editable list of known class-name suffixes.
#[derive(Debug, Clone)]
pub struct SuffixList {
    suffixes: Vec<String>,
}

impl Default for SuffixList {
    fn default() -> Self {
        SuffixList {
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SuffixList {
    pub fn empty() -> Self {
        SuffixList {
            suffixes: Vec::new(),
        }
    }

    pub fn from_suffixes<I: IntoIterator<Item = String>>(suffixes: I) -> Self {
        let mut list = SuffixList::empty();
        for s in suffixes {
            list.push(s);
        }
        list
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Adds suffixes from a raw entry string. Entries may contain several
    /// suffixes separated by comma, semicolon or whitespace; duplicates are
    /// ignored. Returns the suffixes actually added.
    pub fn add(&mut self, entry: &str) -> Vec<String> {
        let splitter = Regex::new(r"[;,\s]+").unwrap();
        let mut added = Vec::new();
        for part in splitter.split(entry) {
            let part = part.trim();
            if !part.is_empty() && !self.suffixes.iter().any(|s| s == part) {
                self.suffixes.push(part.to_string());
                added.push(part.to_string());
            }
        }
        added
    }

    /// Removes one suffix by exact name. Returns whether it was present.
    pub fn remove(&mut self, suffix: &str) -> bool {
        let before = self.suffixes.len();
        self.suffixes.retain(|s| s != suffix);
        self.suffixes.len() != before
    }

    fn push(&mut self, suffix: String) {
        if !suffix.is_empty() && !self.suffixes.iter().any(|s| *s == suffix) {
            self.suffixes.push(suffix);
        }
    }

    /// Strips known suffixes from the end of a class name.
    ///
    /// Matching is case-insensitive and prefers the longest matching suffix.
    /// Stripping repeats until no suffix matches, so cleaning an already
    /// clean name is a no-op.
    pub fn clean_class_name(&self, class_name: &str) -> String {
        let mut name = class_name.to_string();
        loop {
            let best = self
                .suffixes
                .iter()
                .filter(|s| !s.is_empty() && ends_with_ignore_case(&name, s))
                .max_by_key(|s| s.len());
            match best {
                Some(suffix) => {
                    let cut = name.len() - suffix.len();
                    name.truncate(cut);
                }
                None => return name,
            }
        }
    }
}

/// Case-insensitive suffix check that only matches on a char boundary of
/// `name`, so the caller's cut at `name.len() - suffix.len()` is always
/// valid. Uppercasing the whole name would not guarantee that: some
/// characters change byte length under case conversion.
fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    match name.len().checked_sub(suffix.len()) {
        Some(cut) => name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(suffix),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_known_suffix_case_insensitively() {
        let list = SuffixList::default();
        assert_eq!(list.clean_class_name("WidgetClass_US"), "WidgetClass");
        assert_eq!(list.clean_class_name("WidgetClass_us"), "WidgetClass");
        assert_eq!(list.clean_class_name("GadgetClass"), "GadgetClass");
    }

    #[test]
    fn prefers_longest_matching_suffix() {
        let list = SuffixList::from_suffixes(vec!["_IN".to_string(), "_UIL_IN".to_string()]);
        assert_eq!(list.clean_class_name("Foo_UIL_IN"), "Foo");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let list = SuffixList::default();
        for name in ["WidgetClass_US", "A_US_US", "Plain", "_IN", "x_100keyword"] {
            let once = list.clean_class_name(name);
            let twice = list.clean_class_name(&once);
            assert_eq!(once, twice, "clean not idempotent for {name}");
        }
    }

    #[test]
    fn non_ascii_names_never_split_mid_character() {
        // "ß" uppercases to "SS", so matching against an uppercased copy
        // would compute a cut inside the character and panic.
        let list = SuffixList::from_suffixes(vec!["s".to_string()]);
        assert_eq!(list.clean_class_name("Weiß"), "Weiß");

        let list = SuffixList::from_suffixes(vec!["_US".to_string()]);
        assert_eq!(list.clean_class_name("Größe_US"), "Größe");
    }

    #[test]
    fn add_splits_on_separators_and_dedupes() {
        let mut list = SuffixList::empty();
        let added = list.add("_A, _B; _C _A");
        assert_eq!(added, vec!["_A", "_B", "_C"]);
        assert_eq!(list.suffixes().len(), 3);
        assert!(list.add("_B").is_empty());
    }

    #[test]
    fn remove_drops_existing_suffix() {
        let mut list = SuffixList::empty();
        list.add("_A _B");
        assert!(list.remove("_A"));
        assert!(!list.remove("_A"));
        assert_eq!(list.clean_class_name("Foo_A"), "Foo_A");
        assert_eq!(list.clean_class_name("Foo_B"), "Foo");
    }
}
