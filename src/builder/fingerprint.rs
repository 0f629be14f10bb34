//! Stable per-command fingerprints.
//!
//! A fingerprint identifies one (source file, effective options) pair.
//! Each option set is sorted before hashing, so two scans that discover
//! the same flags in a different order produce the same fingerprint and
//! the same object file name.

use std::path::Path;

use crate::util::hash::Fingerprint;

/// Digest length kept for object file names and store keys.
const FINGERPRINT_LEN: usize = 32;

/// Fingerprint one compile command from its inputs.
///
/// `custom_args` are the per-file overrides, already flattened; they are
/// hashed order-sensitively because their order is part of the override.
pub fn command_fingerprint(
    file: &Path,
    flags: &[String],
    definitions: &[String],
    includes: &[String],
    custom_args: &[String],
) -> String {
    let mut fp = Fingerprint::new();
    fp.update_str(&file.display().to_string());
    for (label, set) in [("flags", flags), ("defs", definitions), ("incs", includes)] {
        let mut sorted: Vec<&str> = set.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        // Label each set so a token moving between sets changes the digest.
        fp.update_str(label);
        fp.update_strs(sorted);
    }
    fp.update_str("custom");
    fp.update_strs(custom_args.iter().map(String::as_str));
    let mut digest = fp.finish();
    digest.truncate(FINGERPRINT_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fingerprint_is_order_insensitive() {
        let file = PathBuf::from("/p/src/main.c");
        let a = command_fingerprint(
            &file,
            &owned(&["-O2", "-g"]),
            &owned(&["FOO", "BAR=1"]),
            &owned(&["/p/include", "/usr/include"]),
            &[],
        );
        let b = command_fingerprint(
            &file,
            &owned(&["-g", "-O2"]),
            &owned(&["BAR=1", "FOO"]),
            &owned(&["/usr/include", "/p/include"]),
            &[],
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_sensitive_to_each_input() {
        let file = PathBuf::from("/p/src/main.c");
        let base = command_fingerprint(&file, &owned(&["-O2"]), &[], &[], &[]);

        let other_file =
            command_fingerprint(&PathBuf::from("/p/src/other.c"), &owned(&["-O2"]), &[], &[], &[]);
        let other_flags = command_fingerprint(&file, &owned(&["-O3"]), &[], &[], &[]);
        let with_def = command_fingerprint(&file, &owned(&["-O2"]), &owned(&["X"]), &[], &[]);
        let with_custom = command_fingerprint(&file, &owned(&["-O2"]), &[], &[], &owned(&["-g"]));

        assert_ne!(base, other_file);
        assert_ne!(base, other_flags);
        assert_ne!(base, with_def);
        assert_ne!(base, with_custom);
    }

    #[test]
    fn test_fingerprint_flag_and_definition_sets_distinct() {
        // The same token carried as a flag versus as a definition must not
        // collide.
        let file = PathBuf::from("/p/a.c");
        let as_flag = command_fingerprint(&file, &owned(&["X"]), &[], &[], &[]);
        let as_def = command_fingerprint(&file, &[], &owned(&["X"]), &[], &[]);
        assert_ne!(as_flag, as_def);
    }
}
