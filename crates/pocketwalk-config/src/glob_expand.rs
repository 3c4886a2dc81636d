//! Glob expansion for target/trigger paths and argv templates.
//!
//! A word containing `*` is expanded against the filesystem; a leading `/`
//! roots the pattern at the filesystem root instead of the current working
//! directory. Words with no `*` pass through unchanged -- this lets an argv
//! template word like `--check` or `{affected_targets}` coexist with real
//! glob patterns in the same list without special-casing either.

use std::path::Path;

pub fn expand_words(words: &[String], cwd: &Path) -> Vec<String> {
    words.iter().flat_map(|w| expand_one(w, cwd)).collect()
}

fn expand_one(word: &str, cwd: &Path) -> Vec<String> {
    if !word.contains('*') {
        return vec![word.to_string()];
    }

    let (root, pattern) = if let Some(rest) = word.strip_prefix('/') {
        (Path::new("/").to_path_buf(), rest.to_string())
    } else {
        (cwd.to_path_buf(), word.to_string())
    };

    let full_pattern = root.join(&pattern);
    let pattern_str = full_pattern.to_string_lossy().into_owned();

    match glob::glob(&pattern_str) {
        Ok(paths) => {
            let matched: Vec<String> = paths
                .filter_map(Result::ok)
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            if matched.is_empty() {
                vec![]
            } else {
                matched
            }
        }
        Err(_) => vec![word.to_string()],
    }
}
