use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use regex::Regex;

/// Normalize a path string: forward slashes only, drive-letter prefix
/// stripped, runs of slashes collapsed.
pub fn normalize(path: &str) -> String {
    let mut s = path.replace('\\', "/");
    // Strip a Windows drive prefix like "C:" or "c:".
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        s = s[2..].to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        if c == '/' {
            if !prev_slash {
                out.push('/');
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Normalize a filesystem path.
pub fn normalize_path(path: &Path) -> String {
    normalize(&path.to_string_lossy())
}

/// Relativize `target` against `base`, both normalized first. Falls back to
/// the normalized absolute target if `target` does not live under `base`.
pub fn relativize(base: &Path, target: &Path) -> String {
    match target.strip_prefix(base) {
        Ok(rel) => normalize_path(rel),
        Err(_) => normalize_path(target),
    }
}

/// Convert a glob pattern to a regex. Handles `*`, `**`, `**/`, and `?`.
/// `**/` matches zero or more directories, so `**/X` matches both `X` and
/// `a/X`; a bare `**` matches any characters including slashes.
/// Returns `None` if the resulting regex is invalid.
pub fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut regex = String::with_capacity(glob.len() * 2);
    regex.push('^');

    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    if i + 2 < chars.len() && chars[i + 2] == '/' {
                        regex.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        regex.push_str(".*");
                        i += 2;
                    }
                } else {
                    regex.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                regex.push_str("[^/]");
                i += 1;
            }
            '.' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\' => {
                regex.push('\\');
                regex.push(chars[i]);
                i += 1;
            }
            c => {
                regex.push(c);
                i += 1;
            }
        }
    }

    regex.push('$');
    Regex::new(&regex).ok()
}

fn glob_cache() -> &'static Mutex<HashMap<String, Option<Regex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Option<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Whether `path` (normalized) matches `glob`. Compiled regexes are cached
/// process-wide by glob string; an invalid glob matches nothing.
pub fn glob_matches(glob: &str, path: &str) -> bool {
    let mut cache = glob_cache().lock().expect("glob cache poisoned");
    let compiled = cache
        .entry(glob.to_string())
        .or_insert_with(|| glob_to_regex(glob));
    match compiled {
        Some(re) => re.is_match(path),
        None => false,
    }
}
