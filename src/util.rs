//! Small shared helpers: sorted-vec mutation, string truncation, token
//! generation, text normalization and filesystem writes.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

use rand::RngCore;
use rand::rngs::OsRng;

/// Read access to wiki files that goes through whatever lock the reader
/// represents. Implemented by the revision-store transactions.
pub trait FileReader {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Compares paths so that the tree structure survives flat sorting: `/` is
/// ordered before every other byte, which places subhyphae immediately after
/// their parent.
pub fn pathographic_compare(x: &str, y: &str) -> Ordering {
    fn weight(b: u8) -> i16 {
        if b == b'/' { -1 } else { b as i16 }
    }
    for (a, b) in x.bytes().zip(y.bytes()) {
        match weight(a).cmp(&weight(b)) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    x.len().cmp(&y.len())
}

/// Removes each element of `remove` from the sorted `slice`, keeping it sorted.
pub fn delete_sorted<E, F>(slice: &mut Vec<E>, compare: F, remove: &[E])
where
    F: Fn(&E, &E) -> Ordering,
{
    for el in remove {
        if let Ok(i) = slice.binary_search_by(|probe| compare(probe, el)) {
            slice.remove(i);
        }
    }
}

/// Inserts each element of `insert` into the sorted `slice`, replacing an
/// element that compares equal.
pub fn insert_sorted<E: Clone, F>(slice: &mut Vec<E>, compare: F, insert: &[E])
where
    F: Fn(&E, &E) -> Ordering,
{
    for el in insert {
        match slice.binary_search_by(|probe| compare(probe, el)) {
            Ok(i) => slice[i] = el.clone(),
            Err(i) => slice.insert(i, el.clone()),
        }
    }
}

/// Replaces `old` with `new` in the sorted `slice`. If `old` is absent, `new`
/// is inserted; if `new` is already present, `old` is only removed.
pub fn replace_sorted<E: Clone, F>(slice: &mut Vec<E>, compare: F, old: &E, new: &E)
where
    F: Fn(&E, &E) -> Ordering,
{
    let found_old = slice.binary_search_by(|probe| compare(probe, old));
    let found_new = slice.binary_search_by(|probe| compare(probe, new));
    match (found_old, found_new) {
        (Err(_), Ok(_)) => {}
        (Err(_), Err(j)) => slice.insert(j, new.clone()),
        (Ok(i), Ok(_)) => {
            slice.remove(i);
        }
        (Ok(i), Err(_)) => {
            slice.remove(i);
            if let Err(j) = slice.binary_search_by(|probe| compare(probe, new)) {
                slice.insert(j, new.clone());
            }
        }
    }
}

/// Generates a hex-encoded token from `n` random bytes.
pub fn random_string(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(n * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Checks that a revision hash route parameter looks like an abbreviated
/// git hash: at least 7 hex digits.
pub fn is_rev_hash(rev_hash: &str) -> bool {
    rev_hash.len() >= 7 && rev_hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Truncates `s` to at most `maxlen` characters. The boolean reports whether
/// anything was cut.
pub fn truncate(s: &str, maxlen: usize) -> (String, bool) {
    let count = s.chars().count();
    if count <= maxlen {
        return (s.to_string(), false);
    }
    (s.chars().take(maxlen).collect(), true)
}

/// Like [`truncate`] but keeps the right end of the string.
pub fn truncate_left(s: &str, maxlen: usize) -> (String, bool) {
    let count = s.chars().count();
    if count <= maxlen {
        return (s.to_string(), false);
    }
    (s.chars().skip(count - maxlen).collect(), true)
}

/// Normalizes user-submitted hypha text: trim, LF-only newlines, and a
/// trailing newline when the text is not empty.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let trimmed = text.trim();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\n' => {
                if chars.peek() == Some(&'\r') {
                    chars.next();
                }
                out.push('\n');
            }
            c => out.push(c),
        }
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Strips everything but dots, ASCII alphanumerics, dashes and underscores
/// from a file extension, then caps it at 16 characters.
pub fn sanitize_extension(ext: &str) -> String {
    let cleaned: String = ext
        .chars()
        .filter(|c| *c == '.' || *c == '-' || *c == '_' || c.is_ascii_alphanumeric())
        .collect();
    truncate(&cleaned, 16).0
}

/// Creates `dir` and its parents with group access on Unix.
pub fn create_dir_group(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o770));
    }
    Ok(())
}

/// Writes `data` to `path`, creating parent directories first.
pub fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_group(parent)?;
    }
    fs::write(path, data)
}

/// Streams `reader` into `path`, creating parent directories first.
pub fn copy_file(path: &Path, reader: &mut dyn io::Read) -> io::Result<u64> {
    if let Some(parent) = path.parent() {
        create_dir_group(parent)?;
    }
    let mut file = fs::File::create(path)?;
    io::copy(reader, &mut file)
}

/// Writes through a temp file in the target directory and renames it into
/// place, so readers never observe a half-written file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other(format!("{} has no parent directory", path.display())))?;
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    fs::write(temp.path(), data)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pathographic_order_puts_subhyphae_after_parent() {
        let mut names = vec!["a2", "a/b/c", "a", "a/b"];
        names.sort_by(|x, y| pathographic_compare(x, y));
        assert_eq!(names, vec!["a", "a/b", "a/b/c", "a2"]);
    }

    #[test]
    fn slash_sorts_before_every_other_byte() {
        assert_eq!(pathographic_compare("a/b", "a!b"), Ordering::Less);
        assert_eq!(pathographic_compare("a", "a/b"), Ordering::Less);
        assert_eq!(pathographic_compare("b", "a/b"), Ordering::Greater);
    }

    #[test]
    fn sorted_insert_and_delete_keep_order() {
        let cmp = |a: &&str, b: &&str| pathographic_compare(a, b);
        let mut v = vec!["a", "c"];
        insert_sorted(&mut v, cmp, &["b"]);
        assert_eq!(v, vec!["a", "b", "c"]);
        insert_sorted(&mut v, cmp, &["b"]);
        assert_eq!(v, vec!["a", "b", "c"]);
        delete_sorted(&mut v, cmp, &["a", "missing"]);
        assert_eq!(v, vec!["b", "c"]);
    }

    #[test]
    fn replace_sorted_moves_entries() {
        let cmp = |a: &&str, b: &&str| pathographic_compare(a, b);
        let mut v = vec!["a", "m", "z"];
        replace_sorted(&mut v, cmp, &"m", &"b");
        assert_eq!(v, vec!["a", "b", "z"]);
        replace_sorted(&mut v, cmp, &"b", &"y");
        assert_eq!(v, vec!["a", "y", "z"]);
    }

    #[test]
    fn normalize_text_unifies_newlines() {
        assert_eq!(normalize_text("  a\r\nb\r"), "a\nb\n");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("\n\n"), "");
        assert_eq!(normalize_text("x"), "x\n");
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let (s, cut) = truncate("приве", 3);
        assert_eq!(s, "при");
        assert!(cut);
        let (s, cut) = truncate_left("привет", 2);
        assert_eq!(s, "ет");
        assert!(cut);
        let (s, cut) = truncate("ok", 5);
        assert_eq!(s, "ok");
        assert!(!cut);
    }

    #[test]
    fn rev_hash_validation() {
        assert!(is_rev_hash("0123abc"));
        assert!(!is_rev_hash("0123ab"));
        assert!(!is_rev_hash("0123abg"));
    }

    #[test]
    fn extension_sanitizing() {
        assert_eq!(sanitize_extension(".jpg"), ".jpg");
        assert_eq!(sanitize_extension(".j!p/g"), ".jpg");
        assert_eq!(sanitize_extension(&".".repeat(40)).len(), 16);
    }
}
