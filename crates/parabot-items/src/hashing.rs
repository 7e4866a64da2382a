//! SHA-1 content hashes backing the `.pabotsuitenames` cache file (§3, §8
//! invariant 7).

use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};

/// Suite-source file extensions recognized for the data-source content
/// hash. Kept narrow deliberately: unknown extensions (fixtures, images,
/// READMEs living next to suites) must not perturb the hash.
const KNOWN_SUITE_EXTENSIONS: &[&str] = &["robot", "resource", "txt", "tsv", "rst"];

pub fn hex_sha1(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Recursive content+path hash of the given data sources, limited to
/// known suite extensions (spec §4.2 step 1a).
pub fn hash_data_sources(sources: &[PathBuf]) -> std::io::Result<String> {
    let mut paths = Vec::new();
    for src in sources {
        collect_suite_paths(src, &mut paths)?;
    }
    paths.sort();
    let mut hasher = Sha1::new();
    for path in paths {
        hasher.update(path.to_string_lossy().as_bytes());
        if let Ok(contents) = std::fs::read(&path) {
            hasher.update(&contents);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_suite_paths(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if root.is_file() {
        if has_known_extension(root) {
            out.push(root.to_path_buf());
        }
        return Ok(());
    }
    if root.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(root)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.path());
        for entry in entries {
            collect_suite_paths(&entry.path(), out)?;
        }
    }
    Ok(())
}

fn has_known_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| KNOWN_SUITE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Hash of orchestrator+passthrough options, excluding presentation-only
/// keys (spec §4.2 step 1b). `opts` is pre-sorted by the caller for
/// determinism.
pub fn hash_options(opts: &[(String, String)], testlevelsplit: bool) -> String {
    const PRESENTATION_ONLY: &[&str] =
        &["outputdir", "output", "log", "report", "include", "exclude", "metadata", "name", "doc"];
    let mut hasher = Sha1::new();
    for (k, v) in opts {
        if PRESENTATION_ONLY.contains(&k.as_str()) {
            continue;
        }
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"testlevelsplit=");
    hasher.update(if testlevelsplit { b"1" } else { b"0" });
    hex::encode(hasher.finalize())
}

/// Fixed sentinel used when no `suitesfrom` file is in play (spec §3).
pub const SUITESFROM_SENTINEL: &str = "no-suitesfrom";

pub fn hash_suitesfrom(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        None => Ok(SUITESFROM_SENTINEL.to_string()),
        Some(p) => {
            let contents = std::fs::read(p)?;
            Ok(hex_sha1(&contents))
        }
    }
}

/// XOR-hash of payload lines (§6, §8 invariant 7): each line's SHA-1
/// digest is XORed together, byte-for-byte. `#WAIT`, `{`, `}` tokens are
/// excluded so structural reshuffling of barriers/groups alone doesn't
/// force regeneration from a stale content hash perspective — only the
/// runnable items' identity and order (captured by the header hashes)
/// matters here.
pub fn xor_hash_lines<'a>(lines: impl Iterator<Item = &'a str>) -> [u8; 20] {
    let mut acc = [0u8; 20];
    for line in lines {
        if line == "#WAIT" || line == "{" || line == "}" {
            continue;
        }
        let mut hasher = Sha1::new();
        hasher.update(line.as_bytes());
        let digest = hasher.finalize();
        for i in 0..20 {
            acc[i] ^= digest[i];
        }
    }
    acc
}

/// Final `file:` hash: a function of the three header hashes plus the
/// XOR-hash of the payload lines (spec §3, §8 invariant 7).
pub fn file_hash(datasources: &str, commandline: &str, suitesfrom: &str, xor_hash: &[u8; 20]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(datasources.as_bytes());
    hasher.update(commandline.as_bytes());
    hasher.update(suitesfrom.as_bytes());
    hasher.update(xor_hash);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_hash_excludes_structural_tokens() {
        let with_wait = xor_hash_lines(["--suite A", "#WAIT", "--suite B"].into_iter());
        let without_wait = xor_hash_lines(["--suite A", "--suite B"].into_iter());
        assert_eq!(with_wait, without_wait);
    }

    #[test]
    fn xor_hash_is_order_independent_but_content_sensitive() {
        let a = xor_hash_lines(["--suite A", "--suite B"].into_iter());
        let b = xor_hash_lines(["--suite B", "--suite A"].into_iter());
        assert_eq!(a, b, "xor is commutative by construction");
        let c = xor_hash_lines(["--suite A", "--suite C"].into_iter());
        assert_ne!(a, c);
    }

    #[test]
    fn file_hash_is_function_of_inputs() {
        let xor = xor_hash_lines(["--suite A"].into_iter());
        let h1 = file_hash("d1", "c1", "s1", &xor);
        let h2 = file_hash("d1", "c1", "s1", &xor);
        assert_eq!(h1, h2);
        let h3 = file_hash("d2", "c1", "s1", &xor);
        assert_ne!(h1, h3);
    }
}
